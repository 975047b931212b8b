//! Custom-format dumps (`pg_dump -Fc`).
//!
//! The archive carries its own compression and table of contents, so the
//! structural check is `pg_restore --list` and restores go through
//! `pg_restore` directly.

use crate::config::{ConnectionConfig, ToolsConfig};
use crate::error::{Error, PgError};
use crate::pg::exec::PgRunner;
use crate::pg::{DumpCheck, DumpFormat};
use std::path::Path;
use tracing::debug;

pub struct CustomFormat {
    runner: PgRunner,
    compression: u32,
}

impl CustomFormat {
    pub fn new(conn: &ConnectionConfig, tools: &ToolsConfig, compression: u32) -> Self {
        Self {
            runner: PgRunner::new(conn, tools),
            compression,
        }
    }
}

#[async_trait::async_trait]
impl DumpFormat for CustomFormat {
    fn name(&self) -> &str {
        "custom"
    }

    async fn create(&self, database: &str, dest: &Path) -> Result<(), Error> {
        let tool = self.runner.tools().pg_dump.clone();
        let args = vec![
            "-Fc".to_string(),
            "-Z".to_string(),
            self.compression.to_string(),
            "-f".to_string(),
            dest.display().to_string(),
            database.to_string(),
        ];

        self.runner.run(&tool, &args, database).await?;
        debug!("custom dump of {} written to {}", database, dest.display());
        Ok(())
    }

    async fn check(&self, path: &Path) -> Result<DumpCheck, Error> {
        let tool = self.runner.tools().pg_restore.clone();
        let args = vec!["--list".to_string(), path.display().to_string()];

        let output = self.runner.run_local(&tool, &args).await?;
        let listing = String::from_utf8_lossy(&output.stdout);

        // TOC entries are the non-empty lines that are not ';' comments
        let entries = listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with(';'))
            .count() as u64;

        if entries == 0 {
            return Err(Error::Pg(PgError::InvalidOutput {
                tool,
                details: format!("archive {} lists no contents", path.display()),
            }));
        }

        Ok(DumpCheck {
            items: entries,
            detail: format!("{} archive entries", entries),
        })
    }

    async fn restore(&self, path: &Path, target_db: &str) -> Result<(), Error> {
        let tool = self.runner.tools().pg_restore.clone();
        let args = vec![
            "--no-owner".to_string(),
            "-d".to_string(),
            target_db.to_string(),
            path.display().to_string(),
        ];

        self.runner.run(&tool, &args, target_db).await?;
        Ok(())
    }
}
