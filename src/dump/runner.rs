//! Concurrent dump execution, one task per database.
//!
//! A cycle fans out over the target databases with `join_all` and
//! tolerates partial failure: every database produces a catalog entry,
//! with failures recorded as `failed` entries carrying the error
//! message. Deciding whether the cycle as a whole failed (all
//! databases down vs. one flaky one) is left to the caller.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::catalog::{self, DumpEntry, DumpStatus};
use crate::config::Config;
use crate::dump::naming;
use crate::error::{DumpError, Error, IoError, Result};
use crate::pg::{DumpFormat, Psql};

/// Determine which databases this cycle should dump.
///
/// An explicit `databases` list in the config wins as-is; otherwise the
/// server is asked for its databases and the exclude list is applied.
pub async fn resolve_databases(config: &Config) -> Result<Vec<String>> {
    if !config.connection.databases.is_empty() {
        let mut seen = HashSet::new();
        let targets: Vec<String> = config
            .connection
            .databases
            .iter()
            .filter(|db| seen.insert(db.as_str()))
            .cloned()
            .collect();
        return Ok(targets);
    }

    let psql = Psql::new(&config.connection, &config.tools);
    let discovered = psql.list_databases().await?;
    let excluded: HashSet<&str> = config
        .connection
        .exclude
        .iter()
        .map(String::as_str)
        .collect();

    let targets: Vec<String> = discovered
        .into_iter()
        .filter(|db| !excluded.contains(db.as_str()))
        .collect();

    if targets.is_empty() {
        return Err(Error::Dump(DumpError::NoDatabases));
    }

    debug!("Discovered {} database(s) to dump", targets.len());
    Ok(targets)
}

/// Dump every database concurrently and return one entry per database.
pub async fn dump_all(
    config: &Config,
    format: &dyn DumpFormat,
    databases: &[String],
) -> Vec<DumpEntry> {
    info!(
        "Dumping {} database(s) in {} format",
        databases.len(),
        format.name()
    );

    let tasks: Vec<_> = databases
        .iter()
        .map(|db| dump_one(config, format, db))
        .collect();

    join_all(tasks).await
}

/// Dump a single database and build its catalog entry.
async fn dump_one(config: &Config, format: &dyn DumpFormat, database: &str) -> DumpEntry {
    let started = Instant::now();
    let created_at = Utc::now();
    let id = naming::dump_id(database, created_at);
    let filename = naming::dump_filename(&id, config.dumps.format);
    let final_path = config.dumps.directory.join(&filename);
    let part_path = config.dumps.directory.join(format!("{}.part", filename));

    debug!("Dumping {} -> {}", database, final_path.display());

    let result = write_dump(format, database, &part_path, &final_path).await;
    let duration_secs = started.elapsed().as_secs();

    match result {
        Ok((size_bytes, sha256)) => {
            info!(
                "Dumped {} ({} bytes in {}s)",
                database, size_bytes, duration_secs
            );
            DumpEntry {
                id,
                database: database.to_string(),
                file: filename,
                format: config.dumps.format,
                created_at,
                status: DumpStatus::Complete,
                size_bytes,
                sha256,
                duration_secs,
                verified_at: None,
                error: None,
            }
        }
        Err(e) => {
            warn!("Dump of {} failed: {}", database, e);
            remove_part(&part_path);
            DumpEntry {
                id,
                database: database.to_string(),
                file: filename,
                format: config.dumps.format,
                created_at,
                status: DumpStatus::Failed,
                size_bytes: 0,
                sha256: String::new(),
                duration_secs,
                verified_at: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Write the dump into a `.part` file and promote it only after the
/// tool exits cleanly. Readers of the dump directory never see a
/// half-written file under its final name.
async fn write_dump(
    format: &dyn DumpFormat,
    database: &str,
    part_path: &Path,
    final_path: &Path,
) -> Result<(u64, String)> {
    format.create(database, part_path).await?;

    let sha256 = catalog::file_sha256(part_path)?;
    let size_bytes = std::fs::metadata(part_path)
        .map_err(|e| {
            Error::Io(IoError::FileReadFailed {
                path: part_path.display().to_string(),
                source: e,
            })
        })?
        .len();

    std::fs::rename(part_path, final_path).map_err(|e| {
        Error::Io(IoError::FileWriteFailed {
            path: final_path.display().to_string(),
            source: e,
        })
    })?;

    Ok((size_bytes, sha256))
}

fn remove_part(part_path: &Path) {
    if let Err(e) = std::fs::remove_file(part_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", part_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatKind;
    use crate::error::PgError;
    use crate::pg::DumpCheck;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct MockFormat {
        payload: Vec<u8>,
        fail_on: Option<String>,
    }

    impl MockFormat {
        fn new(payload: &[u8]) -> Self {
            MockFormat {
                payload: payload.to_vec(),
                fail_on: None,
            }
        }

        fn failing_on(database: &str) -> Self {
            MockFormat {
                payload: b"partial".to_vec(),
                fail_on: Some(database.to_string()),
            }
        }
    }

    #[async_trait]
    impl DumpFormat for MockFormat {
        fn name(&self) -> &str {
            "mock"
        }

        async fn create(&self, database: &str, dest: &Path) -> Result<()> {
            // Always write something first, like an interrupted pg_dump
            std::fs::write(dest, &self.payload)?;
            if self.fail_on.as_deref() == Some(database) {
                return Err(Error::Pg(PgError::ConnectionFailed {
                    database: database.to_string(),
                    details: "connection refused".to_string(),
                }));
            }
            Ok(())
        }

        async fn check(&self, _path: &Path) -> Result<DumpCheck> {
            Ok(DumpCheck {
                items: 1,
                detail: "mock".to_string(),
            })
        }

        async fn restore(&self, _path: &Path, _target_db: &str) -> Result<()> {
            Ok(())
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.dumps.directory = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn dump_one_success_promotes_part_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let format = MockFormat::new(b"dump contents");

        let entry = dump_one(&config, &format, "orders").await;

        assert_eq!(entry.status, DumpStatus::Complete);
        assert_eq!(entry.database, "orders");
        assert_eq!(entry.size_bytes, 13);
        assert!(!entry.sha256.is_empty());
        assert!(entry.error.is_none());

        let final_path = dir.path().join(&entry.file);
        assert!(final_path.exists());
        assert!(!dir.path().join(format!("{}.part", entry.file)).exists());
    }

    #[tokio::test]
    async fn dump_one_failure_records_error_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let format = MockFormat::failing_on("orders");

        let entry = dump_one(&config, &format, "orders").await;

        assert_eq!(entry.status, DumpStatus::Failed);
        assert_eq!(entry.size_bytes, 0);
        assert!(entry.sha256.is_empty());
        let message = entry.error.unwrap();
        assert!(message.contains("connection refused"), "{}", message);

        // Neither the final file nor the .part litter survives
        assert!(!dir.path().join(&entry.file).exists());
        assert!(!dir.path().join(format!("{}.part", entry.file)).exists());
    }

    #[tokio::test]
    async fn dump_all_tolerates_partial_failure() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let format = MockFormat::failing_on("billing");
        let databases = vec!["orders".to_string(), "billing".to_string()];

        let entries = dump_all(&config, &format, &databases).await;

        assert_eq!(entries.len(), 2);
        let orders = entries.iter().find(|e| e.database == "orders").unwrap();
        let billing = entries.iter().find(|e| e.database == "billing").unwrap();
        assert_eq!(orders.status, DumpStatus::Complete);
        assert_eq!(billing.status, DumpStatus::Failed);
        assert!(dir.path().join(&orders.file).exists());
        assert!(!dir.path().join(&billing.file).exists());
    }

    #[tokio::test]
    async fn entry_filename_matches_configured_format() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.dumps.format = FormatKind::Custom;

        let format = MockFormat::new(b"x");
        let entry = dump_one(&config, &format, "My Shop DB").await;

        assert!(entry.file.starts_with("my-shop-db-"));
        assert!(entry.file.ends_with(".dump"));
        assert_eq!(entry.format, FormatKind::Custom);
    }

    #[tokio::test]
    async fn resolve_databases_honors_explicit_list() {
        let mut config = Config::default();
        config.connection.databases = vec![
            "orders".to_string(),
            "billing".to_string(),
            "orders".to_string(),
        ];

        let targets = resolve_databases(&config).await.unwrap();
        assert_eq!(targets, vec!["orders", "billing"]);
    }
}
