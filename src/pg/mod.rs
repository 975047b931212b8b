//! PostgreSQL client-tool layer.
//!
//! dadump never speaks the wire protocol itself. Everything goes through the
//! stock client tools (`pg_dump`, `pg_restore`, `psql`) invoked as
//! subprocesses. Each dump format implements the DumpFormat trait so the
//! engine can dump, check and restore without caring which tool family is
//! behind it.

pub mod custom;
pub mod exec;
pub mod plain;
pub mod psql;

use crate::config::{ConnectionConfig, FormatKind, ToolsConfig};
use crate::error::Error;
use std::path::Path;

pub use exec::PgRunner;
pub use psql::Psql;

/// Result of a structural check on a dump file
#[derive(Debug, Clone)]
pub struct DumpCheck {
    /// Archive TOC entries (custom) or SQL lines scanned (plain)
    pub items: u64,
    /// Human-readable note shown by `verify`
    pub detail: String,
}

/// Common trait for dump formats
#[async_trait::async_trait]
pub trait DumpFormat: Send + Sync {
    /// Format name (e.g., "custom", "plain")
    fn name(&self) -> &str;

    /// Dump one database into `dest`
    async fn create(&self, database: &str, dest: &Path) -> Result<(), Error>;

    /// Structural check: is this file a well-formed dump of this format?
    async fn check(&self, path: &Path) -> Result<DumpCheck, Error>;

    /// Restore a dump file into an existing database
    async fn restore(&self, path: &Path, target_db: &str) -> Result<(), Error>;
}

/// Build the format implementation selected by configuration
pub fn format_for(
    kind: FormatKind,
    conn: &ConnectionConfig,
    tools: &ToolsConfig,
    compression: u32,
) -> Box<dyn DumpFormat> {
    match kind {
        FormatKind::Custom => Box::new(custom::CustomFormat::new(conn, tools, compression)),
        FormatKind::Plain => Box::new(plain::PlainFormat::new(conn, tools, compression)),
    }
}
