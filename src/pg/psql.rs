//! Admin operations through `psql`.
//!
//! Connects to the maintenance database for discovery and for creating or
//! dropping scratch databases during deep verification.

use crate::config::{ConnectionConfig, ToolsConfig};
use crate::error::{Error, PgError};
use crate::pg::exec::PgRunner;
use tracing::debug;

/// Database used for queries that are not about any particular database
pub const MAINTENANCE_DB: &str = "postgres";

pub struct Psql {
    runner: PgRunner,
}

impl Psql {
    pub fn new(conn: &ConnectionConfig, tools: &ToolsConfig) -> Self {
        Self {
            runner: PgRunner::new(conn, tools),
        }
    }

    /// Run one SQL statement against a database, returning raw stdout
    /// (-A -t: unaligned, tuples only)
    async fn query(&self, database: &str, sql: &str) -> Result<String, Error> {
        let tool = self.runner.tools().psql.clone();
        let args = vec![
            "-X".to_string(),
            "-q".to_string(),
            "-A".to_string(),
            "-t".to_string(),
            "-v".to_string(),
            "ON_ERROR_STOP=1".to_string(),
            "-d".to_string(),
            database.to_string(),
            "-c".to_string(),
            sql.to_string(),
        ];

        let output = self.runner.run(&tool, &args, database).await?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Confirm the server answers queries at all
    pub async fn ping(&self) -> Result<(), Error> {
        let out = self.query(MAINTENANCE_DB, "SELECT 1").await?;
        if out.trim() == "1" {
            Ok(())
        } else {
            Err(Error::Pg(PgError::InvalidOutput {
                tool: self.runner.tools().psql.clone(),
                details: format!("SELECT 1 returned {:?}", out.trim()),
            }))
        }
    }

    /// All connectable, non-template databases on the server
    pub async fn list_databases(&self) -> Result<Vec<String>, Error> {
        let sql = "SELECT datname FROM pg_database \
                   WHERE NOT datistemplate AND datallowconn ORDER BY datname";
        let out = self.query(MAINTENANCE_DB, sql).await?;

        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool, Error> {
        let sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = {}",
            quote_literal(name)
        );
        let out = self.query(MAINTENANCE_DB, &sql).await?;
        Ok(out.trim() == "1")
    }

    pub async fn create_database(&self, name: &str) -> Result<(), Error> {
        debug!("creating database {}", name);
        let sql = format!("CREATE DATABASE {}", quote_ident(name));
        self.query(MAINTENANCE_DB, &sql).await?;
        Ok(())
    }

    pub async fn drop_database(&self, name: &str) -> Result<(), Error> {
        debug!("dropping database {}", name);
        let sql = format!("DROP DATABASE IF EXISTS {}", quote_ident(name));
        self.query(MAINTENANCE_DB, &sql).await?;
        Ok(())
    }
}

/// Quote an identifier for interpolation into SQL
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into SQL
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("app"), "\"app\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("app"), "'app'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }
}
