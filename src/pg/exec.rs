//! Shared subprocess execution for the PostgreSQL client tools.
//!
//! Spawns a tool with the configured connection arguments, enforces the
//! timeout, classifies stderr into typed errors and retries the retryable
//! ones with exponential backoff.

use crate::config::{ConnectionConfig, ToolsConfig};
use crate::error::{Error, PgError};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs PostgreSQL client tools with connection settings, timeout and retry
#[derive(Debug, Clone)]
pub struct PgRunner {
    conn: ConnectionConfig,
    tools: ToolsConfig,
}

impl PgRunner {
    pub fn new(conn: &ConnectionConfig, tools: &ToolsConfig) -> Self {
        Self {
            conn: conn.clone(),
            tools: tools.clone(),
        }
    }

    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    pub fn user(&self) -> &str {
        &self.conn.user
    }

    /// Connection arguments shared by every tool invocation
    pub fn connection_args(&self) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.conn.host.clone(),
            "-p".to_string(),
            self.conn.port.to_string(),
            "-U".to_string(),
            self.conn.user.clone(),
            // Fail instead of prompting when no password is available
            "--no-password".to_string(),
        ]
    }

    /// Run a tool with retry on retryable errors
    pub async fn run(&self, tool: &str, args: &[String], database: &str) -> Result<Output, Error> {
        let mut attempts = 0;
        let mut backoff_ms = 1000;

        loop {
            attempts += 1;
            debug!(
                "{} attempt {} of {} for {}",
                tool, attempts, self.tools.max_retries, database
            );

            match self.run_once(tool, args, database).await {
                Ok(output) => return Ok(output),
                Err(e) if attempts >= self.tools.max_retries => {
                    warn!("{} failed after {} attempts: {}", tool, attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(
                            "{} failed (attempt {}), retrying in {}ms: {}",
                            tool, attempts, backoff_ms, e
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms *= 2; // Exponential backoff
                    } else {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Execute a single tool invocation without retry
    pub async fn run_once(
        &self,
        tool: &str,
        args: &[String],
        database: &str,
    ) -> Result<Output, Error> {
        let mut cmd = Command::new(tool);
        cmd.args(self.connection_args()).args(args);

        if let Some(password) = &self.conn.password {
            cmd.env("PGPASSWORD", password);
        }

        self.execute(cmd, tool, args, database).await
    }

    /// Run a tool that only touches local files: no connection arguments,
    /// no retry (a bad file does not get better on the second read)
    pub async fn run_local(&self, tool: &str, args: &[String]) -> Result<Output, Error> {
        let mut cmd = Command::new(tool);
        cmd.args(args);
        self.execute(cmd, tool, args, "").await
    }

    /// Pre-configured Command for callers that manage the child themselves
    /// (connection args, PGPASSWORD, piped stdio, kill-on-drop)
    pub fn command(&self, tool: &str) -> Command {
        let mut cmd = Command::new(tool);
        cmd.args(self.connection_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(password) = &self.conn.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }

    async fn execute(
        &self,
        mut cmd: Command,
        tool: &str,
        args: &[String],
        database: &str,
    ) -> Result<Output, Error> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            // Timed-out children must not linger
            .kill_on_drop(true);

        debug!("Executing: {} {}", tool, args.join(" "));

        let child = cmd.spawn().map_err(|e| {
            Error::Pg(PgError::ToolNotFound {
                tool: tool.to_string(),
                source: e.to_string(),
            })
        })?;

        let timeout_duration = Duration::from_secs(self.tools.timeout_secs);
        let output = tokio::time::timeout(timeout_duration, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Pg(PgError::Timeout {
                    tool: tool.to_string(),
                    secs: self.tools.timeout_secs,
                })
            })?
            .map_err(|e| {
                Error::Pg(PgError::ToolFailed {
                    tool: tool.to_string(),
                    stderr: format!("process error: {}", e),
                })
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.classify_stderr(tool, database, &stderr));
        }

        Ok(output)
    }

    /// Parse tool stderr to determine error type
    pub(crate) fn classify_stderr(&self, tool: &str, database: &str, stderr: &str) -> Error {
        let lower = stderr.to_lowercase();

        // Server unreachable or overloaded: worth retrying
        if lower.contains("could not connect")
            || lower.contains("connection refused")
            || lower.contains("connection timed out")
            || lower.contains("timeout expired")
            || lower.contains("too many clients")
            || lower.contains("the database system is starting up")
        {
            return Error::Pg(PgError::ConnectionFailed {
                database: database.to_string(),
                details: first_line(stderr),
            });
        }

        // Credential problems never fix themselves
        if lower.contains("password authentication failed")
            || lower.contains("no password supplied")
            || lower.contains("no pg_hba.conf entry")
        {
            return Error::Pg(PgError::AuthenticationFailed {
                user: self.conn.user.clone(),
            });
        }

        if let Some(name) = extract_missing_database(stderr) {
            return Error::Pg(PgError::DatabaseMissing(name));
        }

        Error::Pg(PgError::ToolFailed {
            tool: tool.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }

    /// Parse `pg_dump --version` into the bare version string
    pub async fn pg_dump_version(&self) -> Result<String, Error> {
        let tool = self.tools.pg_dump.clone();
        let mut cmd = Command::new(&tool);
        cmd.arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        let output = cmd.output().await.map_err(|e| {
            Error::Pg(PgError::ToolNotFound {
                tool: tool.clone(),
                source: e.to_string(),
            })
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version(&stdout).ok_or_else(|| {
            Error::Pg(PgError::InvalidOutput {
                tool,
                details: format!("unrecognized version output: {}", stdout.trim()),
            })
        })
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Pull the database name out of a `database "x" does not exist` message
fn extract_missing_database(stderr: &str) -> Option<String> {
    let re = regex::Regex::new(r#"database "([^"]+)" does not exist"#).ok()?;
    Some(re.captures(stderr)?.get(1)?.as_str().to_string())
}

/// Extract the version number from tool --version output
/// (e.g. "pg_dump (PostgreSQL) 16.4" -> "16.4"). Distribution builds
/// append packaging suffixes, so take the first dotted number.
fn parse_version(output: &str) -> Option<String> {
    let re = regex::Regex::new(r"(\d+(?:\.\d+)+)").ok()?;
    Some(re.captures(output)?.get(1)?.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, ToolsConfig};

    fn runner() -> PgRunner {
        PgRunner::new(&ConnectionConfig::default(), &ToolsConfig::default())
    }

    #[test]
    fn test_connection_args() {
        let args = runner().connection_args();
        assert_eq!(
            args,
            vec!["-h", "localhost", "-p", "5432", "-U", "postgres", "--no-password"]
        );
    }

    #[test]
    fn test_classify_connection_refused() {
        let err = runner().classify_stderr(
            "pg_dump",
            "app",
            "pg_dump: error: connection to server at \"localhost\" (127.0.0.1), port 5432 failed: Connection refused",
        );
        assert!(matches!(
            err,
            Error::Pg(PgError::ConnectionFailed { .. })
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = runner().classify_stderr(
            "pg_dump",
            "app",
            "pg_dump: error: FATAL:  password authentication failed for user \"postgres\"",
        );
        assert!(matches!(
            err,
            Error::Pg(PgError::AuthenticationFailed { .. })
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_classify_missing_database() {
        let err = runner().classify_stderr(
            "pg_dump",
            "ghost",
            "pg_dump: error: FATAL:  database \"ghost\" does not exist",
        );
        match err {
            Error::Pg(PgError::DatabaseMissing(name)) => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_classify_generic_failure() {
        let err = runner().classify_stderr("pg_restore", "app", "pg_restore: error: out of memory");
        assert!(matches!(err, Error::Pg(PgError::ToolFailed { .. })));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("pg_dump (PostgreSQL) 16.4"),
            Some("16.4".to_string())
        );
        assert_eq!(
            parse_version("pg_dump (PostgreSQL) 14.12 (Ubuntu 14.12-1.pgdg22.04+1)"),
            Some("14.12".to_string())
        );
        assert_eq!(parse_version("pg_dump (PostgreSQL) 17.0\n"), Some("17.0".to_string()));
        assert_eq!(parse_version("not a version"), None);
    }

    #[tokio::test]
    async fn test_run_once_reports_missing_tool() {
        let err = runner()
            .run_once("definitely-not-a-real-pg-tool", &[], "app")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pg(PgError::ToolNotFound { .. })));
        assert!(err.is_fatal());
    }
}
