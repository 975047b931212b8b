//! dadump.conf loading and validation.
//!
//! The config file lives at /etc/dadump/dadump.conf (the path the package
//! installs) unless overridden with --config or DADUMP_CONFIG. Every section
//! is optional; missing keys fall back to defaults so a minimal file only
//! names the databases to dump.

use crate::error::{ConfigError, Error, Result};
use crate::retention::RetentionPolicy;
use crate::scheduler::Schedule;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dadump/dadump.conf";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub dumps: DumpsConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// Passed to child tools via PGPASSWORD, never on the command line
    #[serde(default)]
    pub password: Option<String>,
    /// Databases to dump; empty means discover via psql
    #[serde(default)]
    pub databases: Vec<String>,
    /// Names skipped during discovery (templates are always skipped)
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

// Manual Debug keeps the password out of log output
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("databases", &self.databases)
            .field("exclude", &self.exclude)
            .finish()
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_exclude() -> Vec<String> {
    vec!["postgres".to_string()]
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            databases: Vec::new(),
            exclude: default_exclude(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpsConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: FormatKind,
    #[serde(default = "default_compression")]
    pub compression: u32,
}

/// On-disk dump format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// pg_dump custom archive (-Fc), compressed by pg_dump itself
    #[default]
    Custom,
    /// Plain SQL script, gzip-compressed by dadump
    Plain,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Custom => write!(f, "custom"),
            FormatKind::Plain => write!(f, "plain"),
        }
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from("/var/lib/dadump")
}

fn default_compression() -> u32 {
    6
}

impl Default for DumpsConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            format: FormatKind::default(),
            compression: default_compression(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_pg_dump")]
    pub pg_dump: String,
    #[serde(default = "default_pg_restore")]
    pub pg_restore: String,
    #[serde(default = "default_psql")]
    pub psql: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_pg_dump() -> String {
    "pg_dump".to_string()
}

fn default_pg_restore() -> String {
    "pg_restore".to_string()
}

fn default_psql() -> String {
    "psql".to_string()
}

fn default_timeout() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pg_dump: default_pg_dump(),
            pg_restore: default_pg_restore(),
            psql: default_psql(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Config {
    /// Load and validate the config file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(ConfigError::NotFound(
                path.display().to_string(),
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(ConfigError::ParseFailed {
                path: path.display().to_string(),
                source: e.to_string(),
            })
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            Error::Config(ConfigError::ParseFailed {
                path: path.display().to_string(),
                source: e.to_string(),
            })
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !(1..=9).contains(&self.dumps.compression) {
            return Err(invalid(format!(
                "[dumps].compression must be 1..=9, got {}",
                self.dumps.compression
            )));
        }

        if self.dumps.directory.as_os_str().is_empty() {
            return Err(invalid("[dumps].directory must not be empty".to_string()));
        }

        if self.schedule.hour > 23 {
            return Err(invalid(format!(
                "[schedule].hour must be 0..=23, got {}",
                self.schedule.hour
            )));
        }

        if self.schedule.minute > 59 {
            return Err(invalid(format!(
                "[schedule].minute must be 0..=59, got {}",
                self.schedule.minute
            )));
        }

        if self.retention.keep_daily == 0
            && self.retention.keep_weekly == 0
            && self.retention.keep_monthly == 0
        {
            return Err(invalid(
                "[retention] must keep at least one daily, weekly, or monthly slot".to_string(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(invalid("[tools].timeout_secs must be > 0".to_string()));
        }

        Ok(())
    }

    /// Path to the catalog file inside the dump directory
    pub fn catalog_path(&self) -> PathBuf {
        self.dumps.directory.join("catalog.toml")
    }
}

fn invalid(details: String) -> Error {
    Error::Config(ConfigError::Invalid(details))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 5432);
        assert_eq!(config.connection.user, "postgres");
        assert_eq!(config.dumps.format, FormatKind::Custom);
        assert_eq!(config.dumps.compression, 6);
        assert_eq!(config.tools.pg_dump, "pg_dump");
        assert_eq!(config.tools.timeout_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[connection]
databases = ["app", "auth"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connection.databases, vec!["app", "auth"]);
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.retention.keep_daily, 7);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[connection]
host = "db.internal"
port = 5433
user = "backup"
databases = ["app"]

[dumps]
directory = "/srv/dumps"
format = "plain"
compression = 9

[retention]
keep_daily = 14
keep_weekly = 8
keep_monthly = 12

[schedule]
hour = 3
minute = 15

[tools]
pg_dump = "/usr/lib/postgresql/16/bin/pg_dump"
timeout_secs = 7200
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.connection.host, "db.internal");
        assert_eq!(config.connection.port, 5433);
        assert_eq!(config.dumps.format, FormatKind::Plain);
        assert_eq!(config.dumps.compression, 9);
        assert_eq!(config.retention.keep_weekly, 8);
        assert_eq!(config.schedule.hour, 3);
        assert_eq!(config.tools.pg_dump, "/usr/lib/postgresql/16/bin/pg_dump");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_compression() {
        let mut config = Config::default();
        config.dumps.compression = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut config = Config::default();
        config.schedule.hour = 24;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.schedule.minute = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = Config::default();
        config.retention.keep_daily = 0;
        config.retention.keep_weekly = 0;
        config.retention.keep_monthly = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dadump.conf");
        let result = Config::load(&path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("dadump.conf");
        std::fs::write(&path, "this is {{{ not toml").unwrap();
        let result = Config::load(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut conn = ConnectionConfig::default();
        conn.password = Some("s3cret".to_string());
        let debugged = format!("{:?}", conn);
        assert!(!debugged.contains("s3cret"));
        assert!(debugged.contains("<redacted>"));
    }
}
