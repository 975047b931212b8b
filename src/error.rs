//! Error types for dadump
//!
//! Comprehensive error handling for all failure modes:
//! - Configuration (dadump.conf parsing, validation)
//! - Catalog operations (dump tracking, hashing, TOML parsing)
//! - PostgreSQL client tools (pg_dump, pg_restore, psql invocation)
//! - Dump cycle orchestration (locking, all-databases-failed)
//! - Verification (checksums, structural checks, restore checks)
//! - File I/O (reading, writing, permissions)

use std::fmt;
use std::io;

/// Result type alias for dadump operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dadump
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(ConfigError),
    /// Catalog operation errors
    Catalog(CatalogError),
    /// PostgreSQL client tool errors
    Pg(PgError),
    /// Dump cycle errors
    Dump(DumpError),
    /// Verification errors
    Verify(VerifyError),
    /// I/O errors
    Io(IoError),
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    /// Config file does not exist at the given path
    NotFound(String),
    /// Config file is not valid TOML
    ParseFailed { path: String, source: String },
    /// Config parsed but contains an invalid value
    Invalid(String),
}

/// Catalog operation errors
#[derive(Debug)]
pub enum CatalogError {
    /// Catalog TOML file is corrupted or invalid
    CorruptedData(String),
    /// Dump id not found in catalog
    EntryNotFound(String),
    /// Dump id already present in catalog
    DuplicateEntry(String),
}

/// PostgreSQL client tool errors
#[derive(Debug)]
pub enum PgError {
    /// Tool binary could not be spawned (missing from PATH, not executable)
    ToolNotFound { tool: String, source: String },
    /// Tool ran longer than the configured timeout
    Timeout { tool: String, secs: u64 },
    /// Server unreachable or refused the connection
    ConnectionFailed { database: String, details: String },
    /// Password or pg_hba.conf rejected the user
    AuthenticationFailed { user: String },
    /// Named database does not exist on the server
    DatabaseMissing(String),
    /// Tool exited non-zero for any other reason
    ToolFailed { tool: String, stderr: String },
    /// Tool output could not be interpreted
    InvalidOutput { tool: String, details: String },
}

/// Dump cycle errors
#[derive(Debug)]
pub enum DumpError {
    /// No databases configured and discovery returned nothing
    NoDatabases,
    /// Every database in the cycle failed to dump
    AllFailed { failures: usize },
    /// Another dadump process holds the run lock
    LockHeld(String),
}

/// Verification errors
#[derive(Debug)]
pub enum VerifyError {
    /// Cataloged dump file is gone from disk
    MissingFile { id: String, path: String },
    /// File hash no longer matches the catalog
    ChecksumMismatch { id: String, expected: String, actual: String },
    /// Dump content failed the format's structural check
    StructuralCheckFailed { id: String, details: String },
    /// Restore into the scratch database failed
    RestoreCheckFailed { id: String, details: String },
}

/// File I/O errors
#[derive(Debug)]
pub enum IoError {
    /// Failed to read file
    FileReadFailed { path: String, source: io::Error },
    /// Failed to write file
    FileWriteFailed { path: String, source: io::Error },
    /// Failed to remove file
    FileRemoveFailed { path: String, source: io::Error },
    /// Failed to create directory
    DirectoryCreateFailed { path: String, source: io::Error },
    /// Other I/O error
    Other(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Catalog(e) => write!(f, "Catalog error: {}", e),
            Error::Pg(e) => write!(f, "Postgres error: {}", e),
            Error::Dump(e) => write!(f, "Dump error: {}", e),
            Error::Verify(e) => write!(f, "Verify error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound(path) => {
                write!(f, "Config file not found: {} (run 'dadump init' first)", path)
            }
            ConfigError::ParseFailed { path, source } => {
                write!(f, "Failed to parse {}: {}", path, source)
            }
            ConfigError::Invalid(details) => {
                write!(f, "Invalid configuration: {}", details)
            }
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::CorruptedData(details) => {
                write!(f, "Catalog data corrupted: {}", details)
            }
            CatalogError::EntryNotFound(id) => {
                write!(f, "Dump not found in catalog: {}", id)
            }
            CatalogError::DuplicateEntry(id) => {
                write!(f, "Dump id already cataloged: {}", id)
            }
        }
    }
}

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgError::ToolNotFound { tool, source } => {
                write!(f, "Failed to run {}: {}", tool, source)
            }
            PgError::Timeout { tool, secs } => {
                write!(f, "{} timed out after {}s", tool, secs)
            }
            PgError::ConnectionFailed { database, details } => {
                write!(f, "Connection failed for {}: {}", database, details)
            }
            PgError::AuthenticationFailed { user } => {
                write!(f, "Authentication failed for user {}", user)
            }
            PgError::DatabaseMissing(name) => {
                write!(f, "Database does not exist: {}", name)
            }
            PgError::ToolFailed { tool, stderr } => {
                write!(f, "{} failed: {}", tool, stderr)
            }
            PgError::InvalidOutput { tool, details } => {
                write!(f, "Unexpected output from {}: {}", tool, details)
            }
        }
    }
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpError::NoDatabases => {
                write!(
                    f,
                    "No databases to dump (configure [connection].databases or check discovery)"
                )
            }
            DumpError::AllFailed { failures } => {
                write!(f, "All {} databases failed to dump", failures)
            }
            DumpError::LockHeld(details) => {
                write!(f, "Another dadump run is in progress: {}", details)
            }
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::MissingFile { id, path } => {
                write!(f, "Dump file missing for {}: {}", id, path)
            }
            VerifyError::ChecksumMismatch { id, expected, actual } => {
                write!(
                    f,
                    "Checksum mismatch for {}: expected {}, got {}",
                    id, expected, actual
                )
            }
            VerifyError::StructuralCheckFailed { id, details } => {
                write!(f, "Structural check failed for {}: {}", id, details)
            }
            VerifyError::RestoreCheckFailed { id, details } => {
                write!(f, "Restore check failed for {}: {}", id, details)
            }
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::FileReadFailed { path, source } => {
                write!(f, "Failed to read {}: {}", path, source)
            }
            IoError::FileWriteFailed { path, source } => {
                write!(f, "Failed to write {}: {}", path, source)
            }
            IoError::FileRemoveFailed { path, source } => {
                write!(f, "Failed to remove {}: {}", path, source)
            }
            IoError::DirectoryCreateFailed { path, source } => {
                write!(f, "Failed to create directory {}: {}", path, source)
            }
            IoError::Other(source) => write!(f, "{}", source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(IoError::FileReadFailed { source, .. })
            | Error::Io(IoError::FileWriteFailed { source, .. })
            | Error::Io(IoError::FileRemoveFailed { source, .. })
            | Error::Io(IoError::DirectoryCreateFailed { source, .. })
            | Error::Io(IoError::Other(source)) => Some(source),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for CatalogError {}
impl std::error::Error for PgError {}
impl std::error::Error for DumpError {}
impl std::error::Error for VerifyError {}
impl std::error::Error for IoError {}

// Conversion from std::io::Error
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(IoError::Other(err))
    }
}

impl Error {
    /// Check if error is transient (worth retrying with backoff)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Pg(PgError::ConnectionFailed { .. }) | Error::Pg(PgError::Timeout { .. })
        )
    }

    /// Check if error is fatal (retrying cannot help)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Catalog(CatalogError::CorruptedData(_))
                | Error::Pg(PgError::AuthenticationFailed { .. })
                | Error::Pg(PgError::ToolNotFound { .. })
        )
    }
}
