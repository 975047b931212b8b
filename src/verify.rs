//! Restore-readiness verification.
//!
//! Three levels: checksum (the file is the one we cataloged), structural
//! (the file is a well-formed dump of its format) and deep (the dump
//! actually restores into a scratch database). Checksum and structure run
//! every time; deep restores are opt-in.
//!
//! Only conclusions about the dump itself change its catalog status. An
//! unreachable server or a missing client tool aborts verification with an
//! error and leaves the entry as it was.

use crate::catalog::{self, DumpEntry, DumpStatus};
use crate::config::Config;
use crate::error::{Error, PgError, Result, VerifyError};
use crate::pg::{self, Psql};
use chrono::Utc;
use tracing::{debug, info};

/// Scratch databases are named dadump_verify_<timestamp>
const SCRATCH_PREFIX: &str = "dadump_verify_";

/// What one verification produced
#[derive(Debug)]
pub struct VerifyOutcome {
    pub id: String,
    pub database: String,
    pub passed: bool,
    /// One line per check that ran
    pub notes: Vec<String>,
    pub failure: Option<VerifyError>,
    pub warnings: Vec<String>,
}

impl VerifyOutcome {
    fn new(entry: &DumpEntry) -> Self {
        Self {
            id: entry.id.clone(),
            database: entry.database.clone(),
            passed: false,
            notes: Vec::new(),
            failure: None,
            warnings: Vec::new(),
        }
    }

    fn fail(mut self, entry: &mut DumpEntry, failure: VerifyError) -> Self {
        entry.status = DumpStatus::VerifyFailed;
        entry.error = Some(failure.to_string());
        self.failure = Some(failure);
        self.passed = false;
        self
    }

    fn pass(mut self, entry: &mut DumpEntry) -> Self {
        entry.status = DumpStatus::Verified;
        entry.verified_at = Some(Utc::now());
        entry.error = None;
        self.passed = true;
        self
    }
}

/// Verify one cataloged dump, updating its status in place.
///
/// Returns Err only for environment problems (missing tool, unreachable
/// server); those leave the entry untouched.
pub async fn verify_entry(
    config: &Config,
    entry: &mut DumpEntry,
    deep: bool,
) -> Result<VerifyOutcome> {
    let mut outcome = VerifyOutcome::new(entry);
    let path = config.dumps.directory.join(&entry.file);

    debug!("verifying {} ({})", entry.id, path.display());

    // Level 1: the file exists and is byte-identical to what was cataloged
    if !path.exists() {
        return Ok(outcome.fail(
            entry,
            VerifyError::MissingFile {
                id: entry.id.clone(),
                path: path.display().to_string(),
            },
        ));
    }

    let actual = catalog::file_sha256(&path)?;
    if actual != entry.sha256 {
        return Ok(outcome.fail(
            entry,
            VerifyError::ChecksumMismatch {
                id: entry.id.clone(),
                expected: entry.sha256.clone(),
                actual,
            },
        ));
    }
    outcome.notes.push("checksum: matches catalog".to_string());

    // Level 2: the format's own structural check
    let format = pg::format_for(
        entry.format,
        &config.connection,
        &config.tools,
        config.dumps.compression,
    );

    match format.check(&path).await {
        Ok(check) => outcome.notes.push(format!("structure: {}", check.detail)),
        Err(e) if is_environment_error(&e) => return Err(e),
        Err(e) => {
            return Ok(outcome.fail(
                entry,
                VerifyError::StructuralCheckFailed {
                    id: entry.id.clone(),
                    details: e.to_string(),
                },
            ));
        }
    }

    // Level 3: restore into a scratch database and drop it again
    if deep {
        let psql = Psql::new(&config.connection, &config.tools);
        let scratch = format!("{}{}", SCRATCH_PREFIX, Utc::now().format("%Y%m%d%H%M%S"));

        psql.create_database(&scratch).await?;
        info!("restoring {} into scratch database {}", entry.id, scratch);

        let restore_result = format.restore(&path, &scratch).await;

        // The scratch database goes away no matter how the restore went
        if let Err(e) = psql.drop_database(&scratch).await {
            outcome
                .warnings
                .push(format!("scratch database {} not dropped: {}", scratch, e));
        }

        match restore_result {
            Ok(()) => outcome
                .notes
                .push("deep: restored into scratch database".to_string()),
            Err(e) if is_environment_error(&e) => return Err(e),
            Err(e) => {
                return Ok(outcome.fail(
                    entry,
                    VerifyError::RestoreCheckFailed {
                        id: entry.id.clone(),
                        details: e.to_string(),
                    },
                ));
            }
        }
    }

    Ok(outcome.pass(entry))
}

/// Errors that say nothing about the dump itself
fn is_environment_error(e: &Error) -> bool {
    matches!(
        e,
        Error::Pg(PgError::ToolNotFound { .. })
            | Error::Pg(PgError::Timeout { .. })
            | Error::Pg(PgError::ConnectionFailed { .. })
            | Error::Pg(PgError::AuthenticationFailed { .. })
    )
}
