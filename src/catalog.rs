//! Dump catalog: the persistent record of every dump dadump has produced.
//!
//! Stored as catalog.toml inside the dump directory. Saves are atomic
//! (temp file + rename) so a crashed run never leaves a torn catalog.

use crate::config::FormatKind;
use crate::dump::naming;
use crate::error::{CatalogError, Error, IoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub dumps: HashMap<String, DumpEntry>,
}

/// One cataloged dump file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpEntry {
    pub id: String,
    pub database: String,
    /// Filename relative to the dump directory
    pub file: String,
    pub format: FormatKind,
    pub created_at: DateTime<Utc>,
    pub status: DumpStatus,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub duration_secs: u64,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    /// Failure detail for failed / verifyfailed dumps
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpStatus {
    /// Dump finished and was renamed into place
    Complete,
    /// Dump passed checksum + structural verification
    Verified,
    /// Dump failed a later verification
    VerifyFailed,
    /// pg_dump failed; no usable file
    Failed,
}

impl DumpStatus {
    /// Complete and verified dumps are usable for restore and retention slots
    pub fn is_success(&self) -> bool {
        matches!(self, DumpStatus::Complete | DumpStatus::Verified)
    }
}

impl fmt::Display for DumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpStatus::Complete => write!(f, "complete"),
            DumpStatus::Verified => write!(f, "verified"),
            DumpStatus::VerifyFailed => write!(f, "verify-failed"),
            DumpStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogStats {
    pub total: usize,
    pub complete: usize,
    pub verified: usize,
    pub verify_failed: usize,
    pub failed: usize,
    pub databases: Vec<String>,
    pub total_bytes: u64,
    pub newest: Option<DateTime<Utc>>,
    pub oldest: Option<DateTime<Utc>>,
}

/// Disk vs catalog discrepancies found by `reconcile`
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Cataloged dumps whose file is gone from disk
    pub missing: Vec<String>,
    /// Dump-shaped files on disk with no catalog entry
    pub orphans: Vec<PathBuf>,
    /// Leftover .part files from interrupted runs
    pub stale_parts: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.orphans.is_empty() && self.stale_parts.is_empty()
    }
}

impl Catalog {
    /// Load catalog from file, returns empty catalog if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Io(IoError::FileReadFailed {
                path: path.display().to_string(),
                source: e,
            })
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Catalog(CatalogError::CorruptedData(format!(
                "{}: {}",
                path.display(),
                e
            )))
        })
    }

    /// Save catalog to file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Catalog(CatalogError::CorruptedData(e.to_string())))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Io(IoError::DirectoryCreateFailed {
                    path: parent.display().to_string(),
                    source: e,
                })
            })?;
        }

        // Write atomically: write to temp file, then rename
        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, contents).map_err(|e| {
            Error::Io(IoError::FileWriteFailed {
                path: temp_path.display().to_string(),
                source: e,
            })
        })?;

        fs::rename(&temp_path, path).map_err(|e| {
            Error::Io(IoError::FileWriteFailed {
                path: path.display().to_string(),
                source: e,
            })
        })?;

        Ok(())
    }

    /// Add a new dump entry; duplicate ids are an error
    pub fn insert(&mut self, entry: DumpEntry) -> Result<()> {
        if self.dumps.contains_key(&entry.id) {
            return Err(Error::Catalog(CatalogError::DuplicateEntry(entry.id)));
        }
        self.dumps.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DumpEntry> {
        self.dumps.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut DumpEntry> {
        self.dumps.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Result<DumpEntry> {
        self.dumps
            .remove(id)
            .ok_or_else(|| Error::Catalog(CatalogError::EntryNotFound(id.to_string())))
    }

    /// All entries for a database, newest first
    pub fn entries_for(&self, database: &str) -> Vec<&DumpEntry> {
        let mut entries: Vec<&DumpEntry> = self
            .dumps
            .values()
            .filter(|e| e.database == database)
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// All entries across databases, newest first
    pub fn entries(&self) -> Vec<&DumpEntry> {
        let mut entries: Vec<&DumpEntry> = self.dumps.values().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// Most recent successful dump of a database
    pub fn latest_success(&self, database: &str) -> Option<&DumpEntry> {
        self.entries_for(database)
            .into_iter()
            .find(|e| e.status.is_success())
    }

    /// Distinct database names present in the catalog, sorted
    pub fn databases(&self) -> Vec<String> {
        let names: BTreeSet<String> =
            self.dumps.values().map(|e| e.database.clone()).collect();
        names.into_iter().collect()
    }

    /// Get catalog statistics
    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            total: self.dumps.len(),
            complete: 0,
            verified: 0,
            verify_failed: 0,
            failed: 0,
            databases: self.databases(),
            total_bytes: 0,
            newest: None,
            oldest: None,
        };

        for entry in self.dumps.values() {
            match entry.status {
                DumpStatus::Complete => stats.complete += 1,
                DumpStatus::Verified => stats.verified += 1,
                DumpStatus::VerifyFailed => stats.verify_failed += 1,
                DumpStatus::Failed => stats.failed += 1,
            }
            stats.total_bytes += entry.size_bytes;
        }

        stats.newest = self.dumps.values().map(|e| e.created_at).max();
        stats.oldest = self.dumps.values().map(|e| e.created_at).min();
        stats
    }

    /// Compare catalog contents against the dump directory
    pub fn reconcile(&self, dump_dir: &Path) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for entry in self.dumps.values() {
            if entry.status == DumpStatus::Failed {
                continue; // failed dumps have no file by definition
            }
            if !dump_dir.join(&entry.file).exists() {
                report.missing.push(entry.id.clone());
            }
        }
        report.missing.sort();

        let known: BTreeSet<&str> = self.dumps.values().map(|e| e.file.as_str()).collect();

        for entry in WalkDir::new(dump_dir).max_depth(1).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();

            if name.ends_with(".part") {
                report.stale_parts.push(entry.path().to_path_buf());
            } else if naming::parse_dump_filename(&name).is_some() && !known.contains(name.as_str())
            {
                report.orphans.push(entry.path().to_path_buf());
            }
        }
        report.orphans.sort();
        report.stale_parts.sort();

        report
    }
}

/// Calculate SHA-256 hash of a file
pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).map_err(|e| {
        Error::Io(IoError::FileReadFailed {
            path: path.display().to_string(),
            source: e,
        })
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let result = hasher.finalize();

    Ok(format!("{:x}", result))
}
