//! Plain-format dumps (`pg_dump -Fp` piped through gzip).
//!
//! The SQL text streams straight from pg_dump's stdout into a gzip encoder,
//! so the uncompressed dump never touches the disk or sits in memory.
//! Restores decompress to a sibling temp file and replay it with `psql`.

use crate::config::{ConnectionConfig, ToolsConfig};
use crate::error::{Error, IoError, PgError};
use crate::pg::exec::PgRunner;
use crate::pg::{DumpCheck, DumpFormat};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Marker emitted by pg_dump at the top of every plain dump
pub const DUMP_HEADER: &str = "-- PostgreSQL database dump";
/// Marker emitted after the last statement of a finished dump
pub const DUMP_TRAILER: &str = "-- PostgreSQL database dump complete";

pub struct PlainFormat {
    runner: PgRunner,
    compression: u32,
}

impl PlainFormat {
    pub fn new(conn: &ConnectionConfig, tools: &ToolsConfig, compression: u32) -> Self {
        Self {
            runner: PgRunner::new(conn, tools),
            compression,
        }
    }

    /// One dump attempt: spawn pg_dump, gzip its stdout into `dest`
    async fn dump_once(&self, database: &str, dest: &Path) -> Result<(), Error> {
        let tool = self.runner.tools().pg_dump.clone();
        let mut cmd = self.runner.command(&tool);
        cmd.args(["-Fp", database]);

        debug!("Executing: {} -Fp {} (gzip level {})", tool, database, self.compression);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Pg(PgError::ToolNotFound {
                tool: tool.clone(),
                source: e.to_string(),
            })
        })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            Error::Pg(PgError::ToolFailed {
                tool: tool.clone(),
                stderr: "stdout pipe unavailable".to_string(),
            })
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            Error::Pg(PgError::ToolFailed {
                tool: tool.clone(),
                stderr: "stderr pipe unavailable".to_string(),
            })
        })?;

        // Drain stderr concurrently so the child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let file = File::create(dest).map_err(|e| {
            Error::Io(IoError::FileWriteFailed {
                path: dest.display().to_string(),
                source: e,
            })
        })?;
        let mut encoder = GzEncoder::new(file, Compression::new(self.compression));

        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = stdout.read(&mut buf).await.map_err(|e| {
                Error::Pg(PgError::ToolFailed {
                    tool: tool.clone(),
                    stderr: format!("reading dump stream: {}", e),
                })
            })?;
            if n == 0 {
                break;
            }
            encoder.write_all(&buf[..n]).map_err(|e| {
                Error::Io(IoError::FileWriteFailed {
                    path: dest.display().to_string(),
                    source: e,
                })
            })?;
        }

        encoder.finish().map_err(|e| {
            Error::Io(IoError::FileWriteFailed {
                path: dest.display().to_string(),
                source: e,
            })
        })?;

        let status = child.wait().await.map_err(|e| {
            Error::Pg(PgError::ToolFailed {
                tool: tool.clone(),
                stderr: format!("process error: {}", e),
            })
        })?;
        let stderr_bytes = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&stderr_bytes);
            return Err(self.runner.classify_stderr(&tool, database, &stderr_text));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl DumpFormat for PlainFormat {
    fn name(&self) -> &str {
        "plain"
    }

    async fn create(&self, database: &str, dest: &Path) -> Result<(), Error> {
        let timeout = Duration::from_secs(self.runner.tools().timeout_secs);
        let max_retries = self.runner.tools().max_retries;
        let mut attempts = 0;
        let mut backoff_ms = 1000;

        loop {
            attempts += 1;

            let result = tokio::time::timeout(timeout, self.dump_once(database, dest))
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Pg(PgError::Timeout {
                        tool: self.runner.tools().pg_dump.clone(),
                        secs: self.runner.tools().timeout_secs,
                    }))
                });

            match result {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= max_retries => return Err(e),
                Err(e) => {
                    if e.is_retryable() {
                        warn!(
                            "pg_dump of {} failed (attempt {}), retrying in {}ms: {}",
                            database, attempts, backoff_ms, e
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

    async fn check(&self, path: &Path) -> Result<DumpCheck, Error> {
        let file = File::open(path).map_err(|e| {
            Error::Io(IoError::FileReadFailed {
                path: path.display().to_string(),
                source: e,
            })
        })?;
        let reader = BufReader::new(GzDecoder::new(BufReader::new(file)));

        let mut lines: u64 = 0;
        let mut saw_header = false;
        let mut saw_trailer = false;

        // Reading every line also validates the gzip stream end to end
        for line in reader.lines() {
            let line = line.map_err(|e| {
                Error::Io(IoError::FileReadFailed {
                    path: path.display().to_string(),
                    source: e,
                })
            })?;
            lines += 1;

            let trimmed = line.trim();
            if lines <= 10 && trimmed == DUMP_HEADER {
                saw_header = true;
            }
            if trimmed == DUMP_TRAILER {
                saw_trailer = true;
            }
        }

        if !saw_header {
            return Err(Error::Pg(PgError::InvalidOutput {
                tool: self.runner.tools().pg_dump.clone(),
                details: format!("{}: dump header missing", path.display()),
            }));
        }
        if !saw_trailer {
            return Err(Error::Pg(PgError::InvalidOutput {
                tool: self.runner.tools().pg_dump.clone(),
                details: format!(
                    "{}: completion trailer missing (dump truncated?)",
                    path.display()
                ),
            }));
        }

        Ok(DumpCheck {
            items: lines,
            detail: format!("gzip stream intact, {} lines", lines),
        })
    }

    async fn restore(&self, path: &Path, target_db: &str) -> Result<(), Error> {
        let sql_path = decompress_to_sibling(path)?;

        let tool = self.runner.tools().psql.clone();
        let args = vec![
            "-X".to_string(),
            "-q".to_string(),
            "-v".to_string(),
            "ON_ERROR_STOP=1".to_string(),
            "-d".to_string(),
            target_db.to_string(),
            "-f".to_string(),
            sql_path.display().to_string(),
        ];

        let result = self.runner.run(&tool, &args, target_db).await;
        if let Err(e) = std::fs::remove_file(&sql_path) {
            warn!("could not remove {}: {}", sql_path.display(), e);
        }
        result?;
        Ok(())
    }
}

/// Decompress `<x>.sql.gz` into a sibling `<x>.sql.tmp` and return its path
fn decompress_to_sibling(path: &Path) -> Result<PathBuf, Error> {
    let sql_path = path.with_extension("tmp");

    let file = File::open(path).map_err(|e| {
        Error::Io(IoError::FileReadFailed {
            path: path.display().to_string(),
            source: e,
        })
    })?;
    let mut decoder = GzDecoder::new(BufReader::new(file));

    let mut out = File::create(&sql_path).map_err(|e| {
        Error::Io(IoError::FileWriteFailed {
            path: sql_path.display().to_string(),
            source: e,
        })
    })?;

    if let Err(e) = io::copy(&mut decoder, &mut out) {
        let _ = std::fs::remove_file(&sql_path);
        return Err(Error::Io(IoError::FileReadFailed {
            path: path.display().to_string(),
            source: e,
        }));
    }

    Ok(sql_path)
}
