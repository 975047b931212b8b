//! Run command: one full dump cycle.
//!
//! Resolves targets, takes the run lock, dumps every database
//! concurrently, optionally verifies the fresh dumps, applies retention,
//! and saves the catalog. Individual database failures are recorded and
//! reported; the cycle itself only errors when every database failed.

use anyhow::{Context, Result};
use tracing::info;

use crate::catalog::{Catalog, DumpStatus};
use crate::commands::{format_bytes, print_warnings, spinner, status_colored};
use crate::config::Config;
use crate::dump::runner;
use crate::error::{DumpError, Error};
use crate::lock::RunLock;
use crate::pg;
use crate::retention;
use crate::verify::verify_entry;

/// Flags for one dump cycle.
pub struct RunOptions {
    /// Dump only these databases instead of the configured/discovered set
    pub databases: Vec<String>,
    /// Structurally verify each fresh dump after the cycle
    pub verify: bool,
    /// Apply the retention policy after dumping
    pub rotate: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            verify: false,
            rotate: true,
        }
    }
}

/// Run one dump cycle.
pub async fn run_command(config: &Config, options: &RunOptions) -> Result<()> {
    // Step 1: resolve target databases
    let databases = if options.databases.is_empty() {
        let pb = spinner("Resolving target databases...");
        let resolved = runner::resolve_databases(config).await?;
        pb.finish_with_message(format!("{} database(s) to dump", resolved.len()));
        resolved
    } else {
        let mut seen = std::collections::HashSet::new();
        options
            .databases
            .iter()
            .filter(|db| seen.insert(db.as_str()))
            .cloned()
            .collect()
    };

    // Step 2: take the run lock for the rest of the cycle
    let mut lock = RunLock::new(&config.dumps.directory)?;
    let _guard = lock.try_acquire()?;

    // Step 3: load the catalog
    let catalog_path = config.catalog_path();
    let mut catalog = Catalog::load(&catalog_path).context("Failed to load catalog")?;

    // Step 4: dump all databases concurrently
    let format = pg::format_for(
        config.dumps.format,
        &config.connection,
        &config.tools,
        config.dumps.compression,
    );

    let pb = spinner(&format!("Dumping {} database(s)...", databases.len()));
    let entries = runner::dump_all(config, format.as_ref(), &databases).await;

    let mut warnings: Vec<String> = Vec::new();
    let mut result_lines: Vec<String> = Vec::new();
    let mut dumped = 0usize;
    let mut failed = 0usize;
    let mut dumped_bytes = 0u64;

    for entry in entries {
        match entry.status {
            DumpStatus::Failed => {
                failed += 1;
                result_lines.push(format!(
                    "  {:<24} {}",
                    entry.database,
                    status_colored(entry.status)
                ));
                if let Some(reason) = &entry.error {
                    warnings.push(format!("{}: {}", entry.database, reason));
                }
            }
            _ => {
                dumped += 1;
                dumped_bytes += entry.size_bytes;
                result_lines.push(format!(
                    "  {:<24} {} ({}, {}s)",
                    entry.database,
                    entry.file,
                    format_bytes(entry.size_bytes),
                    entry.duration_secs
                ));
            }
        }

        let database = entry.database.clone();
        if let Err(e) = catalog.insert(entry) {
            warnings.push(format!("{}: not cataloged: {}", database, e));
        }
    }
    pb.finish_with_message(format!(
        "Dumped {}/{} database(s) ({})",
        dumped,
        databases.len(),
        format_bytes(dumped_bytes)
    ));
    for line in &result_lines {
        println!("{}", line);
    }

    // Step 5: save the catalog before deciding whether the cycle failed,
    // so failed entries survive for the post-mortem
    catalog.save(&catalog_path).context("Failed to save catalog")?;

    if dumped == 0 && failed > 0 {
        print_warnings(&warnings);
        return Err(Error::Dump(DumpError::AllFailed { failures: failed }).into());
    }

    // Step 6: optional structural verification of the fresh dumps
    let mut verified = 0usize;
    let mut verify_failed = 0usize;
    if options.verify && dumped > 0 {
        let pb = spinner("Verifying fresh dumps...");
        let fresh: Vec<String> = catalog
            .entries()
            .iter()
            .filter(|e| e.status == DumpStatus::Complete && databases.contains(&e.database))
            .map(|e| e.id.clone())
            .collect();

        for id in fresh {
            if let Some(entry) = catalog.get_mut(&id) {
                match verify_entry(config, entry, false).await {
                    Ok(outcome) if outcome.passed => verified += 1,
                    Ok(outcome) => {
                        verify_failed += 1;
                        if let Some(failure) = &outcome.failure {
                            warnings.push(format!("{}: {}", id, failure));
                        }
                    }
                    Err(e) => {
                        warnings.push(format!("{}: verification aborted: {}", id, e));
                    }
                }
            }
        }
        pb.finish_with_message(format!(
            "Verified {}/{} fresh dump(s)",
            verified,
            verified + verify_failed
        ));
        catalog.save(&catalog_path).context("Failed to save catalog")?;
    }

    // Step 7: retention pass
    let mut pruned = 0usize;
    let mut freed = 0u64;
    if options.rotate {
        let plan = retention::plan(&catalog, &config.retention);
        if !plan.is_noop() {
            let pb = spinner("Rotating old dumps...");
            let outcome = retention::apply(&plan, &mut catalog, config);
            pruned = outcome.deleted;
            freed = outcome.freed_bytes;
            warnings.extend(outcome.warnings);
            pb.finish_with_message(format!(
                "Pruned {} dump(s) ({} freed)",
                pruned,
                format_bytes(freed)
            ));
            catalog.save(&catalog_path).context("Failed to save catalog")?;
        }
    } else {
        info!("Rotation skipped (--no-rotate)");
    }

    // Step 8: summary
    println!();
    println!("=== Dump Cycle Complete ===");
    println!("  Databases dumped:  {}", dumped);
    println!("  Failed:            {}", failed);
    if options.verify {
        println!("  Verified:          {}", verified);
        if verify_failed > 0 {
            println!("  Verify failed:     {}", verify_failed);
        }
    }
    if options.rotate {
        println!("  Pruned:            {}", pruned);
        println!("  Space freed:       {}", format_bytes(freed));
    }

    print_warnings(&warnings);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_rotate() {
        let options = RunOptions::default();
        assert!(options.rotate);
        assert!(!options.verify);
        assert!(options.databases.is_empty());
    }
}
