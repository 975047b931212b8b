//! Verify command: restore-readiness checks against cataloged dumps.
//!
//! Checksum and structural checks always run; `--deep` additionally
//! restores into a throwaway scratch database. Results are written back
//! to the catalog so `list` and `status` reflect them.

use anyhow::{Context, Result};

use crate::catalog::{Catalog, DumpStatus};
use crate::commands::{print_warnings, spinner};
use crate::config::Config;
use crate::verify::verify_entry;

pub async fn verify_command(
    config: &Config,
    id: Option<&str>,
    all: bool,
    deep: bool,
) -> Result<()> {
    let catalog_path = config.catalog_path();
    let mut catalog = Catalog::load(&catalog_path).context("Failed to load catalog")?;

    let targets: Vec<String> = match (id, all) {
        (Some(id), _) => {
            if catalog.get(id).is_none() {
                anyhow::bail!("Dump '{}' is not cataloged", id);
            }
            vec![id.to_string()]
        }
        (None, true) => catalog
            .entries()
            .iter()
            .filter(|e| e.status != DumpStatus::Failed)
            .map(|e| e.id.clone())
            .collect(),
        (None, false) => anyhow::bail!("Provide a dump id or --all"),
    };

    if targets.is_empty() {
        println!("Nothing to verify.");
        return Ok(());
    }

    let mut verified = 0usize;
    let mut failed = 0usize;
    let mut warnings: Vec<String> = Vec::new();
    let mut aborted: Option<anyhow::Error> = None;

    for id in &targets {
        let entry = match catalog.get_mut(id) {
            Some(entry) => entry,
            None => continue,
        };
        if entry.status == DumpStatus::Failed {
            println!("- {} skipped (dump never completed)", id);
            continue;
        }

        let pb = spinner(&format!("Verifying {}...", id));
        match verify_entry(config, entry, deep).await {
            Ok(outcome) => {
                if outcome.passed {
                    verified += 1;
                    pb.finish_with_message(format!("✓ {} verified", id));
                } else {
                    failed += 1;
                    let reason = outcome
                        .failure
                        .as_ref()
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "unknown failure".to_string());
                    pb.finish_with_message(format!("✗ {} failed: {}", id, reason));
                }
                for note in &outcome.notes {
                    println!("    {}", note);
                }
                warnings.extend(outcome.warnings);
            }
            Err(e) => {
                // Environment problem, not a dump problem; stop here
                pb.finish_with_message(format!("{} verification aborted", id));
                aborted = Some(anyhow::Error::from(e));
                break;
            }
        }
    }

    catalog.save(&catalog_path).context("Failed to save catalog")?;

    if let Some(e) = aborted {
        return Err(e.context("Verification could not run to completion"));
    }

    println!();
    println!("=== Verification Complete ===");
    println!("  Verified:  {}", verified);
    println!("  Failed:    {}", failed);

    print_warnings(&warnings);

    if failed > 0 {
        anyhow::bail!("{} dump(s) failed verification", failed);
    }

    Ok(())
}
