//! Restore command: load a cataloged dump back into a database.
//!
//! Destructive by nature, so it asks for confirmation unless `--yes`
//! and re-checks the file checksum before touching the server.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Instant;

use crate::catalog::{self, Catalog, DumpStatus};
use crate::commands::{format_bytes, spinner};
use crate::config::Config;
use crate::pg::{self, Psql};

pub async fn restore_command(
    config: &Config,
    id: &str,
    target_db: Option<&str>,
    yes: bool,
) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_path()).context("Failed to load catalog")?;

    let entry = catalog
        .get(id)
        .with_context(|| format!("Dump '{}' is not cataloged", id))?;

    if entry.status == DumpStatus::Failed {
        anyhow::bail!("Dump '{}' never completed; nothing to restore", id);
    }

    let target = target_db.unwrap_or(&entry.database);
    let path = config.dumps.directory.join(&entry.file);

    if !path.exists() {
        anyhow::bail!("Dump file {} is missing on disk", path.display());
    }

    let actual = catalog::file_sha256(&path)?;
    if actual != entry.sha256 {
        anyhow::bail!(
            "Dump file {} does not match its cataloged checksum; run 'dadump verify {}'",
            path.display(),
            id
        );
    }

    println!(
        "Restoring {} ({}, {}) into database '{}'",
        id,
        entry.format,
        format_bytes(entry.size_bytes),
        target
    );

    if !yes && !confirm(&format!(
        "This may overwrite existing data in '{}'. Continue? [y/N] ",
        target
    ))? {
        println!("Aborted.");
        return Ok(());
    }

    let psql = Psql::new(&config.connection, &config.tools);
    if !psql.database_exists(target).await? {
        psql.create_database(target).await?;
        println!("  Created database '{}'", target);
    }

    let format = pg::format_for(
        entry.format,
        &config.connection,
        &config.tools,
        config.dumps.compression,
    );

    let started = Instant::now();
    let pb = spinner(&format!("Restoring into '{}'...", target));
    format.restore(&path, target).await?;
    pb.finish_with_message(format!(
        "Restored {} into '{}' in {}s",
        id,
        target,
        started.elapsed().as_secs()
    ));

    println!("\n✓ Restore complete");

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
