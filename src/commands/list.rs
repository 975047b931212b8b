use anyhow::{Context, Result};
use chrono::Utc;

use crate::catalog::Catalog;
use crate::commands::{format_age, format_bytes, status_colored};
use crate::config::Config;

/// List cataloged dumps, newest first.
pub fn list_command(config: &Config, database: Option<&str>, json: bool) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_path()).context("Failed to load catalog")?;

    let entries = match database {
        Some(db) => catalog.entries_for(db),
        None => catalog.entries(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        match database {
            Some(db) => println!("No dumps cataloged for database '{}'.", db),
            None => println!("No dumps cataloged."),
        }
        return Ok(());
    }

    println!(
        "{:<42} {:<20} {:<28} {:>10}  {}",
        "ID", "DATABASE", "CREATED (UTC)", "SIZE", "STATUS"
    );
    let now = Utc::now();
    for entry in &entries {
        println!(
            "{:<42} {:<20} {:<28} {:>10}  {}",
            entry.id,
            entry.database,
            format!(
                "{} ({})",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                format_age(now - entry.created_at)
            ),
            format_bytes(entry.size_bytes),
            status_colored(entry.status)
        );
    }

    let total_bytes: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!(
        "{} dump(s), {} total",
        entries.len(),
        format_bytes(total_bytes)
    );

    Ok(())
}
