//! Status command: config summary, per-database dump state, catalog
//! stats, and schedule information in one screen.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use colored::Colorize;
use std::path::Path;

use crate::catalog::Catalog;
use crate::commands::{format_age, format_bytes, status_colored};
use crate::config::Config;
use crate::pg::{PgRunner, Psql};
use crate::scheduler;

pub async fn status_command(config: &Config, config_path: &Path) -> Result<()> {
    println!("dadump status");
    println!();
    println!("Config:    {}", config_path.display());
    println!(
        "Server:    {}@{}:{}",
        config.connection.user, config.connection.host, config.connection.port
    );
    println!("Directory: {}", config.dumps.directory.display());
    println!(
        "Format:    {} (compression {})",
        config.dumps.format, config.dumps.compression
    );

    // Tool and server reachability; failures here are informational
    let runner = PgRunner::new(&config.connection, &config.tools);
    match runner.pg_dump_version().await {
        Ok(version) => println!("pg_dump:   {}", version),
        Err(e) => println!("pg_dump:   {} ({})", "unavailable".red(), e),
    }

    let psql = Psql::new(&config.connection, &config.tools);
    match psql.ping().await {
        Ok(()) => println!("Ping:      {}", "ok".green()),
        Err(e) => println!("Ping:      {} ({})", "failed".red(), e),
    }

    let catalog = Catalog::load(&config.catalog_path()).context("Failed to load catalog")?;
    let now = Utc::now();

    println!();
    println!("Databases:");
    let databases = catalog.databases();
    if databases.is_empty() {
        println!("  (no dumps cataloged yet)");
    }
    for db in &databases {
        let entries = catalog.entries_for(db);
        let latest = match entries.first() {
            Some(entry) => entry,
            None => continue,
        };
        let last_success = catalog.latest_success(db);

        let success_note = match last_success {
            Some(entry) => format!("last good {} ago", format_age(now - entry.created_at)),
            None => "no good dump".red().to_string(),
        };

        println!(
            "  {:<24} {:<14} {} ago  ({})",
            db,
            status_colored(latest.status).to_string(),
            format_age(now - latest.created_at),
            success_note
        );
    }

    let stats = catalog.stats();
    println!();
    println!("Catalog:");
    println!("  Dumps:        {} total", stats.total);
    println!(
        "  By status:    {} complete, {} verified, {} verify-failed, {} failed",
        stats.complete, stats.verified, stats.verify_failed, stats.failed
    );
    println!("  Space used:   {}", format_bytes(stats.total_bytes));
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "  Range:        {} .. {}",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }

    // Anything on disk the catalog does not know about, and vice versa
    let report = catalog.reconcile(&config.dumps.directory);
    if !report.is_clean() {
        println!();
        println!("Reconciliation:");
        for id in &report.missing {
            println!("  {} entry '{}' has no file on disk", "missing".yellow(), id);
        }
        for path in &report.orphans {
            println!(
                "  {} {} is not cataloged",
                "orphan".yellow(),
                path.display()
            );
        }
        for path in &report.stale_parts {
            println!(
                "  {} {} left over from an interrupted dump",
                "stale".yellow(),
                path.display()
            );
        }
    }

    println!();
    let local_now = Local::now();
    let next = config.schedule.next_run_after(&local_now);
    println!(
        "Schedule:  daily at {} (next run {})",
        config.schedule,
        next.format("%Y-%m-%d %H:%M %Z")
    );

    let last_success_overall = catalog
        .entries()
        .iter()
        .filter(|e| e.status.is_success())
        .map(|e| e.created_at)
        .max();
    if scheduler::catch_up_due(last_success_overall, now) {
        println!(
            "{}",
            "Note: last successful dump is older than 24h (or none exists).".yellow()
        );
    }

    Ok(())
}
