//! Daemon command: long-running scheduler loop.
//!
//! Sleeps until the configured wall-clock time, runs a dump cycle,
//! repeats. A failed cycle is logged and the daemon waits for the next
//! tick; only a shutdown signal stops the loop.

use anyhow::Result;
use chrono::{Local, Utc};
use tokio::signal;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::commands::run::{run_command, RunOptions};
use crate::config::Config;
use crate::scheduler;

pub async fn daemon_command(config: &Config) -> Result<()> {
    println!(
        "Starting dadump daemon (daily at {}, dumps in {})",
        config.schedule,
        config.dumps.directory.display()
    );
    info!("Daemon started, schedule {}", config.schedule);

    if startup_run_due(config)? {
        info!("Running catch-up dump cycle at startup");
        run_cycle(config).await;
    }

    loop {
        let now = Local::now();
        let next = config.schedule.next_run_after(&now);
        let wait = (next - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        println!("Next run at {}", next.format("%Y-%m-%d %H:%M %Z"));
        info!("Sleeping {}s until next run", wait.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_cycle(config).await;
            }
            _ = shutdown_signal() => {
                println!("Shutting down.");
                info!("Daemon stopped by signal");
                return Ok(());
            }
        }
    }
}

/// Fire immediately when configured to, or when the newest successful
/// dump is older than a day (the machine may have been off at dump time).
fn startup_run_due(config: &Config) -> Result<bool> {
    if config.schedule.run_on_start {
        return Ok(true);
    }

    let catalog = Catalog::load(&config.catalog_path())?;
    let last_success = catalog
        .entries()
        .iter()
        .filter(|e| e.status.is_success())
        .map(|e| e.created_at)
        .max();

    Ok(scheduler::catch_up_due(last_success, Utc::now()))
}

async fn run_cycle(config: &Config) {
    let options = RunOptions::default();
    if let Err(e) = run_command(config, &options).await {
        warn!("Dump cycle failed: {:#}", e);
        println!("Dump cycle failed: {:#}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
