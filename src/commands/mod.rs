//! CLI subcommand implementations.
//!
//! Commands load the config, call into the engine modules, and own all
//! operator-facing output. Errors are wrapped with `anyhow::Context`
//! here; the engine modules below return typed `crate::Error`s.

pub mod daemon;
pub mod init;
pub mod list;
pub mod prune;
pub mod restore;
pub mod run;
pub mod status;
pub mod verify;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog::DumpStatus;

/// Create a spinner-style progress bar
pub(crate) fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print collected warnings
pub(crate) fn print_warnings(warnings: &[String]) {
    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in warnings {
            println!("  - {}", w);
        }
    }
}

/// Status word with the color operators expect at a glance
pub(crate) fn status_colored(status: DumpStatus) -> colored::ColoredString {
    match status {
        DumpStatus::Complete => "complete".green(),
        DumpStatus::Verified => "verified".bright_green(),
        DumpStatus::VerifyFailed => "verify-failed".yellow(),
        DumpStatus::Failed => "failed".red(),
    }
}

/// Human-readable byte count (binary units)
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Compact age like "3d 4h" or "12m"
pub(crate) fn format_age(duration: chrono::Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    let days = minutes / (60 * 24);
    let hours = (minutes % (60 * 24)) / 60;
    let mins = minutes % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_format_age_ranges() {
        assert_eq!(format_age(chrono::Duration::minutes(12)), "12m");
        assert_eq!(format_age(chrono::Duration::minutes(135)), "2h 15m");
        assert_eq!(format_age(chrono::Duration::days(3) + chrono::Duration::hours(4)), "3d 4h");
        assert_eq!(format_age(chrono::Duration::minutes(-5)), "0m");
    }
}
