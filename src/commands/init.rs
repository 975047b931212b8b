use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::catalog::Catalog;
use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# dadump configuration
#
# Dumps every configured database daily and rotates old dumps on a
# grandfather-father-son schedule. All values below are the defaults
# except where noted.

[connection]
host = "localhost"
port = 5432
user = "postgres"
# Passed to the PostgreSQL tools via PGPASSWORD, never on the command line.
# password = "secret"
# Explicit list of databases to dump. An empty list means: ask the server
# and dump everything except the excludes below (template databases are
# always skipped).
databases = []
exclude = ["postgres"]

[dumps]
directory = "__DIRECTORY__"
# "custom" = pg_dump -Fc archives (verifiable with pg_restore --list)
# "plain"  = plain SQL piped through gzip
format = "custom"
compression = 6

[retention]
keep_daily = 7
keep_weekly = 4
keep_monthly = 6
keep_failed = 1

[schedule]
# Local time of the daily run (24h clock)
hour = 2
minute = 30
run_on_start = false

[tools]
pg_dump = "pg_dump"
pg_restore = "pg_restore"
psql = "psql"
timeout_secs = 3600
max_retries = 3
"#;

/// Write a commented sample config, create the dump directory, and seed
/// an empty catalog.
pub fn init_command(config_path: &Path, directory: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first if you want to reinitialize.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let rendered = CONFIG_TEMPLATE.replace("__DIRECTORY__", &directory.display().to_string());
    fs::write(config_path, rendered)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());

    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create {}", directory.display()))?;
    println!("  Created {}/", directory.display());

    // The rendered file must round-trip through the real parser
    let config = Config::load(config_path)
        .context("Generated config failed to parse; this is a bug")?;

    let catalog_path = config.catalog_path();
    Catalog::default()
        .save(&catalog_path)
        .context("Failed to write empty catalog")?;
    println!("  Created {}", catalog_path.display());

    println!("\n✓ dadump initialized");
    println!(
        "Edit {} to set connection details, then run 'dadump run'.",
        config_path.display()
    );

    Ok(())
}
