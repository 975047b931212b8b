use anyhow::{Context, Result};

use crate::catalog::Catalog;
use crate::commands::{format_bytes, print_warnings};
use crate::config::Config;
use crate::lock::RunLock;
use crate::retention;

/// Apply the retention policy now. `--dry-run` prints the plan and
/// deletes nothing.
pub fn prune_command(config: &Config, dry_run: bool) -> Result<()> {
    let catalog_path = config.catalog_path();
    let mut catalog = Catalog::load(&catalog_path).context("Failed to load catalog")?;

    let plan = retention::plan(&catalog, &config.retention);

    if plan.is_noop() {
        println!("Nothing to prune. {} dump(s) within retention.", plan.keep.len());
        return Ok(());
    }

    println!("Retention plan:");
    for item in &plan.delete {
        println!(
            "  delete {:<42} {:>10}  ({})",
            item.id,
            format_bytes(item.size_bytes),
            item.reason
        );
    }
    println!(
        "  keeping {} dump(s); {} will be freed",
        plan.keep.len(),
        format_bytes(plan.freed_bytes())
    );

    if dry_run {
        println!();
        println!("Dry run -- nothing deleted.");
        return Ok(());
    }

    // Deleting files; no concurrent cycle may be writing them
    let mut lock = RunLock::new(&config.dumps.directory)?;
    let _guard = lock.try_acquire()?;

    let outcome = retention::apply(&plan, &mut catalog, config);
    catalog.save(&catalog_path).context("Failed to save catalog")?;

    println!();
    println!("=== Prune Complete ===");
    println!("  Deleted:      {}", outcome.deleted);
    println!("  Space freed:  {}", format_bytes(outcome.freed_bytes));

    print_warnings(&outcome.warnings);

    Ok(())
}
