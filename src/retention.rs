//! Grandfather-father-son rotation over the dump catalog.
//!
//! Retention is planned per database: the newest dump of each of the most
//! recent `keep_daily` calendar days, `keep_weekly` ISO weeks and
//! `keep_monthly` months stays, the union of those slots survives and
//! everything else is deletable. Planning is a pure function of the catalog
//! so `--dry-run` shows exactly what `apply` would do.

use crate::catalog::{Catalog, DumpStatus};
use crate::config::Config;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::debug;

/// How many rotation slots of each kind to keep, per database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Newest dump of each of the N most recent calendar days
    #[serde(default = "default_keep_daily")]
    pub keep_daily: u32,
    /// Newest dump of each of the N most recent ISO weeks
    #[serde(default = "default_keep_weekly")]
    pub keep_weekly: u32,
    /// Newest dump of each of the N most recent months
    #[serde(default = "default_keep_monthly")]
    pub keep_monthly: u32,
    /// Failed-run records to keep once a newer good dump exists
    #[serde(default = "default_keep_failed")]
    pub keep_failed: u32,
}

fn default_keep_daily() -> u32 {
    7
}

fn default_keep_weekly() -> u32 {
    4
}

fn default_keep_monthly() -> u32 {
    6
}

fn default_keep_failed() -> u32 {
    1
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_daily: default_keep_daily(),
            keep_weekly: default_keep_weekly(),
            keep_monthly: default_keep_monthly(),
            keep_failed: default_keep_failed(),
        }
    }
}

/// One dump in a retention plan
#[derive(Debug, Clone)]
pub struct PlanItem {
    pub id: String,
    pub database: String,
    pub status: DumpStatus,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}

/// What retention would keep and delete, with a reason per dump
#[derive(Debug, Default)]
pub struct RetentionPlan {
    pub keep: Vec<PlanItem>,
    pub delete: Vec<PlanItem>,
}

impl RetentionPlan {
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty()
    }

    /// Bytes on disk the deletions would free
    pub fn freed_bytes(&self) -> u64 {
        self.delete
            .iter()
            .filter(|i| i.status != DumpStatus::Failed)
            .map(|i| i.size_bytes)
            .sum()
    }
}

/// What actually happened when a plan was applied
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub deleted: usize,
    pub freed_bytes: u64,
    pub warnings: Vec<String>,
}

/// Plan rotation for every database in the catalog
pub fn plan(catalog: &Catalog, policy: &RetentionPolicy) -> RetentionPlan {
    let mut combined = RetentionPlan::default();

    for database in catalog.databases() {
        let entries = catalog.entries_for(&database);
        let db_plan = plan_for_database(&entries, policy);
        combined.keep.extend(db_plan.keep);
        combined.delete.extend(db_plan.delete);
    }

    combined
}

/// Plan rotation for one database. `entries` must all belong to it;
/// any order is accepted.
pub fn plan_for_database(entries: &[&crate::catalog::DumpEntry], policy: &RetentionPolicy) -> RetentionPlan {
    let mut plan = RetentionPlan::default();
    if entries.is_empty() {
        return plan;
    }

    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let newest_success_at = sorted
        .iter()
        .filter(|e| e.status.is_success())
        .map(|e| e.created_at)
        .next();

    // Slot assignment walks newest -> oldest, so the first dump seen in a
    // period is that period's newest and claims the slot.
    let mut reasons: HashMap<&str, Vec<String>> = HashMap::new();
    let mut daily_slots: BTreeSet<String> = BTreeSet::new();
    let mut weekly_slots: BTreeSet<String> = BTreeSet::new();
    let mut monthly_slots: BTreeSet<String> = BTreeSet::new();

    for (index, entry) in sorted.iter().filter(|e| e.status.is_success()).enumerate() {
        let entry_reasons = reasons.entry(entry.id.as_str()).or_default();

        if index == 0 {
            entry_reasons.push("latest good dump".to_string());
        }

        let day = entry.created_at.date_naive().to_string();
        if !daily_slots.contains(&day) && (daily_slots.len() as u32) < policy.keep_daily {
            daily_slots.insert(day.clone());
            entry_reasons.push(format!("daily {}", day));
        }

        let iso = entry.created_at.iso_week();
        let week = format!("{}-W{:02}", iso.year(), iso.week());
        if !weekly_slots.contains(&week) && (weekly_slots.len() as u32) < policy.keep_weekly {
            weekly_slots.insert(week.clone());
            entry_reasons.push(format!("weekly {}", week));
        }

        let month = format!(
            "{:04}-{:02}",
            entry.created_at.year(),
            entry.created_at.month()
        );
        if !monthly_slots.contains(&month) && (monthly_slots.len() as u32) < policy.keep_monthly {
            monthly_slots.insert(month.clone());
            entry_reasons.push(format!("monthly {}", month));
        }
    }

    let mut failed_seen: u32 = 0;

    for entry in &sorted {
        let item = |reason: String| PlanItem {
            id: entry.id.clone(),
            database: entry.database.clone(),
            status: entry.status,
            size_bytes: entry.size_bytes,
            created_at: entry.created_at,
            reason,
        };

        match entry.status {
            DumpStatus::Complete | DumpStatus::Verified => {
                match reasons.get(entry.id.as_str()) {
                    Some(r) if !r.is_empty() => plan.keep.push(item(r.join(", "))),
                    _ => plan.delete.push(item("outside retention windows".to_string())),
                }
            }
            DumpStatus::Failed => {
                // Failure records stay until a newer good dump supersedes them
                let superseded = newest_success_at
                    .map(|t| t > entry.created_at)
                    .unwrap_or(false);
                failed_seen += 1;

                if superseded && failed_seen > policy.keep_failed {
                    plan.delete.push(item("superseded failure record".to_string()));
                } else if superseded {
                    plan.keep.push(item("recent failure record".to_string()));
                } else {
                    plan.keep.push(item("no newer good dump".to_string()));
                }
            }
            DumpStatus::VerifyFailed => {
                // A dump that failed verification is still the only copy
                // until something newer succeeds
                let superseded = newest_success_at
                    .map(|t| t > entry.created_at)
                    .unwrap_or(false);

                if superseded {
                    plan.delete.push(item("superseded unverified dump".to_string()));
                } else {
                    plan.keep.push(item("no newer good dump".to_string()));
                }
            }
        }
    }

    plan
}

/// Delete everything a plan marks for deletion: file first, then the
/// catalog entry. A file that will not go away leaves its entry in place
/// and produces a warning instead of failing the run.
pub fn apply(
    plan: &RetentionPlan,
    catalog: &mut Catalog,
    config: &Config,
) -> ApplyOutcome {
    let mut outcome = ApplyOutcome::default();

    for item in &plan.delete {
        if item.status != DumpStatus::Failed {
            if let Some(entry) = catalog.get(&item.id) {
                let path = config.dumps.directory.join(&entry.file);
                if let Err(e) = remove_dump_file(&path) {
                    outcome
                        .warnings
                        .push(format!("could not remove {}: {}", path.display(), e));
                    continue;
                }
                outcome.freed_bytes += entry.size_bytes;
            }
        }

        match catalog.remove(&item.id) {
            Ok(_) => {
                debug!("pruned {} ({})", item.id, item.reason);
                outcome.deleted += 1;
            }
            Err(e) => outcome.warnings.push(format!("{}", e)),
        }
    }

    outcome
}

/// Remove a dump file; a file that is already gone counts as removed
fn remove_dump_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DumpEntry;
    use crate::config::FormatKind;
    use chrono::TimeZone;

    fn dump(id: &str, status: DumpStatus, ts: DateTime<Utc>) -> DumpEntry {
        DumpEntry {
            id: id.to_string(),
            database: "app".to_string(),
            file: format!("{}.dump", id),
            format: FormatKind::Custom,
            created_at: ts,
            status,
            size_bytes: 100,
            sha256: String::new(),
            duration_secs: 1,
            verified_at: None,
            error: None,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    fn policy(daily: u32, weekly: u32, monthly: u32, failed: u32) -> RetentionPolicy {
        RetentionPolicy {
            keep_daily: daily,
            keep_weekly: weekly,
            keep_monthly: monthly,
            keep_failed: failed,
        }
    }

    fn ids(items: &[PlanItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_policy_defaults() {
        let p = RetentionPolicy::default();
        assert_eq!(p.keep_daily, 7);
        assert_eq!(p.keep_weekly, 4);
        assert_eq!(p.keep_monthly, 6);
        assert_eq!(p.keep_failed, 1);
    }

    #[test]
    fn test_empty_catalog_empty_plan() {
        let plan = plan_for_database(&[], &policy(7, 4, 6, 1));
        assert!(plan.keep.is_empty());
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn test_every_entry_planned_exactly_once() {
        let dumps: Vec<DumpEntry> = (1..=20)
            .map(|d| dump(&format!("app-{:02}", d), DumpStatus::Complete, at(2026, 7, d, 2)))
            .collect();
        let refs: Vec<&DumpEntry> = dumps.iter().collect();

        let plan = plan_for_database(&refs, &policy(3, 2, 1, 1));
        assert_eq!(plan.keep.len() + plan.delete.len(), 20);

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for item in plan.keep.iter().chain(plan.delete.iter()) {
            assert!(seen.insert(item.id.as_str()), "{} planned twice", item.id);
        }
    }

    #[test]
    fn test_daily_slots_keep_most_recent_days() {
        let dumps: Vec<DumpEntry> = (10..=16)
            .map(|d| dump(&format!("app-{}", d), DumpStatus::Complete, at(2026, 8, d, 2)))
            .collect();
        let refs: Vec<&DumpEntry> = dumps.iter().collect();

        let plan = plan_for_database(&refs, &policy(3, 0, 0, 0));
        assert_eq!(ids(&plan.keep), vec!["app-16", "app-15", "app-14"]);
        assert_eq!(plan.delete.len(), 4);
    }

    #[test]
    fn test_same_day_keeps_only_latest() {
        let morning = dump("app-morning", DumpStatus::Complete, at(2026, 8, 20, 2));
        let evening = dump("app-evening", DumpStatus::Complete, at(2026, 8, 20, 18));
        let refs = vec![&morning, &evening];

        let plan = plan_for_database(&refs, &policy(7, 0, 0, 0));
        assert_eq!(ids(&plan.keep), vec!["app-evening"]);
        assert_eq!(ids(&plan.delete), vec!["app-morning"]);
    }

    #[test]
    fn test_weekly_and_monthly_slots() {
        // Daily dumps across ~10 weeks
        let mut dumps = Vec::new();
        let start = at(2026, 6, 1, 2);
        for i in 0..70 {
            let ts = start + chrono::Duration::days(i);
            dumps.push(dump(&format!("app-{:03}", i), DumpStatus::Complete, ts));
        }
        let refs: Vec<&DumpEntry> = dumps.iter().collect();

        let plan = plan_for_database(&refs, &policy(7, 4, 3, 0));

        // 7 dailies; weeks 8..11 give 4 weeklies but the newest weeks overlap
        // the dailies, and months overlap both, so the union stays small
        assert!(plan.keep.len() >= 7);
        assert!(plan.keep.len() <= 7 + 4 + 3);

        // Last dump holds the newest daily, weekly and monthly slot at once
        let newest = plan.keep.iter().find(|i| i.id == "app-069").unwrap();
        assert!(newest.reason.contains("latest good dump"));
        assert!(newest.reason.contains("daily"));
        assert!(newest.reason.contains("weekly"));
        assert!(newest.reason.contains("monthly"));

        // Monthly slots: June, July, August all represented
        let monthly_kept: Vec<&PlanItem> = plan
            .keep
            .iter()
            .filter(|i| i.reason.contains("monthly"))
            .collect();
        assert_eq!(monthly_kept.len(), 3);
    }

    #[test]
    fn test_newest_success_always_kept() {
        let only = dump("app-only", DumpStatus::Complete, at(2026, 8, 20, 2));
        let refs = vec![&only];

        // Tight policy still keeps the one good dump
        let plan = plan_for_database(&refs, &policy(1, 0, 0, 0));
        assert_eq!(ids(&plan.keep), vec!["app-only"]);
        assert!(plan.keep[0].reason.contains("latest good dump"));
    }

    #[test]
    fn test_verified_counts_as_success() {
        let verified = dump("app-verified", DumpStatus::Verified, at(2026, 8, 20, 2));
        let refs = vec![&verified];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 1));
        assert_eq!(plan.keep.len(), 1);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn test_failed_kept_until_newer_success() {
        // Three failures after the last good dump: all stay
        let good = dump("app-good", DumpStatus::Complete, at(2026, 8, 17, 2));
        let f1 = dump("app-f1", DumpStatus::Failed, at(2026, 8, 18, 2));
        let f2 = dump("app-f2", DumpStatus::Failed, at(2026, 8, 19, 2));
        let f3 = dump("app-f3", DumpStatus::Failed, at(2026, 8, 20, 2));
        let refs = vec![&good, &f1, &f2, &f3];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 1));
        assert_eq!(plan.delete.len(), 0);
        assert_eq!(plan.keep.len(), 4);
    }

    #[test]
    fn test_failed_pruned_after_newer_success() {
        let f1 = dump("app-f1", DumpStatus::Failed, at(2026, 8, 18, 2));
        let f2 = dump("app-f2", DumpStatus::Failed, at(2026, 8, 19, 2));
        let good = dump("app-good", DumpStatus::Complete, at(2026, 8, 20, 2));
        let refs = vec![&f1, &f2, &good];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 1));
        // keep_failed = 1: the newer failure record survives
        assert_eq!(ids(&plan.keep), vec!["app-good", "app-f2"]);
        assert_eq!(ids(&plan.delete), vec!["app-f1"]);
    }

    #[test]
    fn test_failed_all_pruned_with_zero_keep_failed() {
        let f1 = dump("app-f1", DumpStatus::Failed, at(2026, 8, 19, 2));
        let good = dump("app-good", DumpStatus::Complete, at(2026, 8, 20, 2));
        let refs = vec![&f1, &good];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 0));
        assert_eq!(ids(&plan.delete), vec!["app-f1"]);
    }

    #[test]
    fn test_verify_failed_never_holds_slot_but_survives_while_newest() {
        let old = dump("app-old", DumpStatus::Complete, at(2026, 8, 18, 2));
        let bad = dump("app-bad", DumpStatus::VerifyFailed, at(2026, 8, 20, 2));
        let refs = vec![&old, &bad];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 1));
        // The unverified dump stays (nothing newer succeeded) but the daily
        // slot for its day is NOT consumed by it
        assert_eq!(plan.delete.len(), 0);
        let bad_item = plan.keep.iter().find(|i| i.id == "app-bad").unwrap();
        assert_eq!(bad_item.reason, "no newer good dump");
        let old_item = plan.keep.iter().find(|i| i.id == "app-old").unwrap();
        assert!(old_item.reason.contains("latest good dump"));
    }

    #[test]
    fn test_verify_failed_pruned_after_newer_success() {
        let bad = dump("app-bad", DumpStatus::VerifyFailed, at(2026, 8, 19, 2));
        let good = dump("app-good", DumpStatus::Complete, at(2026, 8, 20, 2));
        let refs = vec![&bad, &good];

        let plan = plan_for_database(&refs, &policy(7, 4, 6, 1));
        assert_eq!(ids(&plan.delete), vec!["app-bad"]);
        assert_eq!(plan.delete[0].reason, "superseded unverified dump");
    }

    #[test]
    fn test_plan_covers_all_databases() {
        let mut catalog = Catalog::default();
        let mut e1 = dump("app-1", DumpStatus::Complete, at(2026, 8, 19, 2));
        let mut e2 = dump("app-2", DumpStatus::Complete, at(2026, 8, 20, 2));
        e1.database = "app".to_string();
        e2.database = "app".to_string();
        let mut e3 = dump("auth-1", DumpStatus::Complete, at(2026, 8, 20, 2));
        e3.database = "auth".to_string();
        catalog.insert(e1).unwrap();
        catalog.insert(e2).unwrap();
        catalog.insert(e3).unwrap();

        let plan = plan(&catalog, &policy(1, 0, 0, 0));
        assert_eq!(plan.keep.len(), 2); // newest per database
        assert_eq!(plan.delete.len(), 1);
    }

    #[test]
    fn test_freed_bytes_ignores_failed_entries() {
        let mut p = RetentionPlan::default();
        p.delete.push(PlanItem {
            id: "a".to_string(),
            database: "app".to_string(),
            status: DumpStatus::Complete,
            size_bytes: 500,
            created_at: at(2026, 8, 19, 2),
            reason: String::new(),
        });
        p.delete.push(PlanItem {
            id: "b".to_string(),
            database: "app".to_string(),
            status: DumpStatus::Failed,
            size_bytes: 123,
            created_at: at(2026, 8, 20, 2),
            reason: String::new(),
        });
        assert_eq!(p.freed_bytes(), 500);
    }

    #[test]
    fn test_apply_removes_files_and_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dumps.directory = temp_dir.path().to_path_buf();

        let mut catalog = Catalog::default();
        let old = dump("app-old", DumpStatus::Complete, at(2026, 8, 19, 2));
        let new = dump("app-new", DumpStatus::Complete, at(2026, 8, 20, 2));
        std::fs::write(temp_dir.path().join(&old.file), vec![0u8; 100]).unwrap();
        std::fs::write(temp_dir.path().join(&new.file), vec![0u8; 100]).unwrap();
        catalog.insert(old.clone()).unwrap();
        catalog.insert(new).unwrap();

        let plan = plan(&catalog, &policy(1, 0, 0, 0));
        let outcome = apply(&plan, &mut catalog, &config);

        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.freed_bytes, 100);
        assert!(outcome.warnings.is_empty());
        assert!(!temp_dir.path().join(&old.file).exists());
        assert!(catalog.get("app-old").is_none());
        assert!(catalog.get("app-new").is_some());
    }

    #[test]
    fn test_apply_tolerates_already_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dumps.directory = temp_dir.path().to_path_buf();

        let mut catalog = Catalog::default();
        let old = dump("app-old", DumpStatus::Complete, at(2026, 8, 19, 2));
        let new = dump("app-new", DumpStatus::Complete, at(2026, 8, 20, 2));
        std::fs::write(temp_dir.path().join(&new.file), vec![0u8; 100]).unwrap();
        catalog.insert(old).unwrap();
        catalog.insert(new).unwrap();

        let plan = plan(&catalog, &policy(1, 0, 0, 0));
        let outcome = apply(&plan, &mut catalog, &config);

        // File was already gone: entry still pruned, no warning
        assert_eq!(outcome.deleted, 1);
        assert!(outcome.warnings.is_empty());
        assert!(catalog.get("app-old").is_none());
    }
}
