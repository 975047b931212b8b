//! Dump id and filename conventions.
//!
//! Every dump gets an id of the form `<db-slug>-YYYYMMDD-HHMMSS` (UTC) and a
//! filename of `<id>.dump` (custom format) or `<id>.sql.gz` (plain format).
//! The slug is what ties a file back to its database during reconciliation,
//! so slugs must stay stable across runs.

use crate::config::FormatKind;
use chrono::{DateTime, Utc};

/// Timestamp layout used inside dump ids
pub const ID_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Build the dump id for a database at a given instant
pub fn dump_id(database: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        slugify(database),
        timestamp.format(ID_TIMESTAMP_FORMAT)
    )
}

/// Filename for a dump id in the given format
pub fn dump_filename(id: &str, format: FormatKind) -> String {
    format!("{}{}", id, extension(format))
}

/// File extension for a dump format, including the leading dot
pub fn extension(format: FormatKind) -> &'static str {
    match format {
        FormatKind::Custom => ".dump",
        FormatKind::Plain => ".sql.gz",
    }
}

/// A dump filename split back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDumpName {
    pub slug: String,
    pub timestamp: DateTime<Utc>,
    pub format: FormatKind,
}

/// Parse a dump filename back into slug, timestamp and format.
/// Returns None for anything that doesn't follow the naming scheme.
pub fn parse_dump_filename(name: &str) -> Option<ParsedDumpName> {
    let re = regex::Regex::new(r"^([a-z0-9][a-z0-9-]*)-(\d{8})-(\d{6})\.(dump|sql\.gz)$").ok()?;
    let caps = re.captures(name)?;

    let slug = caps.get(1)?.as_str().to_string();
    let stamp = format!("{}-{}", caps.get(2)?.as_str(), caps.get(3)?.as_str());
    let naive = chrono::NaiveDateTime::parse_from_str(&stamp, ID_TIMESTAMP_FORMAT).ok()?;
    let format = match caps.get(4)?.as_str() {
        "dump" => FormatKind::Custom,
        _ => FormatKind::Plain,
    };

    Some(ParsedDumpName {
        slug,
        timestamp: naive.and_utc(),
        format,
    })
}

/// Convert a database name to a filename-safe slug.
/// Lowercases, replaces anything outside [a-z0-9] with hyphens, collapses
/// multiple hyphens, trims leading/trailing hyphens, truncates to 50 chars.
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    // Collapse multiple hyphens and trim
    let mut result = String::new();
    let mut prev_hyphen = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_hyphen && !result.is_empty() {
                result.push('-');
            }
            prev_hyphen = true;
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    // Trim trailing hyphen and truncate
    let trimmed = result.trim_end_matches('-');
    if trimmed.len() > 50 {
        // Find a clean break point
        let truncated = &trimmed[..50];
        truncated
            .rfind('-')
            .map(|i| &truncated[..i])
            .unwrap_or(truncated)
            .to_string()
    } else {
        trimmed.to_string()
    }
}
