//! Age, size and exclusion filtering of a scan result.
//!
//! Filtering builds a new [`ScanResult`]; the input is never touched, so a
//! caller can re-filter with different options without re-scanning.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use glob::{MatchOptions, Pattern};

use crate::model::{Item, ScanResult};

#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Drop items modified more recently than this many days ago.
    pub min_age_days: Option<u64>,
    /// Drop items with a known size below this many bytes.
    pub min_size_bytes: Option<u64>,
    pub excluded_paths: HashSet<String>,
    pub excluded_patterns: Vec<Pattern>,
    pub skipped_rules: HashSet<String>,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.min_age_days.is_none()
            && self.min_size_bytes.is_none()
            && self.excluded_paths.is_empty()
            && self.excluded_patterns.is_empty()
            && self.skipped_rules.is_empty()
    }
}

pub fn apply(result: &ScanResult, options: &FilterOptions) -> ScanResult {
    apply_at(result, options, Utc::now())
}

/// [`apply`] with an explicit clock.
pub fn apply_at(result: &ScanResult, options: &FilterOptions, now: DateTime<Utc>) -> ScanResult {
    let cutoff = options.min_age_days.map(|days| {
        i64::try_from(days)
            .ok()
            .and_then(Duration::try_days)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    });
    let excluded: HashSet<String> = options
        .excluded_paths
        .iter()
        .map(|p| normalize(p))
        .collect();

    let mut filtered = result.clone();
    let mut dropped = 0usize;
    for category in &mut filtered.categories {
        let before = category.items.len();
        category
            .items
            .retain(|item| keep(item, options, &excluded, cutoff));
        dropped += before - category.items.len();
    }

    tracing::debug!(dropped, remaining = filtered.item_count(), "filter applied");
    filtered
}

fn keep(
    item: &Item,
    options: &FilterOptions,
    excluded: &HashSet<String>,
    cutoff: Option<DateTime<Utc>>,
) -> bool {
    if options.skipped_rules.contains(&item.rule) {
        return false;
    }
    if excluded.contains(&normalize(&item.path)) {
        return false;
    }
    let match_options = MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    if options
        .excluded_patterns
        .iter()
        .any(|p| p.matches_with(&item.path, match_options))
    {
        return false;
    }
    // No timestamp counts as old enough; the boundary itself is kept
    if let (Some(cutoff), Some(modified)) = (cutoff, item.modified_at) {
        if modified > cutoff {
            return false;
        }
    }
    // Unknown sizes are never dropped by size
    if let (Some(min), Some(size)) = (options.min_size_bytes, item.size_bytes) {
        if size < min {
            return false;
        }
    }
    true
}

/// Comparison form of a path: case and separators folded on Windows.
fn normalize(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\").to_lowercase()
    } else {
        path.to_string()
    }
}
