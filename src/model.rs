use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::utils;

/// How cautious a caller should be before deleting an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Temp files and caches that are recreated on demand.
    Safe,
    /// Caches whose loss costs a rebuild (font cache, prefetch, package stores).
    Low,
    /// Data that may be needed for repairs or rollbacks.
    Medium,
    /// Configuration-store entries.
    Registry,
}

impl RiskLevel {
    pub fn tag(self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MED",
            RiskLevel::Registry => "REG",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Registry => "REGISTRY",
        };
        f.write_str(s)
    }
}

/// Selects the deletion strategy for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    File,
    Directory,
    RegistryKey,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Directory => "directory",
            ItemKind::RegistryKey => "registry_key",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered deletable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable across re-scans of unchanged state.
    pub id: String,
    pub label: String,
    /// Absolute filesystem path, or registry path such as `HKLM\SOFTWARE\...`.
    pub path: String,
    pub kind: ItemKind,
    /// `None` when the size is unknown or meaningless (registry entries).
    pub size_bytes: Option<u64>,
    pub discovered_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
    pub risk: RiskLevel,
    /// Name of the rule that produced this item.
    pub rule: String,
    /// Location family the item was found under. Deletion refuses to act on
    /// an item that no longer resolves inside it.
    pub scan_root: String,
    /// For registry items, the filesystem path the entry referenced.
    pub target: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

impl Item {
    pub fn new(
        rule: &str,
        kind: ItemKind,
        path: impl Into<String>,
        scan_root: impl Into<String>,
        risk: RiskLevel,
    ) -> Self {
        let path = path.into();
        Item {
            id: utils::stable_id(rule, &path),
            label: String::new(),
            path,
            kind,
            size_bytes: None,
            discovered_at: Utc::now(),
            modified_at: None,
            risk,
            rule: rule.to_string(),
            scan_root: scan_root.into(),
            target: None,
            selected: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_modified(mut self, modified_at: Option<DateTime<Utc>>) -> Self {
        self.modified_at = modified_at;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// A non-fatal failure recorded against one rule or analysis type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanError {
    pub rule: String,
    pub message: String,
}

impl ScanError {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        ScanError {
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Output of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Rule name; unique within a [`ScanResult`].
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub risk: RiskLevel,
    pub items: Vec<Item>,
    pub scan_duration: Duration,
    /// Partial failures of a rule that still produced a category. The scan
    /// engine moves these into [`ScanResult::errors`].
    #[serde(default)]
    pub errors: Vec<ScanError>,
}

impl Category {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        risk: RiskLevel,
    ) -> Self {
        Category {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            risk,
            items: Vec::new(),
            scan_duration: Duration::ZERO,
            errors: Vec::new(),
        }
    }

    /// Sum over items with a known size.
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().filter_map(|i| i.size_bytes).sum()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn set_selected(&mut self, selected: bool) {
        for item in &mut self.items {
            item.selected = selected;
        }
    }
}

/// Aggregation root of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// In rule-registration order.
    pub categories: Vec<Category>,
    pub errors: Vec<ScanError>,
    pub scan_duration: Duration,
}

impl ScanResult {
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn total_bytes(&self) -> u64 {
        self.categories.iter().map(Category::total_bytes).sum()
    }

    pub fn item_count(&self) -> usize {
        self.categories.iter().map(Category::item_count).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    pub fn select_all(&mut self, selected: bool) {
        for category in &mut self.categories {
            category.set_selected(selected);
        }
    }

    /// Selected items in category order, then item order.
    pub fn selected_items(&self) -> Vec<Item> {
        self.items().filter(|i| i.selected).cloned().collect()
    }

    /// Paths claimed by more than one category, with the claiming rule names.
    ///
    /// Overlaps are reported, never merged: their bytes count once per claim
    /// in [`ScanResult::total_bytes`].
    pub fn overlapping_paths(&self) -> BTreeMap<String, Vec<String>> {
        let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for category in &self.categories {
            for item in &category.items {
                let rules = claims.entry(item.path.clone()).or_default();
                if !rules.contains(&category.name) {
                    rules.push(category.name.clone());
                }
            }
        }
        claims.retain(|_, rules| rules.len() > 1);
        claims
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Succeeded,
    /// Every check passed; nothing was deleted because the run was a dry run.
    SucceededDryRun,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "SUCCEEDED",
            Outcome::SucceededDryRun => "SUCCEEDED-DRYRUN",
            Outcome::Failed => "FAILED",
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, Outcome::Failed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the deletion audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub kind: ItemKind,
    pub size_bytes: Option<u64>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn for_item(item: &Item, outcome: Outcome, error: Option<String>) -> Self {
        AuditRecord {
            timestamp: Utc::now(),
            path: item.path.clone(),
            kind: item.kind,
            size_bytes: item.size_bytes,
            outcome,
            error,
        }
    }

    /// Fields in audit-log column order.
    pub fn to_row(&self) -> [String; 6] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.path.clone(),
            self.kind.as_str().to_string(),
            self.size_bytes.map(|s| s.to_string()).unwrap_or_default(),
            self.outcome.as_str().to_string(),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(rule: &str, path: &str, size: Option<u64>) -> Item {
        let mut item = Item::new(rule, ItemKind::File, path, "/tmp", RiskLevel::Safe);
        item.size_bytes = size;
        item
    }

    #[test]
    fn category_total_skips_unknown_sizes() {
        let mut cat = Category::new("r", "R", "", RiskLevel::Safe);
        cat.items.push(item("r", "/tmp/a", Some(10)));
        cat.items.push(item("r", "/tmp/b", None));
        cat.items.push(item("r", "/tmp/c", Some(5)));
        assert_eq!(cat.total_bytes(), 15);
        assert_eq!(cat.item_count(), 3);
    }

    #[test]
    fn ids_are_stable_per_rule_and_path() {
        let a = item("temp_files", "/tmp/a", None);
        let b = item("temp_files", "/tmp/a", None);
        let c = item("caches", "/tmp/a", None);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn overlapping_paths_lists_every_claiming_rule() {
        let mut one = Category::new("one", "One", "", RiskLevel::Safe);
        one.items.push(item("one", "/shared", Some(1)));
        one.items.push(item("one", "/only-one", Some(1)));
        let mut two = Category::new("two", "Two", "", RiskLevel::Safe);
        two.items.push(item("two", "/shared", Some(1)));
        let result = ScanResult {
            categories: vec![one, two],
            ..Default::default()
        };

        let overlaps = result.overlapping_paths();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps["/shared"], vec!["one", "two"]);
    }

    #[test]
    fn audit_row_leaves_unknown_size_and_success_detail_empty() {
        let mut it = item("r", "/tmp/a,b", None);
        it.kind = ItemKind::Directory;
        let record = AuditRecord::for_item(&it, Outcome::Succeeded, None);
        let row = record.to_row();
        assert_eq!(row[1], "/tmp/a,b");
        assert_eq!(row[2], "directory");
        assert_eq!(row[3], "");
        assert_eq!(row[4], "SUCCEEDED");
        assert_eq!(row[5], "");
    }

    #[test]
    fn selected_items_keep_category_order() {
        let mut one = Category::new("one", "One", "", RiskLevel::Safe);
        one.items.push(item("one", "/a", Some(1)));
        one.items.push(item("one", "/b", Some(1)));
        let mut two = Category::new("two", "Two", "", RiskLevel::Safe);
        two.items.push(item("two", "/c", Some(1)));
        let mut result = ScanResult {
            categories: vec![one, two],
            ..Default::default()
        };
        result.select_all(true);
        result.categories[0].items[1].selected = false;

        let paths: Vec<_> = result.selected_items().into_iter().map(|i| i.path).collect();
        assert_eq!(paths, vec!["/a", "/c"]);
    }
}
