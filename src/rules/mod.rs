//! Scan rules and the ordered rule registry.
//!
//! A rule is a read-only producer of one [`Category`]. Expected conditions
//! (missing directories, permission denied) yield fewer or zero items; only
//! unexpected failures come back as [`RuleError`].

mod caches;
mod dev;
mod logs;
mod system;
mod trash;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use walkdir::WalkDir;

use crate::error::RuleError;
use crate::model::{Category, Item, ItemKind, RiskLevel};
use crate::utils;

/// The contract every scan rule implements.
pub trait Rule: Send + Sync {
    /// Stable machine-readable identifier (e.g. "temp_files").
    fn name(&self) -> &'static str;

    /// Human-readable label for display (e.g. "Temporary Files").
    fn display_name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn default_risk(&self) -> RiskLevel;

    /// Enumerate what could be reclaimed. Never modifies anything.
    fn scan(&self) -> Result<Category, RuleError>;
}

macro_rules! describe {
    ($name:literal, $display:literal, $description:literal, $risk:expr) => {
        fn name(&self) -> &'static str {
            $name
        }

        fn display_name(&self) -> &'static str {
            $display
        }

        fn description(&self) -> &'static str {
            $description
        }

        fn default_risk(&self) -> $crate::model::RiskLevel {
            $risk
        }
    };
}
pub(crate) use describe;

/// Well-known base directories the rules scan under.
///
/// Every field is optional: a rule whose base is unknown on this machine
/// simply reports nothing for it.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    pub home: Option<PathBuf>,
    /// `%LOCALAPPDATA%`
    pub local_data: Option<PathBuf>,
    /// `%APPDATA%`
    pub roaming_data: Option<PathBuf>,
    pub temp: Option<PathBuf>,
    /// `%SYSTEMROOT%`
    pub system_root: Option<PathBuf>,
    /// `%PROGRAMDATA%`
    pub program_data: Option<PathBuf>,
    /// Roots of mounted drives, system drive first.
    pub drives: Vec<PathBuf>,
    pub cargo_home: Option<PathBuf>,
    pub go_path: Option<PathBuf>,
}

impl Locations {
    /// Resolve locations for the current user and machine.
    pub fn detect() -> Self {
        let home = dirs::home_dir();
        let env_path = |var: &str| std::env::var_os(var).map(PathBuf::from);

        let system_root = env_path("SYSTEMROOT")
            .or_else(|| cfg!(windows).then(|| PathBuf::from(r"C:\Windows")));

        Locations {
            local_data: dirs::data_local_dir(),
            roaming_data: dirs::data_dir(),
            temp: env_path("TEMP").or_else(|| Some(std::env::temp_dir())),
            system_root,
            program_data: env_path("PROGRAMDATA"),
            drives: detect_drives(),
            cargo_home: env_path("CARGO_HOME").or_else(|| home.as_ref().map(|h| h.join(".cargo"))),
            go_path: env_path("GOPATH").or_else(|| home.as_ref().map(|h| h.join("go"))),
            home,
        }
    }

    /// A self-contained layout rooted at `base`, mirroring a Windows profile.
    pub fn under(base: &Path) -> Self {
        let home = base.join("Users").join("user");
        Locations {
            local_data: Some(home.join("AppData").join("Local")),
            roaming_data: Some(home.join("AppData").join("Roaming")),
            temp: Some(home.join("AppData").join("Local").join("Temp")),
            system_root: Some(base.join("Windows")),
            program_data: Some(base.join("ProgramData")),
            drives: vec![base.to_path_buf()],
            cargo_home: Some(home.join(".cargo")),
            go_path: Some(home.join("go")),
            home: Some(home),
        }
    }

    /// Directories where users usually keep source trees.
    pub fn project_roots(&self) -> Vec<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "Projects",
            "Repos",
            "Source",
            "Code",
            "dev",
            "workspace",
            "Documents",
            "Desktop",
        ];
        let Some(home) = &self.home else {
            return Vec::new();
        };
        CANDIDATES
            .iter()
            .map(|c| home.join(c))
            .filter(|p| p.is_dir())
            .collect()
    }
}

#[cfg(windows)]
fn detect_drives() -> Vec<PathBuf> {
    let system = std::env::var("SYSTEMDRIVE").unwrap_or_else(|_| "C:".to_string());
    let mut drives = vec![PathBuf::from(format!("{system}\\"))];
    for letter in b'A'..=b'Z' {
        let root = PathBuf::from(format!("{}:\\", letter as char));
        if root.is_dir() && !drives.contains(&root) {
            drives.push(root);
        }
    }
    drives
}

#[cfg(not(windows))]
fn detect_drives() -> Vec<PathBuf> {
    Vec::new()
}

/// Directories a project walk never descends into.
const PROJECT_SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    "venv",
    ".venv",
    "site-packages",
];

/// A build or dependency directory that is safe to drop once a project
/// has gone quiet.
pub(crate) struct StaleDirs {
    pub dir_name: &'static str,
    /// File that must sit next to the directory (e.g. `Cargo.toml`).
    pub marker: Option<&'static str>,
    pub min_age_days: u64,
    pub min_bytes: u64,
    pub max_depth: usize,
    pub label: &'static str,
    pub risk: RiskLevel,
}

/// Builds the category of one rule.
pub(crate) struct Collector {
    rule: &'static str,
    category: Category,
}

impl Collector {
    pub fn for_rule(rule: &dyn Rule) -> Self {
        Collector {
            rule: rule.name(),
            category: Category::new(
                rule.name(),
                rule.display_name(),
                rule.description(),
                rule.default_risk(),
            ),
        }
    }

    fn push(&mut self, kind: ItemKind, path: &Path, root: &Path, label: &str, risk: RiskLevel, size: u64) {
        let item = Item::new(
            self.rule,
            kind,
            utils::path_string(path),
            utils::path_string(&utils::resolve_root(root)),
            risk,
        )
        .with_label(label)
        .with_size(size)
        .with_modified(utils::modified_at(path));
        self.category.items.push(item);
    }

    /// Add a whole directory as one item if it exists and holds data.
    pub fn add_dir(&mut self, path: &Path, label: &str) {
        let risk = self.category.risk;
        self.add_dir_as(path, label, risk);
    }

    pub fn add_dir_as(&mut self, path: &Path, label: &str, risk: RiskLevel) {
        if !is_real_dir(path) {
            return;
        }
        let size = utils::dir_size(path);
        if size > 0 {
            self.push(ItemKind::Directory, path, path, label, risk, size);
        }
    }

    /// Add a single file if it exists and is not empty.
    pub fn add_file(&mut self, path: &Path, label: &str) {
        let risk = self.category.risk;
        self.add_file_as(path, label, risk);
    }

    pub fn add_file_as(&mut self, path: &Path, label: &str, risk: RiskLevel) {
        let Ok(meta) = std::fs::symlink_metadata(path) else {
            return;
        };
        if !meta.is_file() || meta.len() == 0 {
            return;
        }
        let root = path.parent().unwrap_or(path);
        self.push(ItemKind::File, path, root, label, risk, meta.len());
    }

    /// Add each direct child of `dir` whose name passes `keep`.
    pub fn add_children(&mut self, dir: &Path, label: &str, keep: impl Fn(&str, bool) -> bool) {
        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
                return;
            }
        };
        let risk = self.category.risk;
        for entry in read_dir.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            let name = entry.file_name();
            if !keep(&name.to_string_lossy(), file_type.is_dir()) {
                continue;
            }
            let path = entry.path();
            if file_type.is_dir() {
                let size = utils::dir_size(&path);
                self.push(ItemKind::Directory, &path, dir, &format!("{label} folder"), risk, size);
            } else if let Ok(meta) = entry.metadata() {
                self.push(ItemKind::File, &path, dir, label, risk, meta.len());
            }
        }
    }

    /// Add every file below `dir` whose name passes `keep`.
    pub fn add_files_recursive(&mut self, dir: &Path, label: &str, keep: impl Fn(&str) -> bool) {
        if !is_real_dir(dir) {
            return;
        }
        let risk = self.category.risk;
        for entry in WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if !keep(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            self.push(ItemKind::File, entry.path(), dir, label, risk, meta.len());
        }
    }

    /// Find quiet build/dependency directories below the project roots.
    pub fn add_stale_dirs(&mut self, roots: &[PathBuf], stale: &StaleDirs) {
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(stale.min_age_days * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for root in roots {
            let mut walker = WalkDir::new(root)
                .max_depth(stale.max_depth)
                .follow_links(false)
                .into_iter();

            while let Some(entry) = walker.next() {
                let Ok(entry) = entry else {
                    continue;
                };
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();

                if name == stale.dir_name {
                    walker.skip_current_dir();
                    let path = entry.path();
                    let has_marker = match (stale.marker, path.parent()) {
                        (Some(marker), Some(parent)) => parent.join(marker).is_file(),
                        (Some(_), None) => false,
                        (None, _) => true,
                    };
                    if !has_marker {
                        continue;
                    }
                    let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                        continue;
                    };
                    if modified >= cutoff {
                        continue;
                    }
                    let size = utils::dir_size(path);
                    if size > stale.min_bytes {
                        self.push(ItemKind::Directory, path, path, stale.label, stale.risk, size);
                    }
                    continue;
                }

                if name.starts_with('.') || PROJECT_SKIP_DIRS.contains(&name.as_str()) {
                    walker.skip_current_dir();
                }
            }
        }
    }

    pub fn finish(self) -> Category {
        tracing::debug!(rule = self.rule, items = self.category.items.len(), "rule finished");
        self.category
    }
}

/// A directory that is not a symlink.
fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// All built-in rules in display and aggregation order.
pub fn all_rules(locations: &Locations) -> Vec<Box<dyn Rule>> {
    let l = locations;
    vec![
        Box::new(system::TempFiles::new(l)),
        Box::new(system::WindowsUpdate::new(l)),
        Box::new(system::Prefetch::new(l)),
        Box::new(caches::Caches::new(l)),
        Box::new(logs::LogsReports::new(l)),
        Box::new(system::DeliveryOptimization::new(l)),
        Box::new(system::Installer::new(l)),
        Box::new(system::OldWindows::new(l)),
        Box::new(trash::RecycleBin::new(l)),
        Box::new(caches::IconCache::new(l)),
        Box::new(caches::TeamsApps::new(l)),
        Box::new(dev::DevNodejs::new(l)),
        Box::new(dev::DevPython::new(l)),
        Box::new(dev::DevDotnet::new(l)),
        Box::new(dev::DevJava::new(l)),
        Box::new(dev::DevRustGo::new(l)),
        Box::new(dev::DevDocker::new(l)),
        Box::new(dev::DevIde::new(l)),
    ]
}

pub fn find_rule(name: &str, locations: &Locations) -> Option<Box<dyn Rule>> {
    all_rules(locations).into_iter().find(|r| r.name() == name)
}

pub fn rule_names() -> Vec<&'static str> {
    all_rules(&Locations::default())
        .iter()
        .map(|r| r.name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rule_names_are_unique_and_ordered() {
        let names = rule_names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names.first(), Some(&"temp_files"));
        assert_eq!(names.last(), Some(&"dev_ide"));
    }

    #[test]
    fn every_rule_scans_an_empty_machine_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        for rule in all_rules(&locations) {
            let category = rule.scan().unwrap();
            assert_eq!(category.name, rule.name());
            assert!(category.items.is_empty(), "{} found items", rule.name());
        }
    }

    #[test]
    fn find_rule_by_name() {
        let locations = Locations::default();
        assert!(find_rule("dev_nodejs", &locations).is_some());
        assert!(find_rule("nope", &locations).is_none());
    }
}
