use std::path::PathBuf;

use crate::error::RuleError;
use crate::model::{Category, RiskLevel};
use crate::rules::{describe, Collector, Locations, Rule};

fn join(base: &Option<PathBuf>, parts: &[&str]) -> Option<PathBuf> {
    base.as_ref()
        .map(|b| parts.iter().fold(b.clone(), |acc, p| acc.join(p)))
}

// --- Thumbnail, font and browser caches ---

/// Browser cache directories relative to `%LOCALAPPDATA%`.
const BROWSER_CACHES: &[(&str, &[&str])] = &[
    ("Edge cache", &["Microsoft", "Edge", "User Data", "Default", "Cache"]),
    ("Edge code cache", &["Microsoft", "Edge", "User Data", "Default", "Code Cache"]),
    ("Chrome cache", &["Google", "Chrome", "User Data", "Default", "Cache"]),
    ("Chrome code cache", &["Google", "Chrome", "User Data", "Default", "Code Cache"]),
];

pub struct Caches {
    locations: Locations,
}

impl Caches {
    pub fn new(locations: &Locations) -> Self {
        Caches {
            locations: locations.clone(),
        }
    }
}

impl Rule for Caches {
    describe!(
        "caches",
        "Caches (Thumbnails, Fonts, Browsers)",
        "Thumbnail cache, font cache, and browser caches (Chrome, Edge, Firefox)",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        let local = &self.locations.local_data;

        if let Some(explorer) = join(local, &["Microsoft", "Windows", "Explorer"]) {
            collector.add_children(&explorer, "Thumbnail cache", |name, is_dir| {
                !is_dir && name.to_ascii_lowercase().contains("thumbcache")
            });
        }

        if let Some(root) = &self.locations.system_root {
            let font_cache = root
                .join("ServiceProfiles")
                .join("LocalService")
                .join("AppData")
                .join("Local")
                .join("FontCache");
            if let Ok(read_dir) = std::fs::read_dir(&font_cache) {
                for entry in read_dir.flatten() {
                    collector.add_file_as(&entry.path(), "Font cache file", RiskLevel::Low);
                }
            }
        }

        for (label, parts) in BROWSER_CACHES {
            if let Some(dir) = join(local, parts) {
                collector.add_dir(&dir, label);
            }
        }

        // Firefox keeps one cache2 directory per profile
        if let Some(profiles) = join(local, &["Mozilla", "Firefox", "Profiles"]) {
            if let Ok(read_dir) = std::fs::read_dir(&profiles) {
                for entry in read_dir.flatten() {
                    let profile = entry.file_name().to_string_lossy().into_owned();
                    collector.add_dir(
                        &entry.path().join("cache2"),
                        &format!("Firefox cache ({profile})"),
                    );
                }
            }
        }

        Ok(collector.finish())
    }
}

// --- Icon cache ---

pub struct IconCache {
    locations: Locations,
}

impl IconCache {
    pub fn new(locations: &Locations) -> Self {
        IconCache {
            locations: locations.clone(),
        }
    }
}

impl Rule for IconCache {
    describe!(
        "icon_cache",
        "Windows Icon Cache",
        "Icon cache files (IconCache.db), regenerated on reboot",
        RiskLevel::Low
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        let local = &self.locations.local_data;

        if let Some(db) = join(local, &["IconCache.db"]) {
            collector.add_file(&db, "Windows icon cache (main)");
        }
        if let Some(explorer) = join(local, &["Microsoft", "Windows", "Explorer"]) {
            collector.add_children(&explorer, "Explorer icon cache", |name, is_dir| {
                !is_dir && name.to_ascii_lowercase().contains("iconcache")
            });
        }

        Ok(collector.finish())
    }
}

// --- Teams, OneDrive and Store apps ---

const TEAMS_SUBDIRS: &[&str] = &[
    "Cache",
    "blob_storage",
    "databases",
    "GPUCache",
    "IndexedDB",
    "Local Storage",
    "tmp",
    "Code Cache",
    "logs",
];

pub struct TeamsApps {
    locations: Locations,
}

impl TeamsApps {
    pub fn new(locations: &Locations) -> Self {
        TeamsApps {
            locations: locations.clone(),
        }
    }
}

impl Rule for TeamsApps {
    describe!(
        "teams_apps",
        "Teams, OneDrive & Store App Caches",
        "Microsoft Teams cache, OneDrive logs, Store app temp data",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);

        if let Some(teams) = join(&self.locations.roaming_data, &["Microsoft", "Teams"]) {
            for sub in TEAMS_SUBDIRS {
                collector.add_dir(&teams.join(sub), &format!("Teams {sub}"));
            }
        }

        let local = &self.locations.local_data;
        if let Some(logs) = join(local, &["Microsoft", "OneDrive", "logs"]) {
            collector.add_dir(&logs, "OneDrive logs");
        }

        if let Some(packages) = join(local, &["Packages"]) {
            if let Ok(read_dir) = std::fs::read_dir(&packages) {
                let mut entries: Vec<_> = read_dir.flatten().map(|e| e.path()).collect();
                entries.sort();
                for package in entries {
                    let name = package
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if name.starts_with("MSTeams_") {
                        collector.add_dir(
                            &package.join("LocalCache").join("Microsoft").join("MSTeams"),
                            "New Teams cache",
                        );
                    }
                    collector.add_dir(&package.join("TempState"), &format!("Store app temp ({name})"));
                    collector.add_dir(
                        &package.join("AC").join("INetCache"),
                        &format!("Store app internet cache ({name})"),
                    );
                }
            }
        }

        Ok(collector.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn caches_find_firefox_profiles_and_font_cache() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let local = locations.local_data.clone().unwrap();
        let cache2 = local.join("Mozilla/Firefox/Profiles/abc.default/cache2");
        fs::create_dir_all(&cache2).unwrap();
        fs::write(cache2.join("entry"), b"cached").unwrap();

        let fonts = locations
            .system_root
            .clone()
            .unwrap()
            .join("ServiceProfiles/LocalService/AppData/Local/FontCache");
        fs::create_dir_all(&fonts).unwrap();
        fs::write(fonts.join("FontCache-S-1.dat"), b"font").unwrap();

        let category = Caches::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 2);
        let firefox = category
            .items
            .iter()
            .find(|i| i.label.starts_with("Firefox"))
            .unwrap();
        assert_eq!(firefox.label, "Firefox cache (abc.default)");
        let font = category
            .items
            .iter()
            .find(|i| i.label == "Font cache file")
            .unwrap();
        assert_eq!(font.risk, RiskLevel::Low);
    }

    #[test]
    fn empty_icon_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let local = locations.local_data.clone().unwrap();
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("IconCache.db"), b"").unwrap();

        let category = IconCache::new(&locations).scan().unwrap();
        assert!(category.items.is_empty());
    }
}
