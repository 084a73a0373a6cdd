//! Persisted settings, exclusion lists and cleanup profiles.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::filter::FilterOptions;

const APP_DIR: &str = "sysclean";
const CONFIG_FILE: &str = "config.json";
const EXCLUSIONS_FILE: &str = "exclusions.json";

/// `<config dir>/sysclean`, if the platform has a config directory.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Application-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Only delete items older than this many days; 0 disables the filter.
    pub min_age_days: u64,
    /// Only show items of at least this many bytes; 0 disables the filter.
    pub min_size_bytes: u64,
    pub default_profile: String,
    /// Where audit logs are written.
    pub log_dir: PathBuf,
    pub dry_run: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            min_age_days: 0,
            min_size_bytes: 0,
            default_profile: "standard".to_string(),
            log_dir: PathBuf::from("."),
            dry_run: false,
        }
    }
}

impl AppConfig {
    /// Load from the user config directory; defaults if there is none.
    pub fn load() -> Result<Self, ConfigError> {
        match config_dir() {
            Some(dir) => load_json(&dir.join(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(path, self)
    }
}

/// Paths, patterns and rules that are never cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// Exact paths (case-insensitive on Windows).
    pub paths: BTreeSet<String>,
    /// Glob patterns such as `*.important` or `C:\MyData\**`.
    pub patterns: Vec<String>,
    pub skip_rules: BTreeSet<String>,
}

impl ExclusionConfig {
    pub fn load() -> Result<Self, ConfigError> {
        match config_dir() {
            Some(dir) => load_json(&dir.join(EXCLUSIONS_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(path, self)
    }

    /// Combine with the thresholds of `app` into filter options.
    pub fn filter_options(&self, app: &AppConfig) -> Result<FilterOptions, ConfigError> {
        let excluded_patterns = self
            .patterns
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|source| ConfigError::Pattern {
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FilterOptions {
            min_age_days: (app.min_age_days > 0).then_some(app.min_age_days),
            min_size_bytes: (app.min_size_bytes > 0).then_some(app.min_size_bytes),
            excluded_paths: self.paths.iter().cloned().collect(),
            excluded_patterns,
            skipped_rules: self.skip_rules.iter().cloned().collect(),
        })
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(T::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_err)
}

/// A named set of rules for a kind of user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub description: &'static str,
    pub rules: &'static [&'static str],
}

impl Profile {
    pub fn rule_set(&self) -> HashSet<String> {
        self.rules.iter().map(|r| r.to_string()).collect()
    }
}

macro_rules! with_system_rules {
    ($($rule:literal),* $(,)?) => {
        &[
            "temp_files",
            "windows_update",
            "prefetch",
            "caches",
            "logs_reports",
            "delivery_optimization",
            "installer",
            "old_windows",
            "recycle_bin",
            "icon_cache",
            "teams_apps",
            $($rule),*
        ]
    };
}

const SYSTEM_RULES: &[&str] = with_system_rules!();

pub const BUILTIN_PROFILES: &[Profile] = &[
    Profile {
        name: "minimal",
        description: "Safe system cleanup only (temp files, logs, recycle bin)",
        rules: &["temp_files", "logs_reports", "recycle_bin"],
    },
    Profile {
        name: "standard",
        description: "All system rules, no developer caches or registry",
        rules: SYSTEM_RULES,
    },
    Profile {
        name: "frontend",
        description: "Standard plus Node.js and IDE caches",
        rules: with_system_rules!("dev_nodejs", "dev_ide"),
    },
    Profile {
        name: "backend",
        description: "Standard plus Python, .NET, Java and Docker caches",
        rules: with_system_rules!("dev_python", "dev_dotnet", "dev_java", "dev_docker", "dev_ide"),
    },
    Profile {
        name: "fullstack",
        description: "Standard plus every developer cache",
        rules: with_system_rules!(
            "dev_nodejs",
            "dev_python",
            "dev_dotnet",
            "dev_java",
            "dev_rust_go",
            "dev_docker",
            "dev_ide",
        ),
    },
    Profile {
        name: "everything",
        description: "All rules including registry analysis",
        rules: with_system_rules!(
            "dev_nodejs",
            "dev_python",
            "dev_dotnet",
            "dev_java",
            "dev_rust_go",
            "dev_docker",
            "dev_ide",
            "registry",
        ),
    },
];

/// Case-insensitive lookup of a built-in profile.
pub fn find_profile(name: &str) -> Result<&'static Profile, ConfigError> {
    BUILTIN_PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.default_profile, "standard");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"min_age_days": 14, "dry_run": true}"#).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.min_age_days, 14);
        assert!(config.dry_run);
        assert_eq!(config.log_dir, PathBuf::from("."));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclusions.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ExclusionConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn exclusions_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/exclusions.json");
        let mut exclusions = ExclusionConfig::default();
        exclusions.paths.insert(r"C:\Keep".into());
        exclusions.patterns.push("*.important".into());
        exclusions.skip_rules.insert("dev_docker".into());
        exclusions.save_to(&path).unwrap();
        assert_eq!(ExclusionConfig::load_from(&path).unwrap(), exclusions);
    }

    #[test]
    fn filter_options_treat_zero_as_off() {
        let exclusions = ExclusionConfig {
            patterns: vec!["*.bak".into()],
            ..Default::default()
        };
        let app = AppConfig {
            min_size_bytes: 1024,
            ..Default::default()
        };
        let options = exclusions.filter_options(&app).unwrap();
        assert_eq!(options.min_age_days, None);
        assert_eq!(options.min_size_bytes, Some(1024));
        assert_eq!(options.excluded_patterns.len(), 1);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let exclusions = ExclusionConfig {
            patterns: vec!["[unclosed".into()],
            ..Default::default()
        };
        assert!(matches!(
            exclusions.filter_options(&AppConfig::default()),
            Err(ConfigError::Pattern { .. })
        ));
    }

    #[test]
    fn profiles_name_only_known_rules() {
        let known: HashSet<&str> = rules::rule_names().into_iter().collect();
        for profile in BUILTIN_PROFILES {
            for rule in profile.rules {
                assert!(
                    known.contains(rule) || *rule == crate::registry::RULE_NAME,
                    "{} names unknown rule {rule}",
                    profile.name
                );
            }
        }
        let registry = crate::registry::RULE_NAME;
        assert!(find_profile("EVERYTHING").unwrap().rule_set().contains(registry));
        assert!(!find_profile("fullstack").unwrap().rule_set().contains(registry));
        assert!(matches!(find_profile("nope"), Err(ConfigError::UnknownProfile(_))));
    }

    #[test]
    fn larger_profiles_start_with_every_system_rule() {
        for profile in BUILTIN_PROFILES.iter().filter(|p| p.name != "minimal") {
            assert!(
                profile.rules.starts_with(SYSTEM_RULES),
                "{} does not start with the system rules",
                profile.name
            );
        }
        assert_eq!(SYSTEM_RULES.len(), 11);
        assert_eq!(SYSTEM_RULES.last(), Some(&"teams_apps"));
    }
}
