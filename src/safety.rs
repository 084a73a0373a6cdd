//! Guards checked before anything is reported as orphaned or deleted.

use std::io;
use std::path::Path;

use crate::registry::RegistryPath;

/// Directories below the system root that hold core binaries and
/// configuration.
const PROTECTED_SUBDIRS: &[&str] = &[
    "System32",
    "SysWOW64",
    "WinSxS",
    "servicing",
    "Boot",
    "SystemApps",
    "assembly",
];

/// Configuration keys that are never deleted, whatever analysis produced them.
const PROTECTED_REGISTRY_PREFIXES: &[&str] = &[
    r"HKLM\SYSTEM",
    r"HKLM\SECURITY",
    r"HKLM\SAM",
    r"HKLM\BCD00000000",
    r"HKLM\SOFTWARE\Policies",
    r"HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion\Winlogon",
    r"HKCU\SOFTWARE\Policies",
];

/// Compare form: backslashes, lower case, no trailing separator.
fn normalize(path: &str) -> String {
    path.replace('/', "\\").trim_end_matches('\\').to_lowercase()
}

fn under(path: &str, dir: &str) -> bool {
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('\\'))
}

#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    dirs: Vec<String>,
}

impl ProtectedPaths {
    /// Protected directories below `system_root` (e.g. `C:\Windows`).
    pub fn new(system_root: &str) -> Self {
        let root = system_root.trim_end_matches(|c: char| c == '\\' || c == '/');
        ProtectedPaths {
            dirs: PROTECTED_SUBDIRS
                .iter()
                .map(|d| normalize(&format!("{root}\\{d}")))
                .collect(),
        }
    }

    /// Built from `%SYSTEMROOT%`, falling back to `C:\Windows`.
    pub fn detect() -> Self {
        let root = std::env::var("SYSTEMROOT").unwrap_or_else(|_| r"C:\Windows".to_string());
        Self::new(&root)
    }

    /// Whether `path` is a protected directory or lies below one.
    /// Case-insensitive; either separator is accepted.
    pub fn contains(&self, path: &str) -> bool {
        let path = normalize(path.trim());
        self.dirs.iter().any(|dir| under(&path, dir))
    }
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        Self::detect()
    }
}

/// Whether a configuration key must never be deleted. Hive roots and
/// top-level keys are always protected.
pub fn is_protected_key(path: &RegistryPath) -> bool {
    if path.depth() < 2 {
        return true;
    }
    let key = normalize(&path.key_path().to_string());
    PROTECTED_REGISTRY_PREFIXES
        .iter()
        .any(|prefix| under(&key, &normalize(prefix)))
}

/// Whether `path`, with every symlink followed, still lies inside `root`.
pub fn resolves_within(path: &Path, root: &Path) -> io::Result<bool> {
    let path = std::fs::canonicalize(path)?;
    let root = std::fs::canonicalize(root)?;
    Ok(path.starts_with(root))
}
