use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

/// Compute total size of a directory recursively. Unreadable entries count as zero.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Last-modified time of a path, if the platform reports one.
pub fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::symlink_metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(to_utc)
}

pub fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Short hex identifier that stays the same for the same rule and path.
pub fn stable_id(rule: &str, path: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(rule.as_bytes());
    hasher.update(&[0]);
    hasher.update(path.as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Canonical form of a directory used as a scan root, falling back to the
/// path itself when it cannot be resolved.
pub fn resolve_root(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Parse human-readable size string ("100MB") into bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let (num_str, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n.to_string(), 1_073_741_824u64)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n.to_string(), 1_048_576)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n.to_string(), 1_024)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n.to_string(), 1)
    } else {
        // assume bytes if no suffix
        (upper.clone(), 1)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: '{}'", num_str.trim()))?;

    if num < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    Ok((num * multiplier as f64) as u64)
}

/// Format byte count as human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_099_511_627_776 {
        format!("{:.2} TB", bytes as f64 / 1_099_511_627_776.0)
    } else if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1_024 {
        format!("{:.2} KB", bytes as f64 / 1_024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Shorten a path for display by replacing the home dir with ~.
pub fn display_path(path: &str) -> String {
    match dirs::home_dir() {
        Some(home) => match Path::new(path).strip_prefix(&home) {
            Ok(relative) => format!("~/{}", relative.display()),
            Err(_) => path.to_string(),
        },
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_accepts_mixed_case_suffixes() {
        assert_eq!(parse_size("100MB"), Ok(104_857_600));
        assert_eq!(parse_size("1gb"), Ok(1_073_741_824));
        assert_eq!(parse_size("2 KB"), Ok(2_048));
        assert_eq!(parse_size("512"), Ok(512));
        assert!(parse_size("-1MB").is_err());
        assert!(parse_size("lots").is_err());
    }

    #[test]
    fn format_size_picks_largest_unit() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1_536), "1.50 KB");
        assert_eq!(format_size(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/one"), [0u8; 10]).unwrap();
        std::fs::write(dir.path().join("a/b/two"), [0u8; 32]).unwrap();
        assert_eq!(dir_size(dir.path()), 42);
    }
}
