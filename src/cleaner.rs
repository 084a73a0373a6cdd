//! The deletion engine.
//!
//! Items are processed strictly in the order given. Every attempt, including
//! rejected and failed ones, is written to the audit log before the next item
//! is looked at. Only a failure of the audit log itself aborts a run.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use crate::audit::AuditLog;
use crate::error::{AuditError, DeleteError, StoreError};
use crate::model::{AuditRecord, Item, ItemKind, Outcome};
use crate::registry::{self, ConfigStore, RegistryPath};
use crate::safety::{self, ProtectedPaths};
use crate::scanner::StopFlag;

/// What happened to an item that passed every check.
enum Done {
    Deleted,
    /// Already gone: the desired end state holds.
    Vanished,
}

pub struct Cleaner {
    store: Arc<dyn ConfigStore>,
    protected: ProtectedPaths,
    stop: StopFlag,
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner {
    pub fn new() -> Self {
        Self::with_store(registry::system_store())
    }

    pub fn with_store(store: Arc<dyn ConfigStore>) -> Self {
        Cleaner {
            store,
            protected: ProtectedPaths::detect(),
            stop: StopFlag::new(),
        }
    }

    pub fn protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    /// Stop between items once `stop` is raised.
    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    /// Delete `items` in order, appending one record per attempt to the
    /// audit log at `log_path`.
    ///
    /// With `dry_run` every check runs but nothing is removed. The log is
    /// opened before any item is touched; if that fails nothing is deleted.
    pub fn delete_selected(
        &self,
        items: &[Item],
        dry_run: bool,
        log_path: &Path,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut log = AuditLog::open(log_path)?;
        let mut records = Vec::with_capacity(items.len());

        for (done, item) in items.iter().enumerate() {
            if self.stop.is_stopped() {
                tracing::info!(done, remaining = items.len() - done, "deletion stopped");
                break;
            }

            let (outcome, error) = match self.delete_one(item, dry_run) {
                Ok(_) if dry_run => (Outcome::SucceededDryRun, None),
                Ok(Done::Deleted) => (Outcome::Succeeded, None),
                Ok(Done::Vanished) => {
                    tracing::debug!(path = %item.path, "already gone");
                    (Outcome::Succeeded, None)
                }
                Err(e) => {
                    tracing::warn!(path = %item.path, error = %e, "deletion failed");
                    (Outcome::Failed, Some(e.to_string()))
                }
            };

            let record = AuditRecord::for_item(item, outcome, error);
            if let Err(e) = log.append(&record) {
                tracing::error!(path = %log.path().display(), error = %e, "audit log write failed");
                return Err(e);
            }
            records.push(record);
        }

        let summary = Summary::from_records(&records);
        tracing::info!(
            dry_run,
            succeeded = summary.succeeded,
            failed = summary.failed,
            bytes = summary.bytes_reclaimed,
            "deletion finished"
        );
        Ok(records)
    }

    fn delete_one(&self, item: &Item, dry_run: bool) -> Result<Done, DeleteError> {
        match item.kind {
            ItemKind::File | ItemKind::Directory => self.delete_path(item, dry_run),
            ItemKind::RegistryKey => self.delete_entry(item, dry_run),
        }
    }

    fn delete_path(&self, item: &Item, dry_run: bool) -> Result<Done, DeleteError> {
        let path = Path::new(&item.path);
        if !path.is_absolute() {
            return Err(DeleteError::NotAbsolute(item.path.clone()));
        }
        if self.protected.contains(&item.path) {
            return Err(DeleteError::Protected(item.path.clone()));
        }
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Done::Vanished),
            Err(e) => return Err(e.into()),
        };
        if !safety::resolves_within(path, Path::new(&item.scan_root))? {
            return Err(DeleteError::OutsideRoot {
                root: item.scan_root.clone(),
            });
        }
        if dry_run {
            return Ok(Done::Deleted);
        }

        if meta.permissions().readonly() {
            make_writable(path)?;
        }
        match item.kind {
            ItemKind::Directory => remove_tree(path)?,
            _ => fs::remove_file(path)?,
        }
        tracing::debug!(path = %item.path, "deleted");
        Ok(Done::Deleted)
    }

    fn delete_entry(&self, item: &Item, dry_run: bool) -> Result<Done, DeleteError> {
        let path = RegistryPath::parse(&item.path)?;
        // Checked again here whatever the analyzer already decided
        if safety::is_protected_key(&path) {
            return Err(DeleteError::Protected(item.path.clone()));
        }
        if let Some(target) = item.target.as_deref() {
            if self.protected.contains(target) {
                return Err(DeleteError::Protected(target.to_string()));
            }
        }
        if !within_key(&path, &item.scan_root) {
            return Err(DeleteError::OutsideRoot {
                root: item.scan_root.clone(),
            });
        }
        if dry_run {
            return Ok(Done::Deleted);
        }

        match self.store.delete(&path) {
            Ok(()) => {
                tracing::debug!(key = %path, "deleted");
                Ok(Done::Deleted)
            }
            Err(StoreError::NotFound(_)) => Ok(Done::Vanished),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `path` is the registry root `root` or lies below it.
fn within_key(path: &RegistryPath, root: &str) -> bool {
    let Ok(root) = RegistryPath::parse(root) else {
        return false;
    };
    if root.hive != path.hive {
        return false;
    }
    let key = path.key.to_lowercase();
    let root = root.key.to_lowercase();
    key == root || key.starts_with(&format!("{root}\\"))
}

fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::symlink_metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}

/// Remove a directory tree, clearing read-only flags and retrying once if
/// the first attempt is refused.
fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "clearing read-only flags and retrying");
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                let readonly = entry
                    .metadata()
                    .map(|m| m.permissions().readonly())
                    .unwrap_or(false);
                if readonly && !entry.path_is_symlink() {
                    if let Err(e) = make_writable(entry.path()) {
                        tracing::debug!(path = %entry.path().display(), error = %e, "cannot clear read-only flag");
                    }
                }
            }
            fs::remove_dir_all(path)
        }
        other => other,
    }
}

/// Counts derived from a run's records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    /// Declared size of every successful item; a dry run's would-be total.
    pub bytes_reclaimed: u64,
}

impl Summary {
    pub fn from_records(records: &[AuditRecord]) -> Self {
        records.iter().fold(Summary::default(), |mut s, r| {
            if r.outcome.is_success() {
                s.succeeded += 1;
                s.bytes_reclaimed += r.size_bytes.unwrap_or(0);
            } else {
                s.failed += 1;
            }
            s
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use crate::registry::MemoryStore;

    fn cleaner(store: Arc<MemoryStore>) -> Cleaner {
        Cleaner::with_store(store).protected_paths(ProtectedPaths::new(r"C:\Windows"))
    }

    fn file_item(root: &Path, name: &str) -> Item {
        let path = root.join(name);
        fs::write(&path, b"data").unwrap();
        Item::new("temp_files", ItemKind::File, path.to_string_lossy(), root.to_string_lossy(), RiskLevel::Safe)
            .with_size(4)
    }

    #[test]
    fn read_only_file_is_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let item = file_item(dir.path(), "locked.txt");
        let mut perms = fs::metadata(&item.path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&item.path, perms).unwrap();

        let log = dir.path().join("log.csv");
        let records = cleaner(Arc::new(MemoryStore::new()))
            .delete_selected(&[item.clone()], false, &log)
            .unwrap();
        assert_eq!(records[0].outcome, Outcome::Succeeded);
        assert!(!Path::new(&item.path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_tree_is_deleted() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("inner")).unwrap();
        fs::write(tree.join("inner/file"), b"x").unwrap();
        fs::set_permissions(tree.join("inner"), fs::Permissions::from_mode(0o555)).unwrap();

        let item = Item::new("caches", ItemKind::Directory, tree.to_string_lossy(), tree.to_string_lossy(), RiskLevel::Safe);
        let records = cleaner(Arc::new(MemoryStore::new()))
            .delete_selected(&[item], false, &dir.path().join("log.csv"))
            .unwrap();
        assert_eq!(records[0].outcome, Outcome::Succeeded, "{:?}", records[0].error);
        assert!(!tree.exists());
    }

    #[test]
    fn relative_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let item = Item::new("temp_files", ItemKind::File, "relative.txt", "", RiskLevel::Safe);
        let records = cleaner(Arc::new(MemoryStore::new()))
            .delete_selected(&[item], false, &dir.path().join("log.csv"))
            .unwrap();
        assert_eq!(records[0].outcome, Outcome::Failed);
        assert!(records[0].error.as_deref().unwrap().contains("not absolute"));
    }

    #[test]
    fn registry_entries_are_deleted_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let root = r"HKCU\SOFTWARE\Microsoft\Windows\CurrentVersion\Run";
        store.set_string(root, "Gone", r"C:\gone.exe").unwrap();
        store.set_string(root, "Kept", r"C:\kept.exe").unwrap();

        let item = Item::new("registry", ItemKind::RegistryKey, format!(r"{root}\\Gone"), root, RiskLevel::Registry)
            .with_target(r"C:\gone.exe");
        let records = cleaner(store.clone())
            .delete_selected(&[item.clone(), item], false, &dir.path().join("log.csv"))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == Outcome::Succeeded));
        assert!(!store.contains(&format!(r"{root}\\Gone")));
        assert!(store.contains(&format!(r"{root}\\Kept")));
    }

    #[test]
    fn protected_registry_entries_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let key = r"HKLM\SYSTEM\CurrentControlSet\Services\Thing";
        store.insert_key(key).unwrap();

        let by_key = Item::new("registry", ItemKind::RegistryKey, key, r"HKLM\SYSTEM", RiskLevel::Registry);
        let by_target = Item::new(
            "registry",
            ItemKind::RegistryKey,
            r"HKLM\SOFTWARE\Vendor\App",
            r"HKLM\SOFTWARE",
            RiskLevel::Registry,
        )
        .with_target(r"C:\Windows\System32\app.dll");

        let records = cleaner(store.clone())
            .delete_selected(&[by_key, by_target], false, &dir.path().join("log.csv"))
            .unwrap();
        assert!(records.iter().all(|r| r.outcome == Outcome::Failed));
        assert!(store.contains(key));
    }

    #[test]
    fn stop_flag_halts_between_items() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![file_item(dir.path(), "a"), file_item(dir.path(), "b")];
        let stop = StopFlag::new();
        stop.stop();
        let records = cleaner(Arc::new(MemoryStore::new()))
            .stop_flag(stop)
            .delete_selected(&items, false, &dir.path().join("log.csv"))
            .unwrap();
        assert!(records.is_empty());
        assert!(items.iter().all(|i| Path::new(&i.path).exists()));
    }

    #[test]
    fn summary_counts_dry_runs_as_success() {
        let item = Item::new("r", ItemKind::File, "/x", "/", RiskLevel::Safe).with_size(100);
        let records = vec![
            AuditRecord::for_item(&item, Outcome::SucceededDryRun, None),
            AuditRecord::for_item(&item, Outcome::Succeeded, None),
            AuditRecord::for_item(&item, Outcome::Failed, Some("busy".into())),
        ];
        let summary = Summary::from_records(&records);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes_reclaimed, 200);
    }
}
