use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;

/// Top-level configuration store roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hive {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
}

impl Hive {
    pub fn as_str(self) -> &'static str {
        match self {
            Hive::LocalMachine => "HKLM",
            Hive::CurrentUser => "HKCU",
            Hive::ClassesRoot => "HKCR",
            Hive::Users => "HKU",
        }
    }

    pub fn parse(s: &str) -> Option<Hive> {
        match s.to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Some(Hive::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Some(Hive::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Some(Hive::ClassesRoot),
            "HKU" | "HKEY_USERS" => Some(Hive::Users),
            _ => None,
        }
    }
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a key, or of one named value inside a key.
///
/// Rendered as `HKLM\SOFTWARE\Vendor` for a key and
/// `HKLM\SOFTWARE\Vendor\\ValueName` for a value: the empty component
/// separates the key from a value name that may itself contain backslashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryPath {
    pub hive: Hive,
    /// Backslash-separated key below the hive, without leading or trailing separator.
    pub key: String,
    pub value: Option<String>,
}

impl RegistryPath {
    pub fn new(hive: Hive, key: impl Into<String>) -> Self {
        RegistryPath {
            hive,
            key: key.into().trim_matches('\\').to_string(),
            value: None,
        }
    }

    pub fn subkey(&self, name: &str) -> Self {
        let key = if self.key.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.key, name)
        };
        RegistryPath::new(self.hive, key)
    }

    /// The value `name` of this key. An empty name is the key's default value.
    pub fn with_value(&self, name: &str) -> Self {
        RegistryPath {
            hive: self.hive,
            key: self.key.clone(),
            value: Some(name.to_string()),
        }
    }

    /// The key this path names, with any value name removed.
    pub fn key_path(&self) -> Self {
        RegistryPath::new(self.hive, self.key.clone())
    }

    /// Split a key path into its parent key and leaf name.
    pub fn split_leaf(&self) -> Option<(RegistryPath, &str)> {
        let (parent, leaf) = self.key.rsplit_once('\\')?;
        (!parent.is_empty() && !leaf.is_empty()).then(|| (RegistryPath::new(self.hive, parent), leaf))
    }

    pub fn depth(&self) -> usize {
        if self.key.is_empty() {
            0
        } else {
            self.key.split('\\').count()
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidPath(s.to_string());
        let (key_part, value) = match s.split_once("\\\\") {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (s, None),
        };
        let (hive, key) = key_part.split_once('\\').unwrap_or((key_part, ""));
        let hive = Hive::parse(hive).ok_or_else(invalid)?;
        if key.split('\\').any(str::is_empty) && !key.is_empty() {
            return Err(invalid());
        }
        let mut path = RegistryPath::new(hive, key);
        path.value = value;
        Ok(path)
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hive)?;
        if !self.key.is_empty() {
            write!(f, "\\{}", self.key)?;
        }
        if let Some(value) = &self.value {
            write!(f, "\\\\{value}")?;
        }
        Ok(())
    }
}

/// The subset of value types the analyzer reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegValue {
    String(String),
    ExpandString(String),
    Dword(u32),
    Other,
}

impl RegValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RegValue::String(s) | RegValue::ExpandString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            RegValue::Dword(n) => Some(*n),
            _ => None,
        }
    }
}

/// Read and delete access to a hierarchical configuration store.
pub trait ConfigStore: Send + Sync {
    /// False when this platform has no store at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Names of the direct subkeys of `key`.
    fn subkeys(&self, key: &RegistryPath) -> Result<Vec<String>, StoreError>;

    /// Every value of `key` with its name. The default value has an empty name.
    fn values(&self, key: &RegistryPath) -> Result<Vec<(String, RegValue)>, StoreError>;

    fn value(&self, key: &RegistryPath, name: &str) -> Result<Option<RegValue>, StoreError> {
        Ok(self
            .values(key)?
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v))
    }

    /// Delete the key `path` names with all its subkeys, or the single value
    /// it names.
    fn delete(&self, path: &RegistryPath) -> Result<(), StoreError>;
}

/// A store for platforms that have none: every call is `Unavailable`.
#[derive(Debug, Default)]
pub struct UnavailableStore;

impl UnavailableStore {
    fn err() -> StoreError {
        StoreError::Unavailable(format!("no configuration store on {}", std::env::consts::OS))
    }
}

impl ConfigStore for UnavailableStore {
    fn is_available(&self) -> bool {
        false
    }

    fn subkeys(&self, _key: &RegistryPath) -> Result<Vec<String>, StoreError> {
        Err(Self::err())
    }

    fn values(&self, _key: &RegistryPath) -> Result<Vec<(String, RegValue)>, StoreError> {
        Err(Self::err())
    }

    fn delete(&self, _path: &RegistryPath) -> Result<(), StoreError> {
        Err(Self::err())
    }
}

#[derive(Debug, Clone, Default)]
struct MemKey {
    /// Key path as first written, for subkey names.
    path: String,
    values: Vec<(String, RegValue)>,
}

#[derive(Debug, Default)]
struct MemInner {
    /// Lower-cased full key path → key.
    keys: BTreeMap<String, MemKey>,
    denied: HashSet<String>,
}

/// In-memory store with case-insensitive key lookup.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemInner>,
}

fn fold(path: &RegistryPath) -> String {
    path.key_path().to_string().to_lowercase()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `key` and any missing ancestors.
    pub fn insert_key(&self, key: &str) -> Result<(), StoreError> {
        let path = RegistryPath::parse(key)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut current = RegistryPath::new(path.hive, "");
        for part in path.key.split('\\').filter(|p| !p.is_empty()) {
            current = current.subkey(part);
            inner.keys.entry(fold(&current)).or_insert_with(|| MemKey {
                path: current.to_string(),
                values: Vec::new(),
            });
        }
        Ok(())
    }

    /// Set value `name` on `key`, creating the key as needed.
    pub fn set_value(&self, key: &str, name: &str, value: RegValue) -> Result<(), StoreError> {
        self.insert_key(key)?;
        let folded = fold(&RegistryPath::parse(key)?);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = inner.keys.get_mut(&folded) {
            match entry.values.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                Some(slot) => slot.1 = value,
                None => entry.values.push((name.to_string(), value)),
            }
        }
        Ok(())
    }

    pub fn set_string(&self, key: &str, name: &str, value: &str) -> Result<(), StoreError> {
        self.set_value(key, name, RegValue::String(value.to_string()))
    }

    /// Make every access to `key` fail with `PermissionDenied`.
    pub fn deny(&self, key: &str) -> Result<(), StoreError> {
        let folded = fold(&RegistryPath::parse(key)?);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.denied.insert(folded);
        Ok(())
    }

    /// Whether the key or value `path` names exists.
    pub fn contains(&self, path: &str) -> bool {
        let Ok(path) = RegistryPath::parse(path) else {
            return false;
        };
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match (inner.keys.get(&fold(&path)), &path.value) {
            (Some(key), Some(name)) => key.values.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn check(inner: &MemInner, path: &RegistryPath) -> Result<String, StoreError> {
        let folded = fold(path);
        if inner.denied.contains(&folded) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        if !inner.keys.contains_key(&folded) {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(folded)
    }
}

impl ConfigStore for MemoryStore {
    fn subkeys(&self, key: &RegistryPath) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let folded = Self::check(&inner, key)?;
        let prefix = format!("{folded}\\");
        Ok(inner
            .keys
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k[prefix.len()..].contains('\\'))
            .filter_map(|(_, v)| v.path.rsplit('\\').next().map(str::to_string))
            .collect())
    }

    fn values(&self, key: &RegistryPath) -> Result<Vec<(String, RegValue)>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let folded = Self::check(&inner, key)?;
        Ok(inner
            .keys
            .get(&folded)
            .map(|k| k.values.clone())
            .unwrap_or_default())
    }

    fn delete(&self, path: &RegistryPath) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let folded = Self::check(&inner, path)?;
        match &path.value {
            Some(name) => {
                let key = inner
                    .keys
                    .get_mut(&folded)
                    .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
                let before = key.values.len();
                key.values.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
                if key.values.len() == before {
                    return Err(StoreError::NotFound(path.to_string()));
                }
            }
            None => {
                let prefix = format!("{folded}\\");
                inner
                    .keys
                    .retain(|k, _| k != &folded && !k.starts_with(&prefix));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_display_and_parse_agree() {
        let key = RegistryPath::new(Hive::LocalMachine, r"SOFTWARE\Vendor\App");
        assert_eq!(key.to_string(), r"HKLM\SOFTWARE\Vendor\App");
        assert_eq!(RegistryPath::parse(&key.to_string()).unwrap(), key);

        let value = key.with_value(r"C:\Program Files\App\app.dll");
        assert_eq!(value.to_string(), r"HKLM\SOFTWARE\Vendor\App\\C:\Program Files\App\app.dll");
        assert_eq!(RegistryPath::parse(&value.to_string()).unwrap(), value);

        let default = key.with_value("");
        assert_eq!(RegistryPath::parse(&default.to_string()).unwrap(), default);
    }

    #[test]
    fn parse_rejects_unknown_hives() {
        assert!(RegistryPath::parse(r"HKXX\SOFTWARE").is_err());
        assert_eq!(
            RegistryPath::parse(r"HKEY_CURRENT_USER\Software").unwrap().hive,
            Hive::CurrentUser
        );
    }

    #[test]
    fn split_leaf_needs_a_parent() {
        let key = RegistryPath::new(Hive::CurrentUser, r"Software\Run\Thing");
        let (parent, leaf) = key.split_leaf().unwrap();
        assert_eq!(parent.key, r"Software\Run");
        assert_eq!(leaf, "Thing");
        assert!(RegistryPath::new(Hive::CurrentUser, "Software").split_leaf().is_none());
    }

    #[test]
    fn memory_store_lists_and_deletes() {
        let store = MemoryStore::new();
        store.set_string(r"HKLM\SOFTWARE\Uninstall\AppA", "DisplayName", "App A").unwrap();
        store.set_string(r"HKLM\SOFTWARE\Uninstall\AppB\Sub", "x", "y").unwrap();

        let root = RegistryPath::parse(r"HKLM\software\uninstall").unwrap();
        assert_eq!(store.subkeys(&root).unwrap(), vec!["AppA", "AppB"]);

        let app_a = root.subkey("AppA");
        assert_eq!(
            store.value(&app_a, "displayname").unwrap(),
            Some(RegValue::String("App A".into()))
        );

        store.delete(&root.subkey("AppB")).unwrap();
        assert!(!store.contains(r"HKLM\SOFTWARE\Uninstall\AppB\Sub"));
        assert!(matches!(
            store.delete(&root.subkey("AppB")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn memory_store_deletes_single_values() {
        let store = MemoryStore::new();
        store.set_string(r"HKCU\Run", "Tool", r"C:\tool.exe").unwrap();
        store.set_string(r"HKCU\Run", "Other", r"C:\other.exe").unwrap();
        store.delete(&RegistryPath::parse(r"HKCU\Run\\Tool").unwrap()).unwrap();
        assert!(!store.contains(r"HKCU\Run\\Tool"));
        assert!(store.contains(r"HKCU\Run\\Other"));
    }

    #[test]
    fn denied_keys_fail_with_permission_denied() {
        let store = MemoryStore::new();
        store.insert_key(r"HKLM\SOFTWARE\Locked").unwrap();
        store.deny(r"HKLM\SOFTWARE\Locked").unwrap();
        let locked = RegistryPath::parse(r"HKLM\SOFTWARE\Locked").unwrap();
        assert!(matches!(store.subkeys(&locked), Err(StoreError::PermissionDenied(_))));
    }
}
