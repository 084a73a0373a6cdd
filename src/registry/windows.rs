use winreg::enums::{
    RegType, HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_ALL_ACCESS,
    KEY_READ, KEY_WOW64_64KEY,
};
use winreg::types::FromRegValue;
use winreg::RegKey;

use crate::error::StoreError;
use crate::registry::store::{ConfigStore, Hive, RegValue, RegistryPath};

/// The live Windows registry, always through the native 64-bit view.
#[derive(Debug, Default)]
pub struct WindowsStore;

impl WindowsStore {
    pub fn new() -> Self {
        WindowsStore
    }

    fn root(hive: Hive) -> RegKey {
        RegKey::predef(match hive {
            Hive::LocalMachine => HKEY_LOCAL_MACHINE,
            Hive::CurrentUser => HKEY_CURRENT_USER,
            Hive::ClassesRoot => HKEY_CLASSES_ROOT,
            Hive::Users => HKEY_USERS,
        })
    }

    fn open(path: &RegistryPath, access: u32) -> Result<RegKey, StoreError> {
        Self::root(path.hive)
            .open_subkey_with_flags(&path.key, access | KEY_WOW64_64KEY)
            .map_err(|e| StoreError::from_io(path.to_string(), e))
    }
}

fn convert(value: &winreg::RegValue) -> RegValue {
    match value.vtype {
        RegType::REG_SZ => String::from_reg_value(value)
            .map(RegValue::String)
            .unwrap_or(RegValue::Other),
        RegType::REG_EXPAND_SZ => String::from_reg_value(value)
            .map(RegValue::ExpandString)
            .unwrap_or(RegValue::Other),
        RegType::REG_DWORD => u32::from_reg_value(value)
            .map(RegValue::Dword)
            .unwrap_or(RegValue::Other),
        _ => RegValue::Other,
    }
}

impl ConfigStore for WindowsStore {
    fn subkeys(&self, key: &RegistryPath) -> Result<Vec<String>, StoreError> {
        let handle = Self::open(key, KEY_READ)?;
        let mut names = Vec::new();
        for name in handle.enum_keys() {
            match name {
                Ok(name) => names.push(name),
                Err(e) => tracing::debug!(key = %key, error = %e, "skipping unreadable subkey"),
            }
        }
        Ok(names)
    }

    fn values(&self, key: &RegistryPath) -> Result<Vec<(String, RegValue)>, StoreError> {
        let handle = Self::open(key, KEY_READ)?;
        let mut values = Vec::new();
        for entry in handle.enum_values() {
            match entry {
                Ok((name, value)) => values.push((name, convert(&value))),
                Err(e) => tracing::debug!(key = %key, error = %e, "skipping unreadable value"),
            }
        }
        Ok(values)
    }

    fn value(&self, key: &RegistryPath, name: &str) -> Result<Option<RegValue>, StoreError> {
        let handle = Self::open(key, KEY_READ)?;
        match handle.get_raw_value(name) {
            Ok(value) => Ok(Some(convert(&value))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::from_io(key.with_value(name).to_string(), e)),
        }
    }

    fn delete(&self, path: &RegistryPath) -> Result<(), StoreError> {
        match &path.value {
            Some(name) => {
                let handle = Self::open(&path.key_path(), KEY_ALL_ACCESS)?;
                handle
                    .delete_value(name)
                    .map_err(|e| StoreError::from_io(path.to_string(), e))
            }
            None => {
                let (parent, leaf) = path
                    .split_leaf()
                    .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
                let handle = Self::open(&parent, KEY_ALL_ACCESS)?;
                handle
                    .delete_subkey_all(leaf)
                    .map_err(|e| StoreError::from_io(path.to_string(), e))
            }
        }
    }
}
