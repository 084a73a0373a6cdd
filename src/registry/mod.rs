//! Access to the system configuration store and the orphan analyzer built on it.

mod analyzer;
pub mod resolve;
mod store;
#[cfg(windows)]
mod windows;

use std::sync::Arc;

pub use analyzer::{AnalysisType, OrphanAnalyzer, MAX_COM_KEYS, MAX_MUI_FINDINGS, RULE_NAME};
pub use store::{ConfigStore, Hive, MemoryStore, RegValue, RegistryPath, UnavailableStore};
#[cfg(windows)]
pub use windows::WindowsStore;

/// The configuration store of this machine.
#[cfg(windows)]
pub fn system_store() -> Arc<dyn ConfigStore> {
    Arc::new(WindowsStore::new())
}

/// The configuration store of this machine.
#[cfg(not(windows))]
pub fn system_store() -> Arc<dyn ConfigStore> {
    Arc::new(UnavailableStore)
}
