//! Orphaned configuration entries: keys and values that point at files or
//! folders that are gone.
//!
//! The analysis is read-only and conservative. An entry is reported only when
//! its referenced path is absolute, fully expanded, outside every protected
//! system directory, and absent from disk.

use std::io;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{RuleError, StoreError};
use crate::model::{Category, Item, ItemKind, RiskLevel, ScanError};
use crate::registry::resolve::{self, Env};
use crate::registry::store::{ConfigStore, Hive, RegValue, RegistryPath};
use crate::rules::Rule;
use crate::safety::{self, ProtectedPaths};

pub const RULE_NAME: &str = "registry";

const UNINSTALL_ROOTS: &[(Hive, &str)] = &[
    (Hive::LocalMachine, r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall"),
    (Hive::LocalMachine, r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall"),
    (Hive::CurrentUser, r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall"),
];

const SHARED_DLLS: (Hive, &str) = (
    Hive::LocalMachine,
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\SharedDLLs",
);

const CLSID_ROOT: (Hive, &str) = (Hive::ClassesRoot, "CLSID");

const STARTUP_ROOTS: &[(Hive, &str)] = &[
    (Hive::CurrentUser, r"SOFTWARE\Microsoft\Windows\CurrentVersion\Run"),
    (Hive::CurrentUser, r"SOFTWARE\Microsoft\Windows\CurrentVersion\RunOnce"),
    (Hive::LocalMachine, r"SOFTWARE\Microsoft\Windows\CurrentVersion\Run"),
    (Hive::LocalMachine, r"SOFTWARE\Microsoft\Windows\CurrentVersion\RunOnce"),
];

const MUI_CACHE: (Hive, &str) = (
    Hive::CurrentUser,
    r"Software\Classes\Local Settings\Software\Microsoft\Windows\Shell\MuiCache",
);

const APP_PATHS: (Hive, &str) = (
    Hive::LocalMachine,
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\App Paths",
);

/// At most this many CLSID keys are inspected per scan.
pub const MAX_COM_KEYS: usize = 2000;
/// At most this many MuiCache findings are reported per scan.
pub const MAX_MUI_FINDINGS: usize = 1000;

/// One independent pass over a family of configuration entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    Uninstall,
    SharedDlls,
    ComServers,
    Startup,
    MuiCache,
    AppPaths,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 6] = [
        AnalysisType::Uninstall,
        AnalysisType::SharedDlls,
        AnalysisType::ComServers,
        AnalysisType::Startup,
        AnalysisType::MuiCache,
        AnalysisType::AppPaths,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AnalysisType::Uninstall => "uninstall",
            AnalysisType::SharedDlls => "shared_dlls",
            AnalysisType::ComServers => "com_servers",
            AnalysisType::Startup => "startup",
            AnalysisType::MuiCache => "mui_cache",
            AnalysisType::AppPaths => "app_paths",
        }
    }
}

/// Findings and root-level failures of one analysis type.
#[derive(Debug, Default)]
struct Pass {
    items: Vec<Item>,
    errors: Vec<ScanError>,
}

impl Pass {
    fn fail(&mut self, kind: AnalysisType, err: &StoreError) {
        self.errors
            .push(ScanError::new(format!("{RULE_NAME}/{}", kind.name()), err.to_string()));
    }
}

pub struct OrphanAnalyzer {
    store: Arc<dyn ConfigStore>,
    protected: ProtectedPaths,
    env: Env,
}

impl OrphanAnalyzer {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        OrphanAnalyzer {
            store,
            protected: ProtectedPaths::detect(),
            env: Env::from_process(),
        }
    }

    /// Analyzer over this machine's configuration store.
    pub fn system() -> Self {
        Self::new(super::system_store())
    }

    pub fn protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    pub fn env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    /// Run every analysis type; items keep [`AnalysisType::ALL`] order.
    pub fn analyze(&self) -> (Vec<Item>, Vec<ScanError>) {
        let passes: Vec<Pass> = AnalysisType::ALL
            .par_iter()
            .map(|kind| self.run(*kind))
            .collect();

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for mut pass in passes {
            items.append(&mut pass.items);
            errors.append(&mut pass.errors);
        }
        (items, errors)
    }

    fn run(&self, kind: AnalysisType) -> Pass {
        let mut pass = Pass::default();
        match kind {
            AnalysisType::Uninstall => {
                for (hive, key) in UNINSTALL_ROOTS {
                    self.uninstall(&RegistryPath::new(*hive, *key), &mut pass);
                }
            }
            AnalysisType::SharedDlls => self.shared_dlls(&mut pass),
            AnalysisType::ComServers => self.com_servers(&mut pass),
            AnalysisType::Startup => {
                for (hive, key) in STARTUP_ROOTS {
                    self.startup(&RegistryPath::new(*hive, *key), &mut pass);
                }
            }
            AnalysisType::MuiCache => self.mui_cache(&mut pass),
            AnalysisType::AppPaths => self.app_paths(&mut pass),
        }
        tracing::debug!(analysis = kind.name(), found = pass.items.len(), "analysis finished");
        pass
    }

    /// Errors opening a root are recorded against the pass; a missing root
    /// simply has nothing to report.
    fn open_root<T>(
        &self,
        kind: AnalysisType,
        root: &RegistryPath,
        pass: &mut Pass,
        read: impl FnOnce(&RegistryPath) -> Result<T, StoreError>,
    ) -> Option<T> {
        match read(root) {
            Ok(v) => Some(v),
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(key = %root, "configuration root not present");
                None
            }
            Err(e) => {
                tracing::warn!(key = %root, error = %e, "cannot open configuration root");
                pass.fail(kind, &e);
                None
            }
        }
    }

    /// The referenced path if it is checkable, unprotected and missing.
    fn orphaned(&self, path: String) -> Option<String> {
        if !resolve::is_checkable(&path) {
            return None;
        }
        // Protection is decided before existence is ever looked at
        if self.protected.contains(&path) {
            return None;
        }
        missing(&path, Path::new(&path).try_exists()).then_some(path)
    }

    fn finding(&self, entry: RegistryPath, root: &RegistryPath, label: String, target: String) -> Option<Item> {
        if safety::is_protected_key(&entry) {
            return None;
        }
        Some(
            Item::new(
                RULE_NAME,
                ItemKind::RegistryKey,
                entry.to_string(),
                root.to_string(),
                RiskLevel::Registry,
            )
            .with_label(label)
            .with_target(target),
        )
    }

    fn string_value(&self, key: &RegistryPath, name: &str) -> Option<String> {
        self.store
            .value(key, name)
            .ok()
            .flatten()
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
    }

    fn uninstall(&self, root: &RegistryPath, pass: &mut Pass) {
        let kind = AnalysisType::Uninstall;
        let Some(names) = self.open_root(kind, root, pass, |r| self.store.subkeys(r)) else {
            return;
        };
        for name in names {
            let entry = root.subkey(&name);
            let values = match self.store.values(&entry) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!(key = %entry, error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let get = |n: &str| values.iter().find(|(k, _)| k.eq_ignore_ascii_case(n)).map(|(_, v)| v);

            let Some(display_name) = get("DisplayName").and_then(RegValue::as_str).filter(|s| !s.is_empty()) else {
                continue;
            };
            if get("SystemComponent").and_then(RegValue::as_u32) == Some(1) {
                continue;
            }
            if get("ParentKeyName")
                .and_then(RegValue::as_str)
                .is_some_and(|s| !s.is_empty())
            {
                continue;
            }
            let Some(location) = get("InstallLocation").and_then(RegValue::as_str) else {
                continue;
            };
            let Some(target) = self.orphaned(resolve::clean_path(location, &self.env)) else {
                continue;
            };
            let label = format!("{display_name}: install folder missing");
            pass.items.extend(self.finding(entry, root, label, target));
        }
    }

    fn shared_dlls(&self, pass: &mut Pass) {
        let kind = AnalysisType::SharedDlls;
        let root = RegistryPath::new(SHARED_DLLS.0, SHARED_DLLS.1);
        let Some(values) = self.open_root(kind, &root, pass, |r| self.store.values(r)) else {
            return;
        };
        for (name, _) in values {
            let Some(target) = self.orphaned(resolve::clean_path(&name, &self.env)) else {
                continue;
            };
            let label = format!("Shared DLL missing: {}", resolve::file_name(&target));
            pass.items.extend(self.finding(root.with_value(&name), &root, label, target));
        }
    }

    fn com_servers(&self, pass: &mut Pass) {
        let kind = AnalysisType::ComServers;
        let root = RegistryPath::new(CLSID_ROOT.0, CLSID_ROOT.1);
        let Some(names) = self.open_root(kind, &root, pass, |r| self.store.subkeys(r)) else {
            return;
        };
        for name in names
            .into_iter()
            .filter(|n| n.starts_with('{') && n.ends_with('}'))
            .take(MAX_COM_KEYS)
        {
            let clsid = root.subkey(&name);
            let Some(server) = self.string_value(&clsid.subkey("InProcServer32"), "") else {
                continue;
            };
            let Some(target) = self.orphaned(resolve::command_path(&server, &self.env)) else {
                continue;
            };
            let missing = format!("COM server missing: {}", resolve::file_name(&target));
            let label = match self.string_value(&clsid, "") {
                Some(friendly) => format!("{friendly}: {missing}"),
                None => missing,
            };
            pass.items.extend(self.finding(clsid, &root, label, target));
        }
    }

    fn startup(&self, root: &RegistryPath, pass: &mut Pass) {
        let kind = AnalysisType::Startup;
        let Some(values) = self.open_root(kind, root, pass, |r| self.store.values(r)) else {
            return;
        };
        for (name, value) in values {
            let Some(command) = value.as_str() else {
                continue;
            };
            let Some(target) = self.orphaned(resolve::command_path(command, &self.env)) else {
                continue;
            };
            let label = format!("Startup entry '{name}' points at a missing program");
            pass.items.extend(self.finding(root.with_value(&name), root, label, target));
        }
    }

    fn mui_cache(&self, pass: &mut Pass) {
        let kind = AnalysisType::MuiCache;
        let root = RegistryPath::new(MUI_CACHE.0, MUI_CACHE.1);
        let Some(values) = self.open_root(kind, &root, pass, |r| self.store.values(r)) else {
            return;
        };
        let mut found = 0usize;
        for (name, _) in values {
            if found >= MAX_MUI_FINDINGS {
                break;
            }
            let Some(exe) = resolve::mui_executable(&name) else {
                continue;
            };
            let Some(target) = self.orphaned(exe.to_string()) else {
                continue;
            };
            let label = format!("Stale MUI cache entry: {}", resolve::file_name(&target));
            if let Some(item) = self.finding(root.with_value(&name), &root, label, target) {
                pass.items.push(item);
                found += 1;
            }
        }
    }

    fn app_paths(&self, pass: &mut Pass) {
        let kind = AnalysisType::AppPaths;
        let root = RegistryPath::new(APP_PATHS.0, APP_PATHS.1);
        let Some(names) = self.open_root(kind, &root, pass, |r| self.store.subkeys(r)) else {
            return;
        };
        for name in names {
            let entry = root.subkey(&name);
            let Some(exe) = self.string_value(&entry, "") else {
                continue;
            };
            let Some(target) = self.orphaned(resolve::command_path(&exe, &self.env)) else {
                continue;
            };
            let label = format!("App path '{name}' points at a missing program");
            pass.items.extend(self.finding(entry, &root, label, target));
        }
    }
}

/// Whether an existence probe proves `path` absent. A probe that fails
/// (access denied, invalid name) proves nothing.
fn missing(path: &str, probe: io::Result<bool>) -> bool {
    match probe {
        Ok(exists) => !exists,
        Err(e) => {
            tracing::debug!(path, error = %e, "cannot check target, skipping");
            false
        }
    }
}

impl Rule for OrphanAnalyzer {
    fn name(&self) -> &'static str {
        RULE_NAME
    }

    fn display_name(&self) -> &'static str {
        "Orphaned Registry Entries"
    }

    fn description(&self) -> &'static str {
        "Orphaned uninstall, COM, startup, SharedDLL, MUI cache, and App Path entries"
    }

    fn default_risk(&self) -> RiskLevel {
        RiskLevel::Registry
    }

    fn scan(&self) -> Result<Category, RuleError> {
        if !self.store.is_available() {
            return Err(StoreError::Unavailable(format!(
                "no configuration store on {}",
                std::env::consts::OS
            ))
            .into());
        }
        let mut category = Category::new(
            self.name(),
            self.display_name(),
            self.description(),
            self.default_risk(),
        );
        let (items, errors) = self.analyze();
        category.items = items;
        category.errors = errors;
        Ok(category)
    }
}
