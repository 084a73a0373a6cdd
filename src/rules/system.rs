use crate::error::RuleError;
use crate::model::{Category, RiskLevel};
use crate::rules::{describe, Collector, Locations, Rule};

// --- Temporary files ---

pub struct TempFiles {
    locations: Locations,
}

impl TempFiles {
    pub fn new(locations: &Locations) -> Self {
        TempFiles {
            locations: locations.clone(),
        }
    }
}

impl Rule for TempFiles {
    describe!(
        "temp_files",
        "Temporary Files",
        "User and system temporary files (%TEMP%, Windows\\Temp)",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        let user_temp = self.locations.temp.as_deref();

        if let Some(dir) = user_temp {
            collector.add_children(dir, "User temp", |_, _| true);
        }

        if let Some(root) = &self.locations.system_root {
            let system_temp = root.join("Temp");
            // %TEMP% may point at Windows\Temp when running as SYSTEM
            let same_dir = user_temp.is_some_and(|u| {
                u.to_string_lossy().eq_ignore_ascii_case(&system_temp.to_string_lossy())
            });
            if !same_dir {
                collector.add_children(&system_temp, "System temp", |_, _| true);
            }
        }

        Ok(collector.finish())
    }
}

// --- Windows Update download cache ---

pub struct WindowsUpdate {
    locations: Locations,
}

impl WindowsUpdate {
    pub fn new(locations: &Locations) -> Self {
        WindowsUpdate {
            locations: locations.clone(),
        }
    }
}

impl Rule for WindowsUpdate {
    describe!(
        "windows_update",
        "Windows Update Cache",
        "Downloaded Windows Update files (SoftwareDistribution\\Download)",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        if let Some(root) = &self.locations.system_root {
            let download = root.join("SoftwareDistribution").join("Download");
            collector.add_children(&download, "Windows Update download", |_, _| true);
        }
        Ok(collector.finish())
    }
}

// --- Prefetch ---

pub struct Prefetch {
    locations: Locations,
}

impl Prefetch {
    pub fn new(locations: &Locations) -> Self {
        Prefetch {
            locations: locations.clone(),
        }
    }
}

impl Rule for Prefetch {
    describe!(
        "prefetch",
        "Prefetch Files",
        "Windows Prefetch cache files (.pf), regenerated on use",
        RiskLevel::Low
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        if let Some(root) = &self.locations.system_root {
            collector.add_children(&root.join("Prefetch"), "Prefetch file", |name, is_dir| {
                !is_dir && name.to_ascii_lowercase().ends_with(".pf")
            });
        }
        Ok(collector.finish())
    }
}

// --- Delivery Optimization ---

pub struct DeliveryOptimization {
    locations: Locations,
}

impl DeliveryOptimization {
    pub fn new(locations: &Locations) -> Self {
        DeliveryOptimization {
            locations: locations.clone(),
        }
    }
}

impl Rule for DeliveryOptimization {
    describe!(
        "delivery_optimization",
        "Delivery Optimization Cache",
        "Windows Update Delivery Optimization peer-to-peer cache",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        if let Some(root) = &self.locations.system_root {
            collector.add_dir(
                &root.join("SoftwareDistribution").join("DeliveryOptimization"),
                "Delivery Optimization cache",
            );
            let network_cache = root
                .join("ServiceProfiles")
                .join("NetworkService")
                .join("AppData")
                .join("Local")
                .join("Microsoft")
                .join("Windows")
                .join("DeliveryOptimization")
                .join("Cache");
            collector.add_dir(&network_cache, "Delivery Optimization network cache");
        }
        Ok(collector.finish())
    }
}

// --- Windows Installer patch cache ---

pub struct Installer {
    locations: Locations,
}

impl Installer {
    pub fn new(locations: &Locations) -> Self {
        Installer {
            locations: locations.clone(),
        }
    }
}

impl Rule for Installer {
    describe!(
        "installer",
        "Installer Patch Cache",
        "Windows Installer patch cache and orphaned temp files",
        RiskLevel::Medium
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        if let Some(root) = &self.locations.system_root {
            let installer = root.join("Installer");
            collector.add_dir(
                &installer.join("$PatchCache$"),
                "MSI patch cache (may prevent repair of some apps)",
            );
            collector.add_children(&installer, "Orphaned installer temp file", |name, is_dir| {
                !is_dir && name.to_ascii_lowercase().ends_with(".tmp")
            });
        }
        Ok(collector.finish())
    }
}

// --- Previous Windows installations ---

pub struct OldWindows {
    locations: Locations,
}

impl OldWindows {
    pub fn new(locations: &Locations) -> Self {
        OldWindows {
            locations: locations.clone(),
        }
    }
}

const OLD_WINDOWS_DIRS: &[(&str, &str)] = &[
    ("Windows.old", "Previous Windows installation"),
    ("$Windows.~BT", "Windows upgrade temporary files"),
    ("$Windows.~WS", "Windows upgrade source files"),
];

impl Rule for OldWindows {
    describe!(
        "old_windows",
        "Old Windows Installations",
        "Previous Windows installations (Windows.old, upgrade temp folders)",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        if let Some(system_drive) = self.locations.drives.first() {
            for (dir, label) in OLD_WINDOWS_DIRS {
                collector.add_dir(&system_drive.join(dir), label);
            }
        }
        Ok(collector.finish())
    }
}
