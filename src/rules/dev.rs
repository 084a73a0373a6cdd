//! Developer toolchain caches and stale project build directories.

use std::path::{Path, PathBuf};

use crate::error::RuleError;
use crate::model::{Category, RiskLevel};
use crate::rules::{describe, Collector, Locations, Rule, StaleDirs};

/// Which well-known base a cache path hangs off.
#[derive(Clone, Copy)]
enum Base {
    Home,
    Local,
    Roaming,
    Temp,
    CargoHome,
    GoPath,
}

/// A cache directory: base, relative components, label, risk.
type CacheDir = (Base, &'static [&'static str], &'static str, RiskLevel);

fn base_dir(locations: &Locations, base: Base) -> Option<&Path> {
    match base {
        Base::Home => locations.home.as_deref(),
        Base::Local => locations.local_data.as_deref(),
        Base::Roaming => locations.roaming_data.as_deref(),
        Base::Temp => locations.temp.as_deref(),
        Base::CargoHome => locations.cargo_home.as_deref(),
        Base::GoPath => locations.go_path.as_deref(),
    }
}

fn resolve(locations: &Locations, base: Base, parts: &[&str]) -> Option<PathBuf> {
    base_dir(locations, base).map(|b| parts.iter().fold(b.to_path_buf(), |acc, p| acc.join(p)))
}

fn add_cache_dirs(collector: &mut Collector, locations: &Locations, dirs: &[CacheDir]) {
    for (base, parts, label, risk) in dirs {
        if let Some(path) = resolve(locations, *base, parts) {
            collector.add_dir_as(&path, label, *risk);
        }
    }
}

// --- Node.js ---

const NODE_CACHES: &[CacheDir] = &[
    (Base::Roaming, &["npm-cache"], "npm global cache", RiskLevel::Safe),
    (Base::Home, &[".npm", "_cacache"], "npm content cache", RiskLevel::Safe),
    (Base::Local, &["Yarn", "Cache"], "Yarn v1 cache", RiskLevel::Safe),
    (Base::Local, &["yarn", "berry", "cache"], "Yarn Berry cache", RiskLevel::Safe),
    (Base::Local, &["pnpm-store"], "pnpm content-addressable store", RiskLevel::Safe),
    (Base::Local, &["pnpm", "store"], "pnpm store", RiskLevel::Safe),
    (Base::Home, &[".bun", "install", "cache"], "Bun install cache", RiskLevel::Safe),
];

const STALE_NODE_MODULES: StaleDirs = StaleDirs {
    dir_name: "node_modules",
    marker: None,
    min_age_days: 30,
    min_bytes: 1_000_000,
    max_depth: 5,
    label: "Stale node_modules (>30d old)",
    risk: RiskLevel::Low,
};

pub struct DevNodejs {
    locations: Locations,
}

impl DevNodejs {
    pub fn new(locations: &Locations) -> Self {
        DevNodejs {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevNodejs {
    describe!(
        "dev_nodejs",
        "Node.js / Frontend Caches",
        "npm cache, Yarn cache, pnpm store, and stale node_modules",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        add_cache_dirs(&mut collector, &self.locations, NODE_CACHES);
        collector.add_stale_dirs(&self.locations.project_roots(), &STALE_NODE_MODULES);
        Ok(collector.finish())
    }
}

// --- Python ---

const PYTHON_CACHES: &[CacheDir] = &[
    (Base::Local, &["pip", "Cache"], "pip cache", RiskLevel::Safe),
    (Base::Home, &[".cache", "pip"], "pip HTTP cache", RiskLevel::Safe),
    (Base::Home, &[".conda", "pkgs"], "Conda package cache", RiskLevel::Safe),
    (Base::Home, &["anaconda3", "pkgs"], "Anaconda package cache", RiskLevel::Safe),
    (Base::Home, &["miniconda3", "pkgs"], "Miniconda package cache", RiskLevel::Safe),
    (Base::Local, &["pypoetry", "Cache"], "Poetry cache", RiskLevel::Safe),
    (Base::Local, &["pipx", ".cache"], "pipx cache", RiskLevel::Safe),
];

const PYCACHE: StaleDirs = StaleDirs {
    dir_name: "__pycache__",
    marker: None,
    min_age_days: 0,
    min_bytes: 0,
    max_depth: 6,
    label: "Python bytecode cache (__pycache__)",
    risk: RiskLevel::Safe,
};

pub struct DevPython {
    locations: Locations,
}

impl DevPython {
    pub fn new(locations: &Locations) -> Self {
        DevPython {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevPython {
    describe!(
        "dev_python",
        "Python Developer Caches",
        "pip cache, conda packages, __pycache__ directories",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        add_cache_dirs(&mut collector, &self.locations, PYTHON_CACHES);
        collector.add_stale_dirs(&self.locations.project_roots(), &PYCACHE);
        Ok(collector.finish())
    }
}

// --- .NET ---

const DOTNET_CACHES: &[CacheDir] = &[
    (Base::Home, &[".nuget", "packages"], "NuGet global packages", RiskLevel::Low),
    (Base::Local, &["NuGet", "v3-cache"], "NuGet HTTP cache", RiskLevel::Safe),
    (Base::Local, &["NuGet", "plugins-cache"], "NuGet plugins cache", RiskLevel::Safe),
    (Base::Temp, &["NuGetScratch"], "NuGet scratch files", RiskLevel::Safe),
    (Base::Local, &["Microsoft", "dotnet", "sdk-advertising"], ".NET SDK advertising cache", RiskLevel::Safe),
    (Base::Local, &["Microsoft", "dotnet", "toolResolverCache"], ".NET tool resolver cache", RiskLevel::Safe),
];

pub struct DevDotnet {
    locations: Locations,
}

impl DevDotnet {
    pub fn new(locations: &Locations) -> Self {
        DevDotnet {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevDotnet {
    describe!(
        "dev_dotnet",
        ".NET / C# Developer Caches",
        "NuGet packages, NuGet temp files, Visual Studio caches",
        RiskLevel::Low
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        add_cache_dirs(&mut collector, &self.locations, DOTNET_CACHES);

        // One ComponentModelCache / MEFCacheData per installed VS instance
        if let Some(vs) = resolve(&self.locations, Base::Local, &["Microsoft", "VisualStudio"]) {
            if let Ok(read_dir) = std::fs::read_dir(&vs) {
                let mut instances: Vec<_> = read_dir.flatten().map(|e| e.path()).collect();
                instances.sort();
                for instance in instances {
                    collector.add_dir(&instance.join("ComponentModelCache"), "Visual Studio component cache");
                    collector.add_dir(&instance.join("MEFCacheData"), "Visual Studio MEF cache");
                }
            }
        }

        Ok(collector.finish())
    }
}

// --- Java / Android ---

const JAVA_CACHES: &[CacheDir] = &[
    (Base::Home, &[".gradle", "caches"], "Gradle caches", RiskLevel::Safe),
    (Base::Home, &[".gradle", "wrapper", "dists"], "Gradle wrapper distributions", RiskLevel::Safe),
    (Base::Home, &[".gradle", "daemon"], "Gradle daemon logs", RiskLevel::Safe),
    (Base::Home, &[".m2", "repository"], "Maven local repository", RiskLevel::Low),
    (Base::Local, &["Android", "Sdk", ".downloadIntermediates"], "Android SDK download cache", RiskLevel::Safe),
    (Base::Local, &["Android", "Sdk", ".temp"], "Android SDK temp", RiskLevel::Safe),
    (Base::Home, &[".android", "cache"], "Android cache", RiskLevel::Safe),
    (Base::Local, &["kotlin", "daemon"], "Kotlin daemon logs", RiskLevel::Safe),
];

pub struct DevJava {
    locations: Locations,
}

impl DevJava {
    pub fn new(locations: &Locations) -> Self {
        DevJava {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevJava {
    describe!(
        "dev_java",
        "Java / Android Developer Caches",
        "Gradle caches, Maven .m2 repository, Android SDK temp",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        add_cache_dirs(&mut collector, &self.locations, JAVA_CACHES);
        Ok(collector.finish())
    }
}

// --- Rust & Go ---

const RUST_GO_CACHES: &[CacheDir] = &[
    (Base::CargoHome, &["registry", "cache"], "Cargo registry cache (.crate files)", RiskLevel::Safe),
    (Base::CargoHome, &["registry", "src"], "Cargo registry sources", RiskLevel::Safe),
    (Base::CargoHome, &["git", "db"], "Cargo git database", RiskLevel::Safe),
    (Base::CargoHome, &["git", "checkouts"], "Cargo git checkouts", RiskLevel::Safe),
    (Base::GoPath, &["pkg", "mod", "cache"], "Go module download cache", RiskLevel::Safe),
    (Base::Local, &["go-build"], "Go build cache", RiskLevel::Safe),
];

const STALE_TARGET: StaleDirs = StaleDirs {
    dir_name: "target",
    marker: Some("Cargo.toml"),
    min_age_days: 30,
    min_bytes: 10_000_000,
    max_depth: 5,
    label: "Stale Rust target/ (>30d old)",
    risk: RiskLevel::Safe,
};

pub struct DevRustGo {
    locations: Locations,
}

impl DevRustGo {
    pub fn new(locations: &Locations) -> Self {
        DevRustGo {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevRustGo {
    describe!(
        "dev_rust_go",
        "Rust & Go Developer Caches",
        "Cargo registry cache, Go module cache, stale target/ directories",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);
        add_cache_dirs(&mut collector, &self.locations, RUST_GO_CACHES);
        collector.add_stale_dirs(&self.locations.project_roots(), &STALE_TARGET);
        Ok(collector.finish())
    }
}

// --- Docker ---

const DOCKER_CACHES: &[CacheDir] = &[
    (Base::Local, &["Docker", "wsl", "distro"], "Docker Desktop WSL distro data", RiskLevel::Medium),
    (Base::Local, &["Docker", "log"], "Docker Desktop logs", RiskLevel::Safe),
    (Base::Roaming, &["Docker Desktop", "Cache"], "Docker Desktop cache", RiskLevel::Safe),
    (Base::Roaming, &["Docker Desktop", "Code Cache"], "Docker Desktop code cache", RiskLevel::Safe),
    (Base::Roaming, &["Docker Desktop", "GPUCache"], "Docker Desktop GPU cache", RiskLevel::Safe),
    (Base::Home, &[".docker", "buildx"], "Docker buildx cache", RiskLevel::Medium),
];

pub struct DevDocker {
    locations: Locations,
}

impl DevDocker {
    pub fn new(locations: &Locations) -> Self {
        DevDocker {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevDocker {
    describe!(
        "dev_docker",
        "Docker Desktop Caches",
        "Docker Desktop WSL2 disk, image layers, build cache",
        RiskLevel::Medium
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);

        // The WSL2 virtual disk holds every image and volume; only ever MEDIUM
        if let Some(data) = resolve(&self.locations, Base::Local, &["Docker", "wsl", "data"]) {
            collector.add_children(&data, "Docker Desktop WSL2 virtual disk", |name, is_dir| {
                !is_dir && name.to_ascii_lowercase().ends_with(".vhdx")
            });
        }
        add_cache_dirs(&mut collector, &self.locations, DOCKER_CACHES);

        Ok(collector.finish())
    }
}

// --- IDEs and editors ---

const ELECTRON_EDITORS: &[(&str, &str)] = &[
    ("Code", "VS Code"),
    ("Code - Insiders", "VS Code Insiders"),
    ("Windsurf", "Windsurf"),
    ("Cursor", "Cursor"),
];

const ELECTRON_CACHE_SUBDIRS: &[&str] = &["Cache", "CachedData", "Code Cache", "GPUCache", "logs"];

const JETBRAINS_CACHE_SUBDIRS: &[&str] = &["caches", "log", "index"];

const IDE_CACHES: &[CacheDir] = &[
    (Base::Roaming, &["Sublime Text", "Cache"], "Sublime Text cache", RiskLevel::Safe),
    (Base::Local, &["Unity", "cache"], "Unity cache", RiskLevel::Safe),
];

pub struct DevIde {
    locations: Locations,
}

impl DevIde {
    pub fn new(locations: &Locations) -> Self {
        DevIde {
            locations: locations.clone(),
        }
    }
}

impl Rule for DevIde {
    describe!(
        "dev_ide",
        "IDE & Editor Caches",
        "VS Code, JetBrains, Unity editor caches",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);

        if let Some(roaming) = &self.locations.roaming_data {
            for (dir, editor) in ELECTRON_EDITORS {
                for sub in ELECTRON_CACHE_SUBDIRS {
                    collector.add_dir(&roaming.join(dir).join(sub), &format!("{editor} {sub}"));
                }
            }
        }

        if let Some(jetbrains) = resolve(&self.locations, Base::Local, &["JetBrains"]) {
            if let Ok(read_dir) = std::fs::read_dir(&jetbrains) {
                let mut products: Vec<_> = read_dir.flatten().map(|e| e.path()).collect();
                products.sort();
                for product in products {
                    let name = product
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    for sub in JETBRAINS_CACHE_SUBDIRS {
                        collector.add_dir(&product.join(sub), &format!("JetBrains {name} {sub}"));
                    }
                }
            }
        }

        add_cache_dirs(&mut collector, &self.locations, IDE_CACHES);
        Ok(collector.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::fs;

    fn write_bytes(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    fn age_dir(path: &Path, days: i64) {
        let when = FileTime::from_unix_time(chrono::Utc::now().timestamp() - days * 86_400, 0);
        filetime::set_file_mtime(path, when).unwrap();
    }

    #[test]
    fn stale_node_modules_requires_age_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let projects = locations.home.clone().unwrap().join("Projects");

        let old_big = projects.join("old/node_modules");
        write_bytes(&old_big.join("pkg/index.js"), 1_100_000);
        age_dir(&old_big, 90);

        let old_small = projects.join("tiny/node_modules");
        write_bytes(&old_small.join("pkg/index.js"), 10);
        age_dir(&old_small, 90);

        let fresh = projects.join("fresh/node_modules");
        write_bytes(&fresh.join("pkg/index.js"), 1_100_000);

        let category = DevNodejs::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 1);
        let found = Path::new(&category.items[0].path);
        assert_eq!(found, old_big.as_path());
        assert_eq!(category.items[0].risk, RiskLevel::Low);
    }

    #[test]
    fn rust_target_needs_a_cargo_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let projects = locations.home.clone().unwrap().join("dev");

        let crate_target = projects.join("crate/target");
        write_bytes(&crate_target.join("debug/big"), 10_100_000);
        fs::write(projects.join("crate/Cargo.toml"), b"[package]").unwrap();
        age_dir(&crate_target, 60);

        let other_target = projects.join("other/target");
        write_bytes(&other_target.join("debug/big"), 10_100_000);
        age_dir(&other_target, 60);

        let category = DevRustGo::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 1);
        assert_eq!(Path::new(&category.items[0].path), crate_target.as_path());
    }

    #[test]
    fn cargo_registry_cache_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let cache = locations.cargo_home.clone().unwrap().join("registry/cache/index");
        write_bytes(&cache.join("serde-1.0.crate"), 64);

        let category = DevRustGo::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 1);
        assert_eq!(category.items[0].label, "Cargo registry cache (.crate files)");
        assert_eq!(category.items[0].size_bytes, Some(64));
    }

    #[test]
    fn docker_vhdx_is_medium_risk() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let data = locations.local_data.clone().unwrap().join("Docker/wsl/data");
        write_bytes(&data.join("ext4.vhdx"), 128);

        let category = DevDocker::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 1);
        assert_eq!(category.items[0].risk, RiskLevel::Medium);
    }
}
