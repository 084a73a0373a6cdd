use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "sysclean",
    about = "Find and remove reclaimable disk space, with an audited deletion log",
    version
)]
pub struct Cli {
    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan for reclaimable space (never deletes)
    Scan {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Delete everything the scan finds (dry run unless --confirm)
    Clean {
        #[command(flatten)]
        scan: ScanArgs,

        /// Actually delete. Without this flag only the checks run.
        #[arg(long)]
        confirm: bool,

        /// Directory for the audit log (defaults to the configured log_dir)
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// List the built-in cleanup profiles
    Profiles,

    /// Show free space per volume
    Disk,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Cleanup profile (minimal, standard, frontend, backend, fullstack, everything)
    #[arg(long)]
    pub profile: Option<String>,

    /// Only run this rule; repeatable. Overrides --profile.
    #[arg(long = "category", value_name = "NAME")]
    pub categories: Vec<String>,

    /// Also look for orphaned registry entries
    #[arg(long)]
    pub include_registry: bool,

    /// Skip items modified within this many days
    #[arg(long, value_name = "DAYS")]
    pub min_age: Option<u64>,

    /// Skip items smaller than this (e.g. "10MB")
    #[arg(long, value_name = "SIZE")]
    pub min_size: Option<String>,

    /// Never touch this exact path; repeatable
    #[arg(long, value_name = "PATH")]
    pub exclude: Vec<String>,

    /// Worker threads for the scan
    #[arg(long)]
    pub threads: Option<usize>,
}
