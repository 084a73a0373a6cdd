//! Rule-driven disk cleanup.
//!
//! The pipeline is: [`rules`] → [`scanner::Scanner`] → [`filter::apply`] →
//! selection by the caller → [`cleaner::Cleaner::delete_selected`], with the
//! [`registry::OrphanAnalyzer`] as an opt-in extra rule. Every deletion
//! attempt is recorded by [`audit::AuditLog`].

pub mod audit;
pub mod cleaner;
pub mod config;
pub mod disk_info;
pub mod error;
pub mod filter;
pub mod logging;
pub mod model;
pub mod registry;
pub mod rules;
pub mod safety;
pub mod scanner;
pub mod utils;

pub use cleaner::{Cleaner, Summary};
pub use filter::FilterOptions;
pub use model::{AuditRecord, Category, Item, ItemKind, Outcome, RiskLevel, ScanError, ScanResult};
pub use rules::{Locations, Rule};
pub use scanner::{Scanner, StopFlag};
