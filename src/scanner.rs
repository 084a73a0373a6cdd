//! The scan engine: runs every selected rule and aggregates the results.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::error::RuleError;
use crate::model::{Category, ScanError, ScanResult};
use crate::rules::{self, Locations, Rule};

/// Cooperative cancellation shared between the caller and a running engine.
///
/// Checked between rules while scanning and between items while deleting.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Scanner {
    rules: Vec<Box<dyn Rule>>,
    threads: Option<usize>,
    stop: StopFlag,
}

impl Scanner {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Scanner {
            rules,
            threads: None,
            stop: StopFlag::new(),
        }
    }

    /// A scanner over the built-in rule registry.
    pub fn with_builtin_rules(locations: &Locations) -> Self {
        Self::new(rules::all_rules(locations))
    }

    /// Append an extra producer (e.g. the orphan analyzer) after the registry.
    pub fn push(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Bound the worker pool. Defaults to rayon's global pool.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads.max(1));
        self
    }

    pub fn stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule, or only those named in `selected`.
    pub fn run_all(&self, selected: Option<&HashSet<String>>) -> ScanResult {
        self.run_with_progress(selected, |_, _, _| {})
    }

    /// Like [`Scanner::run_all`], calling `progress_fn(completed, total, rule)`
    /// as each rule starts.
    pub fn run_with_progress(
        &self,
        selected: Option<&HashSet<String>>,
        progress_fn: impl Fn(usize, usize, &str) + Send + Sync,
    ) -> ScanResult {
        let started = Instant::now();

        let active: Vec<&dyn Rule> = self
            .rules
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| selected.map_or(true, |names| names.contains(r.name())))
            .collect();

        if let Some(names) = selected {
            for name in names {
                if !self.rules.iter().any(|r| r.name() == name) {
                    tracing::warn!(rule = %name, "selected rule is not registered");
                }
            }
        }

        let total = active.len();
        let completed = AtomicUsize::new(0);

        let run = || -> Vec<Option<(Category, Option<ScanError>)>> {
            // Indexed collect keeps registration order whatever finishes first
            active
                .par_iter()
                .map(|rule| {
                    if self.stop.is_stopped() {
                        tracing::debug!(rule = rule.name(), "scan stopped before rule started");
                        return None;
                    }
                    progress_fn(completed.load(Ordering::Relaxed), total, rule.name());
                    let outcome = run_isolated(*rule);
                    completed.fetch_add(1, Ordering::Relaxed);
                    Some(outcome)
                })
                .collect()
        };

        let outcomes = match self.threads {
            Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot build scan pool, using the global pool");
                    run()
                }
            },
            None => run(),
        };

        let mut result = ScanResult::default();
        for (mut category, failure) in outcomes.into_iter().flatten() {
            result.errors.append(&mut category.errors);
            result.errors.extend(failure);
            result.categories.push(category);
        }
        result.scan_duration = started.elapsed();

        tracing::info!(
            categories = result.categories.len(),
            items = result.item_count(),
            bytes = result.total_bytes(),
            errors = result.errors.len(),
            elapsed_ms = result.scan_duration.as_millis() as u64,
            "scan finished"
        );
        result
    }
}

/// Run one rule, turning an error or a panic into an empty category plus an
/// error entry.
fn run_isolated(rule: &dyn Rule) -> (Category, Option<ScanError>) {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.scan()))
        .unwrap_or_else(|payload| Err(RuleError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(mut category) => {
            category.scan_duration = started.elapsed();
            tracing::info!(
                rule = rule.name(),
                items = category.item_count(),
                bytes = category.total_bytes(),
                "rule finished"
            );
            (category, None)
        }
        Err(e) => {
            tracing::warn!(rule = rule.name(), error = %e, "rule failed");
            let mut empty = Category::new(
                rule.name(),
                rule.display_name(),
                rule.description(),
                rule.default_risk(),
            );
            empty.scan_duration = started.elapsed();
            (empty, Some(ScanError::new(rule.name(), e.to_string())))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
