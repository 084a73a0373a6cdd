mod cli;
mod output;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cli::{Cli, Command, ScanArgs};
use sysclean::config::{self, AppConfig, ExclusionConfig, BUILTIN_PROFILES};
use sysclean::registry::{self, OrphanAnalyzer};
use sysclean::{audit, disk_info, filter, logging, rules, Cleaner, Locations, ScanResult, Scanner};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let app = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        AppConfig::default()
    });
    let exclusions = ExclusionConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read exclusions, using none");
        ExclusionConfig::default()
    });

    match cli.command {
        Command::Scan { scan } => {
            let result = run_scan(&scan, &app, &exclusions)?;
            output::print_scan(&result, cli.verbose);
        }
        Command::Clean {
            scan,
            confirm,
            log_dir,
        } => {
            let dry_run = !confirm || app.dry_run;
            if !confirm {
                output::print_no_confirm_warning();
            }
            let result = run_scan(&scan, &app, &exclusions)?;
            output::print_scan(&result, false);
            run_clean(result, dry_run, log_dir.unwrap_or_else(|| app.log_dir.clone()), cli.verbose)?;
        }
        Command::Profiles => output::print_profiles(BUILTIN_PROFILES),
        Command::Disk => output::print_disks(&disk_info::get_disk_info()),
    }

    Ok(())
}

/// Rule names to run: explicit categories win over a profile, which wins
/// over the configured default profile.
fn selection(args: &ScanArgs, app: &AppConfig) -> Result<HashSet<String>> {
    if !args.categories.is_empty() {
        let locations = Locations::default();
        let unknown: Vec<&str> = args
            .categories
            .iter()
            .map(String::as_str)
            .filter(|&name| name != registry::RULE_NAME && rules::find_rule(name, &locations).is_none())
            .collect();
        if !unknown.is_empty() {
            bail!(
                "unknown category: {} (known: {})",
                unknown.join(", "),
                rules::rule_names().join(", ")
            );
        }
        return Ok(args.categories.iter().cloned().collect());
    }

    let name = args.profile.as_deref().unwrap_or(&app.default_profile);
    let profile = config::find_profile(name)?;
    Ok(profile.rule_set())
}

fn run_scan(args: &ScanArgs, app: &AppConfig, exclusions: &ExclusionConfig) -> Result<ScanResult> {
    let mut selected = selection(args, app)?;
    if args.include_registry {
        selected.insert(registry::RULE_NAME.to_string());
    }

    let locations = Locations::detect();
    let mut scanner = Scanner::with_builtin_rules(&locations);
    if let Some(threads) = args.threads {
        scanner = scanner.threads(threads);
    }
    if selected.contains(registry::RULE_NAME) {
        scanner.push(Box::new(OrphanAnalyzer::system()));
    }

    let result = scanner.run_all(Some(&selected));

    let mut options = exclusions
        .filter_options(app)
        .context("invalid exclusion settings")?;
    if let Some(days) = args.min_age {
        options.min_age_days = (days > 0).then_some(days);
    }
    if let Some(size) = &args.min_size {
        let bytes = sysclean::utils::parse_size(size)
            .map_err(|e| anyhow::anyhow!("invalid --min-size: {e}"))?;
        options.min_size_bytes = (bytes > 0).then_some(bytes);
    }
    options.excluded_paths.extend(args.exclude.iter().cloned());

    if options.is_empty() {
        Ok(result)
    } else {
        Ok(filter::apply(&result, &options))
    }
}

fn run_clean(mut result: ScanResult, dry_run: bool, log_dir: PathBuf, verbose: bool) -> Result<()> {
    result.select_all(true);
    let items = result.selected_items();
    if items.is_empty() {
        output::print_info("Nothing to clean.");
        return Ok(());
    }

    let log_path = audit::default_log_path(&log_dir);
    let records = Cleaner::new()
        .delete_selected(&items, dry_run, &log_path)
        .with_context(|| format!("audit log {} failed", log_path.display()))?;

    output::print_clean_report(&records, dry_run, &log_path, verbose);
    Ok(())
}
