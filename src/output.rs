use std::collections::BTreeMap;
use std::path::Path;

use colored::{ColoredString, Colorize};

use sysclean::cleaner::Summary;
use sysclean::config::Profile;
use sysclean::disk_info::DiskInfo;
use sysclean::model::{AuditRecord, Category, Item, Outcome, RiskLevel, ScanError, ScanResult};
use sysclean::utils::{display_path, format_size};

fn risk_tag(risk: RiskLevel) -> ColoredString {
    let tag = format!("[{}]", risk.tag());
    match risk {
        RiskLevel::Safe => tag.green(),
        RiskLevel::Low => tag.cyan(),
        RiskLevel::Medium => tag.yellow(),
        RiskLevel::Registry => tag.magenta(),
    }
}

pub fn print_scan_header(category: &Category) {
    println!(
        "{} {}",
        format!("=== {} ===", category.display_name).bold().white(),
        risk_tag(category.risk)
    );
}

pub fn print_scan_entry(item: &Item) {
    let size = item.size_bytes.map(format_size).unwrap_or_else(|| "-".to_string());
    let label = if item.label.is_empty() {
        String::new()
    } else {
        format!("  ({})", item.label)
    };
    println!(
        "  {}  {}{}",
        display_path(&item.path).dimmed(),
        size.yellow(),
        label.dimmed()
    );
}

pub fn print_category_total(category: &Category) {
    println!(
        "  {} {}  {}",
        format!("{} total:", category.display_name).bold(),
        format_size(category.total_bytes()).green(),
        format!(
            "{} items, {} ms",
            category.item_count(),
            category.scan_duration.as_millis()
        )
        .dimmed()
    );
    println!();
}

/// Per-category listing followed by the summary table.
pub fn print_scan(result: &ScanResult, show_items: bool) {
    for category in &result.categories {
        if category.items.is_empty() {
            continue;
        }
        print_scan_header(category);
        if show_items {
            for item in &category.items {
                print_scan_entry(item);
            }
        }
        print_category_total(category);
    }

    print_summary_header();
    for category in &result.categories {
        let size = if category.items.is_empty() {
            "nothing found".dimmed().to_string()
        } else {
            format_size(category.total_bytes())
        };
        print_summary_row(&category.display_name, &size);
    }
    print_separator();
    print_grand_total(&format_size(result.total_bytes()));
    print_info(&format!(
        "{} items in {} categories, scanned in {:.1}s",
        result.item_count(),
        result.categories.len(),
        result.scan_duration.as_secs_f64()
    ));

    print_scan_errors(&result.errors);
    print_overlaps(&result.overlapping_paths());
}

pub fn print_summary_header() {
    println!("{}", "=== Summary ===".bold().white());
}

pub fn print_summary_row(label: &str, size: &str) {
    println!("  {:<40} {}", label, size.green());
}

pub fn print_separator() {
    println!("  {}", "─".repeat(55).dimmed());
}

pub fn print_grand_total(total: &str) {
    println!(
        "  {:<40} {}",
        "Total reclaimable:".bold(),
        total.green().bold()
    );
    println!();
}

pub fn print_scan_errors(errors: &[ScanError]) {
    for e in errors {
        print_warning(&format!("{}: {}", e.rule, e.message));
    }
}

pub fn print_overlaps(overlaps: &BTreeMap<String, Vec<String>>) {
    if overlaps.is_empty() {
        return;
    }
    print_warning(&format!(
        "{} paths are claimed by more than one rule and counted once per rule:",
        overlaps.len()
    ));
    for (path, rules) in overlaps {
        println!("  {}  {}", display_path(path).dimmed(), rules.join(", ").yellow());
    }
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "Warning:".red().bold(), msg.red());
}

pub fn print_info(msg: &str) {
    println!("{} {}", "Info:".cyan().bold(), msg);
}

pub fn print_no_confirm_warning() {
    println!(
        "{}",
        "No --confirm flag provided. Running as a dry run."
            .yellow()
            .bold()
    );
    println!();
}

pub fn print_record(record: &AuditRecord) {
    let size = record
        .size_bytes
        .map(format_size)
        .unwrap_or_else(|| "-".to_string());
    match record.outcome {
        Outcome::Succeeded => println!(
            "  {} {}  {}",
            "Deleted".red(),
            display_path(&record.path).dimmed(),
            size.yellow()
        ),
        Outcome::SucceededDryRun => println!(
            "  {} {}  {}",
            "Would delete".yellow(),
            display_path(&record.path).dimmed(),
            size.yellow()
        ),
        Outcome::Failed => println!(
            "  {} {}: {}",
            "Failed".red().bold(),
            display_path(&record.path).dimmed(),
            record.error.as_deref().unwrap_or("unknown error").red()
        ),
    }
}

pub fn print_clean_report(records: &[AuditRecord], dry_run: bool, log_path: &Path, show_items: bool) {
    if show_items {
        for record in records {
            print_record(record);
        }
        println!();
    } else {
        for record in records.iter().filter(|r| r.outcome == Outcome::Failed) {
            print_record(record);
        }
    }

    let summary = Summary::from_records(records);
    if dry_run {
        println!(
            "{} {} in {} items would be freed.",
            "Dry run:".yellow().bold(),
            format_size(summary.bytes_reclaimed).green(),
            summary.succeeded
        );
        println!(
            "{}",
            "Run `sysclean clean --confirm` to delete.".yellow().bold()
        );
    } else {
        println!(
            "{} {}",
            "Cleaned!".green().bold(),
            format!("{} freed.", format_size(summary.bytes_reclaimed)).green()
        );
    }
    if summary.failed > 0 {
        print_warning(&format!("{} items could not be deleted", summary.failed));
    }
    print_info(&format!("Audit log: {}", log_path.display()));
}

pub fn print_profiles(profiles: &[Profile]) {
    println!("{}", "=== Profiles ===".bold().white());
    for profile in profiles {
        println!("  {:<12} {}", profile.name.bold(), profile.description);
        println!("  {:<12} {}", "", profile.rules.join(", ").dimmed());
    }
}

pub fn print_disks(disks: &[DiskInfo]) {
    println!("{}", "=== Volumes ===".bold().white());
    for disk in disks {
        let used = format!("{:.0}%", disk.usage_percent());
        let used = if disk.usage_percent() >= 90.0 {
            used.red().bold()
        } else {
            used.green()
        };
        println!(
            "  {:<20} {:>12} free of {:>12}  {}  {}",
            disk.mount_point,
            format_size(disk.available),
            format_size(disk.total),
            used,
            disk.file_system.dimmed()
        );
    }
}
