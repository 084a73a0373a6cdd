use crate::error::RuleError;
use crate::model::{Category, RiskLevel};
use crate::rules::{describe, Collector, Locations, Rule};

const LOG_EXTENSIONS: &[&str] = &["log", "etl", "old", "bak"];

fn is_log_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| LOG_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub struct LogsReports {
    locations: Locations,
}

impl LogsReports {
    pub fn new(locations: &Locations) -> Self {
        LogsReports {
            locations: locations.clone(),
        }
    }
}

impl Rule for LogsReports {
    describe!(
        "logs_reports",
        "Logs & Error Reports",
        "Windows log files, error reports (WER), and crash dump files",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);

        if let Some(root) = &self.locations.system_root {
            collector.add_files_recursive(&root.join("Logs"), "Windows log", is_log_file);
        }

        if let Some(local) = &self.locations.local_data {
            collector.add_dir(&local.join("Microsoft").join("Windows").join("WER"), "User error report");
        }
        if let Some(program_data) = &self.locations.program_data {
            collector.add_dir(
                &program_data.join("Microsoft").join("Windows").join("WER"),
                "System error report",
            );
        }

        if let Some(root) = &self.locations.system_root {
            collector.add_children(&root.join("Minidump"), "BSOD minidump", |_, is_dir| !is_dir);
        }
        if let Some(local) = &self.locations.local_data {
            collector.add_children(&local.join("CrashDumps"), "User crash dump", |_, is_dir| !is_dir);
        }

        if let Some(root) = &self.locations.system_root {
            collector.add_file(&root.join("MEMORY.DMP"), "Full memory dump (can be very large)");
        }

        Ok(collector.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn log_extensions_are_case_insensitive() {
        assert!(is_log_file("setup.LOG"));
        assert!(is_log_file("trace.etl"));
        assert!(!is_log_file("readme.txt"));
        assert!(!is_log_file("log"));
    }

    #[test]
    fn collects_logs_dumps_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let windows = locations.system_root.clone().unwrap();
        fs::create_dir_all(windows.join("Logs/CBS")).unwrap();
        fs::write(windows.join("Logs/CBS/CBS.log"), b"log").unwrap();
        fs::write(windows.join("Logs/CBS/notes.txt"), b"keep").unwrap();
        fs::create_dir_all(windows.join("Minidump")).unwrap();
        fs::write(windows.join("Minidump/0101.dmp"), b"dump").unwrap();
        fs::write(windows.join("MEMORY.DMP"), b"memory").unwrap();
        let wer = locations
            .program_data
            .clone()
            .unwrap()
            .join("Microsoft/Windows/WER/ReportQueue");
        fs::create_dir_all(&wer).unwrap();
        fs::write(wer.join("report.wer"), b"wer").unwrap();

        let category = LogsReports::new(&locations).scan().unwrap();
        let labels: Vec<_> = category.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Windows log",
                "System error report",
                "BSOD minidump",
                "Full memory dump (can be very large)"
            ]
        );
    }
}
