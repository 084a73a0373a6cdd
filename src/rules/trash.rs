use crate::error::RuleError;
use crate::model::{Category, RiskLevel};
use crate::rules::{describe, Collector, Locations, Rule};

pub struct RecycleBin {
    locations: Locations,
}

impl RecycleBin {
    pub fn new(locations: &Locations) -> Self {
        RecycleBin {
            locations: locations.clone(),
        }
    }
}

impl Rule for RecycleBin {
    describe!(
        "recycle_bin",
        "Recycle Bin",
        "Deleted files in the Recycle Bin on all drives",
        RiskLevel::Safe
    );

    fn scan(&self) -> Result<Category, RuleError> {
        let mut collector = Collector::for_rule(self);

        for drive in &self.locations.drives {
            let label = format!("Recycle Bin ({})", drive.display());
            collector.add_dir(&drive.join("$Recycle.Bin"), &label);
        }

        // freedesktop trash outside Windows
        if self.locations.drives.is_empty() {
            if let Some(data) = &self.locations.roaming_data {
                collector.add_dir(&data.join("Trash"), "Trash");
            }
        }

        Ok(collector.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn recycle_bin_is_one_directory_item_per_drive() {
        let dir = tempfile::tempdir().unwrap();
        let locations = Locations::under(dir.path());
        let bin = dir.path().join("$Recycle.Bin/S-1-5-21");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("$RABC.txt"), b"deleted").unwrap();

        let category = RecycleBin::new(&locations).scan().unwrap();
        assert_eq!(category.items.len(), 1);
        assert_eq!(category.items[0].size_bytes, Some(7));
    }

    #[test]
    fn empty_recycle_bin_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("$Recycle.Bin")).unwrap();
        let category = RecycleBin::new(&Locations::under(dir.path())).scan().unwrap();
        assert!(category.items.is_empty());
    }
}
