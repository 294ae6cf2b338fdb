//! Card storage backed by a host directory.

use std::fs;
use std::path::PathBuf;

use chrono::{Datelike, Local, Timelike};
use log::warn;

use super::storage::{to_8_3, CardStorage};
use crate::disk::{ClockRecord, MAX_FILENAME};
use crate::error::XkimResult;

/// Serves the regular files of one host directory as the card's contents.
///
/// Host names are matched case-insensitively; new files are created under
/// their 8.3 name. Host files whose names do not fit on the card are not
/// listed.
pub struct DirectoryCard {
    root: PathBuf,
}

impl DirectoryCard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host path of an existing file matching `name`.
    fn find(&self, name: &str) -> Option<PathBuf> {
        let wanted = to_8_3(name);
        self.entries()
            .into_iter()
            .find(|(card_name, _)| *card_name == wanted)
            .map(|(_, path)| path)
    }

    /// (card name, host path) for every listable file.
    fn entries(&self) -> Vec<(String, PathBuf)> {
        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) => {
                warn!("[CARD] cannot read {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };
        let mut entries: Vec<(String, PathBuf)> = dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let host = entry.file_name().into_string().ok()?;
                let upper = host.to_uppercase();
                (upper.len() <= MAX_FILENAME && upper == to_8_3(&host))
                    .then(|| (upper, entry.path()))
            })
            .collect();
        entries.sort();
        entries
    }
}

impl CardStorage for DirectoryCard {
    fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.find(name)?;
        match fs::read(&path) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("[CARD] cannot read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> XkimResult<()> {
        let path = self
            .find(name)
            .unwrap_or_else(|| self.root.join(to_8_3(name)));
        fs::write(path, data)?;
        Ok(())
    }

    fn list_files(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }

    fn clock(&self) -> ClockRecord {
        let now = Local::now();
        ClockRecord {
            month: now.month() as u8,
            day: now.day() as u8,
            year: (now.year().rem_euclid(100)) as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            day_of_week: now.weekday().num_days_from_sunday() as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xkim-card-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_lists_only_card_names() {
        let dir = scratch_dir("list");
        fs::write(dir.join("game.hex"), b"x").unwrap();
        fs::write(dir.join("B.TXT"), b"y").unwrap();
        fs::write(dir.join("much-too-long-for-a-card.txt"), b"z").unwrap();
        fs::create_dir(dir.join("SUB")).unwrap();

        let card = DirectoryCard::new(&dir);
        assert_eq!(card.list_files(), vec!["B.TXT".to_string(), "GAME.HEX".to_string()]);
        assert_eq!(card.read_file("GAME.HEX"), Some(b"x".to_vec()));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_replaces_existing_host_file() {
        let dir = scratch_dir("write");
        fs::write(dir.join("save.hex"), b"old").unwrap();

        let mut card = DirectoryCard::new(&dir);
        card.write_file("SAVE.HEX", b"new").unwrap();
        card.write_file("fresh.hex", b"1").unwrap();

        assert_eq!(fs::read(dir.join("save.hex")).unwrap(), b"new");
        assert_eq!(fs::read(dir.join("FRESH.HEX")).unwrap(), b"1");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_clock_fields_in_range() {
        let clock = DirectoryCard::new(".").clock();
        assert!((1..=12).contains(&clock.month));
        assert!((1..=31).contains(&clock.day));
        assert!(clock.year < 100);
        assert!(clock.day_of_week < 7);
    }
}
