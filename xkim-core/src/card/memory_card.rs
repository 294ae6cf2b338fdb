//! In-memory card storage.

use std::collections::BTreeMap;

use super::storage::{to_8_3, CardStorage};
use crate::disk::ClockRecord;
use crate::error::XkimResult;

/// Card contents held in memory, listed in name order.
#[derive(Default, Clone)]
pub struct MemoryCard {
    files: BTreeMap<String, Vec<u8>>,
    clock: ClockRecord,
}

impl MemoryCard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with initial files.
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let files = files
            .into_iter()
            .map(|(k, v)| (to_8_3(k.as_ref()), v))
            .collect();
        Self {
            files,
            clock: ClockRecord::default(),
        }
    }

    /// Add a file from string content.
    pub fn add_file_str(&mut self, name: &str, content: &str) {
        self.files.insert(to_8_3(name), content.as_bytes().to_vec());
    }

    /// Fix the reading returned by the card's clock.
    pub fn set_clock(&mut self, clock: ClockRecord) {
        self.clock = clock;
    }
}

impl CardStorage for MemoryCard {
    fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(&to_8_3(name)).cloned()
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> XkimResult<()> {
        self.files.insert(to_8_3(name), data.to_vec());
        Ok(())
    }

    fn list_files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(&to_8_3(name))
    }

    fn clock(&self) -> ClockRecord {
        self.clock
    }
}
