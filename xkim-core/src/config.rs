//! Monitor configuration, loaded from a JSON file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XkimResult;
use crate::link::LinkConfig;

/// Default location of the auto-run register.
pub const DEFAULT_AUTORUN_VECTOR: u16 = 0xDFF8;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    /// Handshake timeout in milliseconds. Absent means wait forever, as the
    /// hardware does.
    pub link_timeout_ms: Option<u64>,

    /// Address of the two-byte (little-endian) auto-run register.
    pub autorun_vector: u16,

    /// Host directory served as the SD card.
    pub card_directory: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            link_timeout_ms: None,
            autorun_vector: DEFAULT_AUTORUN_VECTOR,
            card_directory: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a file, or the defaults if it doesn't exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> XkimResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Link settings derived from this configuration.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            timeout: self.link_timeout_ms.map(Duration::from_millis),
        }
    }
}
