//! CardStorage trait - flat file store behind the simulated SD card.

use crate::disk::ClockRecord;
use crate::error::XkimResult;

/// Flat file store on the card. There are no directories; all filenames
/// are normalized to 8.3 form.
pub trait CardStorage: Send {
    /// Read file content. Returns None if file does not exist.
    fn read_file(&self, name: &str) -> Option<Vec<u8>>;

    /// Create or replace a file.
    fn write_file(&mut self, name: &str, data: &[u8]) -> XkimResult<()>;

    /// List all files, in listing order.
    fn list_files(&self) -> Vec<String>;

    /// Check if file exists.
    fn exists(&self, name: &str) -> bool {
        self.read_file(name).is_some()
    }

    /// Current time on the card's clock.
    fn clock(&self) -> ClockRecord {
        ClockRecord::default()
    }
}

/// Convert filename to 8.3 format, the form names take on the card.
///
/// - Uppercases everything
/// - Truncates name to 8 chars, extension to 3 chars
/// - Drops characters the card firmware can't store
///
/// # Examples
/// ```
/// use xkim_core::card::to_8_3;
/// assert_eq!(to_8_3("game.hex"), "GAME.HEX");
/// assert_eq!(to_8_3("monitorpatch.hexfile"), "MONITORP.HEX");
/// assert_eq!(to_8_3("noext"), "NOEXT");
/// ```
pub fn to_8_3(filename: &str) -> String {
    let upper = filename.trim().to_uppercase();
    let (name, ext) = match upper.rfind('.') {
        Some(pos) => (&upper[..pos], &upper[pos + 1..]),
        None => (upper.as_str(), ""),
    };

    fn clean(s: &str, max: usize) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric() || "$#@!%'`(){}~^-_".contains(*c))
            .take(max)
            .collect()
    }

    let name = match clean(name, 8) {
        n if n.is_empty() => "_".to_string(),
        n => n,
    };
    let ext = clean(ext, 3);

    if ext.is_empty() {
        name
    } else {
        format!("{}.{}", name, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_8_3_basic() {
        assert_eq!(to_8_3("hello.hex"), "HELLO.HEX");
        assert_eq!(to_8_3("HELLO.HEX"), "HELLO.HEX");
    }

    #[test]
    fn test_to_8_3_fits_wire_limit() {
        let name = to_8_3("averyveryverylongname.extension");
        assert_eq!(name, "AVERYVER.EXT");
        assert!(name.len() <= crate::disk::MAX_FILENAME);
    }

    #[test]
    fn test_to_8_3_strips_separators() {
        assert_eq!(to_8_3("dir/file.bin"), "DIRFILE.BIN");
        assert_eq!(to_8_3(" tape .txt"), "TAPE.TXT");
    }

    #[test]
    fn test_to_8_3_empty_name() {
        assert_eq!(to_8_3(".hex"), "_.HEX");
    }
}
