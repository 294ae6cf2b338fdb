//! Console I/O and the redirectable byte stream.
//!
//! Generic byte I/O goes through `IoContext`, which forwards to whichever
//! endpoint is selected: the console or the open disk file. Code that
//! reads or writes a stream (the HEX codec) never knows which one it has.

use std::collections::VecDeque;

use crate::disk::BlockDevice;
use crate::error::XkimResult;
use crate::file_io::BufferedFile;

/// Console interface for character I/O.
pub trait Console: Send {
    /// Write a character to console output.
    fn write(&mut self, ch: u8);

    /// Check if a key is available (non-blocking).
    fn has_key(&self) -> bool;

    /// Get next key from buffer. Returns None if no key available.
    fn get_key(&mut self) -> Option<u8>;

    /// Wait for a key. Returns None only if input is closed for good.
    fn wait_for_key(&mut self) -> Option<u8> {
        loop {
            if let Some(key) = self.get_key() {
                return Some(key);
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    /// Write a string, byte by byte.
    fn write_str(&mut self, s: &str) {
        for b in s.bytes() {
            self.write(b);
        }
    }
}

/// Headless console for testing - captures output, provides queued input.
#[derive(Default)]
pub struct HeadlessConsole {
    output: Vec<u8>,
    input: VecDeque<u8>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-queued input.
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            output: Vec::new(),
            input: input.iter().copied().collect(),
        }
    }

    /// Get all output as bytes.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Get output as string (lossy UTF-8 conversion).
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Console for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn has_key(&self) -> bool {
        !self.input.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn wait_for_key(&mut self) -> Option<u8> {
        // Queued input is all there will ever be.
        self.input.pop_front()
    }
}

/// Source/sink of bytes for generic I/O.
pub trait ByteStream {
    /// Next byte, or `None` at end of input.
    fn read_byte(&mut self) -> XkimResult<Option<u8>>;

    fn write_byte(&mut self, value: u8) -> XkimResult<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> XkimResult<()> {
        for &b in bytes {
            self.write_byte(b)?;
        }
        Ok(())
    }
}

/// Which endpoint generic I/O is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Console,
    File,
}

/// Console, file and the selector between them.
pub struct IoContext<C: Console, D: BlockDevice> {
    console: C,
    file: BufferedFile<D>,
    active: Redirect,
}

impl<C: Console, D: BlockDevice> IoContext<C, D> {
    /// Start with the console selected.
    pub fn new(console: C, device: D) -> Self {
        Self {
            console,
            file: BufferedFile::new(device),
            active: Redirect::Console,
        }
    }

    /// Route generic I/O to the console.
    pub fn select_console(&mut self) {
        self.active = Redirect::Console;
    }

    /// Route generic I/O to the open file.
    pub fn select_file(&mut self) {
        self.active = Redirect::File;
    }

    pub fn active(&self) -> Redirect {
        self.active
    }

    /// Get console reference.
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Get mutable console reference.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn file(&self) -> &BufferedFile<D> {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut BufferedFile<D> {
        &mut self.file
    }
}

impl<C: Console, D: BlockDevice> ByteStream for IoContext<C, D> {
    fn read_byte(&mut self) -> XkimResult<Option<u8>> {
        match self.active {
            Redirect::Console => Ok(self.console.wait_for_key()),
            Redirect::File => self.file.get_next_byte(),
        }
    }

    fn write_byte(&mut self, value: u8) -> XkimResult<()> {
        match self.active {
            Redirect::Console => {
                self.console.write(value);
                Ok(())
            }
            Redirect::File => self.file.put_next_byte(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardStorage, MemoryCard, SdCardPeer};
    use crate::disk::DiskClient;
    use crate::link::{ByteLink, LinkConfig, SimulatedPort};

    type TestContext = IoContext<HeadlessConsole, DiskClient<SimulatedPort<SdCardPeer<MemoryCard>>>>;

    fn context(console: HeadlessConsole, card: MemoryCard) -> TestContext {
        let port = SimulatedPort::new(SdCardPeer::new(card));
        let disk = DiskClient::new(ByteLink::new(port, LinkConfig::default()));
        IoContext::new(console, disk)
    }

    #[test]
    fn test_headless_console_output() {
        let mut console = HeadlessConsole::new();
        console.write_str("Hi");
        assert_eq!(console.output_string(), "Hi");
    }

    #[test]
    fn test_headless_console_input() {
        let mut console = HeadlessConsole::with_input(b"AB");
        assert!(console.has_key());
        assert_eq!(console.get_key(), Some(b'A'));
        assert_eq!(console.wait_for_key(), Some(b'B'));
        assert!(!console.has_key());
        assert_eq!(console.wait_for_key(), None);
    }

    #[test]
    fn test_console_selected_by_default() {
        let mut io = context(HeadlessConsole::with_input(b"x"), MemoryCard::new());
        assert_eq!(io.active(), Redirect::Console);
        io.write_bytes(b"ok").unwrap();
        assert_eq!(io.read_byte().unwrap(), Some(b'x'));
        assert_eq!(io.console().output(), b"ok");
    }

    #[test]
    fn test_redirect_to_file_and_back() {
        let mut io = context(HeadlessConsole::new(), MemoryCard::new());
        io.file_mut().open_for_write("LOG.TXT").unwrap();
        io.select_file();
        io.write_bytes(b"to file").unwrap();
        io.file_mut().close_output().unwrap();
        io.select_console();
        io.write_bytes(b"to console").unwrap();

        assert_eq!(io.console().output_string(), "to console");
        let card = io.file().device().link().port().device().storage();
        assert_eq!(card.read_file("LOG.TXT"), Some(b"to file".to_vec()));
    }

    #[test]
    fn test_file_read_through_stream() {
        let card = MemoryCard::with_files([("IN.TXT", b"ab".to_vec())]);
        let mut io = context(HeadlessConsole::new(), card);
        io.file_mut().open_for_read("IN.TXT").unwrap();
        io.select_file();
        assert_eq!(io.read_byte().unwrap(), Some(b'a'));
        assert_eq!(io.read_byte().unwrap(), Some(b'b'));
        assert_eq!(io.read_byte().unwrap(), None);
    }
}
