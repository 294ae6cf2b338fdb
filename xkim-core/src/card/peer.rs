//! Firmware side of the disk protocol: an SD-card controller that parses
//! commands byte by byte and queues its replies for the link.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use super::storage::CardStorage;
use crate::disk::{status, Command, MAX_FILENAME};
use crate::link::PeerDevice;

/// One command as seen by the card, for inspection in tests and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Length argument for block commands, name length for opens, else 0.
    pub length: usize,
}

/// Where the command parser is in the incoming byte stream.
#[derive(Debug)]
enum Parse {
    Command,
    Name { command: Command, name: Vec<u8> },
    ReadLength,
    WriteLength,
    WriteData { remaining: usize, data: Vec<u8> },
}

/// The card's single open file.
enum OpenFile {
    Read { data: Vec<u8>, pos: usize },
    Write { name: String, data: Vec<u8> },
}

/// Simulated SD-card controller.
pub struct SdCardPeer<S: CardStorage> {
    storage: S,
    parse: Parse,
    replies: VecDeque<u8>,
    open: Option<OpenFile>,
    listing: Option<VecDeque<String>>,
    journal: Vec<Request>,
}

impl<S: CardStorage> SdCardPeer<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            parse: Parse::Command,
            replies: VecDeque::new(),
            open: None,
            listing: None,
            journal: Vec::new(),
        }
    }

    /// Get the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Commands completed so far.
    pub fn journal(&self) -> &[Request] {
        &self.journal
    }

    /// Whether a file is currently open.
    pub fn has_open_file(&self) -> bool {
        self.open.is_some()
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.replies.extend(bytes.iter().copied());
    }

    fn complete(&mut self, command: Command, length: usize) {
        trace!("[CARD] {:?} ({})", command, length);
        self.journal.push(Request { command, length });
        self.parse = Parse::Command;
    }

    fn start(&mut self, byte: u8) {
        let command = match Command::try_from(byte) {
            Ok(command) => command,
            Err(code) => {
                debug!("[CARD] unknown command {:#04X}", code);
                self.reply(&[status::BAD_COMMAND]);
                return;
            }
        };
        match command {
            Command::Ping => {
                self.reply(&[status::OK]);
                self.complete(command, 0);
            }
            Command::GetClock => {
                let clock = self.storage.clock().to_bytes();
                self.reply(&[status::OK]);
                self.reply(&clock);
                self.complete(command, 0);
            }
            Command::DirOpen => {
                self.listing = Some(self.storage.list_files().into());
                self.reply(&[status::OK]);
                self.complete(command, 0);
            }
            Command::DirNext => {
                match self.listing.as_mut().and_then(|l| l.pop_front()) {
                    Some(name) => {
                        self.reply(&[status::OK]);
                        self.reply(name.as_bytes());
                        self.reply(&[0]);
                    }
                    None => {
                        self.listing = None;
                        self.reply(&[status::DIR_END]);
                    }
                }
                self.complete(command, 0);
            }
            Command::OpenRead | Command::OpenWrite => {
                self.parse = Parse::Name {
                    command,
                    name: Vec::new(),
                };
            }
            Command::ReadBytes => self.parse = Parse::ReadLength,
            Command::WriteBytes => self.parse = Parse::WriteLength,
            Command::Close => {
                let code = self.close_file();
                self.reply(&[code]);
                self.complete(command, 0);
            }
        }
    }

    fn open_file(&mut self, command: Command, name: &str) -> u8 {
        if self.open.is_some() {
            return status::ALREADY_OPEN;
        }
        if name.is_empty() || name.len() > MAX_FILENAME {
            return status::NOT_FOUND;
        }
        match command {
            Command::OpenRead => match self.storage.read_file(name) {
                Some(data) => {
                    debug!("[CARD] open {} for read ({} bytes)", name, data.len());
                    self.open = Some(OpenFile::Read { data, pos: 0 });
                    status::OK
                }
                None => status::NOT_FOUND,
            },
            _ => {
                debug!("[CARD] open {} for write", name);
                self.open = Some(OpenFile::Write {
                    name: name.to_string(),
                    data: Vec::new(),
                });
                status::OK
            }
        }
    }

    fn read_bytes(&mut self, max: usize) {
        match &mut self.open {
            Some(OpenFile::Read { data, pos }) => {
                let count = max.min(data.len() - *pos);
                let chunk = data[*pos..*pos + count].to_vec();
                *pos += count;
                self.reply(&[status::OK, count as u8]);
                self.reply(&chunk);
            }
            _ => self.reply(&[status::NOT_OPEN]),
        }
    }

    fn write_bytes(&mut self, bytes: Vec<u8>) {
        let code = match &mut self.open {
            Some(OpenFile::Write { data, .. }) => {
                data.extend_from_slice(&bytes);
                status::OK
            }
            _ => status::NOT_OPEN,
        };
        self.reply(&[code]);
    }

    /// Commit a file being written. Read files are simply dropped.
    fn close_file(&mut self) -> u8 {
        if let Some(OpenFile::Write { name, data }) = self.open.take() {
            debug!("[CARD] close {} ({} bytes)", name, data.len());
            if let Err(e) = self.storage.write_file(&name, &data) {
                warn!("[CARD] failed to store {}: {}", name, e);
                return status::WRITE_ERROR;
            }
        }
        status::OK
    }
}

impl<S: CardStorage> PeerDevice for SdCardPeer<S> {
    fn receive(&mut self, byte: u8) {
        match std::mem::replace(&mut self.parse, Parse::Command) {
            Parse::Command => self.start(byte),
            Parse::Name { command, mut name } => {
                if byte != 0 {
                    name.push(byte);
                    self.parse = Parse::Name { command, name };
                    return;
                }
                let name = String::from_utf8_lossy(&name).into_owned();
                let code = self.open_file(command, &name);
                self.reply(&[code]);
                self.complete(command, name.len());
            }
            Parse::ReadLength => {
                self.read_bytes(byte as usize);
                self.complete(Command::ReadBytes, byte as usize);
            }
            Parse::WriteLength if byte == 0 => {
                self.write_bytes(Vec::new());
                self.complete(Command::WriteBytes, 0);
            }
            Parse::WriteLength => {
                self.parse = Parse::WriteData {
                    remaining: byte as usize,
                    data: Vec::with_capacity(byte as usize),
                };
            }
            Parse::WriteData {
                remaining,
                mut data,
            } => {
                data.push(byte);
                if data.len() < remaining {
                    self.parse = Parse::WriteData { remaining, data };
                    return;
                }
                self.write_bytes(data);
                self.complete(Command::WriteBytes, remaining);
            }
        }
    }

    fn transmit(&mut self) -> Option<u8> {
        self.replies.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::MemoryCard;

    fn feed(peer: &mut SdCardPeer<MemoryCard>, bytes: &[u8]) -> Vec<u8> {
        for &b in bytes {
            peer.receive(b);
        }
        std::iter::from_fn(|| peer.transmit()).collect()
    }

    #[test]
    fn test_ping_and_unknown_command() {
        let mut peer = SdCardPeer::new(MemoryCard::new());
        assert_eq!(feed(&mut peer, &[0x05]), vec![status::OK]);
        assert_eq!(feed(&mut peer, &[0xEE]), vec![status::BAD_COMMAND]);
        assert_eq!(peer.journal().len(), 1);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut peer = SdCardPeer::new(MemoryCard::new());
        assert_eq!(feed(&mut peer, b"\x1BOUT.BIN\0"), vec![status::OK]);
        assert_eq!(feed(&mut peer, &[0x1C, 3, 7, 8, 9]), vec![status::OK]);
        assert_eq!(feed(&mut peer, &[0x1E]), vec![status::OK]);
        assert_eq!(peer.storage().read_file("OUT.BIN"), Some(vec![7, 8, 9]));

        assert_eq!(feed(&mut peer, b"\x16out.bin\0"), vec![status::OK]);
        assert_eq!(feed(&mut peer, &[0x17, 2]), vec![status::OK, 2, 7, 8]);
        assert_eq!(feed(&mut peer, &[0x17, 2]), vec![status::OK, 1, 9]);
        assert_eq!(feed(&mut peer, &[0x17, 2]), vec![status::OK, 0]);
    }

    #[test]
    fn test_single_open_file() {
        let mut peer = SdCardPeer::new(MemoryCard::new());
        feed(&mut peer, b"\x1BA.BIN\0");
        assert_eq!(feed(&mut peer, b"\x1BB.BIN\0"), vec![status::ALREADY_OPEN]);
        assert_eq!(feed(&mut peer, &[0x17, 4]), vec![status::NOT_OPEN]);
    }

    #[test]
    fn test_missing_file_and_close_without_open() {
        let mut peer = SdCardPeer::new(MemoryCard::new());
        assert_eq!(feed(&mut peer, b"\x16NONE.HEX\0"), vec![status::NOT_FOUND]);
        assert_eq!(feed(&mut peer, &[0x1E]), vec![status::OK]);
        assert!(!peer.has_open_file());
    }

    #[test]
    fn test_directory_ends_with_status() {
        let mut peer = SdCardPeer::new(MemoryCard::with_files([("a.hex", vec![])]));
        assert_eq!(feed(&mut peer, &[0x10]), vec![status::OK]);
        assert_eq!(feed(&mut peer, &[0x11]), b"\0A.HEX\0".to_vec());
        assert_eq!(feed(&mut peer, &[0x11]), vec![status::DIR_END]);
        // Not restartable without reopening.
        assert_eq!(feed(&mut peer, &[0x11]), vec![status::DIR_END]);
    }
}
