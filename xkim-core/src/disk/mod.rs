//! Disk command protocol spoken to the SD-card microcontroller.
//!
//! Each command is one code byte followed by its arguments. The peer answers
//! with a status byte (0 = success) and, for some commands, a payload.
//! Only one command is ever outstanding. There is no timeout at this layer;
//! every call inherits the link's wait behavior.

pub mod clock;

use log::{debug, trace, warn};

use crate::error::{XkimError, XkimResult};
use crate::link::{ByteLink, ParallelPort};

pub use clock::ClockRecord;

/// Command codes understood by the peer firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Liveness check
    Ping = 0x05,
    /// Read the real-time clock
    GetClock = 0x07,
    /// Start a directory listing
    DirOpen = 0x10,
    /// Fetch the next directory entry
    DirNext = 0x11,
    /// Open a file for reading
    OpenRead = 0x16,
    /// Read up to N bytes from the open file
    ReadBytes = 0x17,
    /// Create/truncate a file for writing
    OpenWrite = 0x1B,
    /// Append bytes to the open file
    WriteBytes = 0x1C,
    /// Close the open file
    Close = 0x1E,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x05 => Ok(Self::Ping),
            0x07 => Ok(Self::GetClock),
            0x10 => Ok(Self::DirOpen),
            0x11 => Ok(Self::DirNext),
            0x16 => Ok(Self::OpenRead),
            0x17 => Ok(Self::ReadBytes),
            0x1B => Ok(Self::OpenWrite),
            0x1C => Ok(Self::WriteBytes),
            0x1E => Ok(Self::Close),
            _ => Err(value),
        }
    }
}

/// Status codes returned by the peer.
pub mod status {
    pub const OK: u8 = 0x00;
    /// Directory listing exhausted
    pub const DIR_END: u8 = 0x01;
    pub const NOT_FOUND: u8 = 0x0C;
    pub const NOT_OPEN: u8 = 0x0D;
    pub const ALREADY_OPEN: u8 = 0x0E;
    pub const BAD_COMMAND: u8 = 0x0F;
    pub const WRITE_ERROR: u8 = 0x12;
}

/// Largest block a single read or write command may carry.
pub const MAX_BLOCK: usize = 255;

/// Longest filename the peer accepts.
pub const MAX_FILENAME: usize = 12;

/// Validate a filename for the wire.
///
/// Names are flat (no directories) and are sent NUL-terminated, so NUL and
/// path separators are rejected.
pub fn check_filename(name: &str) -> XkimResult<()> {
    let bad = name.is_empty()
        || name.len() > MAX_FILENAME
        || !name.is_ascii()
        || name.bytes().any(|b| b == 0 || b == b'/' || b == b'\\');
    if bad {
        return Err(XkimError::InvalidFilename(name.to_string()));
    }
    Ok(())
}

/// File-level operations the buffered layer needs from a disk.
pub trait BlockDevice {
    /// Open an existing file for reading.
    fn open_read(&mut self, name: &str) -> XkimResult<()>;

    /// Create (or truncate) a file for writing.
    fn open_write(&mut self, name: &str) -> XkimResult<()>;

    /// Read up to `buf.len()` bytes. Zero means end of file.
    fn read_block(&mut self, buf: &mut [u8]) -> XkimResult<usize>;

    /// Append a block to the open file.
    fn write_block(&mut self, data: &[u8]) -> XkimResult<()>;

    /// Release the open file. Safe to call with nothing open.
    fn close(&mut self) -> XkimResult<()>;

    /// Return the transport to its power-on state after a reset.
    fn reset(&mut self) {}
}

/// Host side of the disk protocol.
pub struct DiskClient<P: ParallelPort> {
    link: ByteLink<P>,
}

impl<P: ParallelPort> DiskClient<P> {
    pub fn new(link: ByteLink<P>) -> Self {
        Self { link }
    }

    /// Get the link.
    pub fn link(&self) -> &ByteLink<P> {
        &self.link
    }

    /// Round-trip liveness check.
    pub fn ping(&mut self) -> XkimResult<()> {
        self.simple(Command::Ping, &[], "ping")
    }

    /// Read the peer's clock.
    pub fn get_clock(&mut self) -> XkimResult<ClockRecord> {
        self.send(Command::GetClock, &[])?;
        let reply = self.reply(|link| {
            let code = link.read_byte()?;
            if code != status::OK {
                return Ok(Err(code));
            }
            let mut raw = [0u8; ClockRecord::LEN];
            for b in raw.iter_mut() {
                *b = link.read_byte()?;
            }
            Ok(Ok(raw))
        })?;
        let raw = reply.map_err(|code| failure("get clock", code))?;
        Ok(ClockRecord::from_bytes(raw))
    }

    /// Start a directory listing.
    pub fn open_directory(&mut self) -> XkimResult<()> {
        self.simple(Command::DirOpen, &[], "open directory")
    }

    /// Next directory entry, or `None` once the listing is exhausted.
    ///
    /// A listing can only be restarted by calling `open_directory` again.
    pub fn next_directory_entry(&mut self) -> XkimResult<Option<String>> {
        self.send(Command::DirNext, &[])?;
        let reply = self.reply(|link| {
            let code = link.read_byte()?;
            match code {
                status::OK => Ok(Ok(Some(read_cstring(link)?))),
                status::DIR_END => Ok(Ok(None)),
                other => Ok(Err(other)),
            }
        })?;
        reply.map_err(|code| failure("read directory", code))
    }

    /// Collect the whole directory listing.
    pub fn list_directory(&mut self) -> XkimResult<Vec<String>> {
        self.open_directory()?;
        let mut names = Vec::new();
        while let Some(name) = self.next_directory_entry()? {
            names.push(name);
        }
        Ok(names)
    }

    fn open(&mut self, command: Command, name: &str, operation: &'static str) -> XkimResult<()> {
        check_filename(name)?;
        let mut args = name.as_bytes().to_vec();
        args.push(0);
        self.simple(command, &args, operation)?;
        debug!("[DISK] {} {}", operation, name);
        Ok(())
    }

    /// Send a command and its arguments in write mode.
    fn send(&mut self, command: Command, args: &[u8]) -> XkimResult<()> {
        trace!("[DISK] {:?} ({} argument bytes)", command, args.len());
        self.link.write_byte(command as u8)?;
        self.link.write_all(args)
    }

    /// Switch to read mode, run `read`, and always return to write mode.
    fn reply<T>(
        &mut self,
        read: impl FnOnce(&mut ByteLink<P>) -> XkimResult<T>,
    ) -> XkimResult<T> {
        self.link.set_read_mode();
        let result = read(&mut self.link);
        self.link.set_write_mode();
        result
    }

    /// Command whose whole answer is a status byte.
    fn simple(&mut self, command: Command, args: &[u8], operation: &'static str) -> XkimResult<()> {
        self.send(command, args)?;
        let code = self.reply(|link| link.read_byte())?;
        if code != status::OK {
            return Err(failure(operation, code));
        }
        Ok(())
    }
}

impl<P: ParallelPort> BlockDevice for DiskClient<P> {
    fn open_read(&mut self, name: &str) -> XkimResult<()> {
        self.open(Command::OpenRead, name, "open for read")
    }

    fn open_write(&mut self, name: &str) -> XkimResult<()> {
        self.open(Command::OpenWrite, name, "open for write")
    }

    fn read_block(&mut self, buf: &mut [u8]) -> XkimResult<usize> {
        let max = buf.len().min(MAX_BLOCK);
        self.send(Command::ReadBytes, &[max as u8])?;
        let reply = self.reply(|link| {
            let code = link.read_byte()?;
            if code != status::OK {
                return Ok(Err(code));
            }
            let count = link.read_byte()? as usize;
            if count > max {
                // Take the rest of the frame so the peer is idle again.
                for _ in 0..count {
                    link.read_byte()?;
                }
                return Err(XkimError::Protocol(count as u8));
            }
            for b in buf[..count].iter_mut() {
                *b = link.read_byte()?;
            }
            Ok(Ok(count))
        })?;
        reply.map_err(|code| failure("read", code))
    }

    fn write_block(&mut self, data: &[u8]) -> XkimResult<()> {
        if data.len() > MAX_BLOCK {
            return Err(XkimError::BlockTooLarge(data.len()));
        }
        let mut args = Vec::with_capacity(data.len() + 1);
        args.push(data.len() as u8);
        args.extend_from_slice(data);
        self.simple(Command::WriteBytes, &args, "write")
    }

    fn close(&mut self) -> XkimResult<()> {
        self.simple(Command::Close, &[], "close")
    }

    fn reset(&mut self) {
        self.link.init();
    }
}

fn failure(operation: &'static str, status: u8) -> XkimError {
    warn!("[DISK] {} failed with status {:#04X}", operation, status);
    XkimError::Disk { operation, status }
}

/// Read a NUL-terminated name of at most `MAX_FILENAME` bytes from the peer.
fn read_cstring<P: ParallelPort>(link: &mut ByteLink<P>) -> XkimResult<String> {
    let mut bytes = Vec::with_capacity(MAX_FILENAME);
    loop {
        let b = link.read_byte()?;
        if b == 0 {
            break;
        }
        if bytes.len() == MAX_FILENAME {
            return Err(XkimError::Protocol(b));
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::link::{LinkConfig, PeerDevice, SimulatedPort};

    /// Peer that replays canned replies and records what it was sent.
    struct ScriptedPeer {
        replies: VecDeque<u8>,
        received: Vec<u8>,
    }

    impl ScriptedPeer {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                received: Vec::new(),
            }
        }
    }

    impl PeerDevice for ScriptedPeer {
        fn receive(&mut self, byte: u8) {
            self.received.push(byte);
        }

        fn transmit(&mut self) -> Option<u8> {
            self.replies.pop_front()
        }
    }

    fn client(replies: &[u8]) -> DiskClient<SimulatedPort<ScriptedPeer>> {
        let port = SimulatedPort::new(ScriptedPeer::new(replies));
        DiskClient::new(ByteLink::new(port, LinkConfig::default()))
    }

    fn sent(client: &DiskClient<SimulatedPort<ScriptedPeer>>) -> &[u8] {
        &client.link().port().device().received
    }

    #[test]
    fn test_command_round_trip() {
        for code in 0..=255u8 {
            if let Ok(cmd) = Command::try_from(code) {
                assert_eq!(cmd as u8, code);
            }
        }
        assert_eq!(Command::try_from(0x00), Err(0x00));
    }

    #[test]
    fn test_ping() {
        let mut disk = client(&[status::OK]);
        disk.ping().unwrap();
        assert_eq!(sent(&disk), &[0x05]);
        assert_eq!(disk.link().direction(), crate::link::Direction::Write);
    }

    #[test]
    fn test_open_read_sends_terminated_name() {
        let mut disk = client(&[status::OK]);
        disk.open_read("GAME.HEX").unwrap();
        assert_eq!(sent(&disk), b"\x16GAME.HEX\0");
    }

    #[test]
    fn test_open_failure_carries_status() {
        let mut disk = client(&[status::NOT_FOUND]);
        let err = disk.open_read("NOPE.HEX").unwrap_err();
        assert!(matches!(
            err,
            XkimError::Disk {
                operation: "open for read",
                status: status::NOT_FOUND
            }
        ));
    }

    #[test]
    fn test_filename_limits() {
        let mut disk = client(&[]);
        assert!(disk.open_write("THIRTEENCHARS").is_err());
        assert!(disk.open_write("a/b").is_err());
        assert!(disk.open_write("").is_err());
        assert!(sent(&disk).is_empty());
        assert!(check_filename("TWELVE.CHARS").is_ok());
    }

    #[test]
    fn test_directory_listing() {
        let mut replies = vec![status::OK];
        replies.extend_from_slice(b"\0A.HEX\0");
        replies.extend_from_slice(b"\0B.HEX\0");
        replies.push(status::DIR_END);
        let mut disk = client(&replies);
        let names = disk.list_directory().unwrap();
        assert_eq!(names, vec!["A.HEX".to_string(), "B.HEX".to_string()]);
        assert_eq!(sent(&disk), &[0x10, 0x11, 0x11, 0x11]);
    }

    #[test]
    fn test_read_block_short_and_eof() {
        let mut disk = client(&[status::OK, 3, 1, 2, 3, status::OK, 0]);
        let mut buf = [0u8; 8];
        assert_eq!(disk.read_block(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(disk.read_block(&mut buf).unwrap(), 0);
        assert_eq!(sent(&disk), &[0x17, 8, 0x17, 8]);
    }

    #[test]
    fn test_read_block_rejects_oversized_reply() {
        let mut disk = client(&[status::OK, 6, 1, 2, 3, 4, 5, 6, status::OK]);
        let mut buf = [0u8; 4];
        assert!(matches!(
            disk.read_block(&mut buf),
            Err(XkimError::Protocol(6))
        ));
        assert_eq!(disk.link().direction(), crate::link::Direction::Write);
        // The data bytes were consumed, so the next reply lines up.
        disk.ping().unwrap();
        assert_eq!(sent(&disk), &[0x17, 4, 0x05]);
    }

    #[test]
    fn test_overlong_directory_name() {
        let mut replies = vec![status::OK, status::OK];
        replies.extend_from_slice(b"THIRTEENCHARS\0");
        let mut disk = client(&replies);
        assert!(matches!(
            disk.list_directory(),
            Err(XkimError::Protocol(b'S'))
        ));
        assert_eq!(disk.link().direction(), crate::link::Direction::Write);
    }

    #[test]
    fn test_write_block_frames_length() {
        let mut disk = client(&[status::OK]);
        disk.write_block(&[0xAA, 0xBB]).unwrap();
        assert_eq!(sent(&disk), &[0x1C, 2, 0xAA, 0xBB]);
        assert!(matches!(
            disk.write_block(&[0u8; 256]),
            Err(XkimError::BlockTooLarge(256))
        ));
    }

    #[test]
    fn test_clock() {
        let mut disk = client(&[status::OK, 10, 18, 26, 13, 5, 9, 0]);
        let clock = disk.get_clock().unwrap();
        assert_eq!(clock.to_string(), "10/18/26 13:05:09");
    }
}
