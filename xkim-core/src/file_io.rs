//! Buffered file I/O: turns the disk's block reads and writes into a byte
//! stream.
//!
//! One block buffer serves whichever session is open. Opening resets the
//! buffer, so read and write bookkeeping never mix.

use log::debug;

use crate::disk::BlockDevice;
use crate::error::{XkimError, XkimResult};

/// Size of the block buffer, and of every full block on the wire.
pub const BLOCK_SIZE: usize = 128;

/// Which way the open session goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Closed,
    Read,
    Write,
}

/// Byte-at-a-time access to a single open file on a `BlockDevice`.
pub struct BufferedFile<D: BlockDevice> {
    device: D,
    mode: FileMode,
    buffer: [u8; BLOCK_SIZE],
    /// Next byte to hand out (read) or unused here (write).
    offset: usize,
    /// Valid bytes in the buffer.
    length: usize,
    eof: bool,
}

impl<D: BlockDevice> BufferedFile<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            mode: FileMode::Closed,
            buffer: [0; BLOCK_SIZE],
            offset: 0,
            length: 0,
            eof: false,
        }
    }

    /// Get the block device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get mutable reference to the block device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// True once a read session has hit end of file.
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    fn reset(&mut self, mode: FileMode) {
        self.mode = mode;
        self.offset = 0;
        self.length = 0;
        self.eof = false;
    }

    pub fn open_for_read(&mut self, name: &str) -> XkimResult<()> {
        if self.mode != FileMode::Closed {
            return Err(XkimError::AlreadyOpen);
        }
        self.device.open_read(name)?;
        self.reset(FileMode::Read);
        debug!("[FILE] reading {}", name);
        Ok(())
    }

    pub fn open_for_write(&mut self, name: &str) -> XkimResult<()> {
        if self.mode != FileMode::Closed {
            return Err(XkimError::AlreadyOpen);
        }
        self.device.open_write(name)?;
        self.reset(FileMode::Write);
        debug!("[FILE] writing {}", name);
        Ok(())
    }

    /// Next byte of the file, or `None` at end of file.
    pub fn get_next_byte(&mut self) -> XkimResult<Option<u8>> {
        match self.mode {
            FileMode::Read => {}
            FileMode::Closed => return Err(XkimError::NotOpen),
            FileMode::Write => return Err(XkimError::WrongMode("reading")),
        }
        if self.eof {
            return Ok(None);
        }
        if self.offset == self.length {
            let n = self.device.read_block(&mut self.buffer)?;
            if n == 0 {
                self.eof = true;
                return Ok(None);
            }
            self.offset = 0;
            self.length = n;
        }
        let b = self.buffer[self.offset];
        self.offset += 1;
        Ok(Some(b))
    }

    /// Append a byte, writing the block out as soon as it is full.
    pub fn put_next_byte(&mut self, value: u8) -> XkimResult<()> {
        match self.mode {
            FileMode::Write => {}
            FileMode::Closed => return Err(XkimError::NotOpen),
            FileMode::Read => return Err(XkimError::WrongMode("writing")),
        }
        self.buffer[self.length] = value;
        self.length += 1;
        if self.length == BLOCK_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out whatever is buffered. An empty buffer writes nothing.
    fn flush(&mut self) -> XkimResult<()> {
        if self.length == 0 {
            return Ok(());
        }
        let len = self.length;
        self.length = 0;
        self.device.write_block(&self.buffer[..len])
    }

    /// Flush the partial block and close the file.
    ///
    /// The remote file is closed even when the final flush fails.
    pub fn close_output(&mut self) -> XkimResult<()> {
        if self.mode != FileMode::Write {
            return Err(XkimError::WrongMode("writing"));
        }
        let flushed = self.flush();
        let closed = self.device.close();
        self.reset(FileMode::Closed);
        flushed.and(closed)
    }

    /// Forget any session without talking to the device, as after a reset.
    pub fn abandon(&mut self) {
        self.reset(FileMode::Closed);
        self.device.reset();
    }

    /// Close whatever is open. Always safe, including after a failed open.
    pub fn close(&mut self) -> XkimResult<()> {
        if self.mode == FileMode::Write {
            return self.close_output();
        }
        self.reset(FileMode::Closed);
        self.device.close()
    }
}
