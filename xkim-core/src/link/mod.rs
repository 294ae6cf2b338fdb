//! Byte-Link transport: a half-duplex strobe/acknowledge handshake that moves
//! one byte at a time over eight data lines.
//!
//! Line roles swap with the direction:
//!
//! ```text
//!            write mode            read mode
//! data       driven by us          driven by peer
//! strobe out STROBE ("data valid") local ACK
//! ack in     peer ACK              peer STROBE
//! ```
//!
//! Every wait is a busy poll of the ACK input. With no timeout configured a
//! silent peer hangs the caller forever; only a reset (re-running `init`)
//! recovers.

pub mod sim;

use std::time::{Duration, Instant};

use log::trace;

use crate::error::{LinkPhase, XkimError, XkimResult};

pub use sim::{PeerDevice, SimulatedPort};

/// Which side drives the data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We drive the data lines (host to peer).
    Write,
    /// The peer drives the data lines (peer to host).
    Read,
}

/// Hardware interface to the parallel port lines.
///
/// Implementations only move line levels; the handshake lives in `ByteLink`.
pub trait ParallelPort: Send {
    /// Configure control lines: strobe and direction as outputs, ack as input.
    fn configure(&mut self);

    /// Set the data-line direction and the direction control output.
    fn set_direction(&mut self, direction: Direction);

    /// Drive a value onto the data lines.
    fn write_data(&mut self, value: u8);

    /// Sample the data lines.
    fn read_data(&mut self) -> u8;

    /// Set the strobe output (local ACK in read mode).
    fn set_strobe(&mut self, high: bool);

    /// Sample the ack input (peer STROBE in read mode).
    fn ack(&mut self) -> bool;

    /// Called between polls of a busy wait.
    fn idle(&mut self) {
        std::hint::spin_loop();
    }
}

/// Link settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkConfig {
    /// Give up on a handshake wait after this long.
    ///
    /// `None` waits forever, which is how the hardware behaves. A timeout is
    /// an addition on top of the hardware contract.
    pub timeout: Option<Duration>,
}

/// The byte-at-a-time transport over a `ParallelPort`.
pub struct ByteLink<P: ParallelPort> {
    port: P,
    direction: Direction,
    config: LinkConfig,
}

impl<P: ParallelPort> ByteLink<P> {
    /// Wrap a port and initialize it into write mode.
    pub fn new(port: P, config: LinkConfig) -> Self {
        let mut link = Self {
            port,
            direction: Direction::Write,
            config,
        };
        link.init();
        link
    }

    /// Configure the lines and leave the link in write mode.
    ///
    /// Safe to call repeatedly; this is also the recovery path after a reset.
    pub fn init(&mut self) {
        self.port.configure();
        self.set_write_mode();
    }

    /// Drive the data lines from our side.
    pub fn set_write_mode(&mut self) {
        self.port.set_direction(Direction::Write);
        self.port.set_strobe(false);
        self.direction = Direction::Write;
    }

    /// Let the peer drive the data lines.
    pub fn set_read_mode(&mut self) {
        self.port.set_direction(Direction::Read);
        self.port.set_strobe(false);
        self.direction = Direction::Read;
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Get the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Send one byte to the peer.
    pub fn write_byte(&mut self, value: u8) -> XkimResult<()> {
        if self.direction != Direction::Write {
            return Err(XkimError::WrongDirection(self.direction));
        }
        self.wait_ack(false, LinkPhase::WriteIdle)?;
        self.port.write_data(value);
        self.port.set_strobe(true);
        self.wait_ack(true, LinkPhase::WriteAck)?;
        self.port.set_strobe(false);
        self.wait_ack(false, LinkPhase::WriteRelease)?;
        trace!("[LINK] -> {:#04X}", value);
        Ok(())
    }

    /// Send a run of bytes, one handshake each.
    pub fn write_all(&mut self, bytes: &[u8]) -> XkimResult<()> {
        for &b in bytes {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Receive one byte from the peer.
    pub fn read_byte(&mut self) -> XkimResult<u8> {
        if self.direction != Direction::Read {
            return Err(XkimError::WrongDirection(self.direction));
        }
        self.wait_ack(true, LinkPhase::ReadStrobe)?;
        let value = self.port.read_data();
        self.port.set_strobe(true);
        self.wait_ack(false, LinkPhase::ReadRelease)?;
        self.port.set_strobe(false);
        trace!("[LINK] <- {:#04X}", value);
        Ok(value)
    }

    /// Spin until the ack input reaches `level`.
    fn wait_ack(&mut self, level: bool, phase: LinkPhase) -> XkimResult<()> {
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        loop {
            if self.port.ack() == level {
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(XkimError::Timeout(phase));
                }
            }
            self.port.idle();
        }
    }
}
