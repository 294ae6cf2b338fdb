//! Extended KIM-1 Monitor Core
//!
//! This crate provides the core components of the monitor extension:
//! - Byte-Link: strobe/acknowledge byte transport over a parallel port
//! - Disk command protocol for an SD-card controller on the far end
//! - Buffered file I/O on top of the block commands
//! - A byte stream that can be redirected between console and file
//! - Intel HEX load and save through that stream
//!
//! # Architecture
//!
//! The monitor uses a layered design:
//! - `ParallelPort` trait: the two handshake lines and the data register
//! - `ByteLink`: one byte per four-phase handshake, half duplex
//! - `DiskClient`: command framing and status codes; implements `BlockDevice`
//! - `BufferedFile`: 128-byte block buffer, one file open at a time
//! - `IoContext`: routes `ByteStream` reads and writes to console or file
//! - `Monitor`: the session object owning memory, I/O and the command table
//!
//! For running without hardware, `SimulatedPort` plays the peer side of the
//! handshake and `SdCardPeer` implements the card firmware over a
//! `CardStorage`.

pub mod card;
pub mod config;
pub mod disk;
pub mod error;
pub mod file_io;
pub mod hex;
pub mod link;
pub mod monitor;
pub mod stream;

pub use card::{to_8_3, CardStorage, DirectoryCard, MemoryCard, SdCardPeer};
pub use config::MonitorConfig;
pub use disk::{BlockDevice, ClockRecord, Command, DiskClient};
pub use error::{HexError, HexStage, XkimError, XkimResult};
pub use file_io::{BufferedFile, FileMode, BLOCK_SIZE};
pub use hex::{load_from_stream, save_to_stream, HexRecord, LoadSummary, MemoryBus, RecordType};
pub use link::{ByteLink, Direction, LinkConfig, ParallelPort, PeerDevice, SimulatedPort};
pub use monitor::{CommandHandler, CommandOutcome, Endpoint, ExitReason, Memory, Monitor};
pub use stream::{ByteStream, Console, HeadlessConsole, IoContext, Redirect};

/// Disk client wired to a simulated SD card.
pub type SimulatedDisk<S> = DiskClient<SimulatedPort<SdCardPeer<S>>>;

/// Connect a disk client to a simulated card serving `storage`.
pub fn simulated_disk<S: CardStorage>(storage: S, config: LinkConfig) -> SimulatedDisk<S> {
    let port = SimulatedPort::new(SdCardPeer::new(storage));
    DiskClient::new(ByteLink::new(port, config))
}
