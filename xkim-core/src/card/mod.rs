//! Simulated SD-card peripheral: the microcontroller at the far end of the
//! parallel link.
//!
//! This module provides:
//! - `CardStorage`: flat file store behind the card
//! - `MemoryCard`: in-memory store
//! - `DirectoryCard`: store backed by a host directory
//! - `SdCardPeer`: the card firmware's command handling, as a `PeerDevice`

mod directory_card;
mod memory_card;
mod peer;
mod storage;

pub use directory_card::DirectoryCard;
pub use memory_card::MemoryCard;
pub use peer::{Request, SdCardPeer};
pub use storage::{to_8_3, CardStorage};
