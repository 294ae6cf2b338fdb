//! In-process parallel port with a simulated peer on the far side.
//!
//! The peer's half of the handshake is a small state machine that advances
//! whenever the host samples its ack input, so a host and peer run
//! deterministically on one thread.

use log::trace;

use super::{Direction, ParallelPort};

/// Byte-level behavior of the device at the other end of the link.
pub trait PeerDevice: Send {
    /// A byte written by the host has been latched.
    fn receive(&mut self, byte: u8);

    /// Next byte the device wants to send, if any.
    fn transmit(&mut self) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    /// Nothing in flight.
    Idle,
    /// Host strobed a byte; our ACK is high.
    Latched,
    /// Our STROBE is high with data on the lines.
    Offered,
    /// Host acknowledged; our STROBE is low, waiting for its ACK to drop.
    Taken,
}

/// Port whose lines are wired to a `PeerDevice`.
pub struct SimulatedPort<D: PeerDevice> {
    device: D,
    state: PeerState,
    host_direction: Direction,
    host_data: u8,
    host_strobe: bool,
    peer_data: u8,
    peer_line: bool,
    latch: u8,
    polls: u64,
}

impl<D: PeerDevice> SimulatedPort<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: PeerState::Idle,
            host_direction: Direction::Write,
            host_data: 0,
            host_strobe: false,
            peer_data: 0,
            peer_line: false,
            latch: 0,
            polls: 0,
        }
    }

    /// Get the peer device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get mutable reference to the peer device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Number of idle polls spent waiting on the peer.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Advance the peer until it has nothing more to do for the current
    /// line levels.
    fn step(&mut self) {
        loop {
            let next = match self.state {
                PeerState::Idle
                    if self.host_direction == Direction::Write && self.host_strobe =>
                {
                    self.latch = self.host_data;
                    self.peer_line = true;
                    PeerState::Latched
                }
                PeerState::Latched if !self.host_strobe => {
                    self.peer_line = false;
                    trace!("[PEER] <- {:#04X}", self.latch);
                    self.device.receive(self.latch);
                    PeerState::Idle
                }
                PeerState::Idle
                    if self.host_direction == Direction::Read && !self.host_strobe =>
                {
                    match self.device.transmit() {
                        Some(byte) => {
                            trace!("[PEER] -> {:#04X}", byte);
                            self.peer_data = byte;
                            self.peer_line = true;
                            PeerState::Offered
                        }
                        None => break,
                    }
                }
                PeerState::Offered if self.host_strobe => {
                    self.peer_line = false;
                    PeerState::Taken
                }
                PeerState::Taken if !self.host_strobe => PeerState::Idle,
                _ => break,
            };
            self.state = next;
        }
    }
}

impl<D: PeerDevice> ParallelPort for SimulatedPort<D> {
    fn configure(&mut self) {
        self.state = PeerState::Idle;
        self.host_strobe = false;
        self.peer_line = false;
    }

    fn set_direction(&mut self, direction: Direction) {
        self.host_direction = direction;
    }

    fn write_data(&mut self, value: u8) {
        self.host_data = value;
    }

    fn read_data(&mut self) -> u8 {
        self.peer_data
    }

    fn set_strobe(&mut self, high: bool) {
        self.host_strobe = high;
    }

    fn ack(&mut self) -> bool {
        self.step();
        self.peer_line
    }

    fn idle(&mut self) {
        self.polls += 1;
        std::hint::spin_loop();
    }
}
