//! Datagram sessions driving actuator channels.
//!
//! The device announces itself to a server with a one-byte datagram so the
//! server learns its address and port, then listens for a fixed duration.
//! Every datagram of at least [`CHANNELS`] bytes replaces the
//! [`ActuatorSnapshot`] wholesale: byte `i` equal to `1` drives channel `i`
//! inverted, any other value leaves it at its default level. Shorter
//! datagrams are discarded without touching any channel.

use crate::network::error::ProtocolError;
use crate::session::readiness::Protocol;
use crate::session::{Phase, SessionState};

/// Datagram session driver.
pub mod client;

pub use client::Client;

/// Number of actuator channels carried in each datagram.
pub const CHANNELS: usize = 3;

/// Datagram sent right after connecting so the server can reply.
pub const ANNOUNCE: [u8; 1] = [0];

/// Byte value that selects the inverted output level.
pub const INVERTED: u8 = 1;

/// The latest channel levels decoded from a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorSnapshot<const CH: usize = CHANNELS> {
    inverted: [bool; CH],
}

impl<const CH: usize> Default for ActuatorSnapshot<CH> {
    /// Every channel at its default level.
    fn default() -> Self {
        Self {
            inverted: [false; CH],
        }
    }
}

impl<const CH: usize> ActuatorSnapshot<CH> {
    /// Decode the first `CH` bytes of `payload`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] when `payload` is shorter than `CH`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let levels = payload.get(..CH).ok_or(ProtocolError::Truncated)?;
        let mut inverted = [false; CH];
        for (slot, byte) in inverted.iter_mut().zip(levels) {
            *slot = *byte == INVERTED;
        }
        Ok(Self { inverted })
    }

    /// Whether `channel` is driven inverted. `None` past the last channel.
    pub fn is_inverted(&self, channel: usize) -> Option<bool> {
        self.inverted.get(channel).copied()
    }

    /// All channel levels, `true` meaning inverted.
    pub fn channels(&self) -> &[bool; CH] {
        &self.inverted
    }
}

/// The output stage the snapshot is applied to, usually a set of GPIO pins.
pub trait Actuator {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Drive `channel` to its inverted (`true`) or default (`false`) level.
    fn set(&mut self, channel: usize, inverted: bool) -> Result<(), Self::Error>;
}

/// Applies received datagrams to the actuator.
#[derive(Debug)]
pub struct Dispatcher<A: Actuator, const CH: usize = CHANNELS> {
    state: SessionState,
    actuator: A,
    snapshot: Option<ActuatorSnapshot<CH>>,
    received: u32,
    discarded: u32,
}

impl<A: Actuator, const CH: usize> Dispatcher<A, CH> {
    /// A dispatcher driving `actuator`.
    pub fn new(actuator: A) -> Self {
        Self {
            state: SessionState::new(),
            actuator,
            snapshot: None,
            received: 0,
            discarded: 0,
        }
    }

    /// The announce datagram went out; there is no handshake to wait for.
    pub fn announce_sent(&mut self, now_ms: u64) {
        self.state.touch(now_ms);
        self.state.set_phase(Phase::Established);
    }

    /// The last snapshot applied, if any datagram was valid so far.
    pub fn snapshot(&self) -> Option<ActuatorSnapshot<CH>> {
        self.snapshot
    }

    /// Valid datagrams applied so far.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Datagrams discarded as too short.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    /// Borrow the actuator.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Apply one datagram.
    pub fn apply(&mut self, payload: &[u8], now_ms: u64) -> Result<(), ProtocolError> {
        let snapshot = ActuatorSnapshot::<CH>::from_payload(payload).inspect_err(|_| {
            self.discarded += 1;
            warn!("datagram of {=usize} bytes discarded", payload.len());
        })?;

        info!("recv()={=usize}", payload.len());
        self.state.touch(now_ms);
        self.received += 1;
        self.snapshot = Some(snapshot);
        for (channel, inverted) in snapshot.channels().iter().enumerate() {
            if let Err(_err) = self.actuator.set(channel, *inverted) {
                error!("actuator channel {=usize} not set", channel);
            }
        }
        Ok(())
    }
}

impl<A: Actuator, const CH: usize> Protocol for Dispatcher<A, CH> {
    const STREAM: bool = false;

    fn dispatch(&mut self, bytes: &[u8], now_ms: u64) {
        // a short datagram is already logged and counted
        let _ = self.apply(bytes, now_ms);
    }

    fn hang_up(&mut self) {
        self.state.set_phase(Phase::Disconnected);
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn teardown(&mut self) {
        self.state.teardown();
        info!("udp disconnected...");
    }
}
