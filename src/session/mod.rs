//! Session state and the scheduling primitives shared by both session kinds.
//!
//! A session is one connect → steady-state exchange → teardown lifecycle over
//! a single transport handle. Its mutable record, [`SessionState`], is owned
//! by the protocol dispatcher inside the [`ReadinessLoop`](readiness::ReadinessLoop);
//! everything else observes it through `Copy` snapshots.

use core::sync::atomic::{AtomicBool, Ordering};

/// The bounded-timeout polling loop
pub mod readiness;

/// Connection status of a session.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Phase {
    /// No handshake in progress, or the session has ended.
    #[default]
    Disconnected,
    /// A handshake request went out and no acknowledgment has arrived yet.
    Handshaking,
    /// The peer acknowledged the handshake.
    Established,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Phase {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Phase::Disconnected => defmt::write!(f, "Disconnected"),
            Phase::Handshaking => defmt::write!(f, "Handshaking"),
            Phase::Established => defmt::write!(f, "Established"),
        }
    }
}

/// The mutable record of one session.
///
/// Created zeroed, mutated only by the dispatcher that owns it and by
/// teardown, and handed to everyone else by value.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SessionState {
    phase: Phase,
    last_activity: u64,
    pending_message_id: Option<u16>,
}

impl SessionState {
    /// A fresh, disconnected session.
    pub const fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            last_activity: 0,
            pending_message_id: None,
        }
    }

    /// Current connection status.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Timestamp in milliseconds of the last inbound protocol activity.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// Identifier of the request still waiting for acknowledgment, if any.
    pub fn pending_message_id(&self) -> Option<u16> {
        self.pending_message_id
    }

    /// Whether the handshake has completed and the session is live.
    pub fn is_established(&self) -> bool {
        self.phase == Phase::Established
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.last_activity = now_ms;
    }

    pub(crate) fn set_pending(&mut self, id: u16) {
        self.pending_message_id = Some(id);
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_message_id = None;
    }

    /// Reset to disconnected and forget any outstanding request.
    pub(crate) fn teardown(&mut self) {
        self.phase = Phase::Disconnected;
        self.pending_message_id = None;
    }
}

/// A monotonic millisecond clock supplied by the platform.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed epoch.
    fn now_ms(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// A cooperative shutdown request.
///
/// The readiness loop checks the signal once per iteration, so a stop is
/// noticed within one poll timeout. Safe to share between threads, and
/// usable from a `static`.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: AtomicBool,
}

impl StopSignal {
    /// A signal that has not been raised.
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Ask every loop observing this signal to wind down.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Lower the signal so it can be reused for another session.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }
}
