//! The bounded-timeout readiness loop.
//!
//! One [`ReadinessLoop`] owns one transport [`Handle`] and the [`Protocol`]
//! that decodes what arrives on it. Each call to [`ReadinessLoop::step`] is
//! one iteration:
//!
//! 1. check the cooperative stop signal;
//! 2. poll the handle for at most `poll_timeout_ms`;
//! 3. readable: read once and hand the bytes to the protocol dispatcher;
//!    hang-up or poll/read error: terminate;
//!    timeout: perform the protocol's liveness obligation, if it has one;
//! 4. inspect the session state and move between [`LoopState`]s.
//!
//! A readiness event always wins over housekeeping in the same cycle: the
//! liveness obligation only runs on an idle timeout, so it is deferred to the
//! next quiet poll whenever data is flowing.
//!
//! ```text
//!   AwaitingHandshake ──established──▶ SteadyState
//!          │                              │
//!          │ refused / timed out /        │ peer disconnect / elapsed /
//!          │ transport error / stop       │ transport error / stop
//!          ▼                              ▼
//!   ┌─────────────────── Terminating ──────────────────┐
//!   │  close handle, session reset to Disconnected    │
//!   └──────────────────────────────────────────────────┘
//! ```

use super::{Clock, SessionState, StopSignal};
use crate::network::Connection;
use crate::network::Readiness;
use crate::network::error::TransportError;
use crate::network::handle::{BUFFER_CAPACITY, Handle};

/// Poll timeout for messaging sessions.
pub const MESSAGING_POLL_TIMEOUT_MS: u32 = 200;

/// Poll timeout for datagram sessions.
pub const DATAGRAM_POLL_TIMEOUT_MS: u32 = 1000;

/// Handshake polls allowed by default before giving up (30 s at 200 ms).
pub const DEFAULT_HANDSHAKE_POLLS: u32 = 150;

/// A protocol driven by the readiness loop.
///
/// Implementors own the [`SessionState`] and are the only code that mutates
/// it, through [`dispatch`](Protocol::dispatch), [`hang_up`](Protocol::hang_up)
/// and [`teardown`](Protocol::teardown).
pub trait Protocol {
    /// Whether the transport is a byte stream. On a stream, a zero-length
    /// read means the peer closed; on a datagram socket it is an empty
    /// datagram.
    const STREAM: bool;

    /// Whether idle timeouts carry a liveness obligation.
    const LIVENESS: bool = false;

    /// Decode `bytes` into protocol events and apply them in order.
    fn dispatch(&mut self, bytes: &[u8], now_ms: u64);

    /// The peer closed the stream.
    fn hang_up(&mut self);

    /// Perform the periodic liveness obligation after an idle poll.
    ///
    /// Isolated failures are absorbed; an error return means the link is
    /// considered down.
    fn on_idle<C: Connection, const N: usize>(
        &mut self,
        _handle: &mut Handle<C, N>,
        _now_ms: u64,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    /// Last words before the handle is closed.
    fn on_terminate<C: Connection, const N: usize>(&mut self, _handle: &mut Handle<C, N>, _exit: Exit) {}

    /// Snapshot of the session state.
    fn state(&self) -> SessionState;

    /// Reset the session to disconnected.
    fn teardown(&mut self);
}

/// Where the loop is in the session lifecycle.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LoopState {
    /// Waiting for the peer to acknowledge the handshake.
    AwaitingHandshake,
    /// Exchanging data until a stop condition is observed.
    SteadyState,
    /// Terminal: the handle is closed and the session is disconnected.
    Terminating,
}

/// Why a loop terminated.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Exit {
    /// A stop was requested, or the driver tore the session down.
    Stopped,
    /// The configured run duration elapsed.
    Elapsed,
    /// The peer disconnected or refused the handshake.
    PeerDisconnected,
    /// The handshake did not complete within the allowed polls.
    HandshakeTimedOut,
    /// The transport failed.
    Transport(TransportError),
}

impl Exit {
    /// Whether the session ended at the device's own request.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Exit::Stopped | Exit::Elapsed)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LoopState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            LoopState::AwaitingHandshake => defmt::write!(f, "AwaitingHandshake"),
            LoopState::SteadyState => defmt::write!(f, "SteadyState"),
            LoopState::Terminating => defmt::write!(f, "Terminating"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Exit {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Exit::Stopped => defmt::write!(f, "Stopped"),
            Exit::Elapsed => defmt::write!(f, "Elapsed"),
            Exit::PeerDisconnected => defmt::write!(f, "PeerDisconnected"),
            Exit::HandshakeTimedOut => defmt::write!(f, "HandshakeTimedOut"),
            Exit::Transport(err) => defmt::write!(f, "Transport({})", err),
        }
    }
}

/// Scheduling parameters of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Upper bound on each readiness poll.
    pub poll_timeout_ms: u32,
    /// Polls to wait for the handshake; `None` waits forever.
    pub handshake_polls: Option<u32>,
    /// Steady-state duration after which the loop exits; `None` runs until
    /// the peer disconnects or a stop is requested.
    pub run_for_ms: Option<u64>,
}

impl LoopConfig {
    /// Defaults for a messaging session: 200 ms polls, bounded handshake,
    /// no duration limit.
    pub const fn messaging() -> Self {
        Self {
            poll_timeout_ms: MESSAGING_POLL_TIMEOUT_MS,
            handshake_polls: Some(DEFAULT_HANDSHAKE_POLLS),
            run_for_ms: None,
        }
    }

    /// Defaults for a datagram session: 1 s polls for one minute.
    pub const fn datagram() -> Self {
        Self {
            poll_timeout_ms: DATAGRAM_POLL_TIMEOUT_MS,
            handshake_polls: Some(1),
            run_for_ms: Some(60_000),
        }
    }
}

/// Counters describing what a loop has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Readiness polls issued.
    pub polls: u32,
    /// Chunks handed to the dispatcher.
    pub dispatches: u32,
    /// Liveness obligations performed on idle timeouts.
    pub obligations: u32,
}

/// The single-threaded readiness loop of one session.
#[derive(Debug)]
pub struct ReadinessLoop<C: Connection, P: Protocol, const N: usize = BUFFER_CAPACITY> {
    handle: Option<Handle<C, N>>,
    protocol: P,
    state: LoopState,
    config: LoopConfig,
    stats: LoopStats,
    handshake_polls: u32,
    steady_since: u64,
    exit: Option<Exit>,
}

impl<C: Connection, P: Protocol, const N: usize> ReadinessLoop<C, P, N> {
    /// Take ownership of a connected handle and its protocol.
    pub fn new(handle: Handle<C, N>, protocol: P, config: LoopConfig) -> Self {
        Self {
            handle: Some(handle),
            protocol,
            state: LoopState::AwaitingHandshake,
            config,
            stats: LoopStats::default(),
            handshake_polls: 0,
            steady_since: 0,
            exit: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> SessionState {
        self.protocol.state()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Why the loop terminated, once it has.
    pub fn exit(&self) -> Option<Exit> {
        self.exit
    }

    /// Scheduling parameters in effect.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Borrow the protocol.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Borrow the open handle, if the loop has not terminated.
    pub fn handle(&self) -> Option<&Handle<C, N>> {
        self.handle.as_ref()
    }

    /// Borrow the handle and the protocol together, to issue requests
    /// between iterations.
    pub fn parts_mut(&mut self) -> Result<(&mut Handle<C, N>, &mut P), TransportError> {
        match self.handle.as_mut() {
            Some(handle) => Ok((handle, &mut self.protocol)),
            None => Err(TransportError::Closed),
        }
    }

    /// Run one iteration. Returns the exit reason once the loop terminates.
    pub fn step<K: Clock>(&mut self, clock: &K, stop: &StopSignal) -> Option<Exit> {
        if let Some(exit) = self.exit {
            return Some(exit);
        }
        if stop.is_requested() {
            debug!("stop requested");
            return Some(self.terminate(Exit::Stopped));
        }

        if let Err(exit) = self.service(clock) {
            return Some(self.terminate(exit));
        }

        let now = clock.now_ms();
        let session = self.protocol.state();
        match self.state {
            LoopState::AwaitingHandshake => {
                if session.is_established() {
                    info!("handshake complete after {=u32} polls", self.stats.polls);
                    self.state = LoopState::SteadyState;
                    self.steady_since = now;
                } else if session.phase() == super::Phase::Disconnected {
                    return Some(self.terminate(Exit::PeerDisconnected));
                } else {
                    self.handshake_polls += 1;
                    if let Some(limit) = self.config.handshake_polls {
                        if self.handshake_polls >= limit {
                            warn!("no handshake after {=u32} polls", self.handshake_polls);
                            return Some(self.terminate(Exit::HandshakeTimedOut));
                        }
                    }
                }
            }
            LoopState::SteadyState => {
                if !session.is_established() {
                    return Some(self.terminate(Exit::PeerDisconnected));
                }
                if let Some(limit) = self.config.run_for_ms {
                    if now.saturating_sub(self.steady_since) >= limit {
                        return Some(self.terminate(Exit::Elapsed));
                    }
                }
            }
            LoopState::Terminating => {}
        }
        None
    }

    /// Iterate until the handshake completes.
    ///
    /// Returns `Err` with the exit reason if the loop terminated instead.
    pub fn run_until_established<K: Clock>(&mut self, clock: &K, stop: &StopSignal) -> Result<(), Exit> {
        while self.state == LoopState::AwaitingHandshake {
            if let Some(exit) = self.step(clock, stop) {
                return Err(exit);
            }
        }
        match self.exit {
            Some(exit) => Err(exit),
            None => Ok(()),
        }
    }

    /// Iterate until the loop terminates.
    pub fn run<K: Clock>(&mut self, clock: &K, stop: &StopSignal) -> Exit {
        loop {
            if let Some(exit) = self.step(clock, stop) {
                return exit;
            }
        }
    }

    /// Terminate now, as if a stop had been requested.
    pub fn shutdown(&mut self) -> Exit {
        match self.exit {
            Some(exit) => exit,
            None => self.terminate(Exit::Stopped),
        }
    }

    /// Terminate because a request written outside the loop hit a transport
    /// failure.
    pub fn abort(&mut self, err: TransportError) -> Exit {
        match self.exit {
            Some(exit) => exit,
            None => {
                error!("transport failed outside the loop: {}", err);
                self.terminate(Exit::Transport(err))
            }
        }
    }

    fn service<K: Clock>(&mut self, clock: &K) -> Result<(), Exit> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Exit::Transport(TransportError::Closed));
        };

        self.stats.polls += 1;
        let readiness = handle.poll(self.config.poll_timeout_ms).map_err(|err| {
            error!("poll failed: {}", err);
            Exit::Transport(err)
        })?;

        match readiness {
            Readiness::Readable => {
                let bytes = handle.receive().map_err(|err| {
                    error!("read failed: {}", err);
                    Exit::Transport(err)
                })?;
                if bytes.is_empty() && P::STREAM {
                    info!("peer closed the stream");
                    self.protocol.hang_up();
                } else {
                    trace!("read {=usize} bytes", bytes.len());
                    self.stats.dispatches += 1;
                    self.protocol.dispatch(bytes, clock.now_ms());
                }
            }
            Readiness::HangUp => {
                error!("socket hang-up");
                return Err(Exit::Transport(TransportError::HangUp));
            }
            Readiness::Timeout => {
                if P::LIVENESS {
                    self.stats.obligations += 1;
                    self.protocol
                        .on_idle(handle, clock.now_ms())
                        .map_err(Exit::Transport)?;
                }
            }
        }
        Ok(())
    }

    fn terminate(&mut self, exit: Exit) -> Exit {
        if let Some(mut handle) = self.handle.take() {
            self.protocol.on_terminate(&mut handle, exit);
            if let Err(err) = handle.close() {
                warn!("close failed: {}", err);
            }
        }
        self.protocol.teardown();
        self.state = LoopState::Terminating;
        self.exit = Some(exit);
        info!("session terminated: {}", exit);
        exit
    }
}

impl<C: Connection, P: Protocol, const N: usize> Drop for ReadinessLoop<C, P, N> {
    fn drop(&mut self) {
        if self.exit.is_none() {
            self.terminate(Exit::Stopped);
        }
    }
}
