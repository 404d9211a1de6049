//! Event dispatch for MQTT sessions.
//!
//! The [`Dispatcher`] turns received bytes into [`Event`]s and applies each
//! one to the [`SessionState`] it owns, synchronously and in arrival order.
//! It is the [`Protocol`] the readiness loop drives for a messaging session.

use super::keepalive::{DEFAULT_MAX_LIVENESS_FAILURES, Keepalive};
use super::packet::{Decoder, Event, encode_disconnect};
use crate::network::Connection;
use crate::network::error::{ProtocolError, TransportError};
use crate::network::handle::{BUFFER_CAPACITY, Handle};
use crate::session::readiness::{Exit, Protocol};
use crate::session::{Phase, SessionState};

/// Receives application messages delivered by the broker.
///
/// Called from inside the readiness loop; implementations must return
/// promptly.
pub trait MessageHandler {
    /// A message arrived on `topic`.
    fn on_message(&mut self, topic: &str, payload: &[u8]);
}

impl<F: FnMut(&str, &[u8])> MessageHandler for F {
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}

/// A handler that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl MessageHandler for Discard {
    fn on_message(&mut self, _topic: &str, _payload: &[u8]) {}
}

/// Everything an event may touch. Kept apart from the decoder so the decode
/// callback can borrow it while the decoder is busy.
#[derive(Debug)]
struct Applied<H> {
    state: SessionState,
    handler: H,
    keepalive: Keepalive,
    established_once: bool,
    refused: Option<u8>,
}

impl<H: MessageHandler> Applied<H> {
    fn apply(&mut self, event: Event<'_>, now_ms: u64) -> Result<(), ProtocolError> {
        if event != Event::PeerDisconnected {
            self.state.touch(now_ms);
        }

        match event {
            Event::HandshakeAcknowledged {
                return_code: 0,
                session_present,
            } => {
                if self.established_once {
                    return Err(ProtocolError::UnexpectedPacket);
                }
                info!("MQTT connected (session present: {=bool})", session_present);
                self.state.set_phase(Phase::Established);
                self.established_once = true;
            }
            Event::HandshakeAcknowledged { return_code, .. } => {
                if self.established_once {
                    return Err(ProtocolError::UnexpectedPacket);
                }
                warn!("CONNACK refused with code {=u8}", return_code);
                self.refused = Some(return_code);
                self.state.set_phase(Phase::Disconnected);
            }
            Event::PeerDisconnected => {
                if self.state.phase() != Phase::Disconnected {
                    info!("MQTT disconnected");
                    self.state.set_phase(Phase::Disconnected);
                }
            }
            Event::MessageDelivered {
                topic,
                payload,
                packet_id,
            } => {
                info!("mqtt recv on {=str}: {=[u8]}", topic, payload);
                if packet_id.is_some() {
                    debug!("QoS 1 delivery is not acknowledged");
                }
                self.handler.on_message(topic, payload);
            }
            Event::PublishAcknowledged { packet_id } => self.acknowledge(packet_id),
            Event::SubscribeAcknowledged { packet_id, granted } => {
                if granted == 0x80 {
                    warn!("subscription {=u16} rejected", packet_id);
                }
                self.acknowledge(packet_id);
            }
            Event::KeepaliveAcknowledged => {
                trace!("PINGRESP");
                self.keepalive.acknowledge();
            }
            Event::Unrecognized { packet_type } => {
                warn!("unrecognized packet type {=u8} discarded", packet_type);
            }
        }
        Ok(())
    }

    fn acknowledge(&mut self, packet_id: u16) {
        if self.state.pending_message_id() == Some(packet_id) {
            self.state.clear_pending();
        } else {
            warn!("acknowledgment for unknown message {=u16}", packet_id);
        }
    }
}

/// Decodes MQTT traffic and applies it to the session.
///
/// # Type Parameters
///
/// * `H` - Receiver of delivered messages
/// * `N` - Receive buffer capacity; larger frames are rejected
#[derive(Debug)]
pub struct Dispatcher<H, const N: usize = BUFFER_CAPACITY> {
    decoder: Decoder<N>,
    applied: Applied<H>,
    next_id: u16,
    rejected: u32,
}

impl<H: MessageHandler, const N: usize> Dispatcher<H, N> {
    /// A dispatcher for a session announcing `keep_alive_seconds`.
    pub fn new(handler: H, keep_alive_seconds: u16) -> Self {
        Self::with_liveness(handler, keep_alive_seconds, DEFAULT_MAX_LIVENESS_FAILURES)
    }

    /// Like [`new`](Self::new), tolerating `max_failures` consecutive
    /// keep-alive failures.
    pub fn with_liveness(handler: H, keep_alive_seconds: u16, max_failures: u8) -> Self {
        Self {
            decoder: Decoder::new(),
            applied: Applied {
                state: SessionState::new(),
                handler,
                keepalive: Keepalive::new(keep_alive_seconds, max_failures),
                established_once: false,
                refused: None,
            },
            next_id: 1,
            rejected: 0,
        }
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.applied.state
    }

    /// Return code of a refused handshake.
    pub fn refused(&self) -> Option<u8> {
        self.applied.refused
    }

    /// Frames rejected as malformed or oversized so far.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// The keep-alive bookkeeping.
    pub fn keepalive(&self) -> &Keepalive {
        &self.applied.keepalive
    }

    /// Borrow the message handler.
    pub fn handler(&self) -> &H {
        &self.applied.handler
    }

    /// CONNECT went out: the session is now handshaking.
    pub fn begin_handshake(&mut self, now_ms: u64) {
        if self.applied.established_once {
            warn!("handshake already completed once");
            return;
        }
        self.applied.state.set_phase(Phase::Handshaking);
        self.applied.keepalive.record_tx(now_ms);
    }

    /// Never zero.
    fn next_message_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Allocate an identifier for a request, tracking it when `acknowledged`.
    ///
    /// A rejected request consumes no identifier.
    pub fn next_request(&mut self, acknowledged: bool) -> Result<u16, ProtocolError> {
        if acknowledged && self.applied.state.pending_message_id().is_some() {
            return Err(ProtocolError::InFlight);
        }
        let id = self.next_message_id();
        if acknowledged {
            self.applied.state.set_pending(id);
        }
        Ok(id)
    }


    /// Forget a tracked request that never made it onto the wire.
    pub fn untrack(&mut self, id: u16) {
        if self.applied.state.pending_message_id() == Some(id) {
            self.applied.state.clear_pending();
        }
    }

    /// Note that a request went out at `now_ms`.
    pub fn record_tx(&mut self, now_ms: u64) {
        self.applied.keepalive.record_tx(now_ms);
    }

    /// Apply one already-decoded event.
    ///
    /// A second CONNACK is rejected with [`ProtocolError::UnexpectedPacket`]
    /// and leaves the session untouched apart from its activity timestamp.
    pub fn apply(&mut self, event: Event<'_>, now_ms: u64) -> Result<(), ProtocolError> {
        self.applied.apply(event, now_ms)
    }
}

impl<H: MessageHandler, const N: usize> Protocol for Dispatcher<H, N> {
    const STREAM: bool = true;
    const LIVENESS: bool = true;

    fn dispatch(&mut self, bytes: &[u8], now_ms: u64) {
        let applied = &mut self.applied;
        let rejected = &mut self.rejected;
        self.decoder.feed(bytes, |decoded| {
            if let Err(err) = decoded.and_then(|event| applied.apply(event, now_ms)) {
                *rejected += 1;
                warn!("frame discarded: {}", err);
            }
        });
    }

    fn hang_up(&mut self) {
        // a disconnect is never rejected
        let _ = self.applied.apply(Event::PeerDisconnected, 0);
    }

    fn on_idle<C: Connection, const M: usize>(
        &mut self,
        handle: &mut Handle<C, M>,
        now_ms: u64,
    ) -> Result<(), TransportError> {
        self.applied.keepalive.live(handle, now_ms)
    }

    fn on_terminate<C: Connection, const M: usize>(&mut self, handle: &mut Handle<C, M>, exit: Exit) {
        if exit.is_graceful() && self.applied.state.is_established() {
            if let Err(err) = handle.send(encode_disconnect) {
                warn!("DISCONNECT not sent: {}", err);
            }
        }
    }

    fn state(&self) -> SessionState {
        self.applied.state
    }

    fn teardown(&mut self) {
        self.applied.state.teardown();
        self.decoder.reset();
        info!("mqtt disposed");
    }
}
