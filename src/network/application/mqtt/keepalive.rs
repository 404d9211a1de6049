//! Keep-alive obligation of an MQTT session.
//!
//! The broker drops a client that stays silent for longer than the
//! keep-alive interval it announced in CONNECT. On every idle poll the
//! readiness loop calls [`Keepalive::live`], which sends a PINGREQ once the
//! interval has elapsed since the last transmission.

use super::packet::encode_pingreq;
use crate::network::Connection;
use crate::network::error::{Error, TransportError};
use crate::network::handle::Handle;

/// Consecutive liveness failures tolerated before the link is declared down.
pub const DEFAULT_MAX_LIVENESS_FAILURES: u8 = 3;

/// Ping scheduling and liveness accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keepalive {
    interval_ms: u64,
    last_tx_ms: u64,
    awaiting_response: bool,
    failures: u8,
    max_failures: u8,
}

impl Keepalive {
    /// Schedule pings every `keep_alive_seconds`; `0` disables them.
    pub fn new(keep_alive_seconds: u16, max_failures: u8) -> Self {
        Self {
            interval_ms: u64::from(keep_alive_seconds) * 1000,
            last_tx_ms: 0,
            awaiting_response: false,
            failures: 0,
            max_failures: max_failures.max(1),
        }
    }

    /// Note that a packet went out at `now_ms`.
    pub fn record_tx(&mut self, now_ms: u64) {
        self.last_tx_ms = now_ms;
    }

    /// The broker answered a ping.
    pub fn acknowledge(&mut self) {
        self.awaiting_response = false;
        self.failures = 0;
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u8 {
        self.failures
    }

    /// Whether a ping is waiting for its response.
    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Whether a ping is due at `now_ms`.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.interval_ms > 0 && now_ms.saturating_sub(self.last_tx_ms) >= self.interval_ms
    }

    /// Run the obligation for one idle poll.
    ///
    /// A failed ping or an unanswered previous ping is logged and counted;
    /// only `max_failures` in a row are reported, as a hang-up.
    pub fn live<C: Connection, const N: usize>(
        &mut self,
        handle: &mut Handle<C, N>,
        now_ms: u64,
    ) -> Result<(), TransportError> {
        match self.ping(handle, now_ms) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                warn!("keep-alive failed: {} ({=u8} in a row)", err, self.failures);
                if self.failures >= self.max_failures {
                    error!("keep-alive exhausted, link considered down");
                    Err(TransportError::HangUp)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn ping<C: Connection, const N: usize>(
        &mut self,
        handle: &mut Handle<C, N>,
        now_ms: u64,
    ) -> Result<(), Error> {
        if !self.is_due(now_ms) {
            return Ok(());
        }
        let unanswered = self.awaiting_response;
        handle.send(encode_pingreq).map_err(|_| Error::Liveness)?;
        trace!("PINGREQ sent");
        self.awaiting_response = true;
        self.last_tx_ms = now_ms;
        if unanswered {
            return Err(Error::Liveness);
        }
        Ok(())
    }
}
