//! Error taxonomy for the connectivity core
//!
//! Errors are split by how far they reach. A [`ProtocolError`] concerns one
//! decoded unit (a frame or a datagram) and is absorbed where it happens. A
//! [`TransportError`] concerns the shared handle and ends the session. The
//! top-level [`Error`] is what session drivers return to callers.

/// A failure of the shared transport handle.
///
/// Any of these observed while a session is established is treated as an
/// implicit disconnect.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TransportError {
    /// Polling the handle for readiness failed.
    Poll,
    /// An error occurred during a read operation.
    Read,
    /// An error occurred during a write or flush operation.
    Write,
    /// The peer hung up or the link was declared dead.
    HangUp,
    /// An operation was attempted on a handle that has been closed.
    Closed,
}

/// A malformed, oversized or unexpected protocol unit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtocolError {
    /// The bytes do not form a valid packet.
    Malformed,
    /// The packet does not fit in the fixed receive or transmit buffer.
    Oversized,
    /// The payload is shorter than the minimum the receiver expects.
    Truncated,
    /// A packet arrived that is not valid in the current phase.
    UnexpectedPacket,
    /// The peer refused the handshake with the given return code.
    Refused(u8),
    /// A request requiring acknowledgment is already outstanding.
    InFlight,
    /// The request needs an established session.
    NotEstablished,
}

/// The top-level error type returned by session drivers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The link layer could not be brought up.
    Link,
    /// Opening the transport failed. Fatal to session start.
    Connection,
    /// A protocol unit could not be encoded or was rejected.
    Protocol(ProtocolError),
    /// The transport failed while the session was running.
    Transport(TransportError),
    /// A keep-alive obligation could not be met.
    Liveness,
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TransportError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            TransportError::Poll => defmt::write!(f, "Poll"),
            TransportError::Read => defmt::write!(f, "Read"),
            TransportError::Write => defmt::write!(f, "Write"),
            TransportError::HangUp => defmt::write!(f, "HangUp"),
            TransportError::Closed => defmt::write!(f, "Closed"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProtocolError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ProtocolError::Malformed => defmt::write!(f, "Malformed"),
            ProtocolError::Oversized => defmt::write!(f, "Oversized"),
            ProtocolError::Truncated => defmt::write!(f, "Truncated"),
            ProtocolError::UnexpectedPacket => defmt::write!(f, "UnexpectedPacket"),
            ProtocolError::Refused(code) => defmt::write!(f, "Refused({=u8})", code),
            ProtocolError::InFlight => defmt::write!(f, "InFlight"),
            ProtocolError::NotEstablished => defmt::write!(f, "NotEstablished"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Link => defmt::write!(f, "Link"),
            Error::Connection => defmt::write!(f, "Connection"),
            Error::Protocol(err) => defmt::write!(f, "Protocol({})", err),
            Error::Transport(err) => defmt::write!(f, "Transport({})", err),
            Error::Liveness => defmt::write!(f, "Liveness"),
        }
    }
}
