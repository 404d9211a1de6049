//! A transport abstraction layer for constrained devices
//!
//! This module provides the traits a platform implements to hand the
//! connectivity core a socket, along with the [`Handle`](handle::Handle) that
//! couples a connection to its fixed-size receive and transmit buffers.
//!
//! Everything the core needs from a socket is here: connect, poll for
//! readiness with a bounded timeout, read, write and close. DNS resolution and
//! modem bring-up stay on the platform side of `Connect::connect`.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Error taxonomy for transport and protocol failures
pub mod error;

/// Transport handle with fixed-capacity buffers
pub mod handle;

/// Application layer protocols driven over a handle
pub mod application;

/// Adapters for `std::net` sockets
#[cfg(feature = "std")]
pub mod std_net;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Poll, Read, Readiness, Write};
}

/// What a bounded readiness poll observed.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Readiness {
    /// Data can be read without blocking.
    Readable,
    /// The timeout elapsed with nothing to read.
    Timeout,
    /// The peer closed the connection or the socket became invalid.
    HangUp,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Readiness {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Readiness::Readable => defmt::write!(f, "Readable"),
            Readiness::Timeout => defmt::write!(f, "Timeout"),
            Readiness::HangUp => defmt::write!(f, "HangUp"),
        }
    }
}

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read available data from the connection.
    ///
    /// Returns `Ok(0)` when a stream peer has closed, or when an empty
    /// datagram was received.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

pub trait Poll {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Block for at most `timeout_ms` waiting for the connection to become
    /// readable.
    fn poll(&mut self, timeout_ms: u32) -> Result<Readiness, Self::Error>;
}

/// A pollable connection serving exactly one session
pub trait Connection: Read + Write + Close + Poll {}

/// A connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `remote`, usually `host:port`
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}
