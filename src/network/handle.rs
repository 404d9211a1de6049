//! Transport handle with fixed-capacity buffers.
//!
//! A [`Handle`] couples one [`Connection`] to a receive buffer and a transmit
//! buffer whose capacity is fixed at compile time. The receive buffer is lent
//! out by [`Handle::receive`] for the duration of one loop iteration; its
//! contents are meaningless after the next call.

use super::error::{Error, ProtocolError, TransportError};
use super::{Connection, Readiness};
use heapless::Vec;

/// Default capacity of both buffers, in bytes.
pub const BUFFER_CAPACITY: usize = 64;

/// A readiness-pollable endpoint plus its receive and transmit buffers.
///
/// # Type Parameters
///
/// * `C` - The connection type implementing [`Connection`]
/// * `N` - Capacity of each buffer in bytes
#[derive(Debug)]
pub struct Handle<C: Connection, const N: usize = BUFFER_CAPACITY> {
    connection: C,
    rx: [u8; N],
    tx: Vec<u8, N>,
}

impl<C: Connection, const N: usize> Handle<C, N> {
    /// Wrap an open connection.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            rx: [0; N],
            tx: Vec::new(),
        }
    }

    /// Capacity of the receive and transmit buffers.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Borrow the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Wait at most `timeout_ms` for the connection to become readable.
    pub fn poll(&mut self, timeout_ms: u32) -> Result<Readiness, TransportError> {
        self.connection
            .poll(timeout_ms)
            .map_err(|_| TransportError::Poll)
    }

    /// Read whatever is available into the receive buffer and lend it out.
    pub fn receive(&mut self) -> Result<&[u8], TransportError> {
        let n = self
            .connection
            .read(&mut self.rx)
            .map_err(|_| TransportError::Read)?;
        Ok(&self.rx[..n.min(N)])
    }

    /// Encode a frame into the transmit buffer and write all of it out.
    ///
    /// Nothing is written when `encode` fails, so an oversized frame never
    /// reaches the wire half-finished. Returns the number of bytes sent.
    pub fn send<F>(&mut self, encode: F) -> Result<usize, Error>
    where
        F: FnOnce(&mut Vec<u8, N>) -> Result<(), ProtocolError>,
    {
        self.tx.clear();
        let encoded = encode(&mut self.tx);
        if let Err(err) = encoded {
            self.tx.clear();
            return Err(err.into());
        }

        let mut written = 0;
        while written < self.tx.len() {
            match self.connection.write(&self.tx[written..]) {
                Ok(0) => {
                    self.tx.clear();
                    return Err(TransportError::Closed.into());
                }
                Ok(n) => written += n,
                Err(_) => {
                    self.tx.clear();
                    return Err(TransportError::Write.into());
                }
            }
        }
        self.tx.clear();
        self.connection
            .flush()
            .map_err(|_| TransportError::Write)?;

        Ok(written)
    }

    /// Close the underlying connection, consuming the handle.
    pub fn close(self) -> Result<(), TransportError> {
        self.connection
            .close()
            .map_err(|_| TransportError::Closed)
    }
}
