//! Adapters for `std::net` sockets.
//!
//! Lets the session drivers run on hosts with a standard library, such as a
//! Linux gateway or a test machine. Readiness polling is emulated with a
//! read-timeout `peek`, which leaves the data in the socket for the read that
//! follows.

use super::{Close, Connect, Connection, Poll, Read, Readiness, Write};
use crate::session::Clock;
use std::io::{self, ErrorKind, Read as _, Write as _};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::time::{Duration, Instant};

fn timeout(timeout_ms: u32) -> Option<Duration> {
    // a zero duration is rejected by set_read_timeout
    Some(Duration::from_millis(u64::from(timeout_ms.max(1))))
}

fn classify(result: io::Result<usize>) -> io::Result<Readiness> {
    match result {
        Ok(_) => Ok(Readiness::Readable),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Ok(Readiness::Timeout)
        }
        Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {
            Ok(Readiness::HangUp)
        }
        Err(e) => Err(e),
    }
}

/// A TCP stream connection.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpConnection {
    type Error = io::Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream.read(buf)
    }
}

impl Write for TcpConnection {
    type Error = io::Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush()
    }
}

impl Close for TcpConnection {
    type Error = io::Error;
    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

impl Poll for TcpConnection {
    type Error = io::Error;
    fn poll(&mut self, timeout_ms: u32) -> Result<Readiness, Self::Error> {
        self.stream.set_read_timeout(timeout(timeout_ms))?;
        let mut probe = [0u8; 1];
        // end of stream peeks as Ok(0) and surfaces as an empty read
        classify(self.stream.peek(&mut probe))
    }
}

impl Connection for TcpConnection {}

/// Opens [`TcpConnection`]s; `remote` is resolved by the standard library.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = io::Error;

    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
        let stream = TcpStream::connect(remote)?;
        stream.set_nodelay(true)?;
        Ok(TcpConnection::new(stream))
    }
}

/// A connected UDP socket.
#[derive(Debug)]
pub struct UdpConnection {
    socket: UdpSocket,
}

impl UdpConnection {
    /// Wrap a socket already connected to its peer.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl Read for UdpConnection {
    type Error = io::Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket.recv(buf)
    }
}

impl Write for UdpConnection {
    type Error = io::Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket.send(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for UdpConnection {
    type Error = io::Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Poll for UdpConnection {
    type Error = io::Error;
    fn poll(&mut self, timeout_ms: u32) -> Result<Readiness, Self::Error> {
        self.socket.set_read_timeout(timeout(timeout_ms))?;
        let mut probe = [0u8; 1];
        classify(self.socket.peek(&mut probe))
    }
}

impl Connection for UdpConnection {}

/// Opens [`UdpConnection`]s bound to an ephemeral local port.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpConnector;

impl Connect for UdpConnector {
    type Connection = UdpConnection;
    type Error = io::Error;

    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(remote)?;
        Ok(UdpConnection::new(socket))
    }
}

/// Milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    /// A clock starting at zero now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
