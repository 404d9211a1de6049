//! Scripted transport shared by the integration tests.
//!
//! Each poll pops the next [`Step`] from a script; an exhausted script keeps
//! timing out. The wire state sits behind an `Rc` so a test can inspect what
//! was written, and whether the connection was closed, after the session has
//! taken ownership of the connection.

#![allow(dead_code)]

use iotlink::network::{Close, Connect, Connection, Poll, Read, Readiness, Write};
use iotlink::session::Clock;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// What the next poll observes.
#[derive(Debug, Clone)]
pub enum Step {
    /// Data is readable; the following read returns these bytes.
    Readable(Vec<u8>),
    /// Nothing arrived within the poll timeout.
    Timeout,
    /// The socket hung up.
    HangUp,
    /// The poll itself failed.
    PollError,
    /// The poll reports readable, but the read fails.
    ReadError,
}

#[derive(Debug, Default)]
pub struct WireState {
    pub script: VecDeque<Step>,
    pub pending: Option<Result<Vec<u8>, ()>>,
    pub written: Vec<u8>,
    pub write_fails: bool,
    pub closed: bool,
    pub polls: usize,
}

/// Both ends of a scripted connection plus the simulated clock.
#[derive(Debug, Clone, Default)]
pub struct Wire {
    state: Rc<RefCell<WireState>>,
    now: Rc<Cell<u64>>,
}

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: Step) {
        self.state.borrow_mut().script.push_back(step);
    }

    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push(Step::Readable(bytes.to_vec()));
    }

    pub fn push_timeouts(&self, count: usize) {
        for _ in 0..count {
            self.push(Step::Timeout);
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    pub fn clear_written(&self) {
        self.state.borrow_mut().written.clear();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow_mut().write_fails = fail;
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn polls(&self) -> usize {
        self.state.borrow().polls
    }

    pub fn clock(&self) -> MockClock {
        MockClock(self.now.clone())
    }

    pub fn connection(&self) -> MockConnection {
        MockConnection { wire: self.clone() }
    }

    pub fn connector(&self) -> MockNetwork {
        MockNetwork {
            wire: self.clone(),
            refuse: false,
        }
    }
}

/// Millisecond clock advanced by the scripted polls.
#[derive(Debug, Clone)]
pub struct MockClock(Rc<Cell<u64>>);

impl MockClock {
    pub fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

#[derive(Debug)]
pub struct MockConnection {
    wire: Wire,
}

impl Read for MockConnection {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.wire.state.borrow_mut();
        match state.pending.take() {
            None => Ok(0),
            Some(Err(())) => Err(()),
            Some(Ok(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                let rest = bytes.split_off(n);
                if !rest.is_empty() {
                    state.pending = Some(Ok(rest));
                }
                Ok(n)
            }
        }
    }
}

impl Write for MockConnection {
    type Error = ();

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.wire.state.borrow_mut();
        if state.write_fails || state.closed {
            return Err(());
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = ();

    fn close(self) -> Result<(), Self::Error> {
        self.wire.state.borrow_mut().closed = true;
        Ok(())
    }
}

impl Poll for MockConnection {
    type Error = ();

    fn poll(&mut self, timeout_ms: u32) -> Result<Readiness, Self::Error> {
        let mut state = self.wire.state.borrow_mut();
        state.polls += 1;
        // bytes left over from a read larger than the buffer come first
        if matches!(state.pending, Some(Ok(_))) {
            self.wire.now.set(self.wire.now.get() + 1);
            return Ok(Readiness::Readable);
        }
        let step = state.script.pop_front().unwrap_or(Step::Timeout);
        let elapsed = match step {
            Step::Timeout => u64::from(timeout_ms),
            _ => 1,
        };
        self.wire.now.set(self.wire.now.get() + elapsed);

        match step {
            Step::Readable(bytes) => {
                state.pending = Some(Ok(bytes));
                Ok(Readiness::Readable)
            }
            Step::Timeout => Ok(Readiness::Timeout),
            Step::HangUp => Ok(Readiness::HangUp),
            Step::PollError => Err(()),
            Step::ReadError => {
                state.pending = Some(Err(()));
                Ok(Readiness::Readable)
            }
        }
    }
}

impl Connection for MockConnection {}

#[derive(Debug)]
pub struct MockNetwork {
    wire: Wire,
    pub refuse: bool,
}

impl Connect for MockNetwork {
    type Connection = MockConnection;
    type Error = ();

    fn connect(&mut self, _remote: &str) -> Result<Self::Connection, Self::Error> {
        if self.refuse {
            return Err(());
        }
        Ok(self.wire.connection())
    }
}

pub const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
pub const PINGRESP: [u8; 2] = [0xD0, 0x00];
pub const DISCONNECT: [u8; 2] = [0xE0, 0x00];
pub const PINGREQ: [u8; 2] = [0xC0, 0x00];

pub fn connack(return_code: u8) -> [u8; 4] {
    [0x20, 0x02, 0x00, return_code]
}

pub fn puback(id: u16) -> [u8; 4] {
    let [hi, lo] = id.to_be_bytes();
    [0x40, 0x02, hi, lo]
}

pub fn suback(id: u16) -> [u8; 5] {
    let [hi, lo] = id.to_be_bytes();
    [0x90, 0x03, hi, lo, 0x00]
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
