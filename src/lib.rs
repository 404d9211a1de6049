//! # iotlink - connectivity core for cellular IoT devices
//!
//! The poll-driven I/O and protocol-event core of a constrained device: once
//! the platform has a data link up, `iotlink` drives either an MQTT messaging
//! session over a stream transport, or a datagram session that maps received
//! bytes onto local actuator channels.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐   ┌──────────────────┐
//! │  Session Driver  │──▶│  Readiness Loop   │──▶│ Transport Handle │
//! │ (mqtt / datagram │   │  poll ▸ read ▸    │   │  connection +    │
//! │     Client)      │   │  dispatch / idle  │   │  64-byte buffers │
//! └──────────────────┘   └───────────────────┘   └──────────────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌──────────────────┐   ┌───────────────────┐
//! │  Session State   │◀──│ Event Dispatcher  │
//! │  (Copy snapshot) │   │  (Protocol impl)  │
//! └──────────────────┘   └───────────────────┘
//! ```
//!
//! - [`network`]: transport traits, the [`Handle`](network::handle::Handle),
//!   error taxonomy and the two application protocols
//! - [`session`]: session state, clock, stop signal and the
//!   [`ReadinessLoop`](session::readiness::ReadinessLoop)
//! - [`link`]: the cellular link boundary
//! - [`config`]: JSON device configuration
//!
//! Each session is single-threaded: one loop owns one handle, and the only
//! blocking point is the bounded readiness poll. A device running both
//! session kinds runs two independent loops that share nothing.
//!
//! ## MQTT session
//!
//! ```rust,no_run
//! use iotlink::network::application::mqtt::{self, Options, Plan, QoS};
//! use iotlink::session::StopSignal;
//! use iotlink::session::readiness::LoopConfig;
//! # use iotlink::network::{Connect, Connection, Readiness};
//! # struct Modem;
//! # struct Socket;
//! # impl Connection for Socket {}
//! # impl iotlink::network::Read for Socket {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl iotlink::network::Write for Socket {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl iotlink::network::Close for Socket {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl iotlink::network::Poll for Socket {
//! #     type Error = ();
//! #     fn poll(&mut self, _timeout_ms: u32) -> Result<Readiness, Self::Error> { Ok(Readiness::Timeout) }
//! # }
//! # impl Connect for Modem {
//! #     type Connection = Socket;
//! #     type Error = ();
//! #     fn connect(&mut self, _remote: &str) -> Result<Socket, ()> { Ok(Socket) }
//! # }
//! # fn uptime_ms() -> u64 { 0 }
//!
//! let options = Options {
//!     client_id: "my_device",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! };
//! let plan = Plan {
//!     subscribe: Some("devices/my_device/cmd"),
//!     publish: Some(("devices/my_device/status", b"online")),
//!     qos: QoS::AtMostOnce,
//! };
//! let stop = StopSignal::new();
//!
//! let exit = mqtt::client::run(
//!     &mut Modem,
//!     "broker.local:1883",
//!     &options,
//!     &plan,
//!     |topic: &str, payload: &[u8]| { let _ = (topic, payload); },
//!     uptime_ms,
//!     LoopConfig::messaging(),
//!     &stop,
//! );
//! ```
//!
//! ## Optional Features
//!
//! - `std`: `std::net` adapters and a wall clock
//! - `defmt`: route the crate's logging through `defmt`

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Transport abstraction, buffers, errors and application protocols.
pub mod network;

/// Session state and the readiness loop.
pub mod session;

/// Cellular link layer boundary.
pub mod link;

/// Device configuration.
pub mod config;
