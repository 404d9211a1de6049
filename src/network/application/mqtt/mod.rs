//! MQTT 3.1.1 messaging sessions.
//!
//! The session core for publish/subscribe messaging over a reliable stream:
//!
//! - [`packet`]: frame encoders and the streaming [`Decoder`](packet::Decoder)
//!   that produces [`Event`](packet::Event)s
//! - [`dispatcher`]: applies events to the session state and delivers
//!   messages to a [`MessageHandler`]
//! - [`keepalive`]: the PINGREQ obligation run on idle polls
//! - [`client`]: the session driver
//!
//! Only QoS 0 and the acknowledgment half of QoS 1 are supported. Frames
//! larger than the 64-byte receive buffer are rejected, not truncated.

/// MQTT session driver and connection options.
pub mod client;

/// Event dispatch and message delivery.
pub mod dispatcher;

/// Keep-alive scheduling.
pub mod keepalive;

/// Packet encoding and streaming decoding.
pub mod packet;

pub use client::{Client, Options, Plan};
pub use dispatcher::{Discard, Dispatcher, MessageHandler};
pub use packet::{Event, QoS};
