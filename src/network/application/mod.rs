//! # Application Layer Protocols
//!
//! The two session kinds a device runs over its cellular link. Each one is a
//! [`Protocol`](crate::session::readiness::Protocol) driven by a
//! [`ReadinessLoop`](crate::session::readiness::ReadinessLoop) plus a driver
//! that walks it through connect, steady state and teardown.
//!
//! - **[`mqtt`]**: publish/subscribe messaging over a stream transport
//! - **[`datagram`]**: datagrams mapped onto local actuator channels
//!
//! Both follow the same rules:
//!
//! - **Connection Agnostic**: work with any type implementing
//!   [`Connection`](crate::network::Connection)
//! - **No-std Compatible**: no heap allocation, fixed 64-byte buffers
//! - **Single Owner**: one loop, one handle, one session; sessions never
//!   share state with each other

/// Datagram sessions driving actuator channels.
pub mod datagram;

/// MQTT 3.1.1 messaging sessions.
pub mod mqtt;
