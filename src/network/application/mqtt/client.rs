//! MQTT 3.1.1 session driver for constrained devices.
//!
//! A [`Client`] owns one readiness loop over one stream connection and walks
//! it through the session lifecycle:
//!
//! ```text
//! connect ──▶ await_handshake ──▶ subscribe / publish ──▶ run ──▶ teardown
//! ```
//!
//! Whatever path ends the session (peer disconnect, transport error, stop
//! request, or simply dropping the client), the handle is closed and the
//! session state is left `Disconnected`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use iotlink::network::application::mqtt::{Client, Options, QoS};
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
//!     client_id: "cocolinx-mqtt-demo",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! };
//! let stop = StopSignal::new();
//! let handler = |topic: &str, payload: &[u8]| { let _ = (topic, payload); };
//!
//! let mut client: Client<_, _, _> = Client::connect(
//!     &mut Modem,
//!     "test.mosquitto.org:1883",
//!     &options,
//!     handler,
//!     uptime_ms,
//!     LoopConfig::messaging(),
//! )?;
//! client.await_handshake(&stop)?;
//! client.subscribe("cocolinx/examples", QoS::AtMostOnce)?;
//! client.publish("cocolinx/examples", b"hello cocolinx", QoS::AtMostOnce)?;
//! let exit = client.run(&stop);
//! # let _ = exit;
//! # Ok::<(), iotlink::network::error::Error>(())
//! ```

use super::dispatcher::{Dispatcher, MessageHandler};
use super::keepalive::DEFAULT_MAX_LIVENESS_FAILURES;
use super::packet::{QoS, encode_connect, encode_publish, encode_subscribe};
use crate::network::error::{Error, ProtocolError};
use crate::network::handle::{BUFFER_CAPACITY, Handle};
use crate::network::{Connect, Connection};
use crate::session::readiness::{Exit, LoopConfig, LoopState, LoopStats, ReadinessLoop};
use crate::session::{Clock, SessionState, StopSignal};

/// Options for configuring the MQTT connection.
///
/// # Examples
///
/// ```rust
/// use iotlink::network::application::mqtt::Options;
///
/// let options = Options {
///     client_id: "my_iot_device",
///     keep_alive_seconds: 60,
///     clean_session: true,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    ///
    /// If a client connects with an identifier already in use, the broker
    /// disconnects the existing client.
    pub client_id: &'a str,

    /// The keep-alive interval in seconds. `0` disables keep-alive pings.
    pub keep_alive_seconds: u16,

    /// Whether the broker should discard any previous session state.
    pub clean_session: bool,
}

/// An MQTT session over a single stream connection.
///
/// # Type Parameters
///
/// * `C` - The connection type implementing [`Connection`]
/// * `H` - Receiver of delivered messages
/// * `K` - Millisecond clock
/// * `N` - Capacity of the receive and transmit buffers
#[derive(Debug)]
pub struct Client<C: Connection, H: MessageHandler, K: Clock, const N: usize = BUFFER_CAPACITY> {
    readiness: ReadinessLoop<C, Dispatcher<H, N>, N>,
    clock: K,
}

impl<C, H, K, const N: usize> Client<C, H, K, N>
where
    C: Connection,
    H: MessageHandler,
    K: Clock,
{
    /// Open the transport and send CONNECT.
    ///
    /// The session is `Handshaking` on return; call
    /// [`await_handshake`](Self::await_handshake) next.
    ///
    /// # Errors
    ///
    /// * [`Error::Connection`] - The connector failed, or CONNECT could not
    ///   be written
    /// * [`Error::Protocol`] - The options do not encode into a frame
    pub fn connect<T>(
        connector: &mut T,
        remote: &str,
        options: &Options,
        handler: H,
        clock: K,
        config: LoopConfig,
    ) -> Result<Self, Error>
    where
        T: Connect<Connection = C>,
    {
        Self::connect_with_liveness(
            connector,
            remote,
            options,
            handler,
            clock,
            config,
            DEFAULT_MAX_LIVENESS_FAILURES,
        )
    }

    /// Like [`connect`](Self::connect), tolerating `max_liveness_failures`
    /// consecutive keep-alive failures before the link is declared down.
    pub fn connect_with_liveness<T>(
        connector: &mut T,
        remote: &str,
        options: &Options,
        handler: H,
        clock: K,
        config: LoopConfig,
        max_liveness_failures: u8,
    ) -> Result<Self, Error>
    where
        T: Connect<Connection = C>,
    {
        info!("mqtt connecting...");
        let connection = connector.connect(remote).map_err(|_| {
            error!("transport connect failed");
            Error::Connection
        })?;

        let mut handle: Handle<C, N> = Handle::new(connection);
        if let Err(err) = handle.send(|buf| encode_connect(buf, options)) {
            error!("CONNECT not sent: {}", err);
            let _ = handle.close();
            return Err(match err {
                Error::Protocol(_) => err,
                _ => Error::Connection,
            });
        }

        let mut dispatcher =
            Dispatcher::with_liveness(handler, options.keep_alive_seconds, max_liveness_failures);
        dispatcher.begin_handshake(clock.now_ms());

        Ok(Self {
            readiness: ReadinessLoop::new(handle, dispatcher, config),
            clock,
        })
    }

    /// Run the readiness loop until the broker acknowledges the handshake.
    ///
    /// # Errors
    ///
    /// * [`Error::Protocol`] with [`ProtocolError::Refused`] - CONNACK
    ///   carried a non-zero return code
    /// * [`Error::Connection`] - No CONNACK within the configured polls, the
    ///   peer went away, or a stop was requested
    /// * [`Error::Transport`] - The transport failed
    pub fn await_handshake(&mut self, stop: &StopSignal) -> Result<(), Error> {
        self.readiness
            .run_until_established(&self.clock, stop)
            .map_err(|exit| match exit {
                Exit::Transport(err) => Error::Transport(err),
                Exit::PeerDisconnected => match self.readiness.protocol().refused() {
                    Some(code) => Error::Protocol(ProtocolError::Refused(code)),
                    None => Error::Connection,
                },
                _ => Error::Connection,
            })
    }

    /// Subscribe to `topic`. Returns the message identifier used.
    ///
    /// The identifier stays pending until the matching SUBACK arrives.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        self.request(true, |buf, id| encode_subscribe(buf, topic, qos, id))
    }

    /// Publish `payload` to `topic`. Returns the message identifier used.
    ///
    /// With [`QoS::AtLeastOnce`] the identifier stays pending until the
    /// matching PUBACK arrives; nothing is retransmitted.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<u16, Error> {
        self.request(qos.is_acknowledged(), |buf, id| {
            encode_publish(buf, topic, payload, qos, id)
        })
    }

    fn request<F>(&mut self, acknowledged: bool, encode: F) -> Result<u16, Error>
    where
        F: FnOnce(&mut heapless::Vec<u8, N>, u16) -> Result<(), ProtocolError>,
    {
        let now = self.clock.now_ms();
        let (handle, dispatcher) = self.readiness.parts_mut()?;
        if !dispatcher.state().is_established() {
            return Err(ProtocolError::NotEstablished.into());
        }

        let id = dispatcher.next_request(acknowledged)?;
        match handle.send(|buf| encode(buf, id)) {
            Ok(_) => {
                dispatcher.record_tx(now);
                Ok(id)
            }
            Err(Error::Transport(err)) => {
                self.readiness.abort(err);
                Err(Error::Transport(err))
            }
            Err(err) => {
                dispatcher.untrack(id);
                Err(err)
            }
        }
    }

    /// Run one loop iteration.
    pub fn step(&mut self, stop: &StopSignal) -> Option<Exit> {
        self.readiness.step(&self.clock, stop)
    }

    /// Run the loop until request `id` is no longer pending.
    ///
    /// Returns the exit reason if the session ends first.
    pub fn await_acknowledgment(&mut self, id: u16, stop: &StopSignal) -> Option<Exit> {
        while self.state().pending_message_id() == Some(id) {
            if let Some(exit) = self.step(stop) {
                return Some(exit);
            }
        }
        None
    }

    /// Run the steady-state loop until the session ends.
    pub fn run(&mut self, stop: &StopSignal) -> Exit {
        self.readiness.run(&self.clock, stop)
    }

    /// End the session now: DISCONNECT if established, then close.
    pub fn teardown(&mut self) -> Exit {
        self.readiness.shutdown()
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.readiness.session()
    }

    /// Where the readiness loop is in the lifecycle.
    pub fn loop_state(&self) -> LoopState {
        self.readiness.state()
    }

    /// Loop counters.
    pub fn stats(&self) -> LoopStats {
        self.readiness.stats()
    }

    /// The dispatcher, for inspection.
    pub fn dispatcher(&self) -> &Dispatcher<H, N> {
        self.readiness.protocol()
    }

    /// The open handle, until the session terminates.
    pub fn handle(&self) -> Option<&Handle<C, N>> {
        self.readiness.handle()
    }
}

/// What a complete messaging session does once established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan<'a> {
    /// Topic filter to subscribe to.
    pub subscribe: Option<&'a str>,
    /// Topic and payload to publish once subscribed.
    pub publish: Option<(&'a str, &'a [u8])>,
    /// QoS for both requests.
    pub qos: QoS,
}

/// Drive a whole session: connect, handshake, subscribe, publish, then run
/// until the session ends.
///
/// An acknowledged publish waits for the SUBACK first, since only one
/// acknowledged request may be pending.
///
/// The handle is closed and the session disconnected on every path out of
/// this function.
#[allow(clippy::too_many_arguments)]
pub fn run<T, H, K>(
    connector: &mut T,
    remote: &str,
    options: &Options,
    plan: &Plan,
    handler: H,
    clock: K,
    config: LoopConfig,
    stop: &StopSignal,
) -> Result<Exit, Error>
where
    T: Connect,
    H: MessageHandler,
    K: Clock,
{
    let mut client: Client<T::Connection, H, K, BUFFER_CAPACITY> =
        Client::connect(connector, remote, options, handler, clock, config)?;
    client.await_handshake(stop)?;

    if let Some(topic) = plan.subscribe {
        let id = client.subscribe(topic, plan.qos)?;
        if plan.publish.is_some() && plan.qos.is_acknowledged() {
            if let Some(exit) = client.await_acknowledgment(id, stop) {
                return Ok(exit);
            }
        }
    }
    if let Some((topic, payload)) = plan.publish {
        client.publish(topic, payload, plan.qos)?;
    }

    Ok(client.run(stop))
}
