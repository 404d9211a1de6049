//! Datagram session driver.

use super::{ANNOUNCE, Actuator, ActuatorSnapshot, CHANNELS, Dispatcher};
use crate::network::error::Error;
use crate::network::handle::{BUFFER_CAPACITY, Handle};
use crate::network::{Connect, Connection};
use crate::session::readiness::{Exit, LoopConfig, LoopState, LoopStats, ReadinessLoop};
use crate::session::{Clock, SessionState, StopSignal};

/// A datagram session over one connected datagram socket.
///
/// # Type Parameters
///
/// * `C` - The connection type implementing [`Connection`]
/// * `A` - The actuator receiving channel levels
/// * `K` - Millisecond clock
#[derive(Debug)]
pub struct Client<C: Connection, A: Actuator, K: Clock> {
    readiness: ReadinessLoop<C, Dispatcher<A, CHANNELS>, BUFFER_CAPACITY>,
    clock: K,
}

impl<C: Connection, A: Actuator, K: Clock> Client<C, A, K> {
    /// Open the socket and send the announce datagram.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] when the connector fails or the announce
    /// datagram cannot be sent.
    pub fn connect<T>(
        connector: &mut T,
        remote: &str,
        actuator: A,
        clock: K,
        config: LoopConfig,
    ) -> Result<Self, Error>
    where
        T: Connect<Connection = C>,
    {
        let connection = connector.connect(remote).map_err(|_| {
            error!("connect failed");
            Error::Connection
        })?;
        info!("udp connected...");

        let mut handle: Handle<C, BUFFER_CAPACITY> = Handle::new(connection);
        if let Err(err) = handle.send(|buf| {
            buf.extend_from_slice(&ANNOUNCE)
                .map_err(|_| crate::network::error::ProtocolError::Oversized)
        }) {
            error!("announce not sent: {}", err);
            let _ = handle.close();
            return Err(Error::Connection);
        }

        let mut dispatcher = Dispatcher::new(actuator);
        dispatcher.announce_sent(clock.now_ms());

        Ok(Self {
            readiness: ReadinessLoop::new(handle, dispatcher, config),
            clock,
        })
    }

    /// Run one loop iteration.
    pub fn step(&mut self, stop: &StopSignal) -> Option<Exit> {
        self.readiness.step(&self.clock, stop)
    }

    /// Listen until the configured duration elapses, a stop is requested,
    /// or the socket fails.
    pub fn run(&mut self, stop: &StopSignal) -> Exit {
        info!("udp poll start...");
        let exit = self.readiness.run(&self.clock, stop);
        info!("udp thread close...");
        exit
    }

    /// Close the socket now.
    pub fn teardown(&mut self) -> Exit {
        self.readiness.shutdown()
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.readiness.session()
    }

    /// The last channel levels applied.
    pub fn snapshot(&self) -> Option<ActuatorSnapshot<CHANNELS>> {
        self.readiness.protocol().snapshot()
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
    pub fn dispatcher(&self) -> &Dispatcher<A, CHANNELS> {
        self.readiness.protocol()
    }

    /// The open handle, until the session terminates.
    pub fn handle(&self) -> Option<&Handle<C, BUFFER_CAPACITY>> {
        self.readiness.handle()
    }
}

/// Drive a whole datagram session: connect, announce, listen, close.
pub fn run<T, A, K>(
    connector: &mut T,
    remote: &str,
    actuator: A,
    clock: K,
    config: LoopConfig,
    stop: &StopSignal,
) -> Result<Exit, Error>
where
    T: Connect,
    A: Actuator,
    K: Clock,
{
    let mut client = Client::connect(connector, remote, actuator, clock, config)?;
    Ok(client.run(stop))
}
