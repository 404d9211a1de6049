//! Runs the messaging session, then the datagram session, from a host with
//! `std::net`, using the same configuration document a device would ship.
//!
//! ```sh
//! cargo run --example gateway --features std -- config.json
//! ```

use iotlink::config::Config;
use iotlink::link::{Link, with_link};
use iotlink::network::application::datagram::{self, Actuator};
use iotlink::network::application::mqtt;
use iotlink::network::std_net::{StdClock, TcpConnector, UdpConnector};
use iotlink::session::StopSignal;
use iotlink::session::readiness::LoopConfig;
use std::{env, fs, process};

/// The host's network is already up; there is no radio to manage.
struct HostLink;

impl Link for HostLink {
    type Error = ();

    fn bring_up(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn power_off(&mut self) {}
}

/// Prints channel levels instead of driving pins.
struct Console;

impl Actuator for Console {
    type Error = ();

    fn set(&mut self, channel: usize, inverted: bool) -> Result<(), ()> {
        println!("channel {channel}: {}", if inverted { "inverted" } else { "default" });
        Ok(())
    }
}

static STOP: StopSignal = StopSignal::new();

/// Messaging time when the document sets no bound, so the datagram session
/// still gets its turn.
const MESSAGING_RUN_FOR_MS: u64 = 60_000;

fn main() {
    let document = match env::args().nth(1) {
        Some(path) => fs::read_to_string(path).unwrap_or_else(|err| {
            eprintln!("cannot read config: {err}");
            process::exit(1);
        }),
        None => "{}".to_string(),
    };
    let config = Config::from_json(&document).unwrap_or_else(|err| {
        eprintln!("invalid config: {err:?}");
        process::exit(1);
    });

    let messaging = &config.mqtt;
    let messaging_loop = LoopConfig {
        run_for_ms: messaging.run_for_ms.or(Some(MESSAGING_RUN_FOR_MS)),
        ..messaging.loop_config()
    };
    let result = with_link(&mut HostLink, || {
        mqtt::client::run(
            &mut TcpConnector,
            messaging.broker,
            &messaging.options(),
            &messaging.plan(),
            |topic: &str, payload: &[u8]| {
                println!("{topic}: {}", String::from_utf8_lossy(payload));
            },
            StdClock::new(),
            messaging_loop,
            &STOP,
        )
    });
    println!("messaging session ended: {result:?}");

    let udp = &config.datagram;
    let result = with_link(&mut HostLink, || {
        datagram::client::run(
            &mut UdpConnector,
            udp.server,
            Console,
            StdClock::new(),
            udp.loop_config(),
            &STOP,
        )
    });
    println!("datagram session ended: {result:?}");
}
