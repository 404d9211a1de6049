mod common;

use common::*;
use iotlink::config::Config;
use iotlink::network::application::mqtt::{self, Client, Discard, Options, Plan, QoS};
use iotlink::network::error::{Error, ProtocolError, TransportError};
use iotlink::session::readiness::{Exit, LoopConfig, LoopState};
use iotlink::session::{Phase, StopSignal};
use std::cell::RefCell;
use std::rc::Rc;

type TestClient<H = Discard> = Client<MockConnection, H, MockClock>;

const OPTIONS: Options<'static> = Options {
    client_id: "cocolinx-mqtt-demo",
    keep_alive_seconds: 60,
    clean_session: true,
};

fn connect(wire: &Wire) -> TestClient {
    connect_with(wire, &OPTIONS, LoopConfig::messaging())
}

fn connect_with(wire: &Wire, options: &Options, config: LoopConfig) -> TestClient {
    Client::connect(&mut wire.connector(), "broker:1883", options, Discard, wire.clock(), config)
        .unwrap()
}

fn established(wire: &Wire) -> TestClient {
    let mut client = connect(wire);
    wire.push_bytes(&CONNACK_ACCEPTED);
    client.await_handshake(&StopSignal::new()).unwrap();
    wire.clear_written();
    client
}

#[test]
fn connect_sends_connect_and_starts_handshaking() {
    let wire = Wire::new();
    let client = connect(&wire);

    let written = wire.written();
    assert_eq!(written[0], 0x10);
    assert!(contains(&written, b"\x00\x04MQTT\x04\x02\x00\x3c"));
    assert!(contains(&written, b"cocolinx-mqtt-demo"));
    assert_eq!(client.state().phase(), Phase::Handshaking);
    assert_eq!(client.loop_state(), LoopState::AwaitingHandshake);
}

#[test]
fn connect_failure_is_a_connection_error() {
    let wire = Wire::new();
    let mut network = wire.connector();
    network.refuse = true;

    let result: Result<TestClient, Error> = Client::connect(
        &mut network,
        "broker:1883",
        &OPTIONS,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
    );
    assert_eq!(result.err(), Some(Error::Connection));
}

#[test]
fn unwritable_connect_closes_the_transport() {
    let wire = Wire::new();
    wire.fail_writes(true);

    let result: Result<TestClient, Error> = Client::connect(
        &mut wire.connector(),
        "broker:1883",
        &OPTIONS,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
    );
    assert_eq!(result.err(), Some(Error::Connection));
    assert!(wire.is_closed());
}

#[test]
fn connack_in_first_poll_reaches_steady_state() {
    let wire = Wire::new();
    let mut client = connect(&wire);
    wire.push_bytes(&CONNACK_ACCEPTED);

    assert_eq!(client.step(&StopSignal::new()), None);

    assert_eq!(client.loop_state(), LoopState::SteadyState);
    assert_eq!(client.state().phase(), Phase::Established);
    assert_eq!(client.stats().polls, 1);
    assert_eq!(client.stats().dispatches, 1);
}

#[test]
fn handshake_waits_through_idle_polls() {
    let wire = Wire::new();
    let mut client = connect(&wire);
    wire.push_timeouts(4);
    wire.push_bytes(&CONNACK_ACCEPTED);

    client.await_handshake(&StopSignal::new()).unwrap();

    assert_eq!(client.stats().polls, 5);
    assert_eq!(client.loop_state(), LoopState::SteadyState);
}

#[test]
fn refused_handshake_reports_return_code() {
    let wire = Wire::new();
    let mut client = connect(&wire);
    wire.push_bytes(&connack(5));

    let result = client.await_handshake(&StopSignal::new());

    assert_eq!(result, Err(Error::Protocol(ProtocolError::Refused(5))));
    assert_eq!(client.loop_state(), LoopState::Terminating);
    assert_eq!(client.state().phase(), Phase::Disconnected);
    assert!(client.handle().is_none());
    assert!(wire.is_closed());
}

#[test]
fn handshake_gives_up_after_configured_polls() {
    let wire = Wire::new();
    let config = LoopConfig {
        handshake_polls: Some(3),
        ..LoopConfig::messaging()
    };
    let mut client = connect_with(&wire, &OPTIONS, config);

    let result = client.await_handshake(&StopSignal::new());

    assert_eq!(result, Err(Error::Connection));
    assert_eq!(wire.polls(), 3);
    assert!(wire.is_closed());
    assert_eq!(client.state().phase(), Phase::Disconnected);
}

#[test]
fn acknowledged_publish_clears_pending_id() {
    let wire = Wire::new();
    let mut client = established(&wire);

    let id = client.publish("t", b"hi", QoS::AtLeastOnce).unwrap();
    assert_eq!(client.state().pending_message_id(), Some(id));
    assert_eq!(wire.written(), [0x32, 7, 0, 1, b't', (id >> 8) as u8, id as u8, b'h', b'i']);

    wire.push_bytes(&puback(id));
    client.step(&StopSignal::new());

    assert_eq!(client.state().pending_message_id(), None);
    assert_eq!(client.state().phase(), Phase::Established);
}

#[test]
fn unrelated_puback_leaves_pending_id() {
    let wire = Wire::new();
    let mut client = established(&wire);

    let id = client.publish("t", b"hi", QoS::AtLeastOnce).unwrap();
    wire.push_bytes(&puback(id.wrapping_add(1)));
    client.step(&StopSignal::new());

    assert_eq!(client.state().pending_message_id(), Some(id));
}

#[test]
fn fire_and_forget_publish_tracks_nothing() {
    let wire = Wire::new();
    let mut client = established(&wire);

    client.publish("t", b"hi", QoS::AtMostOnce).unwrap();

    assert_eq!(client.state().pending_message_id(), None);
    assert_eq!(wire.written(), [0x30, 5, 0, 1, b't', b'h', b'i']);
}

#[test]
fn one_acknowledged_request_at_a_time() {
    let wire = Wire::new();
    let mut client = established(&wire);

    let id = client.subscribe("cocolinx/examples", QoS::AtMostOnce).unwrap();
    assert_eq!(
        client.publish("t", b"hi", QoS::AtLeastOnce),
        Err(Error::Protocol(ProtocolError::InFlight))
    );

    wire.push_bytes(&suback(id));
    client.step(&StopSignal::new());
    // the rejected publish consumed no identifier
    assert_eq!(client.publish("t", b"hi", QoS::AtLeastOnce), Ok(id + 1));
    assert_eq!(client.state().pending_message_id(), Some(id + 1));
}

#[test]
fn requests_need_an_established_session() {
    let wire = Wire::new();
    let mut client = connect(&wire);

    assert_eq!(
        client.publish("t", b"hi", QoS::AtMostOnce),
        Err(Error::Protocol(ProtocolError::NotEstablished))
    );
    assert_eq!(
        client.subscribe("t", QoS::AtMostOnce),
        Err(Error::Protocol(ProtocolError::NotEstablished))
    );
}

#[test]
fn messages_reach_the_handler() {
    let wire = Wire::new();
    let received: Rc<RefCell<Vec<(String, Vec<u8>)>>> = Rc::default();
    let sink = received.clone();
    let handler = move |topic: &str, payload: &[u8]| {
        sink.borrow_mut().push((topic.to_string(), payload.to_vec()));
    };

    let mut client: Client<MockConnection, _, MockClock> = Client::connect(
        &mut wire.connector(),
        "broker:1883",
        &OPTIONS,
        handler,
        wire.clock(),
        LoopConfig::messaging(),
    )
    .unwrap();
    // CONNACK and a PUBLISH in the same read
    wire.push_bytes(&[0x20, 2, 0, 0, 0x30, 5, 0, 1, b't', b'h', b'i']);
    client.step(&StopSignal::new());

    assert_eq!(client.loop_state(), LoopState::SteadyState);
    assert_eq!(
        received.borrow().as_slice(),
        &[("t".to_string(), b"hi".to_vec())]
    );
}

#[test]
fn five_idle_polls_are_five_obligations() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push_timeouts(5);

    let stop = StopSignal::new();
    for _ in 0..5 {
        assert_eq!(client.step(&stop), None);
    }

    assert_eq!(client.stats().obligations, 5);
}

#[test]
fn readable_poll_defers_the_obligation() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push_bytes(&PINGRESP);

    client.step(&StopSignal::new());

    assert_eq!(client.stats().obligations, 0);
}

#[test]
fn keepalive_pings_once_the_interval_elapses() {
    let wire = Wire::new();
    let options = Options {
        keep_alive_seconds: 1,
        ..OPTIONS
    };
    let mut client = connect_with(&wire, &options, LoopConfig::messaging());
    wire.push_bytes(&CONNACK_ACCEPTED);
    client.await_handshake(&StopSignal::new()).unwrap();
    wire.clear_written();

    let stop = StopSignal::new();
    for _ in 0..4 {
        client.step(&stop);
    }
    assert!(wire.written().is_empty());

    client.step(&stop);
    assert_eq!(wire.written(), PINGREQ);
    assert!(client.dispatcher().keepalive().is_awaiting_response());

    wire.push_bytes(&PINGRESP);
    client.step(&stop);
    assert!(!client.dispatcher().keepalive().is_awaiting_response());
}

#[test]
fn exhausted_keepalive_ends_the_session() {
    let wire = Wire::new();
    let options = Options {
        keep_alive_seconds: 1,
        ..OPTIONS
    };
    let mut client: TestClient = Client::connect_with_liveness(
        &mut wire.connector(),
        "broker:1883",
        &options,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
        2,
    )
    .unwrap();
    wire.push_bytes(&CONNACK_ACCEPTED);
    client.await_handshake(&StopSignal::new()).unwrap();
    wire.fail_writes(true);

    let exit = client.run(&StopSignal::new());

    assert_eq!(exit, Exit::Transport(TransportError::HangUp));
    assert_eq!(client.dispatcher().keepalive().failures(), 2);
    assert!(wire.is_closed());
}

#[test]
fn read_error_terminates_in_the_same_iteration() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push(Step::ReadError);

    let exit = client.step(&StopSignal::new());

    assert_eq!(exit, Some(Exit::Transport(TransportError::Read)));
    assert_eq!(client.loop_state(), LoopState::Terminating);
    assert_eq!(client.state().phase(), Phase::Disconnected);
    assert!(client.handle().is_none());
    assert!(wire.is_closed());
    // no DISCONNECT on an abnormal exit
    assert!(wire.written().is_empty());
}

#[test]
fn poll_error_and_hang_up_terminate() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push(Step::PollError);
    assert_eq!(
        client.run(&StopSignal::new()),
        Exit::Transport(TransportError::Poll)
    );

    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push(Step::HangUp);
    assert_eq!(
        client.run(&StopSignal::new()),
        Exit::Transport(TransportError::HangUp)
    );
    assert!(wire.is_closed());
}

#[test]
fn broker_disconnect_ends_the_session() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push_bytes(&DISCONNECT);

    assert_eq!(client.run(&StopSignal::new()), Exit::PeerDisconnected);
    assert!(wire.is_closed());
}

#[test]
fn closed_stream_ends_the_session() {
    let wire = Wire::new();
    let mut client = established(&wire);
    wire.push_bytes(&[]);

    assert_eq!(client.run(&StopSignal::new()), Exit::PeerDisconnected);
    assert_eq!(client.state().phase(), Phase::Disconnected);
}

#[test]
fn stop_request_sends_disconnect() {
    let wire = Wire::new();
    let mut client = established(&wire);
    let stop = StopSignal::new();
    stop.request();

    assert_eq!(client.run(&stop), Exit::Stopped);
    assert_eq!(wire.written(), DISCONNECT);
    assert!(wire.is_closed());
    assert_eq!(client.state().phase(), Phase::Disconnected);
}

#[test]
fn teardown_is_idempotent() {
    let wire = Wire::new();
    let mut client = established(&wire);

    assert_eq!(client.teardown(), Exit::Stopped);
    assert_eq!(client.teardown(), Exit::Stopped);
    assert_eq!(wire.written(), DISCONNECT);
    assert_eq!(
        client.publish("t", b"hi", QoS::AtMostOnce),
        Err(Error::Transport(TransportError::Closed))
    );
}

#[test]
fn dropping_the_client_closes_the_transport() {
    let wire = Wire::new();
    let client = established(&wire);
    drop(client);
    assert!(wire.is_closed());
}

#[test]
fn oversized_frame_is_skipped() {
    let wire = Wire::new();
    let mut client = established(&wire);
    let mut frame = vec![0x30, 100, 0, 1, b't'];
    frame.resize(102, 0xAA);
    wire.push_bytes(&frame);
    wire.push_bytes(&PINGRESP);

    let stop = StopSignal::new();
    client.step(&stop);
    client.step(&stop);
    client.step(&stop);

    assert_eq!(client.dispatcher().rejected(), 1);
    assert_eq!(client.state().phase(), Phase::Established);
}

#[test]
fn whole_session_runs_its_plan() {
    let wire = Wire::new();
    wire.push_bytes(&CONNACK_ACCEPTED);
    wire.push_bytes(&suback(1));
    wire.push_bytes(&DISCONNECT);

    let plan = Plan {
        subscribe: Some("cocolinx/examples"),
        publish: Some(("cocolinx/examples", b"hello cocolinx")),
        qos: QoS::AtMostOnce,
    };
    let exit = mqtt::client::run(
        &mut wire.connector(),
        "broker:1883",
        &OPTIONS,
        &plan,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
        &StopSignal::new(),
    );

    assert_eq!(exit, Ok(Exit::PeerDisconnected));
    let written = wire.written();
    assert!(contains(&written, b"\x82\x16\x00\x01\x00\x11cocolinx/examples\x00"));
    assert!(contains(&written, b"hello cocolinx"));
    assert!(wire.is_closed());
}

#[test]
fn acknowledged_plan_publishes_after_the_suback() {
    let wire = Wire::new();
    wire.push_bytes(&CONNACK_ACCEPTED);
    wire.push_bytes(&suback(1));
    wire.push_bytes(&puback(2));
    wire.push_bytes(&DISCONNECT);

    let plan = Plan {
        subscribe: Some("t"),
        publish: Some(("t", b"hi")),
        qos: QoS::AtLeastOnce,
    };
    let exit = mqtt::client::run(
        &mut wire.connector(),
        "broker:1883",
        &OPTIONS,
        &plan,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
        &StopSignal::new(),
    );

    assert_eq!(exit, Ok(Exit::PeerDisconnected));
    let written = wire.written();
    let subscribe = [0x82, 6, 0, 1, 0, 1, b't', 1];
    let publish = [0x32, 7, 0, 1, b't', 0, 2, b'h', b'i'];
    assert!(contains(&written, &subscribe));
    assert!(contains(&written, &publish));
    assert!(wire.is_closed());
}

#[test]
fn acknowledged_plan_ends_when_the_session_ends_before_the_suback() {
    let wire = Wire::new();
    wire.push_bytes(&CONNACK_ACCEPTED);
    wire.push_bytes(&DISCONNECT);

    let plan = Plan {
        subscribe: Some("t"),
        publish: Some(("t", b"hi")),
        qos: QoS::AtLeastOnce,
    };
    let exit = mqtt::client::run(
        &mut wire.connector(),
        "broker:1883",
        &OPTIONS,
        &plan,
        Discard,
        wire.clock(),
        LoopConfig::messaging(),
        &StopSignal::new(),
    );

    assert_eq!(exit, Ok(Exit::PeerDisconnected));
    assert!(!contains(&wire.written(), b"hi"));
    assert!(wire.is_closed());
}

#[test]
fn configured_duration_ends_messaging_gracefully() {
    let config = Config::from_json(r#"{"mqtt": {"run_for_ms": 1000}}"#).unwrap();
    let wire = Wire::new();
    wire.push_bytes(&CONNACK_ACCEPTED);
    wire.push_bytes(&suback(1));

    let exit = mqtt::client::run(
        &mut wire.connector(),
        config.mqtt.broker,
        &config.mqtt.options(),
        &config.mqtt.plan(),
        Discard,
        wire.clock(),
        config.mqtt.loop_config(),
        &StopSignal::new(),
    );

    assert_eq!(exit, Ok(Exit::Elapsed));
    assert!(wire.written().ends_with(&DISCONNECT));
    assert!(wire.is_closed());
    // 200 ms idle polls after the CONNACK and SUBACK
    assert!(wire.polls() <= 2 + 5);
}
