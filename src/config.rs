//! Device configuration.
//!
//! Settings for both session kinds, parsed from a JSON document without
//! allocating: strings borrow from the input. Every field is optional and
//! falls back to the values the reference device ships with.
//!
//! ```rust
//! use iotlink::config::Config;
//!
//! let json = r#"{"mqtt":{"client_id":"node-7","keep_alive_seconds":30}}"#;
//! let config = Config::from_json(json).unwrap();
//! assert_eq!(config.mqtt.client_id, "node-7");
//! assert_eq!(config.mqtt.broker, "test.mosquitto.org:1883");
//! assert_eq!(config.mqtt.options().keep_alive_seconds, 30);
//! ```

use crate::network::application::mqtt::{Options, Plan, QoS};
use crate::session::readiness::{
    DATAGRAM_POLL_TIMEOUT_MS, DEFAULT_HANDSHAKE_POLLS, LoopConfig, MESSAGING_POLL_TIMEOUT_MS,
};
use serde::Deserialize;

/// Errors from parsing a configuration document.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    /// The document is not valid JSON or does not match the schema.
    Parse,
    /// The document has content after the top-level object.
    TrailingData,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::Parse => defmt::write!(f, "Parse"),
            ConfigError::TrailingData => defmt::write!(f, "TrailingData"),
        }
    }
}

/// Settings for the messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig<'a> {
    /// Broker address as `host:port`.
    pub broker: &'a str,
    /// Client identifier announced in CONNECT.
    pub client_id: &'a str,
    /// Topic filter subscribed to once connected.
    pub subscribe_topic: &'a str,
    /// Topic the greeting is published to.
    pub publish_topic: &'a str,
    /// Payload published once subscribed; empty to skip.
    pub greeting: &'a str,
    /// Keep-alive interval announced to the broker.
    pub keep_alive_seconds: u16,
    /// Whether to request a clean session.
    pub clean_session: bool,
    /// Readiness poll timeout.
    pub poll_timeout_ms: u32,
    /// Polls to wait for CONNACK; `null` waits forever.
    pub handshake_polls: Option<u32>,
    /// Consecutive keep-alive failures tolerated.
    pub max_liveness_failures: u8,
    /// How long to stay connected once established; `null` runs until
    /// stopped.
    pub run_for_ms: Option<u64>,
}

impl Default for MqttConfig<'_> {
    fn default() -> Self {
        Self {
            broker: "test.mosquitto.org:1883",
            client_id: "cocolinx-mqtt-demo",
            subscribe_topic: "cocolinx/examples",
            publish_topic: "cocolinx/examples",
            greeting: "hello cocolinx",
            keep_alive_seconds: 60,
            clean_session: true,
            poll_timeout_ms: MESSAGING_POLL_TIMEOUT_MS,
            handshake_polls: Some(DEFAULT_HANDSHAKE_POLLS),
            max_liveness_failures: 3,
            run_for_ms: None,
        }
    }
}

impl<'a> MqttConfig<'a> {
    /// CONNECT options.
    pub fn options(&self) -> Options<'a> {
        Options {
            client_id: self.client_id,
            keep_alive_seconds: self.keep_alive_seconds,
            clean_session: self.clean_session,
        }
    }

    /// Readiness loop parameters.
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_timeout_ms: self.poll_timeout_ms,
            handshake_polls: self.handshake_polls,
            run_for_ms: self.run_for_ms,
        }
    }

    /// Subscribe, then publish the greeting, both at most once.
    pub fn plan(&self) -> Plan<'a> {
        Plan {
            subscribe: (!self.subscribe_topic.is_empty()).then_some(self.subscribe_topic),
            publish: (!self.greeting.is_empty())
                .then_some((self.publish_topic, self.greeting.as_bytes())),
            qos: QoS::AtMostOnce,
        }
    }
}

/// Settings for the datagram session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatagramConfig<'a> {
    /// Server address as `host:port`.
    pub server: &'a str,
    /// Readiness poll timeout.
    pub poll_timeout_ms: u32,
    /// How long to listen before closing the socket.
    pub run_for_ms: u64,
}

impl Default for DatagramConfig<'_> {
    fn default() -> Self {
        Self {
            server: "192.0.2.1:40000",
            poll_timeout_ms: DATAGRAM_POLL_TIMEOUT_MS,
            run_for_ms: 60_000,
        }
    }
}

impl DatagramConfig<'_> {
    /// Readiness loop parameters.
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            poll_timeout_ms: self.poll_timeout_ms,
            handshake_polls: Some(1),
            run_for_ms: Some(self.run_for_ms),
        }
    }
}

/// Configuration for both sessions of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Config<'a> {
    /// Messaging session settings.
    #[serde(borrow)]
    pub mqtt: MqttConfig<'a>,
    /// Datagram session settings.
    #[serde(borrow)]
    pub datagram: DatagramConfig<'a>,
}

impl<'a> Config<'a> {
    /// Parse a JSON document. Strings in the result borrow from `json`.
    pub fn from_json(json: &'a str) -> Result<Self, ConfigError> {
        let (config, used) =
            serde_json_core::from_str::<Config<'a>>(json).map_err(|_| ConfigError::Parse)?;
        if !json[used..].trim().is_empty() {
            return Err(ConfigError::TrailingData);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.mqtt.client_id, "cocolinx-mqtt-demo");
        assert_eq!(config.datagram.run_for_ms, 60_000);
    }

    #[test]
    fn overrides_selected_fields() {
        let json = r#"{
            "mqtt": {"broker": "10.0.0.2:1883", "handshake_polls": null, "greeting": ""},
            "datagram": {"server": "10.0.0.3:40000", "run_for_ms": 5000}
        }"#;
        let config = Config::from_json(json).unwrap();

        assert_eq!(config.mqtt.broker, "10.0.0.2:1883");
        assert_eq!(config.mqtt.loop_config().handshake_polls, None);
        assert_eq!(config.mqtt.plan().publish, None);
        assert_eq!(config.mqtt.plan().subscribe, Some("cocolinx/examples"));
        assert_eq!(config.datagram.server, "10.0.0.3:40000");
        assert_eq!(config.datagram.loop_config().run_for_ms, Some(5000));
        assert_eq!(config.datagram.loop_config().poll_timeout_ms, 1000);
    }

    #[test]
    fn messaging_runs_until_stopped_unless_bounded() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.mqtt.loop_config().run_for_ms, None);

        let config = Config::from_json(r#"{"mqtt": {"run_for_ms": 5000}}"#).unwrap();
        assert_eq!(config.mqtt.loop_config().run_for_ms, Some(5000));
        assert_eq!(config.datagram.run_for_ms, 60_000);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(Config::from_json("{\"mqtt\": 7}"), Err(ConfigError::Parse));
        assert_eq!(Config::from_json("not json"), Err(ConfigError::Parse));
    }
}
