//! MQTT 3.1.1 packet codec.
//!
//! Encoders write straight into a handle's fixed transmit buffer and fail with
//! [`ProtocolError::Oversized`] rather than truncate. The [`Decoder`] is
//! streaming: bytes arrive in whatever chunks the transport delivers, frames
//! are reassembled in a buffer of the same fixed capacity, and each complete
//! frame becomes one [`Event`].

use super::client::Options;
use crate::network::error::ProtocolError;
use heapless::Vec;

// MQTT Control Packet types
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x2;
const PUBLISH: u8 = 0x30;
const PUBLISH_TYPE: u8 = 0x3;
const PUBACK: u8 = 0x4;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x9;
const PINGREQ: u8 = 0xC0;
const PINGRESP: u8 = 0xD;
const DISCONNECT: u8 = 0xE0;
const DISCONNECT_TYPE: u8 = 0xE;

// Protocol constants
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1
const CLEAN_SESSION: u8 = 0x02;

/// Largest value the remaining-length field can carry.
const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Longest fixed header: one type byte and four length bytes.
pub const MAX_FIXED_HEADER_LEN: usize = 5;

/// Quality of Service levels supported by the session.
///
/// `AtLeastOnce` is encoded and its acknowledgment tracked, but nothing is
/// retransmitted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery, acknowledged by the broker.
    AtLeastOnce = 1,
}

impl QoS {
    /// Whether the broker answers this level with an acknowledgment.
    pub fn is_acknowledged(self) -> bool {
        self != QoS::AtMostOnce
    }
}

/// A decoded inbound packet.
///
/// Borrowed fields point into the decoder's reassembly buffer and are only
/// valid inside the callback that receives the event.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Event<'a> {
    /// CONNACK. A non-zero return code means the broker refused.
    HandshakeAcknowledged {
        /// Whether the broker resumed a stored session.
        session_present: bool,
        /// CONNACK return code, `0` for accepted.
        return_code: u8,
    },
    /// DISCONNECT from the broker, or the stream closed.
    PeerDisconnected,
    /// PUBLISH from the broker.
    MessageDelivered {
        /// Topic the message was published to.
        topic: &'a str,
        /// Message body.
        payload: &'a [u8],
        /// Packet identifier, present for QoS above 0.
        packet_id: Option<u16>,
    },
    /// PUBACK.
    PublishAcknowledged {
        /// Identifier of the acknowledged publish.
        packet_id: u16,
    },
    /// SUBACK.
    SubscribeAcknowledged {
        /// Identifier of the acknowledged subscribe.
        packet_id: u16,
        /// Granted QoS, or `0x80` for failure.
        granted: u8,
    },
    /// PINGRESP.
    KeepaliveAcknowledged,
    /// Any packet type the session does not act on.
    Unrecognized {
        /// The control packet type (upper nibble of the first byte).
        packet_type: u8,
    },
}

fn put<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), ProtocolError> {
    buf.extend_from_slice(bytes)
        .map_err(|_| ProtocolError::Oversized)
}

fn put_str<const N: usize>(buf: &mut Vec<u8, N>, value: &[u8]) -> Result<(), ProtocolError> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::Oversized)?;
    put(buf, &len.to_be_bytes())?;
    put(buf, value)
}

/// Encode the remaining length field for an MQTT packet.
///
/// Uses up to 4 bytes, 7 bits each, with the top bit flagging that another
/// byte follows.
fn put_remaining_length<const N: usize>(
    buf: &mut Vec<u8, N>,
    mut len: usize,
) -> Result<(), ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::Oversized);
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| ProtocolError::Oversized)?;
        if len == 0 {
            return Ok(());
        }
    }
}

fn put_header<const N: usize>(
    buf: &mut Vec<u8, N>,
    first: u8,
    remaining: usize,
) -> Result<(), ProtocolError> {
    buf.push(first).map_err(|_| ProtocolError::Oversized)?;
    put_remaining_length(buf, remaining)
}

/// Encode a CONNECT packet.
pub fn encode_connect<const N: usize>(
    buf: &mut Vec<u8, N>,
    options: &Options,
) -> Result<(), ProtocolError> {
    let client_id = options.client_id.as_bytes();
    if client_id.is_empty() {
        return Err(ProtocolError::Malformed);
    }
    // name (2 + 4), level, flags, keep-alive (2), then the client id
    let remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + client_id.len();

    put_header(buf, CONNECT, remaining)?;
    put_str(buf, PROTOCOL_NAME)?;
    let flags = if options.clean_session { CLEAN_SESSION } else { 0 };
    put(buf, &[PROTOCOL_LEVEL, flags])?;
    put(buf, &options.keep_alive_seconds.to_be_bytes())?;
    put_str(buf, client_id)
}

/// Encode a PUBLISH packet. `packet_id` is only written for acknowledged QoS.
pub fn encode_publish<const N: usize>(
    buf: &mut Vec<u8, N>,
    topic: &str,
    payload: &[u8],
    qos: QoS,
    packet_id: u16,
) -> Result<(), ProtocolError> {
    validate_topic(topic, false)?;
    let id_len = if qos.is_acknowledged() { 2 } else { 0 };
    let remaining = 2 + topic.len() + id_len + payload.len();

    put_header(buf, PUBLISH | ((qos as u8) << 1), remaining)?;
    put_str(buf, topic.as_bytes())?;
    if qos.is_acknowledged() {
        put(buf, &packet_id.to_be_bytes())?;
    }
    put(buf, payload)
}

/// Encode a SUBSCRIBE packet for a single topic filter.
pub fn encode_subscribe<const N: usize>(
    buf: &mut Vec<u8, N>,
    topic: &str,
    qos: QoS,
    packet_id: u16,
) -> Result<(), ProtocolError> {
    validate_topic(topic, true)?;
    let remaining = 2 + 2 + topic.len() + 1;

    put_header(buf, SUBSCRIBE, remaining)?;
    put(buf, &packet_id.to_be_bytes())?;
    put_str(buf, topic.as_bytes())?;
    put(buf, &[qos as u8])
}

/// Encode a PINGREQ packet.
pub fn encode_pingreq<const N: usize>(buf: &mut Vec<u8, N>) -> Result<(), ProtocolError> {
    put_header(buf, PINGREQ, 0)
}

/// Encode a DISCONNECT packet.
pub fn encode_disconnect<const N: usize>(buf: &mut Vec<u8, N>) -> Result<(), ProtocolError> {
    put_header(buf, DISCONNECT, 0)
}

/// Topic names must be non-empty; only filters may carry wildcards.
fn validate_topic(topic: &str, filter: bool) -> Result<(), ProtocolError> {
    if topic.is_empty() || topic.contains('\0') {
        return Err(ProtocolError::Malformed);
    }
    if !filter && topic.contains(['+', '#']) {
        return Err(ProtocolError::Malformed);
    }
    Ok(())
}

/// Parse the fixed header at the start of `buf`.
///
/// Returns the header length and the remaining length, or `None` when more
/// bytes are needed.
fn parse_fixed_header(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for i in 0..4 {
        let Some(&byte) = buf.get(1 + i) else {
            return Ok(None);
        };
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((2 + i, value)));
        }
        multiplier *= 128;
    }
    Err(ProtocolError::Malformed)
}

fn read_u16(bytes: &[u8]) -> Result<u16, ProtocolError> {
    match bytes {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(ProtocolError::Malformed),
    }
}

/// Decode one complete frame, fixed header included.
pub fn decode(frame: &[u8]) -> Result<Event<'_>, ProtocolError> {
    let (header_len, remaining) =
        parse_fixed_header(frame)?.ok_or(ProtocolError::Truncated)?;
    let body = frame
        .get(header_len..header_len + remaining)
        .ok_or(ProtocolError::Truncated)?;
    let packet_type = frame[0] >> 4;

    match packet_type {
        CONNACK => match body {
            [flags, return_code] => Ok(Event::HandshakeAcknowledged {
                session_present: flags & 0x01 != 0,
                return_code: *return_code,
            }),
            _ => Err(ProtocolError::Malformed),
        },
        PUBLISH_TYPE => {
            let qos = (frame[0] >> 1) & 0x03;
            if qos == 3 {
                return Err(ProtocolError::Malformed);
            }
            let topic_len = read_u16(body)? as usize;
            let topic_end = 2 + topic_len;
            let topic = body.get(2..topic_end).ok_or(ProtocolError::Malformed)?;
            let topic = core::str::from_utf8(topic).map_err(|_| ProtocolError::Malformed)?;
            let (packet_id, payload_start) = if qos > 0 {
                let id = read_u16(body.get(topic_end..).ok_or(ProtocolError::Malformed)?)?;
                (Some(id), topic_end + 2)
            } else {
                (None, topic_end)
            };
            Ok(Event::MessageDelivered {
                topic,
                payload: &body[payload_start..],
                packet_id,
            })
        }
        PUBACK => match body {
            [_, _] => Ok(Event::PublishAcknowledged {
                packet_id: read_u16(body)?,
            }),
            _ => Err(ProtocolError::Malformed),
        },
        SUBACK => match body {
            [_, _, granted, ..] => Ok(Event::SubscribeAcknowledged {
                packet_id: read_u16(body)?,
                granted: *granted,
            }),
            _ => Err(ProtocolError::Malformed),
        },
        PINGRESP if body.is_empty() => Ok(Event::KeepaliveAcknowledged),
        PINGRESP => Err(ProtocolError::Malformed),
        DISCONNECT_TYPE => Ok(Event::PeerDisconnected),
        _ => Ok(Event::Unrecognized { packet_type }),
    }
}

/// Streaming frame reassembler with a fixed `N`-byte capacity.
///
/// A frame longer than `N` bytes is reported once as
/// [`ProtocolError::Oversized`] and its bytes are skipped as they arrive.
/// A frame whose length field is invalid is reported as
/// [`ProtocolError::Malformed`] and everything buffered is dropped.
///
/// `N` must hold at least [`MAX_FIXED_HEADER_LEN`] bytes; smaller
/// capacities fail to compile.
#[derive(Debug)]
pub struct Decoder<const N: usize> {
    buf: Vec<u8, N>,
    skip: usize,
}

impl<const N: usize> Decoder<N> {
    /// An empty decoder.
    pub const fn new() -> Self {
        const { assert!(N >= MAX_FIXED_HEADER_LEN, "decoder cannot hold a fixed header") };
        Self {
            buf: Vec::new(),
            skip: 0,
        }
    }

    /// Bytes buffered towards an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.skip = 0;
    }

    /// Consume `input`, invoking `sink` once per complete frame in arrival
    /// order.
    pub fn feed<F>(&mut self, mut input: &[u8], mut sink: F)
    where
        F: FnMut(Result<Event<'_>, ProtocolError>),
    {
        while !input.is_empty() {
            if self.skip > 0 {
                let n = self.skip.min(input.len());
                self.skip -= n;
                input = &input[n..];
                continue;
            }

            let take = (N - self.buf.len()).min(input.len());
            // `take` never exceeds the spare capacity
            let _ = self.buf.extend_from_slice(&input[..take]);
            input = &input[take..];

            self.drain(&mut sink);
        }
    }

    fn drain<F>(&mut self, sink: &mut F)
    where
        F: FnMut(Result<Event<'_>, ProtocolError>),
    {
        loop {
            let (header_len, remaining) = match parse_fixed_header(&self.buf) {
                Ok(Some(header)) => header,
                Ok(None) => return,
                Err(err) => {
                    sink(Err(err));
                    self.buf.clear();
                    return;
                }
            };

            let total = header_len + remaining;
            if total > N {
                sink(Err(ProtocolError::Oversized));
                self.skip = total - self.buf.len();
                self.buf.clear();
                return;
            }
            if self.buf.len() < total {
                return;
            }

            sink(decode(&self.buf[..total]));
            let rest = self.buf.len() - total;
            self.buf.copy_within(total.., 0);
            self.buf.truncate(rest);
        }
    }
}

impl<const N: usize> Default for Decoder<N> {
    fn default() -> Self {
        Self::new()
    }
}
