// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tap-to-node wire contract.
//!
//! Each message is two length-prefixed frames: the topic bytes, then a
//! named-field msgpack payload. The node binds, taps connect.

use serde::Serialize;

/// Bumped on type changes or field removals; additions are non-breaking.
pub const PROTOCOL_VERSION: u32 = 1;

pub const TOPIC_UAV: &str = "uav";
pub const TOPIC_HEARTBEAT: &str = "heartbeat";
/// Reserved for future out-of-band notifications.
pub const TOPIC_ALERT: &str = "alert";

/// One queued outbound message.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub topic: &'static str,
    pub payload: Vec<u8>,
}

/// Encode a document into a publishable message.
pub fn encode<T: Serialize>(
    topic: &'static str,
    value: &T,
) -> Result<WireMessage, rmp_serde::encode::Error> {
    Ok(WireMessage {
        topic,
        payload: rmp_serde::encode::to_vec_named(value)?,
    })
}

/// Serialize the two frames as they go on the socket.
pub fn frame(message: &WireMessage) -> Vec<u8> {
    let topic = message.topic.as_bytes();
    let mut out =
        Vec::with_capacity(8 + topic.len() + message.payload.len());
    out.extend_from_slice(&(topic.len() as u32).to_be_bytes());
    out.extend_from_slice(topic);
    out.extend_from_slice(&(message.payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&message.payload);
    out
}

/// Split one framed message off the front of a buffer. Used by tests and
/// useful for diagnostics against a live node.
pub fn read_frame(buffer: &[u8]) -> Option<(Vec<u8>, Vec<u8>, usize)> {
    let (topic, after_topic) = read_chunk(buffer)?;
    let (payload, consumed) = read_chunk(&buffer[after_topic..])?;
    Some((topic, payload, after_topic + consumed))
}

fn read_chunk(buffer: &[u8]) -> Option<(Vec<u8>, usize)> {
    if buffer.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if buffer.len() < 4 + len {
        return None;
    }
    Some((buffer[4..4 + len].to_vec(), 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Doc {
        name: &'static str,
        value: Option<u32>,
    }

    #[test]
    fn frames_round_trip() {
        let message = encode(
            TOPIC_UAV,
            &Doc {
                name: "x",
                value: Some(7),
            },
        )
        .unwrap();
        let bytes = frame(&message);
        let (topic, payload, consumed) = read_frame(&bytes).unwrap();
        assert_eq!(topic, b"uav");
        assert_eq!(payload, message.payload);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn payload_is_a_named_map_with_nulls_present() {
        let message = encode(
            TOPIC_HEARTBEAT,
            &Doc {
                name: "x",
                value: None,
            },
        )
        .unwrap();
        // fixmap(2), "name" and "value" keys present, value nil.
        assert_eq!(message.payload[0], 0x82);
        assert!(message.payload.windows(4).any(|w| w == b"name"));
        assert!(message.payload.windows(5).any(|w| w == b"value"));
        assert_eq!(*message.payload.last().unwrap(), 0xc0);
    }

    #[test]
    fn partial_buffers_are_incomplete() {
        let message = encode(TOPIC_ALERT, &Doc { name: "x", value: None }).unwrap();
        let bytes = frame(&message);
        assert!(read_frame(&bytes[..bytes.len() - 1]).is_none());
    }
}
