// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! ASTM F3411 broadcast message decoding.
//!
//! Messages are fixed 25-byte records; a Message Pack (type 0xF) bundles up
//! to nine of them behind a two-byte pack header. The over-the-air element
//! is `[vendor type 0x0D][message counter][message or pack]`.

use crate::{
    ascii_field, Authentication, BasicId, DecodeError, HeightType, IdType, Location,
    OperationalStatus, OperatorId, OperatorLocationType, RemoteIdMessage, SelfId, SystemMessage,
    UaType, ASTM_VENDOR_TYPE,
};

/// Fixed length of every ASTM message record.
pub const MESSAGE_LEN: usize = 25;
/// Message type of the Message Pack container.
pub const MESSAGE_TYPE_PACK: u8 = 0xF;
/// Maximum number of messages a pack may carry.
pub const MAX_PACK_MESSAGES: usize = 9;

/// Decode the vendor element payload of a Remote ID broadcast.
///
/// `payload` is everything after the 3-byte OUI: the vendor type byte, the
/// one-byte message counter, then a single message or a message pack.
pub fn decode_broadcast(payload: &[u8]) -> Result<Vec<RemoteIdMessage>, DecodeError> {
    if payload.len() < 2 + MESSAGE_LEN {
        return Err(DecodeError::Truncated {
            needed: 2 + MESSAGE_LEN,
            got: payload.len(),
        });
    }
    if payload[0] != ASTM_VENDOR_TYPE {
        return Err(DecodeError::UnexpectedVendorType(payload[0]));
    }
    // payload[1] is the message counter; repeats carry no new information.
    decode_messages(&payload[2..])
}

/// Decode a single message record or a message pack.
pub fn decode_messages(data: &[u8]) -> Result<Vec<RemoteIdMessage>, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Truncated { needed: 1, got: 0 });
    }
    let message_type = data[0] >> 4;
    if message_type != MESSAGE_TYPE_PACK {
        return match decode_message(data)? {
            Some(message) => Ok(vec![message]),
            None => Err(DecodeError::UnknownMessageType(message_type)),
        };
    }

    if data.len() < 3 {
        return Err(DecodeError::Truncated {
            needed: 3,
            got: data.len(),
        });
    }
    let message_size = data[1];
    if message_size as usize != MESSAGE_LEN {
        return Err(DecodeError::BadMessageSize(message_size));
    }
    let count = (data[2] as usize).min(MAX_PACK_MESSAGES);
    let needed = 3 + count * MESSAGE_LEN;
    if data.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            got: data.len(),
        });
    }

    let mut messages = Vec::with_capacity(count);
    for i in 0..count {
        let start = 3 + i * MESSAGE_LEN;
        // Reserved types inside a pack are skipped for forward compatibility.
        if let Some(message) = decode_message(&data[start..start + MESSAGE_LEN])? {
            messages.push(message);
        }
    }
    Ok(messages)
}

/// Decode one 25-byte record. Reserved message types yield `Ok(None)`.
pub fn decode_message(bytes: &[u8]) -> Result<Option<RemoteIdMessage>, DecodeError> {
    if bytes.len() < MESSAGE_LEN {
        return Err(DecodeError::Truncated {
            needed: MESSAGE_LEN,
            got: bytes.len(),
        });
    }
    let bytes = &bytes[..MESSAGE_LEN];
    let message = match bytes[0] >> 4 {
        0 => Some(RemoteIdMessage::BasicId(decode_basic_id(bytes))),
        1 => Some(RemoteIdMessage::Location(decode_location(bytes))),
        2 => Some(RemoteIdMessage::Authentication(decode_authentication(bytes))),
        3 => Some(RemoteIdMessage::SelfId(decode_self_id(bytes))),
        4 => Some(RemoteIdMessage::System(decode_system(bytes))),
        5 => Some(RemoteIdMessage::OperatorId(decode_operator_id(bytes))),
        _ => None,
    };
    Ok(message)
}

fn decode_basic_id(b: &[u8]) -> BasicId {
    BasicId {
        id_type: IdType::from_u8(b[1] >> 4),
        ua_type: UaType::from_u8(b[1] & 0x0F),
        uas_id: ascii_field(&b[2..22]),
    }
}

fn decode_location(b: &[u8]) -> Location {
    let status = OperationalStatus::from_u8(b[1] >> 4);
    let height_type = if (b[1] >> 2) & 1 == 1 {
        HeightType::AboveGround
    } else {
        HeightType::AboveTakeoff
    };
    let east_west = (b[1] >> 1) & 1 == 1;
    let speed_multiplier = b[1] & 1 == 1;

    let track = {
        let raw = b[2] as u16 + if east_west { 180 } else { 0 };
        // 361 encodes "unknown" on the wire.
        if raw > 359 {
            None
        } else {
            Some(raw)
        }
    };
    let speed = match b[3] {
        255 => None,
        raw if speed_multiplier => Some(raw as f32 * 0.75 + 63.75),
        raw => Some(raw as f32 * 0.25),
    };
    let vertical_speed = match b[4] as i8 {
        63 => None,
        raw => Some(raw as f32 * 0.5),
    };

    Location {
        status,
        height_type,
        track,
        speed,
        vertical_speed,
        latitude: decode_coordinate(&b[5..9]),
        longitude: decode_coordinate(&b[9..13]),
        altitude_pressure: decode_altitude(&b[13..15]),
        altitude_geodetic: decode_altitude(&b[15..17]),
        height: decode_altitude(&b[17..19]),
        horizontal_accuracy: horizontal_accuracy_m(b[19] & 0x0F),
        vertical_accuracy: vertical_accuracy_m(b[19] >> 4),
        barometer_accuracy: vertical_accuracy_m(b[20] >> 4),
        speed_accuracy: speed_accuracy_m_s(b[20] & 0x0F),
    }
}

fn decode_authentication(b: &[u8]) -> Authentication {
    let auth_type = b[1] >> 4;
    let page = b[1] & 0x0F;
    // Page 0 leads with last-page-index, length and a timestamp before the
    // first data bytes; later pages are all data.
    let data = if page == 0 { &b[8..25] } else { &b[2..25] };
    let end = data.iter().rposition(|&x| x != 0).map_or(0, |p| p + 1);
    Authentication {
        auth_type,
        page,
        data: data[..end].to_vec(),
    }
}

fn decode_self_id(b: &[u8]) -> SelfId {
    SelfId {
        description_type: b[1],
        description: ascii_field(&b[2..25]),
    }
}

fn decode_system(b: &[u8]) -> SystemMessage {
    let classification_type = (b[1] >> 2) & 0x07;
    let eu = classification_type == 1;
    let nonzero = |v: u8| if v == 0 { None } else { Some(v) };
    SystemMessage {
        operator_location_type: OperatorLocationType::from_u8(b[1] & 0x03),
        classification_type,
        operator_latitude: decode_coordinate(&b[2..6]),
        operator_longitude: decode_coordinate(&b[6..10]),
        area_count: u16::from_le_bytes([b[10], b[11]]),
        area_radius: b[12] as f32 * 10.0,
        area_ceiling: decode_altitude(&b[13..15]),
        area_floor: decode_altitude(&b[15..17]),
        category_eu: if eu { nonzero(b[17] >> 4) } else { None },
        class_eu: if eu { nonzero(b[17] & 0x0F) } else { None },
        operator_altitude: decode_altitude(&b[18..20]),
    }
}

fn decode_operator_id(b: &[u8]) -> OperatorId {
    OperatorId {
        operator_id_type: b[1],
        operator_id: ascii_field(&b[2..22]),
    }
}

/// Signed 1e-7-degree coordinate; raw zero is "unknown".
fn decode_coordinate(b: &[u8]) -> Option<f64> {
    let raw = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    if raw == 0 {
        None
    } else {
        Some(raw as f64 * 1e-7)
    }
}

/// Altitude encoded as (value + 1000 m) / 0.5; raw zero is "invalid".
fn decode_altitude(b: &[u8]) -> Option<f32> {
    let raw = u16::from_le_bytes([b[0], b[1]]);
    if raw == 0 {
        None
    } else {
        Some(raw as f32 * 0.5 - 1000.0)
    }
}

/// Horizontal accuracy category to meters (ASTM table: NM-derived buckets).
pub fn horizontal_accuracy_m(v: u8) -> Option<f32> {
    match v {
        1 => Some(18520.0),
        2 => Some(7408.0),
        3 => Some(3704.0),
        4 => Some(1852.0),
        5 => Some(926.0),
        6 => Some(555.6),
        7 => Some(185.2),
        8 => Some(92.6),
        9 => Some(30.0),
        10 => Some(10.0),
        11 => Some(3.0),
        12 => Some(1.0),
        _ => None,
    }
}

/// Vertical / barometric accuracy category to meters.
pub fn vertical_accuracy_m(v: u8) -> Option<f32> {
    match v {
        1 => Some(150.0),
        2 => Some(45.0),
        3 => Some(25.0),
        4 => Some(10.0),
        5 => Some(3.0),
        6 => Some(1.0),
        _ => None,
    }
}

/// Speed accuracy category to m/s.
pub fn speed_accuracy_m_s(v: u8) -> Option<f32> {
    match v {
        1 => Some(10.0),
        2 => Some(3.0),
        3 => Some(1.0),
        4 => Some(0.3),
        _ => None,
    }
}
