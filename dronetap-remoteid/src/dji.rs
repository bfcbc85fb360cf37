// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! DJI proprietary DroneID flight-info decoding.
//!
//! The beacon vendor element (OUI 60-60-1F) carries a fixed-layout record:
//! coordinates in 1/174533-degree units (radians scaled by 1e7), altitude and
//! height in 0.1 m, velocities in 0.01 m/s, yaw in 0.01 deg, followed by the
//! pilot and home positions, a product type byte and an optional flight UUID.

use crate::{ascii_field, DecodeError};

/// Vendor subtype that introduces a flight-info record.
pub const FLIGHT_INFO_SUBTYPE: u8 = 0x10;

/// Minimum record length through the home position and product type.
const MIN_RECORD_LEN: usize = 64;

/// Divisor converting raw DJI coordinates to degrees.
const COORDINATE_SCALE: f64 = 174533.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DjiFlightInfo {
    pub version: u8,
    pub sequence: u16,
    /// Airframe serial number (16 ASCII bytes on the wire).
    pub serial: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Barometric altitude in meters.
    pub altitude: Option<f32>,
    /// Height above takeoff in meters.
    pub height: Option<f32>,
    /// Horizontal ground speed in m/s, derived from the velocity components.
    pub speed: Option<f32>,
    /// Vertical speed in m/s, up positive.
    pub vertical_speed: Option<f32>,
    /// Ground track in degrees, 0-359, derived from yaw.
    pub ground_track: Option<u16>,
    pub pilot_latitude: Option<f64>,
    pub pilot_longitude: Option<f64>,
    pub home_latitude: Option<f64>,
    pub home_longitude: Option<f64>,
    pub product_type: u8,
    /// Flight UUID, empty when the record does not carry one.
    pub uuid: String,
}

/// Decode the vendor element payload following the DJI OUI.
pub fn decode_flight_info(payload: &[u8]) -> Result<DjiFlightInfo, DecodeError> {
    if payload.len() < MIN_RECORD_LEN {
        return Err(DecodeError::Truncated {
            needed: MIN_RECORD_LEN,
            got: payload.len(),
        });
    }
    if payload[0] != FLIGHT_INFO_SUBTYPE {
        return Err(DecodeError::UnexpectedVendorType(payload[0]));
    }

    let longitude = coordinate(&payload[22..26]);
    let latitude = coordinate(&payload[26..30]);
    let altitude = decimeters(&payload[30..32]);
    let height = decimeters(&payload[32..34]);
    let v_north = centi(&payload[34..36]);
    let v_east = centi(&payload[36..38]);
    let v_up = centi(&payload[38..40]);
    let yaw = centi(&payload[40..42]);

    let speed = match (v_north, v_east) {
        (Some(n), Some(e)) => Some((n * n + e * e).sqrt()),
        _ => None,
    };
    let ground_track = yaw.map(|y| (y.round() as i32).rem_euclid(360) as u16);

    let uuid = if payload.len() > MIN_RECORD_LEN {
        let len = (payload[63] as usize).min(payload.len() - MIN_RECORD_LEN);
        ascii_field(&payload[64..64 + len])
    } else {
        String::new()
    };

    Ok(DjiFlightInfo {
        version: payload[1],
        sequence: u16::from_le_bytes([payload[2], payload[3]]),
        serial: ascii_field(&payload[6..22]),
        latitude,
        longitude,
        altitude,
        height,
        speed,
        vertical_speed: v_up,
        ground_track,
        pilot_latitude: coordinate(&payload[46..50]),
        pilot_longitude: coordinate(&payload[50..54]),
        home_longitude: coordinate(&payload[54..58]),
        home_latitude: coordinate(&payload[58..62]),
        product_type: payload[62],
        uuid,
    })
}

fn coordinate(b: &[u8]) -> Option<f64> {
    let raw = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    if raw == 0 {
        None
    } else {
        Some(raw as f64 / COORDINATE_SCALE)
    }
}

fn decimeters(b: &[u8]) -> Option<f32> {
    let raw = i16::from_le_bytes([b[0], b[1]]);
    if raw == i16::MIN {
        None
    } else {
        Some(raw as f32 * 0.1)
    }
}

fn centi(b: &[u8]) -> Option<f32> {
    let raw = i16::from_le_bytes([b[0], b[1]]);
    if raw == i16::MIN {
        None
    } else {
        Some(raw as f32 * 0.01)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight_info_record(serial: &str, lat: f64, lon: f64) -> Vec<u8> {
        let mut p = vec![0u8; 84];
        p[0] = FLIGHT_INFO_SUBTYPE;
        p[1] = 2;
        p[2..4].copy_from_slice(&417u16.to_le_bytes());
        p[6..6 + serial.len()].copy_from_slice(serial.as_bytes());
        p[22..26].copy_from_slice(&((lon * COORDINATE_SCALE) as i32).to_le_bytes());
        p[26..30].copy_from_slice(&((lat * COORDINATE_SCALE) as i32).to_le_bytes());
        p[30..32].copy_from_slice(&852i16.to_le_bytes()); // 85.2 m altitude
        p[32..34].copy_from_slice(&700i16.to_le_bytes()); // 70 m height
        p[34..36].copy_from_slice(&300i16.to_le_bytes()); // 3 m/s north
        p[36..38].copy_from_slice(&400i16.to_le_bytes()); // 4 m/s east
        p[38..40].copy_from_slice(&(-150i16).to_le_bytes()); // 1.5 m/s down
        p[40..42].copy_from_slice(&(-9000i16).to_le_bytes()); // yaw -90 deg
        p[46..50].copy_from_slice(&((lat * COORDINATE_SCALE) as i32).to_le_bytes());
        p[50..54].copy_from_slice(&(((lon + 0.001) * COORDINATE_SCALE) as i32).to_le_bytes());
        p[62] = 16; // Mavic-family product code
        p[63] = 4;
        p[64..68].copy_from_slice(b"f1a2");
        p
    }

    #[test]
    fn flight_info_round_trips() {
        let info =
            decode_flight_info(&flight_info_record("1581F5FKD228S00A", 47.61, -122.33)).unwrap();
        assert_eq!(info.version, 2);
        assert_eq!(info.sequence, 417);
        assert_eq!(info.serial, "1581F5FKD228S00A");
        assert!((info.latitude.unwrap() - 47.61).abs() < 1e-4);
        assert!((info.longitude.unwrap() + 122.33).abs() < 1e-4);
        assert_eq!(info.altitude, Some(85.2));
        assert_eq!(info.height, Some(70.0));
        assert_eq!(info.speed, Some(5.0));
        assert_eq!(info.vertical_speed, Some(-1.5));
        assert_eq!(info.ground_track, Some(270));
        assert!(info.pilot_latitude.is_some());
        assert_eq!(info.product_type, 16);
        assert_eq!(info.uuid, "f1a2");
    }

    #[test]
    fn zero_coordinates_are_unknown() {
        let mut record = flight_info_record("1581F5FKD228S00A", 0.0, 0.0);
        record[46..62].fill(0);
        let info = decode_flight_info(&record).unwrap();
        assert_eq!(info.latitude, None);
        assert_eq!(info.longitude, None);
        assert_eq!(info.pilot_latitude, None);
        assert_eq!(info.home_latitude, None);
    }

    #[test]
    fn short_payload_is_truncated() {
        assert!(matches!(
            decode_flight_info(&[FLIGHT_INFO_SUBTYPE; 20]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn wrong_subtype_is_rejected() {
        let mut record = flight_info_record("X", 47.0, -122.0);
        record[0] = 0x11;
        assert_eq!(
            decode_flight_info(&record),
            Err(DecodeError::UnexpectedVendorType(0x11))
        );
    }
}
