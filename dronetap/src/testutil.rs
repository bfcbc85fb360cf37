// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Synthetic frames and payloads for tests. Compiled only for the crate's
//! own tests and the `test-utils` feature.

use crate::capture::{FrameRecord, SUBTYPE_BEACON};
use dronetap_remoteid::{VendorElement, ASTM_OUI, ASTM_VENDOR_TYPE, DJI_OUI};
use std::collections::HashMap;

pub const MESSAGE_LEN: usize = 25;

pub fn basic_id_message(id_type: u8, ua_type: u8, id: &str) -> [u8; MESSAGE_LEN] {
    let mut m = [0u8; MESSAGE_LEN];
    m[0] = 0x02;
    m[1] = (id_type << 4) | ua_type;
    m[2..2 + id.len()].copy_from_slice(id.as_bytes());
    m
}

pub fn location_message(
    status: u8,
    lat: f64,
    lon: f64,
    alt_geodetic: f32,
    speed: f32,
) -> [u8; MESSAGE_LEN] {
    let mut m = [0u8; MESSAGE_LEN];
    m[0] = 0x12;
    m[1] = status << 4;
    m[2] = 90; // track 90 deg
    m[3] = (speed / 0.25) as u8;
    m[4] = 2; // 1 m/s climb
    m[5..9].copy_from_slice(&((lat * 1e7) as i32).to_le_bytes());
    m[9..13].copy_from_slice(&((lon * 1e7) as i32).to_le_bytes());
    m[13..15].copy_from_slice(&(((alt_geodetic + 1000.0) * 2.0) as u16).to_le_bytes());
    m[15..17].copy_from_slice(&(((alt_geodetic + 1000.0) * 2.0) as u16).to_le_bytes());
    m[17..19].copy_from_slice(&2100u16.to_le_bytes()); // height 50 m
    m[19] = (4 << 4) | 10;
    m[20] = (3 << 4) | 3;
    m
}

pub fn system_message(operator_lat: f64, operator_lon: f64) -> [u8; MESSAGE_LEN] {
    let mut m = [0u8; MESSAGE_LEN];
    m[0] = 0x42;
    m[1] = 1; // dynamic operator location
    m[2..6].copy_from_slice(&((operator_lat * 1e7) as i32).to_le_bytes());
    m[6..10].copy_from_slice(&((operator_lon * 1e7) as i32).to_le_bytes());
    m[10..12].copy_from_slice(&1u16.to_le_bytes());
    m
}

/// Wrap fixed messages in a Message Pack behind the broadcast framing.
pub fn broadcast_payload(messages: &[[u8; MESSAGE_LEN]]) -> Vec<u8> {
    let mut payload = vec![ASTM_VENDOR_TYPE, 0, 0xF2, MESSAGE_LEN as u8, messages.len() as u8];
    for m in messages {
        payload.extend_from_slice(m);
    }
    payload
}

/// Beacon frame carrying an ASTM Remote ID vendor element.
pub fn remote_id_frame(mac: &str, timestamp: f64, messages: &[[u8; MESSAGE_LEN]]) -> FrameRecord {
    frame(
        mac,
        timestamp,
        None,
        vec![VendorElement {
            oui: ASTM_OUI,
            payload: broadcast_payload(messages),
        }],
    )
}

/// DJI DroneID flight-info payload with a plausible in-flight state.
pub fn dji_payload(serial: &str, lat: f64, lon: f64) -> Vec<u8> {
    const SCALE: f64 = 174533.0;
    let mut p = vec![0u8; 84];
    p[0] = 0x10;
    p[1] = 2;
    p[2..4].copy_from_slice(&7u16.to_le_bytes());
    p[6..6 + serial.len()].copy_from_slice(serial.as_bytes());
    p[22..26].copy_from_slice(&((lon * SCALE) as i32).to_le_bytes());
    p[26..30].copy_from_slice(&((lat * SCALE) as i32).to_le_bytes());
    p[30..32].copy_from_slice(&900i16.to_le_bytes()); // 90 m altitude
    p[32..34].copy_from_slice(&600i16.to_le_bytes()); // 60 m height
    p[34..36].copy_from_slice(&300i16.to_le_bytes());
    p[36..38].copy_from_slice(&400i16.to_le_bytes());
    p[38..40].copy_from_slice(&100i16.to_le_bytes());
    p[40..42].copy_from_slice(&4500i16.to_le_bytes());
    p[46..50].copy_from_slice(&((lat * SCALE) as i32).to_le_bytes());
    p[50..54].copy_from_slice(&((lon * SCALE) as i32).to_le_bytes());
    p[62] = 16;
    p
}

/// Beacon frame carrying a DJI DroneID vendor element.
pub fn dji_frame(mac: &str, timestamp: f64, serial: &str) -> FrameRecord {
    frame(
        mac,
        timestamp,
        Some("DJI-PHANTOM"),
        vec![VendorElement {
            oui: DJI_OUI,
            payload: dji_payload(serial, 47.61, -122.33),
        }],
    )
}

/// Management frame without any vendor element.
pub fn plain_frame(mac: &str, timestamp: f64, ssid: Option<&str>) -> FrameRecord {
    frame(mac, timestamp, ssid, Vec::new())
}

fn frame(
    mac: &str,
    timestamp: f64,
    ssid: Option<&str>,
    vendor_elements: Vec<VendorElement>,
) -> FrameRecord {
    let mut raw_fields = HashMap::new();
    raw_fields.insert("frame.time_epoch".to_string(), timestamp.to_string());
    raw_fields.insert("wlan.sa".to_string(), mac.to_string());
    if let Some(ssid) = ssid {
        raw_fields.insert("wlan.ssid".to_string(), ssid.to_string());
    }
    FrameRecord {
        timestamp,
        source_mac: mac.to_string(),
        channel: Some(6),
        rssi: Some(-52),
        subtype: Some(SUBTYPE_BEACON),
        ssid: ssid.map(str::to_string),
        vendor_elements,
        raw_fields,
    }
}
