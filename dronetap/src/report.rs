// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire documents published to the collector.
//!
//! Every field is serialized even when null so receivers never have to
//! probe for presence; unknown fields are ignored on the receiving side,
//! which makes additions non-breaking. Type changes or removals bump
//! [`crate::wire::PROTOCOL_VERSION`].

use serde::Serialize;
use std::collections::HashMap;

/// Full per-airframe detection report, topic `uav`.
#[derive(Debug, Clone, Serialize)]
pub struct UavReport {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub protocol_version: u32,
    pub tap_uuid: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
    pub mac: String,
    pub identifier: String,
    pub detection_source: &'static str,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_geodetic: Option<f64>,
    pub altitude_pressure: Option<f64>,
    pub height: Option<f64>,
    pub height_type: Option<u8>,

    pub ground_track: Option<u16>,
    pub speed: Option<f64>,
    pub vertical_speed: Option<f64>,

    pub id_serial: Option<String>,
    pub id_registration: Option<String>,
    pub id_utm: Option<String>,
    pub id_session: Option<String>,
    pub uav_type: Option<u8>,
    pub operational_status: Option<u8>,

    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub operator_altitude: Option<f64>,
    pub operator_id: Option<String>,
    pub operator_location_type: Option<u8>,

    pub rssi: Option<i32>,
    pub ssid: Option<String>,

    pub accuracy_horizontal: Option<f64>,
    pub accuracy_vertical: Option<f64>,
    pub accuracy_barometer: Option<f64>,
    pub accuracy_speed: Option<f64>,

    pub category_eu: Option<u8>,
    pub class_eu: Option<u8>,

    pub area_count: Option<u32>,
    pub area_radius: Option<f64>,
    pub area_ceiling: Option<f64>,
    pub area_floor: Option<f64>,

    pub spoof_flags: Vec<&'static str>,
    pub trust_score: u8,
    pub auth_type: Option<u8>,
    pub auth_data: Option<String>,

    pub designation: Option<String>,
    pub message_types_seen: Vec<u8>,
    pub self_id_description: Option<String>,
    pub self_id_type: Option<u8>,

    pub raw_fields: HashMap<String, String>,
}

/// Record type carried in `UavReport::record_type`.
pub const UAV_REPORT_TYPE: &str = "uav_report";

/// Tap liveness document, topic `heartbeat`.
#[derive(Debug, Clone, Serialize)]
pub struct TapHeartbeat {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub protocol_version: u32,
    pub tap_uuid: String,
    pub tap_name: String,
    pub timestamp: String,
    pub version: String,
    pub interface: String,
    pub channel: Option<u16>,

    pub cpu_load: f64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_percent: f64,
    /// Degrees Celsius; null when the platform exposes no thermal zone.
    pub temperature: Option<f64>,
    pub disk_free: u64,
    pub disk_writes_total: u64,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub frames_total: u64,
    pub frames_parsed: u64,
    pub tshark_running: bool,
    pub tap_uptime: u64,
    pub channels: Vec<u16>,
    pub capture_errors: u64,
}

/// Record type carried in `TapHeartbeat::record_type`.
pub const HEARTBEAT_TYPE: &str = "tap_heartbeat";
