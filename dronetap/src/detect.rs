// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frame-to-detection routing.
//!
//! Vendor-specific elements are routed by OUI: ASTM Remote ID message packs
//! first, DJI proprietary DroneID second, and an SSID/OUI fingerprint
//! fallback when a frame carries neither. Malformed payloads never escape
//! this module; they surface as a counted [`ParseOutcome::Malformed`].

use crate::capture::FrameRecord;
use crate::fingerprint::FingerprintTables;
use dronetap_remoteid::{astm, dji, RemoteIdMessage, ASTM_OUI, DJI_OUI};
use std::collections::HashMap;
use tracing::trace;

/// How the airframe was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    RemoteIdWiFi,
    DjiProprietaryDroneId,
    WiFiFingerprint,
}

impl DetectionSource {
    /// Wire name, stable across protocol versions.
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionSource::RemoteIdWiFi => "RemoteIdWiFi",
            DetectionSource::DjiProprietaryDroneId => "DJIProprietaryDroneID",
            DetectionSource::WiFiFingerprint => "WiFiFingerprint",
        }
    }
}

/// Flat view of every protocol field an event can carry. `None` means the
/// observation did not include the field; the correlator never regresses a
/// known value on `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionFields {
    pub id_serial: Option<String>,
    pub id_registration: Option<String>,
    pub id_utm: Option<String>,
    pub id_session: Option<String>,
    pub uav_type: Option<u8>,
    pub operational_status: Option<u8>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_geodetic: Option<f64>,
    pub altitude_pressure: Option<f64>,
    pub height: Option<f64>,
    pub height_type: Option<u8>,
    pub ground_track: Option<u16>,
    pub speed: Option<f64>,
    pub vertical_speed: Option<f64>,
    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub operator_altitude: Option<f64>,
    pub operator_id: Option<String>,
    pub operator_location_type: Option<u8>,
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
    pub auth_type: Option<u8>,
    pub auth_data: Option<String>,
    pub self_id_description: Option<String>,
    pub self_id_type: Option<u8>,
}

impl DetectionFields {
    /// Non-null overwrite: later observations win only where they carry a
    /// value.
    pub fn merge_from(&mut self, other: &DetectionFields) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            id_serial,
            id_registration,
            id_utm,
            id_session,
            uav_type,
            operational_status,
            latitude,
            longitude,
            altitude_geodetic,
            altitude_pressure,
            height,
            height_type,
            ground_track,
            speed,
            vertical_speed,
            operator_latitude,
            operator_longitude,
            operator_altitude,
            operator_id,
            operator_location_type,
            accuracy_horizontal,
            accuracy_vertical,
            accuracy_barometer,
            accuracy_speed,
            category_eu,
            class_eu,
            area_count,
            area_radius,
            area_ceiling,
            area_floor,
            auth_type,
            auth_data,
            self_id_description,
            self_id_type,
        );
    }
}

/// One successfully parsed observation of an airframe.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub mac: String,
    /// Capture timestamp, epoch seconds.
    pub timestamp: f64,
    pub source: DetectionSource,
    pub rssi: Option<i32>,
    pub ssid: Option<String>,
    pub fields: DetectionFields,
    /// ASTM message types carried by this event; empty for proprietary and
    /// fingerprint sources.
    pub message_types: Vec<u8>,
    pub raw_fields: HashMap<String, String>,
}

#[derive(Debug)]
pub enum ParseOutcome {
    Detection(Box<DetectionEvent>),
    /// Nothing UAV-shaped in the frame.
    Nothing,
    /// A payload claimed to be Remote ID or DroneID but failed to decode.
    Malformed,
}

/// Decode one frame record. Never fails outward.
pub fn parse_frame(record: &FrameRecord, tables: &FingerprintTables) -> ParseOutcome {
    let mut fields = DetectionFields::default();
    let mut message_types = Vec::new();
    let mut saw_remote_id = false;
    let mut saw_dji = false;
    let mut malformed = false;

    for element in &record.vendor_elements {
        if element.oui == ASTM_OUI {
            match astm::decode_broadcast(&element.payload) {
                Ok(messages) if !messages.is_empty() => {
                    saw_remote_id = true;
                    for message in &messages {
                        apply_message(&mut fields, &mut message_types, message);
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    trace!(error = %err, mac = %record.source_mac, "bad remote id payload");
                    malformed = true;
                }
            }
        } else if element.oui == DJI_OUI {
            match dji::decode_flight_info(&element.payload) {
                Ok(info) => {
                    saw_dji = true;
                    apply_dji(&mut fields, &info);
                }
                Err(err) => {
                    trace!(error = %err, mac = %record.source_mac, "bad droneid payload");
                    malformed = true;
                }
            }
        }
    }

    if saw_remote_id {
        // An element with no identity and no position identifies nothing.
        if fields.id_serial.is_none()
            && fields.id_registration.is_none()
            && fields.latitude.is_none()
        {
            return ParseOutcome::Nothing;
        }
        return detection(record, DetectionSource::RemoteIdWiFi, fields, message_types);
    }
    if saw_dji {
        return detection(
            record,
            DetectionSource::DjiProprietaryDroneId,
            fields,
            Vec::new(),
        );
    }
    if malformed {
        return ParseOutcome::Malformed;
    }

    // Fingerprint fallback: MAC, SSID and RSSI only.
    let ssid_hit = record
        .ssid
        .as_deref()
        .and_then(|ssid| tables.match_ssid(ssid));
    if ssid_hit.is_some() || tables.match_mac(&record.source_mac).is_some() {
        return detection(
            record,
            DetectionSource::WiFiFingerprint,
            DetectionFields::default(),
            Vec::new(),
        );
    }
    ParseOutcome::Nothing
}

fn detection(
    record: &FrameRecord,
    source: DetectionSource,
    fields: DetectionFields,
    mut message_types: Vec<u8>,
) -> ParseOutcome {
    message_types.sort_unstable();
    message_types.dedup();
    ParseOutcome::Detection(Box::new(DetectionEvent {
        mac: record.source_mac.clone(),
        timestamp: record.timestamp,
        source,
        rssi: record.rssi,
        ssid: record.ssid.clone(),
        fields,
        message_types,
        raw_fields: record.raw_fields.clone(),
    }))
}

fn apply_message(
    fields: &mut DetectionFields,
    message_types: &mut Vec<u8>,
    message: &RemoteIdMessage,
) {
    message_types.push(message.message_type());
    match message {
        RemoteIdMessage::BasicId(id) => {
            if !id.uas_id.is_empty() {
                let value = Some(id.uas_id.clone());
                match id.id_type {
                    dronetap_remoteid::IdType::SerialNumber => fields.id_serial = value,
                    dronetap_remoteid::IdType::CaaRegistration => fields.id_registration = value,
                    dronetap_remoteid::IdType::UtmAssigned => fields.id_utm = value,
                    dronetap_remoteid::IdType::SessionId => fields.id_session = value,
                    dronetap_remoteid::IdType::None => {}
                }
            }
            fields.uav_type = Some(id.ua_type.as_u8());
        }
        RemoteIdMessage::Location(loc) => {
            fields.operational_status = Some(loc.status.as_u8());
            fields.height_type = Some(loc.height_type as u8);
            fields.ground_track = loc.track;
            fields.speed = loc.speed.map(f64::from);
            fields.vertical_speed = loc.vertical_speed.map(f64::from);
            fields.latitude = loc.latitude;
            fields.longitude = loc.longitude;
            fields.altitude_geodetic = loc.altitude_geodetic.map(f64::from);
            fields.altitude_pressure = loc.altitude_pressure.map(f64::from);
            fields.height = loc.height.map(f64::from);
            fields.accuracy_horizontal = loc.horizontal_accuracy.map(f64::from);
            fields.accuracy_vertical = loc.vertical_accuracy.map(f64::from);
            fields.accuracy_barometer = loc.barometer_accuracy.map(f64::from);
            fields.accuracy_speed = loc.speed_accuracy.map(f64::from);
        }
        RemoteIdMessage::Authentication(auth) => {
            fields.auth_type = Some(auth.auth_type);
            if !auth.data.is_empty() {
                let page = hex::encode(&auth.data);
                fields.auth_data = Some(match fields.auth_data.take() {
                    Some(existing) => existing + &page,
                    None => page,
                });
            }
        }
        RemoteIdMessage::SelfId(self_id) => {
            fields.self_id_type = Some(self_id.description_type);
            if !self_id.description.is_empty() {
                fields.self_id_description = Some(self_id.description.clone());
            }
        }
        RemoteIdMessage::System(sys) => {
            fields.operator_location_type = Some(sys.operator_location_type.as_u8());
            fields.operator_latitude = sys.operator_latitude;
            fields.operator_longitude = sys.operator_longitude;
            fields.operator_altitude = sys.operator_altitude.map(f64::from);
            fields.area_count = Some(sys.area_count as u32);
            fields.area_radius = Some(sys.area_radius as f64);
            fields.area_ceiling = sys.area_ceiling.map(f64::from);
            fields.area_floor = sys.area_floor.map(f64::from);
            fields.category_eu = sys.category_eu;
            fields.class_eu = sys.class_eu;
        }
        RemoteIdMessage::OperatorId(op) => {
            if !op.operator_id.is_empty() {
                fields.operator_id = Some(op.operator_id.clone());
            }
        }
    }
}

fn apply_dji(fields: &mut DetectionFields, info: &dji::DjiFlightInfo) {
    if !info.serial.is_empty() {
        fields.id_serial = Some(info.serial.clone());
    }
    fields.latitude = info.latitude;
    fields.longitude = info.longitude;
    fields.altitude_geodetic = info.altitude.map(f64::from);
    fields.height = info.height.map(f64::from);
    fields.speed = info.speed.map(f64::from);
    fields.vertical_speed = info.vertical_speed.map(f64::from);
    fields.ground_track = info.ground_track;
    fields.operator_latitude = info.pilot_latitude.or(info.home_latitude);
    fields.operator_longitude = info.pilot_longitude.or(info.home_longitude);
    if !info.uuid.is_empty() {
        fields.id_session = Some(info.uuid.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn remote_id_beacon_parses_to_a_detection() {
        let record = testutil::remote_id_frame(
            "aa:bb:cc:00:00:01",
            1000.0,
            &[
                testutil::basic_id_message(1, 2, "1596F3BCDE000001"),
                testutil::location_message(2, 47.6062, -122.3321, 120.0, 8.0),
            ],
        );
        let tables = FingerprintTables::builtin();
        match parse_frame(&record, &tables) {
            ParseOutcome::Detection(event) => {
                assert_eq!(event.source, DetectionSource::RemoteIdWiFi);
                assert_eq!(event.fields.id_serial.as_deref(), Some("1596F3BCDE000001"));
                assert_eq!(event.message_types, vec![0, 1]);
                assert!(event.fields.latitude.is_some());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn remote_id_without_identity_or_position_is_nothing() {
        let mut self_id = [0u8; 25];
        self_id[0] = 0x32;
        self_id[2..6].copy_from_slice(b"work");
        let record = testutil::remote_id_frame("aa:bb:cc:00:00:01", 1000.0, &[self_id]);
        let tables = FingerprintTables::builtin();
        assert!(matches!(
            parse_frame(&record, &tables),
            ParseOutcome::Nothing
        ));
    }

    #[test]
    fn truncated_remote_id_payload_is_malformed() {
        let mut record = testutil::remote_id_frame("aa:bb:cc:00:00:01", 1000.0, &[]);
        record.vendor_elements[0].payload.truncate(5);
        let tables = FingerprintTables::builtin();
        assert!(matches!(
            parse_frame(&record, &tables),
            ParseOutcome::Malformed
        ));
    }

    #[test]
    fn dji_vendor_element_maps_to_the_same_shape() {
        let record = testutil::dji_frame("60:60:1f:00:00:09", 1000.0, "1581F5FKD228S00A");
        let tables = FingerprintTables::builtin();
        match parse_frame(&record, &tables) {
            ParseOutcome::Detection(event) => {
                assert_eq!(event.source, DetectionSource::DjiProprietaryDroneId);
                assert_eq!(event.fields.id_serial.as_deref(), Some("1581F5FKD228S00A"));
                assert!(event.fields.latitude.is_some());
                assert!(event.message_types.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn fingerprint_fallback_keeps_only_signal_fields() {
        let record = testutil::plain_frame("aa:bb:cc:00:00:07", 1000.0, Some("DJI-Mavic3"));
        let tables = FingerprintTables::builtin();
        match parse_frame(&record, &tables) {
            ParseOutcome::Detection(event) => {
                assert_eq!(event.source, DetectionSource::WiFiFingerprint);
                assert_eq!(event.fields, DetectionFields::default());
                assert!(event.ssid.is_some());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn unremarkable_frames_are_nothing() {
        let record = testutil::plain_frame("02:00:00:00:00:01", 1000.0, Some("HomeWifi"));
        let tables = FingerprintTables::builtin();
        assert!(matches!(
            parse_frame(&record, &tables),
            ParseOutcome::Nothing
        ));
    }

    #[test]
    fn merge_never_regresses_to_null() {
        let mut base = DetectionFields {
            id_serial: Some("A".into()),
            latitude: Some(47.0),
            ..Default::default()
        };
        let update = DetectionFields {
            speed: Some(4.0),
            ..Default::default()
        };
        base.merge_from(&update);
        assert_eq!(base.id_serial.as_deref(), Some("A"));
        assert_eq!(base.latitude, Some(47.0));
        assert_eq!(base.speed, Some(4.0));
    }
}
