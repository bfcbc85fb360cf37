// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-airframe correlation.
//!
//! The tracker is the single owner of the UAV state table, keyed by source
//! MAC. Each detection event is fused under the non-null overwrite rule,
//! the identifier is re-elected, spoof heuristics run over the pre/post
//! state, and a full report is emitted. States idle past the eviction
//! timeout are dropped silently; the collector handles staleness.

use crate::detect::{DetectionEvent, DetectionFields, DetectionSource};
use crate::fingerprint::FingerprintTables;
use crate::report::{UavReport, UAV_REPORT_TYPE};
use crate::spoof::{self, PriorObservation, SpoofFlag};
use crate::wire::PROTOCOL_VERSION;
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Most-recent distinct position fixes retained per airframe.
pub const FIX_HISTORY_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    /// Capture timestamp, epoch seconds.
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

#[derive(Debug)]
pub struct UavState {
    pub mac: String,
    pub first_seen: f64,
    pub last_seen: f64,
    pub source: DetectionSource,
    pub fields: DetectionFields,
    pub rssi: Option<i32>,
    pub ssid: Option<String>,
    pub message_types_seen: BTreeSet<u8>,
    pub flags: BTreeSet<SpoofFlag>,
    pub trust_score: u8,
    pub fixes: VecDeque<PositionFix>,
    pub identifier: String,
    pub designation: Option<String>,
    pub raw_fields: HashMap<String, String>,
}

impl UavState {
    fn new(event: &DetectionEvent) -> UavState {
        UavState {
            mac: event.mac.clone(),
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            source: event.source,
            fields: DetectionFields::default(),
            rssi: None,
            ssid: None,
            message_types_seen: BTreeSet::new(),
            flags: BTreeSet::new(),
            trust_score: spoof::BASE_TRUST as u8,
            fixes: VecDeque::with_capacity(FIX_HISTORY_LEN),
            identifier: String::new(),
            designation: None,
            raw_fields: HashMap::new(),
        }
    }
}

pub struct UavTracker {
    tap_uuid: String,
    tables: Arc<FingerprintTables>,
    eviction_timeout: Duration,
    states: HashMap<String, UavState>,
}

impl UavTracker {
    pub fn new(
        tap_uuid: String,
        tables: Arc<FingerprintTables>,
        eviction_timeout: Duration,
    ) -> UavTracker {
        UavTracker {
            tap_uuid,
            tables,
            eviction_timeout,
            states: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, mac: &str) -> Option<&UavState> {
        self.states.get(mac)
    }

    /// Fuse one event and emit the resulting report.
    pub fn apply(&mut self, event: DetectionEvent) -> UavReport {
        let state = self
            .states
            .entry(event.mac.clone())
            .or_insert_with(|| UavState::new(&event));

        // Spoof heuristics compare the event against the pre-update state.
        let prior_serial = state.fields.id_serial.clone();
        let prior_fix = state.fixes.back().cloned();
        let prior = PriorObservation {
            last_fix: prior_fix.as_ref(),
            serial: prior_serial.as_deref(),
            operator_position: state
                .fields
                .operator_latitude
                .zip(state.fields.operator_longitude),
        };
        let new_flags = spoof::evaluate(&prior, &event);

        state.last_seen = event.timestamp;
        // A fingerprint-only observation never downgrades a decoded source.
        if event.source != DetectionSource::WiFiFingerprint {
            state.source = event.source;
        }
        state.fields.merge_from(&event.fields);
        if event.rssi.is_some() {
            state.rssi = event.rssi;
        }
        if event.ssid.is_some() {
            state.ssid = event.ssid.clone();
        }
        state
            .message_types_seen
            .extend(event.message_types.iter().copied());

        if let (Some(latitude), Some(longitude)) = (event.fields.latitude, event.fields.longitude)
        {
            let differs = state
                .fixes
                .back()
                .is_none_or(|tail| tail.latitude != latitude || tail.longitude != longitude);
            if differs {
                state.fixes.push_back(PositionFix {
                    timestamp: event.timestamp,
                    latitude,
                    longitude,
                    altitude: event.fields.altitude_geodetic,
                });
                while state.fixes.len() > FIX_HISTORY_LEN {
                    state.fixes.pop_front();
                }
            }
        }

        // Once spoofed, stays flagged.
        state.flags.extend(new_flags.iter().copied());
        state.trust_score = spoof::trust_score(&state.flags);
        state.identifier = elect_identifier(&state.fields, &state.mac);
        if let Some(designation) = derive_designation(&self.tables, state) {
            state.designation = Some(designation.to_string());
        }
        for (key, value) in &event.raw_fields {
            state.raw_fields.insert(key.clone(), value.clone());
        }

        build_report(state, &self.tap_uuid)
    }

    /// Drop states idle past the eviction timeout. Emits nothing.
    pub fn evict_stale(&mut self, now: f64) -> usize {
        let timeout = self.eviction_timeout.as_secs_f64();
        let before = self.states.len();
        self.states.retain(|_, state| now - state.last_seen <= timeout);
        let evicted = before - self.states.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.states.len(), "evicted idle airframes");
        }
        evicted
    }
}

/// Identifier precedence: serial, registration, UTM, operator ID, then a
/// stable truncated hash of the MAC.
pub fn elect_identifier(fields: &DetectionFields, mac: &str) -> String {
    let candidate = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    candidate(&fields.id_serial)
        .or_else(|| candidate(&fields.id_registration))
        .or_else(|| candidate(&fields.id_utm))
        .or_else(|| candidate(&fields.operator_id))
        .unwrap_or_else(|| mac_hash(mac))
}

/// First 8 hex digits of SHA-256 over the canonical MAC string.
pub fn mac_hash(mac: &str) -> String {
    let digest = Sha256::digest(mac.as_bytes());
    hex::encode(&digest[..4])
}

fn derive_designation(tables: &FingerprintTables, state: &UavState) -> Option<&'static str> {
    if let Some(serial) = state.fields.id_serial.as_deref() {
        if let Some(designation) = tables.designation_for_serial(serial) {
            return Some(designation);
        }
    }
    if let Some(designation) = tables.match_mac(&state.mac) {
        return Some(designation);
    }
    state.ssid.as_deref().and_then(|s| tables.match_ssid(s))
}

fn build_report(state: &UavState, tap_uuid: &str) -> UavReport {
    let fields = &state.fields;
    UavReport {
        record_type: UAV_REPORT_TYPE,
        protocol_version: PROTOCOL_VERSION,
        tap_uuid: tap_uuid.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        mac: state.mac.clone(),
        identifier: state.identifier.clone(),
        detection_source: state.source.as_str(),
        latitude: fields.latitude,
        longitude: fields.longitude,
        altitude_geodetic: fields.altitude_geodetic,
        altitude_pressure: fields.altitude_pressure,
        height: fields.height,
        height_type: fields.height_type,
        ground_track: fields.ground_track,
        speed: fields.speed,
        vertical_speed: fields.vertical_speed,
        id_serial: fields.id_serial.clone(),
        id_registration: fields.id_registration.clone(),
        id_utm: fields.id_utm.clone(),
        id_session: fields.id_session.clone(),
        uav_type: fields.uav_type,
        operational_status: fields.operational_status,
        operator_latitude: fields.operator_latitude,
        operator_longitude: fields.operator_longitude,
        operator_altitude: fields.operator_altitude,
        operator_id: fields.operator_id.clone(),
        operator_location_type: fields.operator_location_type,
        rssi: state.rssi,
        ssid: state.ssid.clone(),
        accuracy_horizontal: fields.accuracy_horizontal,
        accuracy_vertical: fields.accuracy_vertical,
        accuracy_barometer: fields.accuracy_barometer,
        accuracy_speed: fields.accuracy_speed,
        category_eu: fields.category_eu,
        class_eu: fields.class_eu,
        area_count: fields.area_count,
        area_radius: fields.area_radius,
        area_ceiling: fields.area_ceiling,
        area_floor: fields.area_floor,
        spoof_flags: state.flags.iter().map(|f| f.tag()).collect(),
        trust_score: state.trust_score,
        auth_type: fields.auth_type,
        auth_data: fields.auth_data.clone(),
        designation: state.designation.clone(),
        message_types_seen: state.message_types_seen.iter().copied().collect(),
        self_id_description: fields.self_id_description.clone(),
        self_id_type: fields.self_id_type,
        raw_fields: state.raw_fields.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionSource;

    fn tracker() -> UavTracker {
        UavTracker::new(
            "tap-1".to_string(),
            Arc::new(FingerprintTables::builtin()),
            Duration::from_secs(60),
        )
    }

    fn event(mac: &str, timestamp: f64, fields: DetectionFields) -> DetectionEvent {
        DetectionEvent {
            mac: mac.to_string(),
            timestamp,
            source: DetectionSource::RemoteIdWiFi,
            rssi: Some(-55),
            ssid: None,
            fields,
            message_types: vec![0, 1],
            raw_fields: HashMap::new(),
        }
    }

    #[test]
    fn identifier_precedence() {
        let mac = "aa:bb:cc:dd:ee:ff";
        let mut fields = DetectionFields::default();
        assert_eq!(elect_identifier(&fields, mac), mac_hash(mac));
        assert_eq!(elect_identifier(&fields, mac).len(), 8);

        fields.operator_id = Some("OP".to_string());
        assert_eq!(elect_identifier(&fields, mac), "OP");
        fields.id_utm = Some("UTM".to_string());
        assert_eq!(elect_identifier(&fields, mac), "UTM");
        fields.id_registration = Some("REG".to_string());
        assert_eq!(elect_identifier(&fields, mac), "REG");
        fields.id_serial = Some("SER".to_string());
        assert_eq!(elect_identifier(&fields, mac), "SER");
    }

    #[test]
    fn mac_hash_is_stable() {
        assert_eq!(
            mac_hash("aa:bb:cc:dd:ee:ff"),
            mac_hash("aa:bb:cc:dd:ee:ff")
        );
        assert_ne!(
            mac_hash("aa:bb:cc:dd:ee:ff"),
            mac_hash("aa:bb:cc:dd:ee:fe")
        );
    }

    #[test]
    fn fields_never_regress_and_message_types_grow() {
        let mut tracker = tracker();
        let first = tracker.apply(event(
            "aa:bb:cc:00:00:01",
            100.0,
            DetectionFields {
                id_serial: Some("SER-1".to_string()),
                latitude: Some(47.0),
                longitude: Some(-122.0),
                ..Default::default()
            },
        ));
        assert_eq!(first.identifier, "SER-1");
        assert_eq!(first.message_types_seen, vec![0, 1]);

        let mut second_event = event("aa:bb:cc:00:00:01", 101.0, DetectionFields::default());
        second_event.message_types = vec![4];
        let second = tracker.apply(second_event);
        // Non-null overwrite: the id and position survive an empty update.
        assert_eq!(second.id_serial.as_deref(), Some("SER-1"));
        assert_eq!(second.latitude, Some(47.0));
        assert_eq!(second.message_types_seen, vec![0, 1, 4]);
    }

    #[test]
    fn fix_ring_keeps_distinct_recent_positions() {
        let mut tracker = tracker();
        let mac = "aa:bb:cc:00:00:02";
        for i in 0..12 {
            tracker.apply(event(
                mac,
                100.0 + i as f64 * 10.0,
                DetectionFields {
                    latitude: Some(47.0 + i as f64 * 0.001),
                    longitude: Some(-122.0),
                    ..Default::default()
                },
            ));
        }
        // Repeated position is not appended.
        tracker.apply(event(
            mac,
            300.0,
            DetectionFields {
                latitude: Some(47.011),
                longitude: Some(-122.0),
                ..Default::default()
            },
        ));
        let state = tracker.get(mac).unwrap();
        assert_eq!(state.fixes.len(), FIX_HISTORY_LEN);
        assert_eq!(state.fixes.back().unwrap().timestamp, 210.0);
    }

    #[test]
    fn teleport_flags_persist_and_lower_trust() {
        let mut tracker = tracker();
        let mac = "aa:bb:cc:00:00:03";
        tracker.apply(event(
            mac,
            100.0,
            DetectionFields {
                latitude: Some(47.0),
                longitude: Some(-122.0),
                ..Default::default()
            },
        ));
        let teleported = tracker.apply(event(
            mac,
            101.0,
            DetectionFields {
                latitude: Some(48.0),
                longitude: Some(-122.0),
                ..Default::default()
            },
        ));
        assert_eq!(teleported.spoof_flags, vec!["teleportation"]);
        assert_eq!(teleported.trust_score, 50);

        // A clean follow-up keeps the flag.
        let later = tracker.apply(event(
            mac,
            200.0,
            DetectionFields {
                latitude: Some(48.0001),
                longitude: Some(-122.0),
                ..Default::default()
            },
        ));
        assert_eq!(later.spoof_flags, vec!["teleportation"]);
        assert_eq!(later.trust_score, 50);
    }

    #[test]
    fn identity_churn_scores_sixty() {
        let mut tracker = tracker();
        let mac = "aa:bb:cc:00:00:04";
        tracker.apply(event(
            mac,
            100.0,
            DetectionFields {
                id_serial: Some("A".to_string()),
                ..Default::default()
            },
        ));
        let churned = tracker.apply(event(
            mac,
            101.0,
            DetectionFields {
                id_serial: Some("B".to_string()),
                ..Default::default()
            },
        ));
        assert!(churned.spoof_flags.contains(&"identity_churn"));
        assert_eq!(churned.trust_score, 60);
        assert_eq!(churned.identifier, "B");
    }

    #[test]
    fn eviction_removes_idle_states_only() {
        let mut tracker = tracker();
        tracker.apply(event("aa:bb:cc:00:00:05", 100.0, DetectionFields::default()));
        tracker.apply(event("aa:bb:cc:00:00:06", 150.0, DetectionFields::default()));
        assert_eq!(tracker.evict_stale(165.0), 1);
        assert!(tracker.get("aa:bb:cc:00:00:05").is_none());
        assert!(tracker.get("aa:bb:cc:00:00:06").is_some());
    }

    #[test]
    fn designation_derives_from_serial_prefix() {
        let mut tracker = tracker();
        let report = tracker.apply(event(
            "aa:bb:cc:00:00:07",
            100.0,
            DetectionFields {
                id_serial: Some("1596F3BCDE000001".to_string()),
                ..Default::default()
            },
        ));
        assert_eq!(report.designation.as_deref(), Some("DJI"));
    }
}
