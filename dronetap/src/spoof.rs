// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Spoof heuristics: physics and consistency checks over consecutive
//! observations of one airframe.
//!
//! `evaluate` is a pure function of the pre-update state and the new event.
//! Each flag subtracts a fixed weight from a base trust of 100; flags stick
//! to the airframe for the lifetime of its state.

use crate::detect::DetectionEvent;
use crate::track::PositionFix;
use std::collections::BTreeSet;

/// Base trust before any flag applies.
pub const BASE_TRUST: u32 = 100;

/// Ground speed implied by > 1 km in < 2 s.
const TELEPORT_DISTANCE_M: f64 = 1000.0;
const TELEPORT_WINDOW_S: f64 = 2.0;
/// Well above any civilian multirotor.
const MAX_PLAUSIBLE_SPEED_M_S: f64 = 100.0;
const MAX_PLAUSIBLE_ALTITUDE_M: f64 = 10_000.0;
const MIN_PLAUSIBLE_ALTITUDE_M: f64 = -500.0;
const OPERATOR_JUMP_M: f64 = 10_000.0;

/// Operational status value meaning "airborne" on the wire.
const STATUS_AIRBORNE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpoofFlag {
    Teleportation,
    ImpossibleSpeed,
    ImpossibleAltitude,
    IdentityChurn,
    OperatorTeleport,
    MissingRequired,
}

impl SpoofFlag {
    /// Tag published in `spoof_flags`.
    pub fn tag(self) -> &'static str {
        match self {
            SpoofFlag::Teleportation => "teleportation",
            SpoofFlag::ImpossibleSpeed => "impossible_speed",
            SpoofFlag::ImpossibleAltitude => "impossible_altitude",
            SpoofFlag::IdentityChurn => "identity_churn",
            SpoofFlag::OperatorTeleport => "operator_teleport",
            SpoofFlag::MissingRequired => "missing_required",
        }
    }

    /// Trust subtracted while the flag is present.
    pub fn weight(self) -> u32 {
        match self {
            SpoofFlag::Teleportation => 50,
            SpoofFlag::ImpossibleSpeed => 30,
            SpoofFlag::ImpossibleAltitude => 20,
            SpoofFlag::IdentityChurn => 40,
            SpoofFlag::OperatorTeleport => 20,
            SpoofFlag::MissingRequired => 10,
        }
    }
}

/// `100 - Σ weights`, floored at zero.
pub fn trust_score(flags: &BTreeSet<SpoofFlag>) -> u8 {
    let penalty: u32 = flags.iter().map(|f| f.weight()).sum();
    BASE_TRUST.saturating_sub(penalty) as u8
}

/// Pre-update context the heuristics compare the new event against.
#[derive(Debug, Default)]
pub struct PriorObservation<'a> {
    pub last_fix: Option<&'a PositionFix>,
    pub serial: Option<&'a str>,
    pub operator_position: Option<(f64, f64)>,
}

/// Flags raised by this event. The caller unions them into the persistent
/// per-airframe set.
pub fn evaluate(prior: &PriorObservation<'_>, event: &DetectionEvent) -> BTreeSet<SpoofFlag> {
    let mut flags = BTreeSet::new();
    let fields = &event.fields;

    if let (Some(prev), Some(lat), Some(lon)) = (prior.last_fix, fields.latitude, fields.longitude)
    {
        let dt = event.timestamp - prev.timestamp;
        let distance = haversine_m(prev.latitude, prev.longitude, lat, lon);
        if distance > TELEPORT_DISTANCE_M && dt >= 0.0 && dt < TELEPORT_WINDOW_S {
            flags.insert(SpoofFlag::Teleportation);
        }
    }

    if fields.speed.is_some_and(|s| s > MAX_PLAUSIBLE_SPEED_M_S) {
        flags.insert(SpoofFlag::ImpossibleSpeed);
    }

    if fields
        .altitude_geodetic
        .is_some_and(|a| a > MAX_PLAUSIBLE_ALTITUDE_M || a < MIN_PLAUSIBLE_ALTITUDE_M)
    {
        flags.insert(SpoofFlag::ImpossibleAltitude);
    }

    if let (Some(before), Some(after)) = (prior.serial, fields.id_serial.as_deref()) {
        if before != after {
            flags.insert(SpoofFlag::IdentityChurn);
        }
    }

    if let (Some((prev_lat, prev_lon)), Some(lat), Some(lon)) = (
        prior.operator_position,
        fields.operator_latitude,
        fields.operator_longitude,
    ) {
        if haversine_m(prev_lat, prev_lon, lat, lon) > OPERATOR_JUMP_M {
            flags.insert(SpoofFlag::OperatorTeleport);
        }
    }

    let location_without_position = event.message_types.contains(&1)
        && (fields.latitude.is_none() || fields.longitude.is_none());
    if location_without_position
        && fields.operational_status == Some(STATUS_AIRBORNE)
    {
        flags.insert(SpoofFlag::MissingRequired);
    }

    flags
}

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}
