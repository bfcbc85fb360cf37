// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoder for broadcast UAS identification payloads.
//!
//! Two wire formats are covered: the ASTM F3411 Remote ID message pack
//! carried in 802.11 vendor-specific elements ([`astm`]), and the DJI
//! proprietary DroneID flight-info payload ([`dji`]). Decoding is
//! byte-oriented and side-effect free; all fields the standard marks as
//! "invalid / no value" decode to `None` rather than failing the message.

pub mod astm;
pub mod dji;

use std::error::Error;
use std::fmt::{self, Display};

/// One 802.11 vendor-specific element, split at the OUI boundary.
///
/// `payload` is everything following the 3-byte OUI, including the
/// vendor-assigned type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorElement {
    pub oui: [u8; 3],
    pub payload: Vec<u8>,
}

/// OUI assigned to ASTM F3411 broadcast Remote ID (FA-0B-BC).
pub const ASTM_OUI: [u8; 3] = [0xFA, 0x0B, 0xBC];
/// Vendor type byte that introduces a Remote ID message pack.
pub const ASTM_VENDOR_TYPE: u8 = 0x0D;
/// OUI used by DJI DroneID beacons (60-60-1F).
pub const DJI_OUI: [u8; 3] = [0x60, 0x60, 0x1F];

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is shorter than the format requires.
    Truncated { needed: usize, got: usize },
    /// The message header carries a type outside the ASTM enum.
    UnknownMessageType(u8),
    /// A message pack header declares a message size other than 25 bytes.
    BadMessageSize(u8),
    /// The payload does not carry the expected vendor type byte.
    UnexpectedVendorType(u8),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { needed, got } => {
                write!(f, "payload truncated: needed {} bytes, got {}", needed, got)
            }
            DecodeError::UnknownMessageType(t) => write!(f, "unknown message type {:#x}", t),
            DecodeError::BadMessageSize(s) => write!(f, "unsupported pack message size {}", s),
            DecodeError::UnexpectedVendorType(t) => write!(f, "unexpected vendor type {:#x}", t),
        }
    }
}

impl Error for DecodeError {}

/// UA type carried in the Basic ID message (ASTM F3411 table 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UaType {
    None,
    Aeroplane,
    Multirotor,
    Gyroplane,
    HybridLift,
    Ornithopter,
    Glider,
    Kite,
    FreeBalloon,
    CaptiveBalloon,
    Airship,
    FreeFallParachute,
    Rocket,
    TetheredPowered,
    GroundObstacle,
    Other,
}

impl UaType {
    pub fn from_u8(v: u8) -> UaType {
        match v & 0x0F {
            0 => UaType::None,
            1 => UaType::Aeroplane,
            2 => UaType::Multirotor,
            3 => UaType::Gyroplane,
            4 => UaType::HybridLift,
            5 => UaType::Ornithopter,
            6 => UaType::Glider,
            7 => UaType::Kite,
            8 => UaType::FreeBalloon,
            9 => UaType::CaptiveBalloon,
            10 => UaType::Airship,
            11 => UaType::FreeFallParachute,
            12 => UaType::Rocket,
            13 => UaType::TetheredPowered,
            14 => UaType::GroundObstacle,
            _ => UaType::Other,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Kind of identifier carried in the Basic ID message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    None,
    /// CTA-2063-A serial number.
    SerialNumber,
    /// CAA-assigned registration.
    CaaRegistration,
    /// UTM-assigned UUID.
    UtmAssigned,
    /// Per-flight session ID.
    SessionId,
}

impl IdType {
    pub fn from_u8(v: u8) -> IdType {
        match v & 0x0F {
            1 => IdType::SerialNumber,
            2 => IdType::CaaRegistration,
            3 => IdType::UtmAssigned,
            4 => IdType::SessionId,
            _ => IdType::None,
        }
    }
}

/// Operational status from the Location/Vector message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalStatus {
    Undeclared,
    Ground,
    Airborne,
    Emergency,
    RemoteIdSystemFailure,
    Reserved(u8),
}

impl OperationalStatus {
    pub fn from_u8(v: u8) -> OperationalStatus {
        match v {
            0 => OperationalStatus::Undeclared,
            1 => OperationalStatus::Ground,
            2 => OperationalStatus::Airborne,
            3 => OperationalStatus::Emergency,
            4 => OperationalStatus::RemoteIdSystemFailure,
            other => OperationalStatus::Reserved(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            OperationalStatus::Undeclared => 0,
            OperationalStatus::Ground => 1,
            OperationalStatus::Airborne => 2,
            OperationalStatus::Emergency => 3,
            OperationalStatus::RemoteIdSystemFailure => 4,
            OperationalStatus::Reserved(v) => v,
        }
    }
}

/// Height reference from the Location/Vector message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightType {
    /// Height above the takeoff location.
    AboveTakeoff = 0,
    /// Height above ground level.
    AboveGround = 1,
}

/// Operator location source from the System message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorLocationType {
    TakeoffLocation,
    DynamicLocation,
    FixedLocation,
}

impl OperatorLocationType {
    pub fn from_u8(v: u8) -> OperatorLocationType {
        match v & 0x03 {
            1 => OperatorLocationType::DynamicLocation,
            2 => OperatorLocationType::FixedLocation,
            _ => OperatorLocationType::TakeoffLocation,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicId {
    pub id_type: IdType,
    pub ua_type: UaType,
    /// Trimmed UAS identifier; empty when the field is all NULs.
    pub uas_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub status: OperationalStatus,
    pub height_type: HeightType,
    /// Ground track in degrees, 0-359.
    pub track: Option<u16>,
    /// Horizontal ground speed in m/s.
    pub speed: Option<f32>,
    /// Vertical speed in m/s, up positive.
    pub vertical_speed: Option<f32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_pressure: Option<f32>,
    pub altitude_geodetic: Option<f32>,
    pub height: Option<f32>,
    pub horizontal_accuracy: Option<f32>,
    pub vertical_accuracy: Option<f32>,
    pub barometer_accuracy: Option<f32>,
    pub speed_accuracy: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub auth_type: u8,
    pub page: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfId {
    pub description_type: u8,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub operator_location_type: OperatorLocationType,
    pub classification_type: u8,
    pub operator_latitude: Option<f64>,
    pub operator_longitude: Option<f64>,
    pub area_count: u16,
    /// Operating area radius in meters.
    pub area_radius: f32,
    pub area_ceiling: Option<f32>,
    pub area_floor: Option<f32>,
    /// EU category, present when the classification region is EU.
    pub category_eu: Option<u8>,
    pub class_eu: Option<u8>,
    pub operator_altitude: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorId {
    pub operator_id_type: u8,
    pub operator_id: String,
}

/// One decoded ASTM F3411 message.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteIdMessage {
    BasicId(BasicId),
    Location(Location),
    Authentication(Authentication),
    SelfId(SelfId),
    System(SystemMessage),
    OperatorId(OperatorId),
}

impl RemoteIdMessage {
    /// The ASTM message type this variant decodes from.
    pub fn message_type(&self) -> u8 {
        match self {
            RemoteIdMessage::BasicId(_) => 0,
            RemoteIdMessage::Location(_) => 1,
            RemoteIdMessage::Authentication(_) => 2,
            RemoteIdMessage::SelfId(_) => 3,
            RemoteIdMessage::System(_) => 4,
            RemoteIdMessage::OperatorId(_) => 5,
        }
    }
}

/// Decode NUL-padded ASCII into a trimmed string, dropping non-printable
/// bytes the way dissectors render unknown identifier bytes.
pub(crate) fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .filter(|b| b.is_ascii() && !b.is_ascii_control())
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}
