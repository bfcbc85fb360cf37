// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static lookup tables: SSID and OUI patterns that strongly indicate a UAV
//! without Remote ID, and serial-prefix / vendor hints used to derive a
//! model designation. Plain maps loaded at startup, not plug-ins.

/// SSID prefixes broadcast by common UAV access points.
const SSID_PREFIXES: &[(&str, &str)] = &[
    ("DJI-", "DJI"),
    ("Mavic", "DJI Mavic"),
    ("Phantom", "DJI Phantom"),
    ("Spark-", "DJI Spark"),
    ("Anafi", "Parrot Anafi"),
    ("Parrot", "Parrot"),
    ("Bebop", "Parrot Bebop"),
    ("Skydio-", "Skydio"),
    ("Autel", "Autel Robotics"),
    ("EVO-", "Autel EVO"),
    ("Yuneec", "Yuneec"),
    ("Breeze", "Yuneec Breeze"),
];

/// Vendor OUIs that identify airframe radios.
const VENDOR_OUIS: &[([u8; 3], &str)] = &[
    ([0x60, 0x60, 0x1F], "DJI"),
    ([0x34, 0xD2, 0x62], "DJI"),
    ([0x48, 0x1C, 0xB9], "DJI"),
    ([0x90, 0x03, 0xB7], "Parrot"),
    ([0xA0, 0x14, 0x3D], "Parrot"),
    ([0x00, 0x12, 0x1C], "Parrot"),
    ([0x38, 0x1D, 0x14], "Skydio"),
];

/// CTA-2063-A manufacturer codes (first four serial characters).
const SERIAL_PREFIXES: &[(&str, &str)] = &[
    ("1596", "DJI"),
    ("1581", "DJI"),
    ("1633", "Parrot"),
    ("1787", "Skydio"),
    ("1749", "Autel Robotics"),
];

#[derive(Debug, Default)]
pub struct FingerprintTables;

impl FingerprintTables {
    pub fn builtin() -> Self {
        FingerprintTables
    }

    /// A designation when the SSID alone identifies a UAV family.
    pub fn match_ssid(&self, ssid: &str) -> Option<&'static str> {
        SSID_PREFIXES
            .iter()
            .find(|(prefix, _)| ssid.starts_with(prefix))
            .map(|(_, designation)| *designation)
    }

    /// A designation when the source OUI belongs to a known airframe vendor.
    pub fn match_mac(&self, mac: &str) -> Option<&'static str> {
        let oui = parse_mac_oui(mac)?;
        VENDOR_OUIS
            .iter()
            .find(|(known, _)| *known == oui)
            .map(|(_, designation)| *designation)
    }

    /// Model hint from a CTA-2063-A serial's manufacturer code.
    pub fn designation_for_serial(&self, serial: &str) -> Option<&'static str> {
        if serial.len() < 4 {
            return None;
        }
        SERIAL_PREFIXES
            .iter()
            .find(|(prefix, _)| serial.starts_with(prefix))
            .map(|(_, designation)| *designation)
    }
}

fn parse_mac_oui(mac: &str) -> Option<[u8; 3]> {
    let mut oui = [0u8; 3];
    for (i, group) in mac.split(':').take(3).enumerate() {
        oui[i] = u8::from_str_radix(group, 16).ok()?;
    }
    Some(oui)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssid_prefixes_match() {
        let tables = FingerprintTables::builtin();
        assert_eq!(tables.match_ssid("DJI-Mavic3-9F2C"), Some("DJI"));
        assert_eq!(tables.match_ssid("Anafi-123456"), Some("Parrot Anafi"));
        assert_eq!(tables.match_ssid("HomeWifi"), None);
    }

    #[test]
    fn vendor_ouis_match() {
        let tables = FingerprintTables::builtin();
        assert_eq!(tables.match_mac("60:60:1f:00:00:01"), Some("DJI"));
        assert_eq!(tables.match_mac("00:11:22:33:44:55"), None);
    }

    #[test]
    fn serial_prefix_designations() {
        let tables = FingerprintTables::builtin();
        assert_eq!(
            tables.designation_for_serial("1596F3BCDE000001"),
            Some("DJI")
        );
        assert_eq!(tables.designation_for_serial("999"), None);
    }
}
