// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Dissector child supervision and frame-record extraction.
//!
//! The driver owns a tshark child process in monitor-mode field-output
//! configuration, turns its line stream into [`FrameRecord`]s, and respawns
//! the child whenever it exits. Filtering happens at capture time only: the
//! BPF filter keeps management frames, and no display filter is ever passed
//! because `-Y` discards frames the parser still wants to see.

use crate::config::TapConfig;
use crate::metrics::TapCounters;
use anyhow::{anyhow, Context, Result};
use dronetap_remoteid::VendorElement;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kernel-level capture filter: management frames only.
pub const CAPTURE_FILTER: &str = "type mgt";

/// Field list requested from the dissector, one column per entry.
pub const FIELDS: &[&str] = &[
    "frame.time_epoch",
    "wlan.sa",
    "wlan.ssid",
    "wlan_radio.channel",
    "wlan_radio.signal_dbm",
    "wlan.fc.type_subtype",
    "wlan.tag.oui",
    "wlan.tag.vendor.oui.type",
    "wlan.tag.vendor.data",
];

/// Management frame subtypes the tap decodes.
pub const SUBTYPE_BEACON: u8 = 0x08;
pub const SUBTYPE_PROBE_RESPONSE: u8 = 0x05;
pub const SUBTYPE_ACTION: u8 = 0x0d;

/// One captured management frame, immutable after creation.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Capture timestamp, epoch seconds.
    pub timestamp: f64,
    /// Canonical lowercase colon-separated source MAC.
    pub source_mac: String,
    pub channel: Option<u16>,
    pub rssi: Option<i32>,
    pub subtype: Option<u8>,
    pub ssid: Option<String>,
    /// Vendor-specific elements split at the OUI boundary, raw bytes kept.
    pub vendor_elements: Vec<VendorElement>,
    /// Raw dissector fields as received, keyed by field name.
    pub raw_fields: HashMap<String, String>,
}

/// Parse one dissector output line into a frame record.
///
/// Lines with an unusable timestamp or source address yield `None`; they
/// still count toward `frames_total` at the call site.
pub fn parse_line(line: &str) -> Option<FrameRecord> {
    let columns: Vec<&str> = line.split('\t').collect();
    let mut raw_fields = HashMap::new();
    for (name, value) in FIELDS.iter().zip(columns.iter()) {
        if !value.is_empty() {
            raw_fields.insert((*name).to_string(), (*value).to_string());
        }
    }

    let timestamp: f64 = first_value(&raw_fields, "frame.time_epoch")?.parse().ok()?;
    let source_mac = canonical_mac(first_value(&raw_fields, "wlan.sa")?)?;
    let channel = first_value(&raw_fields, "wlan_radio.channel").and_then(|v| v.parse().ok());
    let rssi = first_value(&raw_fields, "wlan_radio.signal_dbm")
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.round() as i32);
    let subtype = first_value(&raw_fields, "wlan.fc.type_subtype").and_then(parse_number_u8);
    let ssid = first_value(&raw_fields, "wlan.ssid").map(decode_ssid_field);

    Some(FrameRecord {
        timestamp,
        source_mac,
        channel,
        rssi,
        subtype,
        ssid,
        vendor_elements: vendor_elements(&raw_fields),
        raw_fields,
    })
}

/// First occurrence of a possibly comma-aggregated field.
fn first_value<'a>(raw_fields: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    raw_fields
        .get(name)
        .map(|v| v.split(',').next().unwrap_or(""))
        .filter(|v| !v.is_empty())
}

/// All occurrences of a comma-aggregated field, in order.
fn all_values<'a>(raw_fields: &'a HashMap<String, String>, name: &str) -> Vec<&'a str> {
    raw_fields
        .get(name)
        .map(|v| v.split(',').collect())
        .unwrap_or_default()
}

/// Reassemble vendor elements from the parallel OUI / type / data columns.
fn vendor_elements(raw_fields: &HashMap<String, String>) -> Vec<VendorElement> {
    let ouis = all_values(raw_fields, "wlan.tag.oui");
    let types = all_values(raw_fields, "wlan.tag.vendor.oui.type");
    let datas = all_values(raw_fields, "wlan.tag.vendor.data");

    let mut elements = Vec::new();
    for (i, oui) in ouis.iter().enumerate() {
        let Some(oui) = parse_oui(oui) else {
            continue;
        };
        let mut payload = Vec::new();
        if let Some(t) = types.get(i).and_then(|v| parse_number_u8(v)) {
            payload.push(t);
        }
        if let Some(data) = datas.get(i).and_then(|v| parse_hex_bytes(v)) {
            payload.extend_from_slice(&data);
        }
        if !payload.is_empty() {
            elements.push(VendorElement { oui, payload });
        }
    }
    elements
}

/// Canonicalize a MAC address to lowercase colon-separated form.
pub fn canonical_mac(value: &str) -> Option<String> {
    let groups: Vec<&str> = value.split(&[':', '-'][..]).collect();
    if groups.len() != 6 {
        return None;
    }
    let mut out = String::with_capacity(17);
    for (i, group) in groups.iter().enumerate() {
        if group.len() != 2 || u8::from_str_radix(group, 16).is_err() {
            return None;
        }
        if i > 0 {
            out.push(':');
        }
        out.push_str(&group.to_ascii_lowercase());
    }
    Some(out)
}

/// Accept `0x..` hex or plain decimal field renderings.
fn parse_number_u8(value: &str) -> Option<u8> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok().or_else(|| {
            // Wide renderings like 0x0008 still fit once leading zeros go.
            u16::from_str_radix(hex, 16).ok().map(|v| v as u8)
        })
    } else {
        value.parse().ok()
    }
}

/// OUIs arrive as decimal, `0x`-hex or colon-separated bytes depending on
/// the dissector version.
fn parse_oui(value: &str) -> Option<[u8; 3]> {
    let value = value.trim();
    if value.contains(':') {
        let bytes = parse_hex_bytes(value)?;
        return bytes.try_into().ok();
    }
    let raw = if let Some(hex) = value.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        value.parse().ok()?
    };
    Some([(raw >> 16) as u8, (raw >> 8) as u8, raw as u8])
}

/// Byte sequences render as `aa:bb:cc` or bare hex.
fn parse_hex_bytes(value: &str) -> Option<Vec<u8>> {
    let compact: String = value.chars().filter(|c| *c != ':').collect();
    hex::decode(compact).ok()
}

/// SSIDs render as text on current dissectors and hex bytes on older ones.
fn decode_ssid_field(value: &str) -> String {
    let looks_hex = value.len() >= 2
        && value.len() % 2 == 0
        && value.chars().all(|c| c.is_ascii_hexdigit())
        && value.chars().any(|c| c.is_ascii_digit());
    if looks_hex {
        if let Ok(bytes) = hex::decode(value) {
            if let Ok(text) = String::from_utf8(bytes) {
                return text;
            }
        }
    }
    value.to_string()
}

/// Owns the dissector child and feeds the processor's frame channel.
pub struct CaptureDriver {
    tshark_path: String,
    interface: String,
    restart_delay: Duration,
    counters: Arc<TapCounters>,
    frames: mpsc::Sender<FrameRecord>,
    cancel: CancellationToken,
}

impl CaptureDriver {
    pub fn new(
        config: &TapConfig,
        counters: Arc<TapCounters>,
        frames: mpsc::Sender<FrameRecord>,
        cancel: CancellationToken,
    ) -> Self {
        CaptureDriver {
            tshark_path: config.tshark_path.clone(),
            interface: config.interface.clone(),
            restart_delay: config.tshark_restart_delay(),
            counters,
            frames,
            cancel,
        }
    }

    /// The dissector argv, capture-time filtering only. Never contains `-Y`.
    pub fn command_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-i",
            &self.interface,
            "-f",
            CAPTURE_FILTER,
            "-l",
            "-n",
            "-T",
            "fields",
            "-E",
            "separator=/t",
            "-E",
            "occurrence=a",
            "-E",
            "aggregator=,",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for field in FIELDS {
            args.push("-e".to_string());
            args.push((*field).to_string());
        }
        args
    }

    /// Spawn, pump, respawn until cancelled. Exits observed during shutdown
    /// do not count as capture errors.
    pub async fn run(&mut self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.pump_one_child().await {
                Ok(()) => return, // cancelled or frame channel closed
                Err(err) => {
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    self.counters.tshark_running.store(false, Ordering::Relaxed);
                    self.counters.capture_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, "dissector exited, respawning");
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }
    }

    async fn pump_one_child(&mut self) -> Result<()> {
        let mut child = Command::new(&self.tshark_path)
            .args(self.command_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning dissector {}", self.tshark_path))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("dissector stdout not captured"))?;
        self.counters.tshark_running.store(true, Ordering::Relaxed);
        info!(path = %self.tshark_path, interface = %self.interface, "dissector started");

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = child.start_kill();
                    self.counters.tshark_running.store(false, Ordering::Relaxed);
                    return Ok(());
                }
                line = lines.next_line() => match line.context("reading dissector output")? {
                    Some(line) => {
                        self.counters.frames_total.fetch_add(1, Ordering::Relaxed);
                        if let Some(record) = parse_line(&line) {
                            // Bounded send: the dissector's own flow control
                            // backs off when the processor lags.
                            if self.frames.send(record).await.is_err() {
                                let _ = child.start_kill();
                                return Ok(());
                            }
                        } else {
                            debug!("unusable dissector line");
                        }
                    }
                    None => {
                        let status = child.wait().await.context("reaping dissector")?;
                        return Err(anyhow!("dissector exited with {status}"));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dronetap_remoteid::{ASTM_OUI, DJI_OUI};

    fn driver() -> CaptureDriver {
        let config =
            TapConfig::from_json(r#"{"node_host": "n", "interface": "wlan1"}"#).unwrap();
        let (tx, _rx) = mpsc::channel(4);
        CaptureDriver::new(
            &config,
            Arc::new(TapCounters::default()),
            tx,
            CancellationToken::new(),
        )
    }

    #[test]
    fn argv_never_contains_a_display_filter() {
        let args = driver().command_args();
        assert!(!args.iter().any(|a| a == "-Y"));
        let filter_at = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[filter_at + 1], CAPTURE_FILTER);
    }

    #[test]
    fn argv_requests_every_field() {
        let args = driver().command_args();
        for field in FIELDS {
            assert!(args.iter().any(|a| a == field), "missing {field}");
        }
    }

    #[test]
    fn parse_line_builds_a_canonical_record() {
        let line = "1723550000.123456\tAA:BB:CC:00:00:01\tDJI-Mavic\t6\t-47\t0x0008\t\
                    0xfa0bbc\t0x0d\t0d:01:f2:19";
        let record = parse_line(line).unwrap();
        assert_eq!(record.source_mac, "aa:bb:cc:00:00:01");
        assert_eq!(record.channel, Some(6));
        assert_eq!(record.rssi, Some(-47));
        assert_eq!(record.subtype, Some(SUBTYPE_BEACON));
        assert_eq!(record.ssid.as_deref(), Some("DJI-Mavic"));
        assert_eq!(record.vendor_elements.len(), 1);
        assert_eq!(record.vendor_elements[0].oui, ASTM_OUI);
        // Payload is the vendor type byte followed by the data column.
        assert_eq!(record.vendor_elements[0].payload[0], 0x0d);
        assert_eq!(record.raw_fields["wlan.sa"], "AA:BB:CC:00:00:01");
    }

    #[test]
    fn parse_line_splits_multiple_vendor_tags() {
        let line = format!(
            "1723550000.0\taa:bb:cc:00:00:02\t\t11\t-60\t0x0005\t{},{}\t0x0d,0x10\t0d:00,10:02",
            0xfa0bbc, 0x60601f
        );
        let record = parse_line(&line).unwrap();
        assert_eq!(record.vendor_elements.len(), 2);
        assert_eq!(record.vendor_elements[0].oui, ASTM_OUI);
        assert_eq!(record.vendor_elements[1].oui, DJI_OUI);
        assert_eq!(record.vendor_elements[1].payload, vec![0x10, 0x10, 0x02]);
    }

    #[test]
    fn parse_line_rejects_missing_essentials() {
        assert!(parse_line("not-a-timestamp\taa:bb:cc:00:00:01").is_none());
        assert!(parse_line("1723550000.0\tnot-a-mac").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn mac_canonicalization() {
        assert_eq!(
            canonical_mac("AA-BB-CC-00-00-01").as_deref(),
            Some("aa:bb:cc:00:00:01")
        );
        assert_eq!(canonical_mac("aa:bb:cc:00:00").as_deref(), None);
        assert_eq!(canonical_mac("zz:bb:cc:00:00:01").as_deref(), None);
    }

    #[test]
    fn ssid_hex_rendering_is_decoded() {
        assert_eq!(decode_ssid_field("444a492d4d61766963"), "DJI-Mavic");
        assert_eq!(decode_ssid_field("Mavic Air"), "Mavic Air");
    }

    #[tokio::test]
    async fn dissector_exits_are_counted_and_respawned() {
        // A child that prints one line and exits stands in for a crashing
        // dissector; every exit outside shutdown must count.
        let config = TapConfig::from_json(
            r#"{"node_host": "n", "tshark_path": "echo", "tshark_restart_delay_s": 0}"#,
        )
        .unwrap();
        let counters = Arc::new(TapCounters::default());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(64);
        let mut driver = CaptureDriver::new(&config, counters.clone(), tx, cancel.clone());
        let task = tokio::spawn(async move { driver.run().await });

        // Drain whatever the fake dissector emits so sends never block.
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            if counters.capture_errors.load(Ordering::Relaxed) >= 2 {
                break;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "dissector was not respawned"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(counters.frames_total.load(Ordering::Relaxed) >= 1);

        cancel.cancel();
        task.await.unwrap();
        drain.await.unwrap();
    }
}
