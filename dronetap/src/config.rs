// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tap configuration: a single JSON document plus a small piece of
//! persistent identity.
//!
//! Unknown keys and a missing `node_host` are startup errors; everything
//! else carries a default. The tap UUID survives reinstalls through a
//! fallback file created with mode 0600 when the config does not pin one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Where the generated tap UUID is persisted when absent from the config.
pub const TAP_UUID_FALLBACK_PATH: &str = "/var/lib/dronetap/tap_uuid";

/// Default collector port; the node binds, taps connect.
const DEFAULT_NODE_PORT: u16 = 5590;

fn default_tap_name() -> String {
    "dronetap".to_string()
}

fn default_interface() -> String {
    "wlan0".to_string()
}

fn default_auto_monitor() -> bool {
    true
}

fn default_channel_dwell_ms() -> u64 {
    500
}

fn default_node_port() -> u16 {
    DEFAULT_NODE_PORT
}

fn default_tshark_path() -> String {
    "tshark".to_string()
}

fn default_starvation_timeout_s() -> u64 {
    120
}

fn default_tshark_restart_delay_s() -> u64 {
    5
}

fn default_heartbeat_interval_s() -> u64 {
    30
}

fn default_zmq_buffer_size() -> usize {
    1000
}

fn default_zmq_hwm() -> usize {
    1000
}

fn default_memory_percent_threshold() -> f64 {
    90.0
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapConfig {
    #[serde(default)]
    pub tap_uuid: Option<String>,
    #[serde(default = "default_tap_name")]
    pub tap_name: String,
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_auto_monitor")]
    pub auto_monitor: bool,
    /// Legacy flat channel plan, migrated into `channels_24ghz` on load.
    #[serde(default)]
    channels: Option<Vec<u16>>,
    #[serde(default)]
    pub channels_24ghz: Vec<u16>,
    #[serde(default)]
    pub channels_5ghz: Vec<u16>,
    #[serde(default)]
    pub channels_6ghz: Vec<u16>,
    #[serde(default = "default_channel_dwell_ms")]
    pub channel_dwell_ms: u64,
    pub node_host: String,
    #[serde(default = "default_node_port")]
    pub node_port: u16,
    #[serde(default = "default_tshark_path")]
    pub tshark_path: String,
    #[serde(default = "default_starvation_timeout_s")]
    pub starvation_timeout_s: u64,
    #[serde(default = "default_tshark_restart_delay_s")]
    pub tshark_restart_delay_s: u64,
    #[serde(default = "default_heartbeat_interval_s")]
    pub heartbeat_interval_s: u64,
    #[serde(default = "default_zmq_buffer_size")]
    pub zmq_buffer_size: usize,
    #[serde(default = "default_zmq_hwm")]
    pub zmq_hwm: usize,
    #[serde(default = "default_memory_percent_threshold")]
    pub memory_percent_threshold: f64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Static tap position carried on heartbeats; the tap has no GPS.
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl TapConfig {
    /// Load and migrate a configuration document.
    pub fn load(path: &Path) -> Result<TapConfig> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: TapConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.migrate();
        Ok(config)
    }

    /// Parse a document from memory; used by tests and `load`.
    pub fn from_json(raw: &str) -> Result<TapConfig> {
        let mut config: TapConfig = serde_json::from_str(raw).context("parsing config")?;
        config.migrate();
        Ok(config)
    }

    fn migrate(&mut self) {
        if let Some(legacy) = self.channels.take() {
            if self.channels_24ghz.is_empty() {
                self.channels_24ghz = legacy;
            }
        }
        if self.channels_24ghz.is_empty()
            && self.channels_5ghz.is_empty()
            && self.channels_6ghz.is_empty()
        {
            self.channels_24ghz = vec![1, 6, 11];
        }
    }

    /// The hopper sequence: 2.4 GHz, then 5, then 6; first occurrence wins.
    pub fn merged_channels(&self) -> Vec<u16> {
        let mut merged = Vec::new();
        for &ch in self
            .channels_24ghz
            .iter()
            .chain(self.channels_5ghz.iter())
            .chain(self.channels_6ghz.iter())
        {
            if !merged.contains(&ch) {
                merged.push(ch);
            }
        }
        merged
    }

    pub fn channel_dwell(&self) -> Duration {
        Duration::from_millis(self.channel_dwell_ms)
    }

    pub fn starvation_timeout(&self) -> Duration {
        Duration::from_secs(self.starvation_timeout_s)
    }

    pub fn tshark_restart_delay(&self) -> Duration {
        Duration::from_secs(self.tshark_restart_delay_s)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_s)
    }

    pub fn node_addr(&self) -> String {
        format!("{}:{}", self.node_host, self.node_port)
    }
}

/// Resolve the tap identity: config value, then fallback file, then a
/// freshly generated v4 UUID persisted for the next run.
pub fn resolve_tap_uuid(configured: Option<&str>, fallback: &Path) -> Result<String> {
    if let Some(uuid) = configured {
        if !uuid.trim().is_empty() {
            return Ok(uuid.trim().to_string());
        }
    }

    if let Ok(stored) = fs::read_to_string(fallback) {
        let stored = stored.trim();
        if !stored.is_empty() {
            return Ok(stored.to_string());
        }
    }

    let generated = uuid::Uuid::new_v4().to_string();
    if let Some(parent) = fallback.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(fallback)
        .with_context(|| format!("persisting tap uuid to {}", fallback.display()))?;
    writeln!(file, "{generated}")
        .with_context(|| format!("persisting tap uuid to {}", fallback.display()))?;
    Ok(generated)
}
