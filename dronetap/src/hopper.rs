// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cooperative channel sequencer.
//!
//! The hopper owns the NIC channel exclusively: it walks the merged band
//! plan, retunes every dwell period and publishes the current channel
//! through the shared atomic cell the heartbeat reads. With `auto_monitor`
//! off or an empty plan it parks until shutdown.

use crate::config::TapConfig;
use crate::metrics::TapCounters;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ChannelHopper {
    interface: String,
    channels: Vec<u16>,
    dwell: Duration,
    enabled: bool,
    counters: Arc<TapCounters>,
    cancel: CancellationToken,
}

impl ChannelHopper {
    pub fn new(
        config: &TapConfig,
        counters: Arc<TapCounters>,
        cancel: CancellationToken,
    ) -> ChannelHopper {
        ChannelHopper {
            interface: config.interface.clone(),
            channels: config.merged_channels(),
            dwell: config.channel_dwell(),
            enabled: config.auto_monitor,
            counters,
            cancel,
        }
    }

    pub async fn run(&mut self) {
        if !self.enabled || self.channels.is_empty() {
            info!("channel hopper idle");
            self.cancel.cancelled().await;
            return;
        }
        info!(
            channels = self.channels.len(),
            dwell_ms = self.dwell.as_millis() as u64,
            "channel hopper started"
        );

        let mut position = 0usize;
        loop {
            let channel = self.channels[position];
            position = (position + 1) % self.channels.len();

            self.set_channel(channel).await;
            self.counters
                .current_channel
                .store(channel as u32, Ordering::Relaxed);

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(self.dwell) => {}
            }
        }
    }

    async fn set_channel(&self, channel: u16) {
        let result = Command::new("iw")
            .args([
                "dev",
                &self.interface,
                "set",
                "channel",
                &channel.to_string(),
            ])
            .output()
            .await;
        match result {
            Ok(output) if output.status.success() => {
                debug!(channel, "tuned");
            }
            Ok(output) => {
                warn!(channel, status = %output.status, "channel set failed");
            }
            Err(err) => {
                warn!(channel, error = %err, "could not invoke iw");
            }
        }
    }
}
