// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Heartbeat emission and the liveness watchdog.
//!
//! Every tick the worker samples host metrics and the pipeline counters,
//! publishes a heartbeat, and evaluates the watchdog rules. Starvation and
//! memory pressure end the process deliberately with distinguished exit
//! codes; the external supervisor restarts it and can tell the causes
//! apart in its logs.

use crate::config::TapConfig;
use crate::host::{HostSample, HostSampler};
use crate::metrics::TapCounters;
use crate::publish::PublisherHandle;
use crate::report::{TapHeartbeat, HEARTBEAT_TYPE};
use crate::wire::{PROTOCOL_VERSION, TOPIC_HEARTBEAT};
use crate::{EXIT_MEMORY_PRESSURE, EXIT_STARVATION};
use chrono::{SecondsFormat, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Outcome of one watchdog evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    Healthy,
    Starved,
    MemoryPressure,
}

/// Pure decision so the exit paths stay testable.
pub fn watchdog_verdict(
    stalled_for: Duration,
    starvation_timeout: Duration,
    memory_percent: f64,
    memory_threshold: f64,
) -> WatchdogVerdict {
    if stalled_for >= starvation_timeout {
        return WatchdogVerdict::Starved;
    }
    if memory_percent >= memory_threshold {
        return WatchdogVerdict::MemoryPressure;
    }
    WatchdogVerdict::Healthy
}

pub struct HeartbeatWorker {
    tap_uuid: String,
    tap_name: String,
    interface: String,
    channels: Vec<u16>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    interval: Duration,
    starvation_timeout: Duration,
    memory_threshold: f64,
    counters: Arc<TapCounters>,
    publisher: PublisherHandle,
    sampler: HostSampler,
    last_frames: u64,
    last_advance: Instant,
    cancel: CancellationToken,
}

impl HeartbeatWorker {
    pub fn new(
        config: &TapConfig,
        tap_uuid: String,
        counters: Arc<TapCounters>,
        publisher: PublisherHandle,
        cancel: CancellationToken,
    ) -> HeartbeatWorker {
        HeartbeatWorker {
            tap_uuid,
            tap_name: config.tap_name.clone(),
            interface: config.interface.clone(),
            channels: config.merged_channels(),
            latitude: config.latitude,
            longitude: config.longitude,
            interval: config.heartbeat_interval(),
            starvation_timeout: config.starvation_timeout(),
            memory_threshold: config.memory_percent_threshold,
            counters,
            publisher,
            sampler: HostSampler::default(),
            last_frames: 0,
            last_advance: Instant::now(),
            cancel,
        }
    }

    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    fn tick(&mut self) {
        let sample = self.sampler.sample();
        let frames_total = self.counters.frames_total.load(Ordering::Relaxed);
        if frames_total != self.last_frames {
            self.last_frames = frames_total;
            self.last_advance = Instant::now();
        }

        let heartbeat = self.assemble(&sample, frames_total);
        self.publisher.publish(TOPIC_HEARTBEAT, &heartbeat);

        match watchdog_verdict(
            self.last_advance.elapsed(),
            self.starvation_timeout,
            sample.memory_percent,
            self.memory_threshold,
        ) {
            WatchdogVerdict::Healthy => {}
            WatchdogVerdict::Starved => {
                error!(
                    timeout_s = self.starvation_timeout.as_secs(),
                    "no frames seen, exiting for supervisor restart"
                );
                std::process::exit(EXIT_STARVATION);
            }
            WatchdogVerdict::MemoryPressure => {
                error!(
                    memory_percent = sample.memory_percent,
                    threshold = self.memory_threshold,
                    "memory pressure, exiting for supervisor restart"
                );
                std::process::exit(EXIT_MEMORY_PRESSURE);
            }
        }
    }

    fn assemble(&self, sample: &HostSample, frames_total: u64) -> TapHeartbeat {
        TapHeartbeat {
            record_type: HEARTBEAT_TYPE,
            protocol_version: PROTOCOL_VERSION,
            tap_uuid: self.tap_uuid.clone(),
            tap_name: self.tap_name.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            version: env!("CARGO_PKG_VERSION").to_string(),
            interface: self.interface.clone(),
            channel: self.counters.channel(),
            cpu_load: sample.cpu_load,
            cpu_percent: sample.cpu_percent,
            memory_used: sample.memory_used,
            memory_percent: sample.memory_percent,
            temperature: sample.temperature,
            disk_free: sample.disk_free,
            disk_writes_total: sample.disk_writes_total,
            latitude: self.latitude,
            longitude: self.longitude,
            frames_total,
            frames_parsed: self.counters.frames_parsed.load(Ordering::Relaxed),
            tshark_running: self.counters.tshark_running.load(Ordering::Relaxed),
            tap_uptime: self.counters.uptime_secs(),
            channels: self.channels.clone(),
            capture_errors: self.counters.capture_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(120);

    #[test]
    fn healthy_when_frames_flow_and_memory_is_fine() {
        assert_eq!(
            watchdog_verdict(Duration::from_secs(5), TIMEOUT, 40.0, 90.0),
            WatchdogVerdict::Healthy
        );
    }

    #[test]
    fn starvation_fires_at_the_timeout() {
        assert_eq!(
            watchdog_verdict(Duration::from_secs(119), TIMEOUT, 40.0, 90.0),
            WatchdogVerdict::Healthy
        );
        assert_eq!(
            watchdog_verdict(TIMEOUT, TIMEOUT, 40.0, 90.0),
            WatchdogVerdict::Starved
        );
    }

    #[test]
    fn memory_pressure_fires_at_the_threshold() {
        assert_eq!(
            watchdog_verdict(Duration::ZERO, TIMEOUT, 95.0, 90.0),
            WatchdogVerdict::MemoryPressure
        );
        assert_eq!(
            watchdog_verdict(Duration::ZERO, TIMEOUT, 89.9, 90.0),
            WatchdogVerdict::Healthy
        );
    }

    #[test]
    fn starvation_outranks_memory_pressure() {
        assert_eq!(
            watchdog_verdict(TIMEOUT, TIMEOUT, 95.0, 90.0),
            WatchdogVerdict::Starved
        );
    }
}
