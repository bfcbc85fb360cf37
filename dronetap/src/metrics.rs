// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cross-task counters sampled by the heartbeat emitter.
//!
//! Every counter is written by exactly one producing task and read by the
//! heartbeat task; nothing here is locked on the hot path.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct TapCounters {
    /// Dissector output lines read, parseable or not.
    pub frames_total: AtomicU64,
    /// Frames that produced a detection event.
    pub frames_parsed: AtomicU64,
    /// Malformed payloads dropped by the parser.
    pub parse_errors: AtomicU64,
    /// Dissector exits observed outside shutdown.
    pub capture_errors: AtomicU64,
    /// Outbound messages dropped by the publisher queue.
    pub reports_dropped: AtomicU64,
    pub tshark_running: AtomicBool,
    /// Channel the hopper most recently tuned to; 0 until the first hop.
    pub current_channel: AtomicU32,
    started: Instant,
}

impl Default for TapCounters {
    fn default() -> Self {
        TapCounters {
            frames_total: AtomicU64::new(0),
            frames_parsed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
            reports_dropped: AtomicU64::new(0),
            tshark_running: AtomicBool::new(false),
            current_channel: AtomicU32::new(0),
            started: Instant::now(),
        }
    }
}

impl TapCounters {
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn channel(&self) -> Option<u16> {
        match self.current_channel.load(Ordering::Relaxed) {
            0 => None,
            ch => Some(ch as u16),
        }
    }
}
