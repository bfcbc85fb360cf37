// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Passive WiFi UAV sensor.
//!
//! The tap captures 802.11 management frames in monitor mode through a
//! supervised tshark child, decodes Remote ID and DJI DroneID broadcasts,
//! correlates observations per airframe with spoof heuristics, and
//! publishes detection reports and heartbeats to a collector node over a
//! topic-framed TCP link.
//!
//! A fixed set of tasks cooperates over bounded channels: the capture
//! reader, the processor (sole owner of the airframe table), the channel
//! hopper, the heartbeat/watchdog, and the publisher. The only shared
//! state is the atomic counter block in [`metrics`].

pub mod capture;
pub mod config;
pub mod detect;
pub mod fingerprint;
pub mod heartbeat;
pub mod hopper;
pub mod host;
pub mod metrics;
pub mod processor;
pub mod publish;
pub mod report;
pub mod spoof;
pub mod track;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutil;

/// Exit code for the frame-starvation watchdog; distinguishable by the
/// supervisor from a crash or a clean stop.
pub const EXIT_STARVATION: i32 = 82;
/// Exit code for the memory-pressure watchdog.
pub const EXIT_MEMORY_PRESSURE: i32 = 83;

/// Capture-to-processor channel bound. The reader blocks when full; the
/// dissector provides upstream flow control.
pub const FRAME_CHANNEL_CAPACITY: usize = 256;
