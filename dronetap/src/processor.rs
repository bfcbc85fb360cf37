// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The processing task: frames in, reports out.
//!
//! Sole consumer of the capture channel and sole owner of the tracker, so
//! per-MAC ordering falls out of the task structure. Parsing and
//! correlation never suspend; the only waits are channel receives and the
//! eviction timer.

use crate::capture::FrameRecord;
use crate::detect::{self, ParseOutcome};
use crate::fingerprint::FingerprintTables;
use crate::metrics::TapCounters;
use crate::publish::PublisherHandle;
use crate::track::UavTracker;
use crate::wire::TOPIC_UAV;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub struct Processor {
    frames: mpsc::Receiver<FrameRecord>,
    tracker: UavTracker,
    tables: Arc<FingerprintTables>,
    publisher: PublisherHandle,
    counters: Arc<TapCounters>,
    cancel: CancellationToken,
}

impl Processor {
    pub fn new(
        frames: mpsc::Receiver<FrameRecord>,
        tracker: UavTracker,
        tables: Arc<FingerprintTables>,
        publisher: PublisherHandle,
        counters: Arc<TapCounters>,
        cancel: CancellationToken,
    ) -> Processor {
        Processor {
            frames,
            tracker,
            tables,
            publisher,
            counters,
            cancel,
        }
    }

    pub async fn run(&mut self) {
        let mut sweep = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // Drain what the capture reader already handed over.
                    while let Ok(record) = self.frames.try_recv() {
                        self.handle(record);
                    }
                    return;
                }
                received = self.frames.recv() => match received {
                    Some(record) => self.handle(record),
                    None => return,
                },
                _ = sweep.tick() => {
                    self.tracker.evict_stale(epoch_now());
                }
            }
        }
    }

    fn handle(&mut self, record: FrameRecord) {
        match detect::parse_frame(&record, &self.tables) {
            ParseOutcome::Detection(event) => {
                self.counters.frames_parsed.fetch_add(1, Ordering::Relaxed);
                let report = self.tracker.apply(*event);
                self.publisher.publish(TOPIC_UAV, &report);
            }
            ParseOutcome::Nothing => {}
            ParseOutcome::Malformed => {
                self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn epoch_now() -> f64 {
    std::time::SystemTime::UNIX_EPOCH
        .elapsed()
        .unwrap_or_default()
        .as_secs_f64()
}
