// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::Parser;
use dronetap::capture::CaptureDriver;
use dronetap::config::{self, TapConfig};
use dronetap::fingerprint::FingerprintTables;
use dronetap::heartbeat::HeartbeatWorker;
use dronetap::hopper::ChannelHopper;
use dronetap::metrics::TapCounters;
use dronetap::processor::Processor;
use dronetap::track::UavTracker;
use dronetap::{publish, FRAME_CHANNEL_CAPACITY};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Passive WiFi Remote ID tap.
#[derive(Debug, Parser)]
#[command(name = "dronetap", version)]
struct Cli {
    /// Capture interface; overrides the config value.
    #[arg(long)]
    interface: Option<String>,
    /// Path to the tap configuration document.
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = TapConfig::load(&cli.config)?;
    if let Some(interface) = cli.interface {
        config.interface = interface;
    }

    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let tap_uuid = config::resolve_tap_uuid(
        config.tap_uuid.as_deref(),
        Path::new(config::TAP_UUID_FALLBACK_PATH),
    )?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        tap_uuid = %tap_uuid,
        interface = %config.interface,
        node = %config.node_addr(),
        "dronetap starting"
    );

    let counters = Arc::new(TapCounters::default());
    let cancel = CancellationToken::new();
    let tables = Arc::new(FingerprintTables::builtin());

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let (publisher_handle, mut publisher) = publish::channel(
        config.node_addr(),
        config.zmq_buffer_size,
        config.zmq_hwm,
        counters.clone(),
        cancel.clone(),
    );

    let tracker = UavTracker::new(tap_uuid.clone(), tables.clone(), config.starvation_timeout());
    let mut capture = CaptureDriver::new(&config, counters.clone(), frame_tx, cancel.clone());
    let mut processor = Processor::new(
        frame_rx,
        tracker,
        tables,
        publisher_handle.clone(),
        counters.clone(),
        cancel.clone(),
    );
    let mut hopper = ChannelHopper::new(&config, counters.clone(), cancel.clone());
    let mut heartbeat = HeartbeatWorker::new(
        &config,
        tap_uuid,
        counters.clone(),
        publisher_handle,
        cancel.clone(),
    );

    let tasks = vec![
        tokio::spawn(async move { capture.run().await }),
        tokio::spawn(async move { processor.run().await }),
        tokio::spawn(async move { hopper.run().await }),
        tokio::spawn(async move { heartbeat.run().await }),
        tokio::spawn(async move { publisher.run().await }),
    ];

    wait_for_shutdown().await;
    info!("shutdown requested");
    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("dronetap stopped");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
