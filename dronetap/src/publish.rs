// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound publishing: a bounded queue in front of a connecting TCP
//! transport.
//!
//! The pipeline never blocks on the collector. Enqueueing is non-blocking
//! and drops the newest message on overflow; while the link is down up to
//! the high-water mark of messages buffer, then newest are dropped too.
//! Reconnection is internal to the transport.

use crate::metrics::TapCounters;
use crate::wire::{self, WireMessage};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Cheap handle other tasks publish through.
#[derive(Clone)]
pub struct PublisherHandle {
    queue: mpsc::Sender<WireMessage>,
    counters: Arc<TapCounters>,
}

impl PublisherHandle {
    /// Encode and enqueue. On a full queue the message (the newest) is
    /// dropped and counted; the correlator is never blocked.
    pub fn publish<T: Serialize>(&self, topic: &'static str, value: &T) {
        let message = match wire::encode(topic, value) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, topic, "failed to encode outbound message");
                return;
            }
        };
        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.reports_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Build the queue pair: a handle for producers and the worker owning the
/// socket.
pub fn channel(
    node_addr: String,
    buffer_size: usize,
    hwm: usize,
    counters: Arc<TapCounters>,
    cancel: CancellationToken,
) -> (PublisherHandle, Publisher) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (
        PublisherHandle {
            queue: tx,
            counters: counters.clone(),
        },
        Publisher {
            node_addr,
            hwm: hwm.max(1),
            queue: rx,
            pending: VecDeque::new(),
            counters,
            cancel,
        },
    )
}

pub struct Publisher {
    node_addr: String,
    hwm: usize,
    queue: mpsc::Receiver<WireMessage>,
    pending: VecDeque<WireMessage>,
    counters: Arc<TapCounters>,
    cancel: CancellationToken,
}

impl Publisher {
    /// Run until cancelled, then flush whatever the high-water mark still
    /// holds.
    pub async fn run(&mut self) {
        let mut socket: Option<TcpStream> = None;
        loop {
            if socket.is_none() {
                socket = self.connect().await;
                if socket.is_none() {
                    // Only cancellation stops the connect loop.
                    break;
                }
                // Drain whatever buffered while the link was down.
                if let Some(stream) = socket.as_mut() {
                    if self.flush(stream).await.is_err() {
                        socket = None;
                        continue;
                    }
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = self.queue.recv() => match received {
                    Some(message) => {
                        self.buffer(message);
                        if let Some(stream) = socket.as_mut() {
                            if let Err(err) = self.flush(stream).await {
                                debug!(error = %err, "node link lost");
                                socket = None;
                            }
                        }
                    }
                    None => break,
                },
            }
        }

        // Best-effort final flush.
        while let Ok(message) = self.queue.try_recv() {
            self.buffer(message);
        }
        if let Some(stream) = socket.as_mut() {
            let _ = self.flush(stream).await;
            let _ = stream.shutdown().await;
        }
    }

    /// Queue a message for the socket, bounded by the high-water mark:
    /// beyond it the newest message is the one dropped.
    fn buffer(&mut self, message: WireMessage) {
        if self.pending.len() >= self.hwm {
            self.counters.reports_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.pending.push_back(message);
    }

    async fn flush(&mut self, stream: &mut TcpStream) -> std::io::Result<()> {
        while let Some(message) = self.pending.pop_front() {
            if let Err(err) = stream.write_all(&wire::frame(&message)).await {
                // Keep the message for the next connection.
                self.pending.push_front(message);
                return Err(err);
            }
        }
        stream.flush().await
    }

    /// Connect with backoff, buffering messages that arrive in the
    /// meantime. Returns `None` only on cancellation.
    async fn connect(&mut self) -> Option<TcpStream> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                connected = TcpStream::connect(&self.node_addr) => match connected {
                    Ok(stream) => {
                        info!(node = %self.node_addr, "connected to node");
                        return Some(stream);
                    }
                    Err(err) => {
                        debug!(node = %self.node_addr, error = %err, "node connect failed");
                    }
                },
            }
            // Keep draining producers while backing off.
            let backoff = tokio::time::sleep(RECONNECT_DELAY);
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    _ = &mut backoff => break,
                    received = self.queue.recv() => match received {
                        Some(message) => self.buffer(message),
                        None => return None,
                    },
                }
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::TOPIC_UAV;

    fn message(n: u8) -> WireMessage {
        WireMessage {
            topic: TOPIC_UAV,
            payload: vec![n],
        }
    }

    #[test]
    fn hwm_drops_newest_and_counts() {
        let counters = Arc::new(TapCounters::default());
        let (_handle, mut publisher) = channel(
            "127.0.0.1:5590".to_string(),
            8,
            2,
            counters.clone(),
            CancellationToken::new(),
        );
        publisher.buffer(message(1));
        publisher.buffer(message(2));
        publisher.buffer(message(3));
        assert_eq!(publisher.pending_len(), 2);
        assert_eq!(publisher.pending[0].payload, vec![1]);
        assert_eq!(publisher.pending[1].payload, vec![2]);
        assert_eq!(counters.reports_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_newest_at_the_handle() {
        let counters = Arc::new(TapCounters::default());
        let (handle, _publisher) = channel(
            "127.0.0.1:5590".to_string(),
            2,
            2,
            counters.clone(),
            CancellationToken::new(),
        );
        #[derive(Serialize)]
        struct Doc {
            n: u32,
        }
        handle.publish(TOPIC_UAV, &Doc { n: 1 });
        handle.publish(TOPIC_UAV, &Doc { n: 2 });
        handle.publish(TOPIC_UAV, &Doc { n: 3 });
        assert_eq!(counters.reports_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn messages_flush_to_a_listening_node() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let counters = Arc::new(TapCounters::default());
        let cancel = CancellationToken::new();
        let (handle, mut publisher) = channel(
            addr.to_string(),
            8,
            8,
            counters,
            cancel.clone(),
        );

        let worker = tokio::spawn(async move { publisher.run().await });
        let (mut node_side, _) = listener.accept().await.unwrap();

        #[derive(Serialize)]
        struct Doc {
            n: u32,
        }
        handle.publish(TOPIC_UAV, &Doc { n: 42 });

        let mut received = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            let n = node_side.read(&mut chunk).await.unwrap();
            received.extend_from_slice(&chunk[..n]);
            if wire::read_frame(&received).is_some() {
                break;
            }
        }
        let (topic, payload, _) = wire::read_frame(&received).unwrap();
        assert_eq!(topic, b"uav");
        assert!(!payload.is_empty());

        cancel.cancel();
        worker.await.unwrap();
    }
}
