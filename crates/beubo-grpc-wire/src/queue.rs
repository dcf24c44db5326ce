//! Outbound queue — FIFO buffer between producers and a forwarding loop.
//!
//! Producers push from anywhere in the host process; a single forwarding
//! loop at a time pops. Capacity and overflow behavior come from
//! [`QueueConfig`].

use beubo_grpc_types::config::{OverflowPolicy, QueueConfig};
use beubo_grpc_types::envelope::Channel;
use beubo_grpc_types::message::PluginMessage;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Returned when a block-on-full queue has no room. Carries the message back.
#[derive(Debug, Error)]
#[error("Outbound {channel} queue is full")]
pub struct QueueFull {
    pub channel: Channel,
    pub message: PluginMessage,
}

/// Counters for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Messages currently queued.
    pub depth: usize,
    /// Messages accepted since creation.
    pub enqueued: u64,
    /// Messages discarded by the drop-oldest policy.
    pub dropped: u64,
}

/// A FIFO queue of plugin messages for one channel.
pub struct OutboundQueue {
    channel: Channel,
    config: QueueConfig,
    items: Mutex<VecDeque<PluginMessage>>,
    not_empty: Notify,
    not_full: Notify,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(channel: Channel, config: QueueConfig) -> Self {
        Self {
            channel,
            config,
            items: Mutex::new(VecDeque::new()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append without waiting.
    ///
    /// Only a full queue under [`OverflowPolicy::Block`] refuses the message.
    pub fn try_enqueue(&self, message: PluginMessage) -> Result<(), QueueFull> {
        {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            let capacity = self.config.capacity.max(1);
            match self.config.overflow {
                OverflowPolicy::Unbounded => {}
                OverflowPolicy::Block if items.len() >= capacity => {
                    return Err(QueueFull {
                        channel: self.channel,
                        message,
                    });
                }
                OverflowPolicy::Block => {}
                OverflowPolicy::DropOldest => {
                    while items.len() >= capacity {
                        if let Some(old) = items.pop_front() {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                channel = %self.channel,
                                name = %old.name,
                                "Outbound queue full, dropped oldest message"
                            );
                        }
                    }
                }
            }
            items.push_back(message);
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Append, waiting for room when the queue is full under
    /// [`OverflowPolicy::Block`]. Returns immediately under other policies.
    pub async fn enqueue(&self, mut message: PluginMessage) {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_enqueue(message) {
                Ok(()) => return,
                Err(full) => {
                    debug!(channel = %self.channel, "Producer waiting for queue room");
                    message = full.message;
                }
            }
            notified.await;
        }
    }

    /// Pop the oldest message, waiting until one is available.
    ///
    /// Cancel-safe: a waiter dropped before completion removes nothing.
    pub async fn next(&self) -> PluginMessage {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_next() {
                return message;
            }
            notified.await;
        }
    }

    /// Pop the oldest message if there is one.
    pub fn try_next(&self) -> Option<PluginMessage> {
        let message = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            items.pop_front()
        };
        if message.is_some() {
            self.not_full.notify_one();
        }
        message
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
