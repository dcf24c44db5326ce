//! Channel router — owns the request and response queues.
//!
//! Construct one router at startup and share it by `Arc` with every producer
//! and with the server. The router does no routing decisions of its own: it
//! hands the next queued message on a channel to whichever loop asks.

use crate::queue::{OutboundQueue, QueueFull, QueueStats};
use beubo_grpc_types::config::QueueConfig;
use beubo_grpc_types::envelope::Channel;
use beubo_grpc_types::message::PluginMessage;

/// Both outbound queues.
pub struct ChannelRouter {
    requests: OutboundQueue,
    responses: OutboundQueue,
}

impl ChannelRouter {
    /// Create a router whose queues share one configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            requests: OutboundQueue::new(Channel::Request, config.clone()),
            responses: OutboundQueue::new(Channel::Response, config),
        }
    }

    /// The queue backing `channel`.
    pub fn queue(&self, channel: Channel) -> &OutboundQueue {
        match channel {
            Channel::Request => &self.requests,
            Channel::Response => &self.responses,
        }
    }

    /// Queue a request without waiting.
    pub fn enqueue_request(&self, message: PluginMessage) -> Result<(), QueueFull> {
        self.requests.try_enqueue(message)
    }

    /// Queue a response without waiting.
    pub fn enqueue_response(&self, message: PluginMessage) -> Result<(), QueueFull> {
        self.responses.try_enqueue(message)
    }

    /// Queue a request, waiting for room if the queue blocks when full.
    pub async fn send_request(&self, message: PluginMessage) {
        self.requests.enqueue(message).await
    }

    /// Queue a response, waiting for room if the queue blocks when full.
    pub async fn send_response(&self, message: PluginMessage) {
        self.responses.enqueue(message).await
    }

    /// Wait for the next request.
    pub async fn next_request(&self) -> PluginMessage {
        self.requests.next().await
    }

    /// Wait for the next response.
    pub async fn next_response(&self) -> PluginMessage {
        self.responses.next().await
    }

    /// Wait for the next message on `channel`.
    pub async fn next(&self, channel: Channel) -> PluginMessage {
        self.queue(channel).next().await
    }

    /// Counters for both queues, in [`Channel::ALL`] order.
    pub fn stats(&self) -> [(Channel, QueueStats); 2] {
        Channel::ALL.map(|c| (c, self.queue(c).stats()))
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
