//! Forwarding loop supervision and per-channel health.
//!
//! Each session runs one supervised forwarder per channel. A forwarder drains
//! its queue into the session's sink until a send fails; the supervisor then
//! restarts it with exponential backoff until the restart budget is spent,
//! after which the channel is marked stopped for the rest of the session.
//! A sink that reports itself closed stops the channel at once, leaving the
//! remaining messages queued.

use crate::codec;
use crate::frame::WireError;
use crate::router::ChannelRouter;
use crate::sink::EventSink;
use beubo_grpc_types::config::SupervisorConfig;
use beubo_grpc_types::envelope::{Channel, Event};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Liveness of one forwarding channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChannelStatus {
    Running = 0,
    Restarting = 1,
    Stopped = 2,
}

impl ChannelStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Restarting,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Restarting => write!(f, "restarting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Live counters for one channel of one session.
#[derive(Debug)]
pub struct ChannelHealth {
    channel: Channel,
    status: AtomicU8,
    restarts: AtomicU32,
    sent: AtomicU64,
    encode_failures: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of [`ChannelHealth`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHealthSnapshot {
    pub channel: Channel,
    pub status: ChannelStatus,
    pub restarts: u32,
    pub sent: u64,
    pub encode_failures: u64,
    pub send_failures: u64,
}

impl ChannelHealth {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            status: AtomicU8::new(ChannelStatus::Running as u8),
            restarts: AtomicU32::new(0),
            sent: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ChannelStatus) {
        self.status.store(status as u8, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ChannelHealthSnapshot {
        ChannelHealthSnapshot {
            channel: self.channel,
            status: self.status(),
            restarts: self.restarts.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Drain `channel` into `sink` until a send fails.
///
/// Messages that fail to encode, either as a payload or as a frame, are
/// dropped and the loop moves on. The message whose send failed is not
/// redelivered.
async fn forward(
    session_id: &str,
    channel: Channel,
    router: &ChannelRouter,
    sink: &dyn EventSink,
    health: &ChannelHealth,
) -> WireError {
    loop {
        let message = router.next(channel).await;
        let value = match codec::encode(&message) {
            Ok(v) => v,
            Err(e) => {
                health.encode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session = %session_id,
                    channel = %channel,
                    name = %message.name,
                    error = %e,
                    "Could not serialize plugin message, dropping it"
                );
                continue;
            }
        };

        match sink.send(Event::single(channel, value)).await {
            Ok(()) => {}
            Err(e) if e.is_unencodable() => {
                health.encode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session = %session_id,
                    channel = %channel,
                    name = %message.name,
                    error = %e,
                    "Could not frame plugin message, dropping it"
                );
                continue;
            }
            Err(e) => {
                health.send_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    session = %session_id,
                    channel = %channel,
                    name = %message.name,
                    error = %e,
                    "Failed to send event"
                );
                return e;
            }
        }
        health.sent.fetch_add(1, Ordering::Relaxed);
        debug!(session = %session_id, channel = %channel, name = %message.name, "Forwarded message");
    }
}

/// Run the forwarder for `channel`, restarting it after send failures.
///
/// Returns once the restart budget is exhausted or the sink is closed.
/// Callers abort the returned future's task to stop forwarding when the
/// session ends.
pub async fn supervise(
    session_id: String,
    channel: Channel,
    router: Arc<ChannelRouter>,
    sink: Arc<dyn EventSink>,
    health: Arc<ChannelHealth>,
    config: SupervisorConfig,
) {
    let mut attempt = 0u32;
    loop {
        health.set_status(ChannelStatus::Running);
        let _err = forward(&session_id, channel, &router, sink.as_ref(), &health).await;

        if sink.is_closed() {
            health.set_status(ChannelStatus::Stopped);
            warn!(
                session = %session_id,
                channel = %channel,
                "Sink closed, channel stopped for this session"
            );
            return;
        }

        if attempt >= config.max_restarts {
            health.set_status(ChannelStatus::Stopped);
            warn!(
                session = %session_id,
                channel = %channel,
                restarts = attempt,
                "Forwarder exceeded restart limit, channel stopped for this session"
            );
            return;
        }

        let delay = config.backoff_ms(attempt);
        attempt += 1;
        health.restarts.fetch_add(1, Ordering::Relaxed);
        health.set_status(ChannelStatus::Restarting);
        info!(
            session = %session_id,
            channel = %channel,
            attempt,
            delay_ms = delay,
            "Restarting forwarder"
        );
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
