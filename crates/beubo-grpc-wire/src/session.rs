//! Stream session — one live bidirectional event stream.
//!
//! A session starts one supervised forwarder per outbound channel, then runs
//! the receive loop on the caller's task until the peer half-closes or the
//! receive path fails. Forwarders are aborted when the session ends, on every
//! exit path, so a finished session never keeps draining the shared queues.

use crate::codec::{self, Decoded};
use crate::frame::{read_frame, Frame, WireError};
use crate::router::ChannelRouter;
use crate::sink::{EventSink, FrameSink};
use crate::supervisor::{supervise, ChannelHealth, ChannelHealthSnapshot};
use async_trait::async_trait;
use beubo_grpc_types::config::SupervisorConfig;
use beubo_grpc_types::envelope::{Channel, Event};
use beubo_grpc_types::error::CodecError;
use beubo_grpc_types::message::PluginMessage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Reading from the stream failed for a reason other than a clean close.
    #[error("Transport receive error: {0}")]
    Transport(#[from] WireError),
    /// A payload with a recognized type failed to decode.
    #[error(transparent)]
    Deserialization(#[from] CodecError),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Receives decoded inbound plugin messages.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Called for every recognized entry, in arrival order. `key` is the
    /// enclosing event's channel label.
    async fn handle_message(&self, key: &str, message: PluginMessage);
}

/// Handler that only logs what arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl InboundHandler for LoggingHandler {
    async fn handle_message(&self, key: &str, message: PluginMessage) {
        info!(
            key = %key,
            name = %message.name,
            identifier = %message.identifier,
            "Plugin message received"
        );
    }
}

struct SessionShared {
    id: String,
    started_at: DateTime<Utc>,
    state: AtomicU8,
    events_received: AtomicU64,
    request: Arc<ChannelHealth>,
    response: Arc<ChannelHealth>,
}

/// Observability handle for a session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHealth {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    pub events_received: u64,
    pub request: ChannelHealthSnapshot,
    pub response: ChannelHealthSnapshot,
}

impl SessionHealth {
    /// True when any forwarding channel has stopped for good.
    pub fn is_degraded(&self) -> bool {
        use crate::supervisor::ChannelStatus;
        self.request.status == ChannelStatus::Stopped
            || self.response.status == ChannelStatus::Stopped
    }
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn health(&self) -> SessionHealth {
        SessionHealth {
            id: self.shared.id.clone(),
            started_at: self.shared.started_at,
            state: self.state(),
            events_received: self.shared.events_received.load(Ordering::Relaxed),
            request: self.shared.request.snapshot(),
            response: self.shared.response.snapshot(),
        }
    }
}

/// Aborts the forwarders when dropped.
struct Forwarders(Vec<JoinHandle<()>>);

impl Drop for Forwarders {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// One accepted stream.
pub struct StreamSession {
    router: Arc<ChannelRouter>,
    handler: Arc<dyn InboundHandler>,
    supervisor: SupervisorConfig,
    shared: Arc<SessionShared>,
}

impl StreamSession {
    pub fn new(
        router: Arc<ChannelRouter>,
        handler: Arc<dyn InboundHandler>,
        supervisor: SupervisorConfig,
    ) -> Self {
        let shared = Arc::new(SessionShared {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            state: AtomicU8::new(SessionState::Open as u8),
            events_received: AtomicU64::new(0),
            request: Arc::new(ChannelHealth::new(Channel::Request)),
            response: Arc::new(ChannelHealth::new(Channel::Response)),
        });
        Self {
            router,
            handler,
            supervisor,
            shared,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.shared.state.store(state as u8, Ordering::SeqCst);
    }

    /// Run the session over a split byte stream.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.run_with_sink(reader, Arc::new(FrameSink::new(writer)))
            .await
    }

    /// Run the session with outbound events going to `sink`.
    pub async fn run_with_sink<R>(
        self,
        mut reader: R,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let id = self.shared.id.clone();
        info!(session = %id, "Stream session open");

        let forwarders = Forwarders(
            [
                (Channel::Request, &self.shared.request),
                (Channel::Response, &self.shared.response),
            ]
            .into_iter()
            .map(|(channel, health)| {
                tokio::spawn(supervise(
                    id.clone(),
                    channel,
                    Arc::clone(&self.router),
                    Arc::clone(&sink),
                    Arc::clone(health),
                    self.supervisor.clone(),
                ))
            })
            .collect(),
        );

        let result = self.receive_loop(&mut reader).await;
        drop(forwarders);
        self.set_state(SessionState::Closed);

        match &result {
            Ok(()) => info!(session = %id, "Stream session closed by peer"),
            Err(e) => warn!(session = %id, error = %e, "Stream session ended with error"),
        }
        result
    }

    async fn receive_loop<R>(&self, reader: &mut R) -> Result<(), SessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        loop {
            let frame = match read_frame(reader).await {
                Ok(frame) => frame,
                Err(WireError::ConnectionClosed) => {
                    self.set_state(SessionState::Closing);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            match frame {
                Frame::Event(event) => self.dispatch(event).await?,
                other => {
                    warn!(session = %self.shared.id, frame = ?other, "Ignoring non-event frame on stream");
                }
            }
        }
    }

    /// Decode and hand off every recognized entry of `event`.
    async fn dispatch(&self, event: Event) -> Result<(), CodecError> {
        self.shared.events_received.fetch_add(1, Ordering::Relaxed);
        info!(
            session = %self.shared.id,
            key = %event.key,
            data = %event.data,
            entries = event.values.len(),
            "Event received"
        );

        for value in &event.values {
            debug!(session = %self.shared.id, type_url = %value.type_url, "Event entry");
            match codec::decode(value)? {
                Decoded::Plugin(message) => {
                    info!(session = %self.shared.id, name = %message.name, "Plugin message unmarshalled");
                    self.handler.handle_message(&event.key, message).await;
                }
                Decoded::Unrecognized(type_url) => {
                    debug!(session = %self.shared.id, type_url = %type_url, "Skipping entry of unrecognized type");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::write_frame;
    use crate::supervisor::ChannelStatus;
    use beubo_grpc_types::envelope::TypedValue;
    use beubo_grpc_types::message::PLUGIN_MESSAGE_TYPE;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<(String, PluginMessage)>>,
    }

    #[async_trait]
    impl InboundHandler for Collecting {
        async fn handle_message(&self, key: &str, message: PluginMessage) {
            self.seen.lock().unwrap().push((key.to_string(), message));
        }
    }

    struct Harness {
        router: Arc<ChannelRouter>,
        handler: Arc<Collecting>,
        handle: SessionHandle,
        task: JoinHandle<Result<(), SessionError>>,
        client_rx: ReadHalf<DuplexStream>,
        client_tx: WriteHalf<DuplexStream>,
    }

    fn start() -> Harness {
        let router = Arc::new(ChannelRouter::default());
        let handler = Arc::new(Collecting::default());
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_rx, server_tx) = tokio::io::split(server);
        let (client_rx, client_tx) = tokio::io::split(client);

        let session = StreamSession::new(
            Arc::clone(&router),
            handler.clone(),
            SupervisorConfig::default(),
        );
        let handle = session.handle();
        let task = tokio::spawn(session.run(server_rx, server_tx));
        Harness {
            router,
            handler,
            handle,
            task,
            client_rx,
            client_tx,
        }
    }

    fn plugin_value(name: &str) -> TypedValue {
        codec::encode(&PluginMessage::new(name, "peer")).unwrap()
    }

    #[tokio::test]
    async fn test_peer_eof_ends_session_cleanly() {
        let mut h = start();
        let event = Event::new("hello").with_value(plugin_value("greeting"));
        write_frame(&mut h.client_tx, &Frame::Event(event)).await.unwrap();
        h.client_tx.shutdown().await.unwrap();

        let result = h.task.await.unwrap();
        assert!(result.is_ok(), "expected clean close, got {result:?}");
        assert_eq!(h.handle.state(), SessionState::Closed);

        let seen = h.handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "hello");
        assert_eq!(seen[0].1.name, "greeting");
    }

    #[tokio::test]
    async fn test_corrupted_recognized_payload_ends_session() {
        let mut h = start();
        let event = Event::new("request")
            .with_value(TypedValue::new(PLUGIN_MESSAGE_TYPE, vec![0xc1, 0x00]));
        write_frame(&mut h.client_tx, &Frame::Event(event)).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("session must not hang")
            .unwrap();
        assert!(matches!(result, Err(SessionError::Deserialization(_))));
        assert_eq!(h.handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_unrecognized_entries_do_not_stop_processing() {
        let mut h = start();
        let event = Event::new("mixed")
            .with_value(TypedValue::new("beubo.Unknown", vec![1, 2, 3]))
            .with_value(plugin_value("first"))
            .with_value(TypedValue::new("other.Type", vec![]))
            .with_value(plugin_value("second"));
        write_frame(&mut h.client_tx, &Frame::Event(event)).await.unwrap();
        h.client_tx.shutdown().await.unwrap();

        assert!(h.task.await.unwrap().is_ok());
        let names: Vec<_> = h
            .handler
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.name.clone())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_forwards_both_channels_in_order() {
        let mut h = start();
        for name in ["a", "b", "c"] {
            h.router.enqueue_request(PluginMessage::new(name, "host")).unwrap();
        }
        h.router.enqueue_response(PluginMessage::new("x", "host")).unwrap();

        let mut requests = Vec::new();
        let mut responses = Vec::new();
        for _ in 0..4 {
            let Frame::Event(event) = read_frame(&mut h.client_rx).await.unwrap() else {
                panic!("expected event frame");
            };
            assert_eq!(event.values.len(), 1);
            let Decoded::Plugin(msg) = codec::decode(&event.values[0]).unwrap() else {
                panic!("expected plugin message");
            };
            match event.key.as_str() {
                "request" => requests.push(msg.name),
                "response" => responses.push(msg.name),
                other => panic!("unexpected key {other}"),
            }
        }
        assert_eq!(requests, vec!["a", "b", "c"]);
        assert_eq!(responses, vec!["x"]);

        h.client_tx.shutdown().await.unwrap();
        assert!(h.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_inbound_events_do_not_duplicate_forwarders() {
        let mut h = start();
        for i in 0..5 {
            let event = Event::new(format!("ping-{i}"));
            write_frame(&mut h.client_tx, &Frame::Event(event)).await.unwrap();
        }
        h.router.enqueue_request(PluginMessage::new("only", "host")).unwrap();

        let Frame::Event(event) = read_frame(&mut h.client_rx).await.unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(event.key, "request");

        // Nothing else arrives.
        let extra = tokio::time::timeout(
            Duration::from_millis(100),
            read_frame(&mut h.client_rx),
        )
        .await;
        assert!(extra.is_err());

        let health = h.handle.health();
        assert_eq!(health.events_received, 5);
        assert_eq!(health.request.sent, 1);
        assert_eq!(health.request.restarts, 0);
        assert_eq!(health.request.status, ChannelStatus::Running);
        h.client_tx.shutdown().await.unwrap();
        assert!(h.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_forwarders_stop_draining_after_session_ends() {
        let mut h = start();
        h.client_tx.shutdown().await.unwrap();
        assert!(h.task.await.unwrap().is_ok());

        h.router.enqueue_request(PluginMessage::new("later", "host")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.router.queue(Channel::Request).len(), 1);
    }

    /// Sink that rejects every response event and records requests.
    #[derive(Default)]
    struct NoResponses {
        requests: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventSink for NoResponses {
        async fn send(&self, event: Event) -> Result<(), WireError> {
            if event.key == "response" {
                return Err(WireError::ConnectionClosed);
            }
            self.requests.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_channel_does_not_end_session() {
        let router = Arc::new(ChannelRouter::default());
        let sink = Arc::new(NoResponses::default());
        let (mut client, server) = tokio::io::duplex(1024);
        let session = StreamSession::new(
            Arc::clone(&router),
            Arc::new(LoggingHandler),
            SupervisorConfig {
                max_restarts: 1,
                min_delay_ms: 1,
                max_delay_ms: 1,
            },
        );
        let handle = session.handle();
        let task = tokio::spawn(session.run_with_sink(server, sink.clone()));

        router.enqueue_response(PluginMessage::new("r1", "host")).unwrap();
        router.enqueue_response(PluginMessage::new("r2", "host")).unwrap();
        for _ in 0..500 {
            if handle.health().is_degraded() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let health = handle.health();
        assert!(health.is_degraded());
        assert_eq!(health.response.status, ChannelStatus::Stopped);
        assert_eq!(handle.state(), SessionState::Open);

        router.enqueue_request(PluginMessage::new("q", "host")).unwrap();
        for _ in 0..500 {
            if !sink.requests.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(sink.requests.lock().unwrap().len(), 1);

        client.shutdown().await.unwrap();
        assert!(task.await.unwrap().is_ok());
    }
}
