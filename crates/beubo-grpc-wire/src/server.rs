//! RelayServer — TCP listener that dispatches connections by opening call.
//!
//! Each accepted connection sends one [`Call`] frame first:
//!
//! - `connect` runs a [`StreamSession`] for the life of the connection;
//! - `requests` records a subscription and answers with a single `ack`;
//! - `describe` answers with the plugin's discovery metadata.

use crate::frame::{read_frame, write_frame, Call, Frame, WireError};
use crate::queue::QueueStats;
use crate::router::ChannelRouter;
use crate::session::{InboundHandler, SessionError, SessionHandle, SessionHealth, StreamSession};
use crate::subscription::SubscriberRegistry;
use beubo_grpc_types::config::RelayConfig;
use beubo_grpc_types::envelope::Channel;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Snapshot of the server for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub listen_addr: SocketAddr,
    pub uptime_secs: u64,
    pub sessions_total: u64,
    pub active_sessions: Vec<SessionHealth>,
    pub subscribers: usize,
    pub queues: Vec<(Channel, QueueStats)>,
}

/// The relay's network endpoint.
pub struct RelayServer {
    config: RelayConfig,
    router: Arc<ChannelRouter>,
    handler: Arc<dyn InboundHandler>,
    subscribers: SubscriberRegistry,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    sessions_total: AtomicU64,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    start_time: Instant,
}

impl RelayServer {
    /// Bind the configured address and start accepting connections.
    ///
    /// A bind failure is returned as [`WireError::Bind`]; the caller decides
    /// whether it is fatal.
    pub async fn start(
        config: RelayConfig,
        router: Arc<ChannelRouter>,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let addr = config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WireError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            plugin = %config.plugin.identifier,
            "Relay listening"
        );

        let server = Arc::new(Self {
            config,
            router,
            handler,
            subscribers: SubscriberRegistry::new(),
            sessions: RwLock::new(HashMap::new()),
            sessions_total: AtomicU64::new(0),
            local_addr,
            start_time: Instant::now(),
        });

        let server_clone = Arc::clone(&server);
        let accept_handle = tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        Ok((server, accept_handle))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    /// Handles of the sessions currently running.
    pub fn active_sessions(&self) -> Vec<SessionHandle> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.values().cloned().collect()
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            listen_addr: self.local_addr,
            uptime_secs: self.start_time.elapsed().as_secs(),
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            active_sessions: self.active_sessions().iter().map(|s| s.health()).collect(),
            subscribers: self.subscribers.count(),
            queues: self.router.stats().to_vec(),
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "Accepted connection");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(peer = %addr, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Read the opening call and serve it.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), SessionError> {
        let (mut reader, mut writer) = stream.into_split();

        let call = match read_frame(&mut reader).await? {
            Frame::Call(call) => call,
            other => {
                warn!(peer = %addr, frame = ?other, "Rejected connection without opening call");
                write_frame(
                    &mut writer,
                    &Frame::Error {
                        code: 400,
                        message: "Connection must open with a call frame".to_string(),
                    },
                )
                .await?;
                return Err(WireError::Protocol("missing opening call".into()).into());
            }
        };

        match call {
            Call::Connect => {
                let session = StreamSession::new(
                    Arc::clone(&self.router),
                    Arc::clone(&self.handler),
                    self.config.supervisor.clone(),
                );
                let handle = session.handle();
                self.track(&handle, addr);
                let result = session.run(reader, writer).await;
                self.untrack(&handle);
                result
            }
            Call::Requests { subscriber } => {
                self.subscribers.subscribe(&subscriber);
                write_frame(&mut writer, &Frame::Ack).await?;
                let _ = writer.shutdown().await;
                Ok(())
            }
            Call::Describe => {
                debug!(peer = %addr, "Describe call");
                write_frame(
                    &mut writer,
                    &Frame::Registration {
                        name: self.config.plugin.name.clone(),
                        identifier: self.config.plugin.identifier.clone(),
                    },
                )
                .await?;
                let _ = writer.shutdown().await;
                Ok(())
            }
        }
    }

    fn track(&self, handle: &SessionHandle, addr: SocketAddr) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if !sessions.is_empty() {
            warn!(
                session = %handle.id(),
                active = sessions.len(),
                "Another stream session is active; sessions will compete for queued messages"
            );
        }
        sessions.insert(handle.id().to_string(), handle.clone());
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        info!(session = %handle.id(), peer = %addr, "Stream connected");
    }

    fn untrack(&self, handle: &SessionHandle) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(handle.id());
    }
}
