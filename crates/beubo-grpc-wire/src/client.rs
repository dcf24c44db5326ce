//! Peer side of the relay protocol.
//!
//! Used by hosts that talk to a relay, and by the test suite.

use crate::frame::{read_frame, write_frame, Call, Frame, WireError};
use beubo_grpc_types::envelope::Event;
use beubo_grpc_types::message::PluginMessage;
use beubo_grpc_types::plugin::{register, PluginInfo};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// An open `connect` stream.
pub struct StreamClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl StreamClient {
    /// Open a stream to the relay at `addr`.
    pub async fn connect(addr: SocketAddr) -> Result<Self, WireError> {
        debug!(addr = %addr, "Opening relay stream");
        let stream = TcpStream::connect(addr).await?;
        let (reader, mut writer) = stream.into_split();
        write_frame(&mut writer, &Frame::Call(Call::Connect)).await?;
        Ok(Self { reader, writer })
    }

    /// Send one event to the relay.
    pub async fn send(&mut self, event: Event) -> Result<(), WireError> {
        write_frame(&mut self.writer, &Frame::Event(event)).await
    }

    /// Receive the next event. `None` once the relay closes the stream.
    pub async fn recv(&mut self) -> Result<Option<Event>, WireError> {
        match read_frame(&mut self.reader).await {
            Ok(Frame::Event(event)) => Ok(Some(event)),
            Ok(Frame::Error { code, message }) => Err(WireError::Protocol(format!(
                "Remote error {code}: {message}"
            ))),
            Ok(other) => Err(WireError::Protocol(format!(
                "Unexpected frame on stream: {other:?}"
            ))),
            Err(WireError::ConnectionClosed) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Half-close: tell the relay no more events are coming.
    pub async fn close_send(&mut self) -> Result<(), WireError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Open a unary call and read its single response frame.
async fn unary(addr: SocketAddr, call: Call) -> Result<Frame, WireError> {
    let stream = TcpStream::connect(addr).await?;
    let (mut reader, mut writer) = stream.into_split();
    write_frame(&mut writer, &Frame::Call(call)).await?;
    match read_frame(&mut reader).await? {
        Frame::Error { code, message } => Err(WireError::Protocol(format!(
            "Remote error {code}: {message}"
        ))),
        frame => Ok(frame),
    }
}

/// Register `subscriber` to receive future requests.
pub async fn subscribe(addr: SocketAddr, subscriber: PluginMessage) -> Result<(), WireError> {
    match unary(addr, Call::Requests { subscriber }).await? {
        Frame::Ack => Ok(()),
        other => Err(WireError::Protocol(format!(
            "Expected ack, got {other:?}"
        ))),
    }
}

/// Fetch the relay's discovery mapping (`name`, `identifier`).
pub async fn describe(addr: SocketAddr) -> Result<HashMap<String, String>, WireError> {
    match unary(addr, Call::Describe).await? {
        Frame::Registration { name, identifier } => {
            Ok(register(&PluginInfo { name, identifier }))
        }
        other => Err(WireError::Protocol(format!(
            "Expected registration, got {other:?}"
        ))),
    }
}
