//! Wire framing.
//!
//! Every frame is a 4-byte big-endian length header followed by a JSON body.
//! A connection opens with a [`Frame::Call`] that selects what the rest of
//! the connection carries.

use beubo_grpc_types::envelope::Event;
use beubo_grpc_types::message::PluginMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum single frame size (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Errors from the framing and transport layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
}

impl WireError {
    /// True for errors raised while building an outbound frame. No byte has
    /// reached the stream, so the stream is still usable.
    pub fn is_unencodable(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::Json(_))
    }
}

/// The call a connection opens with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Call {
    /// Open a bidirectional event stream.
    #[serde(rename = "connect")]
    Connect,
    /// Register the sender to receive future requests.
    #[serde(rename = "requests")]
    Requests { subscriber: PluginMessage },
    /// Ask for the plugin's discovery metadata.
    #[serde(rename = "describe")]
    Describe,
}

/// A single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Opening frame of a connection.
    #[serde(rename = "call")]
    Call(Call),
    /// An event on an open stream.
    #[serde(rename = "event")]
    Event(Event),
    /// Empty success response to a unary call.
    #[serde(rename = "ack")]
    Ack,
    /// Response to [`Call::Describe`].
    #[serde(rename = "registration")]
    Registration { name: String, identifier: String },
    /// Error response.
    #[serde(rename = "error")]
    Error { code: i32, message: String },
}

/// Encode a frame to bytes (4-byte big-endian length + JSON).
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    let json = serde_json::to_vec(frame)?;
    let len = u32::try_from(json.len()).unwrap_or(u32::MAX);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut bytes = Vec::with_capacity(4 + json.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

/// Decode the length prefix from a 4-byte header.
pub fn decode_length(header: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*header)
}

/// Parse a JSON body into a frame.
pub fn decode_frame(body: &[u8]) -> Result<Frame, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame.
///
/// A clean end of stream before a header byte arrives is reported as
/// [`WireError::ConnectionClosed`]; an end of stream inside a frame is an
/// I/O error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; 4];
    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Err(WireError::ConnectionClosed);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = decode_length(&header);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    Ok(decode_frame(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beubo_grpc_types::envelope::{Channel, TypedValue};

    #[test]
    fn test_encode_length_prefix() {
        let bytes = encode_frame(&Frame::Ack).unwrap();
        let len = decode_length(&[bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len() - 4);
        assert_eq!(decode_frame(&bytes[4..]).unwrap(), Frame::Ack);
    }

    #[test]
    fn test_call_json_shape() {
        let frame = Frame::Call(Call::Requests {
            subscriber: PluginMessage::new("Pages", "beubo_pages"),
        });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"call""#));
        assert!(json.contains(r#""method":"requests""#));
        assert!(json.contains("beubo_pages"));
        assert_eq!(serde_json::from_str::<Frame>(&json).unwrap(), frame);
    }

    #[test]
    fn test_event_json_shape() {
        let frame = Frame::Event(Event::single(
            Channel::Response,
            TypedValue::new("beubo.PluginMessage", vec![1, 2, 3]),
        ));
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""key":"response""#));
        assert!(json.contains(r#""type_url":"beubo.PluginMessage""#));
    }

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, &Frame::Call(Call::Connect)).await.unwrap();
        write_frame(&mut a, &Frame::Ack).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), Frame::Call(Call::Connect));
        assert_eq!(read_frame(&mut b).await.unwrap(), Frame::Ack);
        assert!(matches!(
            read_frame(&mut b).await,
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_eof_inside_frame_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let bytes = encode_frame(&Frame::Ack).unwrap();
        a.write_all(&bytes[..bytes.len() - 2]).await.unwrap();
        drop(a);
        assert!(matches!(read_frame(&mut b).await, Err(WireError::Io(_))));
    }

    #[tokio::test]
    async fn test_oversized_header_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&(MAX_FRAME_SIZE + 1).to_be_bytes()).await.unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(WireError::FrameTooLarge { .. })
        ));
    }
}
