//! Deliverable sinks for outbound events.
//!
//! Forwarding loops write through [`EventSink`] so they do not care what sits
//! behind it: a framed stream today, possibly one sink per subscriber later.

use crate::frame::{encode_frame, Frame, WireError};
use async_trait::async_trait;
use beubo_grpc_types::envelope::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Something outbound events can be delivered to.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Deliver one event.
    ///
    /// Errors for which [`WireError::is_unencodable`] holds concern only this
    /// event; the sink stays usable.
    async fn send(&self, event: Event) -> Result<(), WireError>;

    /// Whether the sink can never deliver again.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Writes events as frames on a byte stream.
///
/// Several forwarding loops share one writer; the mutex keeps frames whole.
/// The first failed write closes the sink for good.
pub struct FrameSink<W> {
    writer: Mutex<W>,
    closed: AtomicBool,
}

impl<W> FrameSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<W> EventSink for FrameSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, event: Event) -> Result<(), WireError> {
        if self.is_closed() {
            return Err(WireError::ConnectionClosed);
        }
        let bytes = encode_frame(&Frame::Event(event))?;

        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(&bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{read_frame, MAX_FRAME_SIZE};
    use beubo_grpc_types::envelope::{Channel, TypedValue};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_sends_keep_frames_whole() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let sink = Arc::new(FrameSink::new(writer));

        let mut tasks = Vec::new();
        for channel in Channel::ALL {
            let sink = Arc::clone(&sink);
            tasks.push(tokio::spawn(async move {
                for i in 0..20u8 {
                    let event = Event::single(channel, TypedValue::new("t", vec![i; 50]));
                    sink.send(event).await.unwrap();
                }
            }));
        }

        let mut counts = [0usize; 2];
        for _ in 0..40 {
            match read_frame(&mut reader).await.unwrap() {
                Frame::Event(e) if e.key == "request" => counts[0] += 1,
                Frame::Event(e) if e.key == "response" => counts[1] += 1,
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(counts, [20, 20]);
        for t in tasks {
            t.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_send_fails_when_reader_gone() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let sink = FrameSink::new(writer);
        assert!(!sink.is_closed());

        let result = sink
            .send(Event::single(Channel::Request, TypedValue::new("t", vec![])))
            .await;
        assert!(matches!(result, Err(WireError::Io(_))));
        assert!(sink.is_closed());

        let again = sink
            .send(Event::single(Channel::Request, TypedValue::new("t", vec![])))
            .await;
        assert!(matches!(again, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_event_leaves_sink_open() {
        let (writer, mut reader) = tokio::io::duplex(1024);
        let sink = FrameSink::new(writer);

        let huge = TypedValue::new("t", vec![0u8; MAX_FRAME_SIZE as usize]);
        let err = sink.send(Event::single(Channel::Request, huge)).await.unwrap_err();
        assert!(err.is_unencodable());
        assert!(!sink.is_closed());

        sink.send(Event::single(Channel::Request, TypedValue::new("t", vec![1])))
            .await
            .unwrap();
        let Frame::Event(event) = read_frame(&mut reader).await.unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(event.values[0].value, vec![1]);
    }
}
