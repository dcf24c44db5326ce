//! Beubo gRPC relay — streaming event transport between Beubo and plugins.
//!
//! A plugin process listens on TCP. The host opens one long-lived stream on
//! which the plugin forwards two internally queued message channels
//! (`request`, `response`) as typed events, while concurrently decoding the
//! events the host sends back.
//!
//! ## Architecture
//!
//! - **codec**: plugin message <-> typed value
//! - **ChannelRouter**: the request and response outbound queues
//! - **StreamSession**: supervised forwarders plus the receive loop
//! - **SubscriberRegistry**: records `requests` subscription calls
//! - **RelayServer**: TCP listener dispatching connections by opening call

pub mod client;
pub mod codec;
pub mod frame;
pub mod queue;
pub mod router;
pub mod server;
pub mod session;
pub mod sink;
pub mod subscription;
pub mod supervisor;

pub use frame::{Call, Frame, WireError};
pub use router::ChannelRouter;
pub use server::{RelayServer, RelayStatus};
pub use session::{InboundHandler, LoggingHandler, SessionError, SessionHandle, StreamSession};
pub use subscription::SubscriberRegistry;
