//! Event envelopes exchanged on a relay stream.
//!
//! An [`Event`] carries a free-text channel key and an ordered list of
//! [`TypedValue`] entries. Each entry names its own type, so a receiver can
//! decide per entry whether it knows how to decode the bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Serde helper for `Vec<u8>` as a base64 string.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as standard base64.
    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    /// Deserialize standard base64 into bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// The two outbound logical channels multiplexed on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Requests produced by the host for plugins.
    Request,
    /// Responses produced by the host for plugins.
    Response,
}

impl Channel {
    /// Both channels, in a fixed order.
    pub const ALL: [Channel; 2] = [Channel::Request, Channel::Response];

    /// The envelope key used for this channel.
    pub fn key(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A type identifier paired with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    /// Namespaced type name, e.g. `beubo.PluginMessage`.
    pub type_url: String,
    /// Encoded payload.
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

impl TypedValue {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            type_url: type_url.into(),
            value,
        }
    }
}

/// Wire-level envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Channel label such as `request` or `response`.
    pub key: String,
    /// Optional free-text annotation.
    #[serde(default)]
    pub data: String,
    /// Typed entries, in order.
    #[serde(default)]
    pub values: Vec<TypedValue>,
}

impl Event {
    /// An event with the given key and no entries.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: String::new(),
            values: Vec::new(),
        }
    }

    /// An outbound event carrying a single entry on `channel`.
    pub fn single(channel: Channel, value: TypedValue) -> Self {
        Self {
            key: channel.key().to_string(),
            data: String::new(),
            values: vec![value],
        }
    }

    /// Append an entry.
    pub fn with_value(mut self, value: TypedValue) -> Self {
        self.values.push(value);
        self
    }
}
