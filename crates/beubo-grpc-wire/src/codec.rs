//! Envelope codec: plugin messages to typed values and back.
//!
//! Payloads are MessagePack with named fields. Field order follows the
//! struct definition and `content` is a sorted map, so encoding is
//! deterministic.

use beubo_grpc_types::envelope::TypedValue;
use beubo_grpc_types::error::{CodecError, CodecResult};
use beubo_grpc_types::message::{PluginMessage, PLUGIN_MESSAGE_TYPE};
use serde::Deserialize;

/// Result of decoding a typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The entry was a plugin message.
    Plugin(PluginMessage),
    /// The entry's type is not known here; the payload stays opaque.
    Unrecognized(String),
}

/// Encode a plugin message as a typed value.
pub fn encode(message: &PluginMessage) -> CodecResult<TypedValue> {
    if !message.has_identifier() {
        return Err(CodecError::Serialization(format!(
            "message '{}' has no identifier",
            message.name
        )));
    }
    let bytes = rmp_serde::to_vec_named(message)
        .map_err(|e| CodecError::Serialization(e.to_string()))?;
    Ok(TypedValue::new(PLUGIN_MESSAGE_TYPE, bytes))
}

/// Decode a typed value.
///
/// Unknown type identifiers yield [`Decoded::Unrecognized`]; only malformed
/// bytes for a known type are an error. Bytes left over after the message
/// count as malformed.
pub fn decode(value: &TypedValue) -> CodecResult<Decoded> {
    if value.type_url != PLUGIN_MESSAGE_TYPE {
        return Ok(Decoded::Unrecognized(value.type_url.clone()));
    }
    let malformed = |reason: String| CodecError::Deserialization {
        type_url: value.type_url.clone(),
        reason,
    };

    let mut rest: &[u8] = &value.value;
    let mut de = rmp_serde::Deserializer::new(&mut rest);
    let message = PluginMessage::deserialize(&mut de).map_err(|e| malformed(e.to_string()))?;
    drop(de);
    if !rest.is_empty() {
        return Err(malformed(format!("{} trailing bytes", rest.len())));
    }
    Ok(Decoded::Plugin(message))
}
