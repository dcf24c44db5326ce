//! The plugin message relayed between Beubo and its plugins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fully qualified type name of [`PluginMessage`] on the wire.
pub const PLUGIN_MESSAGE_TYPE: &str = "beubo.PluginMessage";

/// A named, identified payload.
///
/// `content` is an ordered map so two equal messages always encode to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginMessage {
    /// Human-readable name.
    pub name: String,
    /// Identifier of the plugin or message source. Not globally unique.
    pub identifier: String,
    /// Arbitrary structured content.
    #[serde(default)]
    pub content: BTreeMap<String, serde_json::Value>,
}

impl PluginMessage {
    /// Create a message with empty content.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            content: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a content field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.content.insert(key.into(), value);
        self
    }

    /// Whether the message carries the identifier required for delivery.
    pub fn has_identifier(&self) -> bool {
        !self.identifier.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let msg = PluginMessage::new("page", "beubo_pages")
            .with_field("path", json!("/about"))
            .with_field("status", json!(200));
        assert_eq!(msg.content.len(), 2);
        assert_eq!(msg.content["status"], json!(200));
        assert!(msg.has_identifier());
    }

    #[test]
    fn test_blank_identifier() {
        assert!(!PluginMessage::new("x", "  ").has_identifier());
        assert!(!PluginMessage::default().has_identifier());
    }

    #[test]
    fn test_content_defaults_when_missing() {
        let msg: PluginMessage =
            serde_json::from_str(r#"{"name":"a","identifier":"b"}"#).unwrap();
        assert!(msg.content.is_empty());
    }
}
