//! Media descriptors attached to posts and comments.

use serde::{Deserialize, Serialize};

/// Reference to a stored media object. The engine never looks at the bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Opaque id assigned by the media store
    pub id: String,
    /// Type tag (`image`, `video`, ...)
    #[serde(rename = "type")]
    pub media_type: String,
    /// Where the media store serves it.
    pub url: String,
    /// Pixel width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Playback length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl MediaDescriptor {
    /// Encode a list for a JSON column, preserving order.
    #[must_use]
    pub fn list_to_json(media: &[Self]) -> serde_json::Value {
        serde_json::to_value(media).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }

    /// Decode a JSON column.
    #[must_use]
    pub fn list_from_json(value: &serde_json::Value) -> Vec<Self> {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}
