//! Rich display data (§3): a closed set of MIME types, each carrying an
//! encoded payload and optional per-mime metadata, emitted on the wire as
//! two sibling `data`/`metadata` maps (§4.B).

use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of MIME types this protocol knows how to carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MimeType {
    /// `text/plain`
    TextPlain,
    /// `text/html`
    TextHtml,
    /// `image/png`, with optional display dimensions.
    ImagePng {
        /// Width in pixels, if the producer specified one.
        width: Option<u32>,
        /// Height in pixels, if the producer specified one.
        height: Option<u32>,
    },
    /// `image/jpeg`, with optional display dimensions.
    ImageJpeg {
        /// Width in pixels, if the producer specified one.
        width: Option<u32>,
        /// Height in pixels, if the producer specified one.
        height: Option<u32>,
    },
    /// `image/svg+xml`
    ImageSvgXml,
    /// `text/latex`
    TextLatex,
    /// `application/javascript`
    ApplicationJavascript,
}

impl MimeType {
    /// The IANA media-type string used as the JSON key.
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::TextPlain => "text/plain",
            MimeType::TextHtml => "text/html",
            MimeType::ImagePng { .. } => "image/png",
            MimeType::ImageJpeg { .. } => "image/jpeg",
            MimeType::ImageSvgXml => "image/svg+xml",
            MimeType::TextLatex => "text/latex",
            MimeType::ApplicationJavascript => "application/javascript",
        }
    }

    fn metadata_value(&self) -> Option<Value> {
        let (width, height) = match self {
            MimeType::ImagePng { width, height } | MimeType::ImageJpeg { width, height } => {
                (*width, *height)
            }
            _ => return None,
        };
        if width.is_none() && height.is_none() {
            return None;
        }
        let mut map = Map::new();
        if let Some(width) = width {
            map.insert("width".to_string(), Value::from(width));
        }
        if let Some(height) = height {
            map.insert("height".to_string(), Value::from(height));
        }
        Some(Value::Object(map))
    }

    fn from_parts(mime: &str, metadata: Option<&Value>) -> Option<MimeType> {
        let dims = |metadata: Option<&Value>| -> (Option<u32>, Option<u32>) {
            let Some(Value::Object(map)) = metadata else {
                return (None, None);
            };
            let width = map.get("width").and_then(Value::as_u64).map(|w| w as u32);
            let height = map.get("height").and_then(Value::as_u64).map(|h| h as u32);
            (width, height)
        };
        Some(match mime {
            "text/plain" => MimeType::TextPlain,
            "text/html" => MimeType::TextHtml,
            "image/png" => {
                let (width, height) = dims(metadata);
                MimeType::ImagePng { width, height }
            }
            "image/jpeg" => {
                let (width, height) = dims(metadata);
                MimeType::ImageJpeg { width, height }
            }
            "image/svg+xml" => MimeType::ImageSvgXml,
            "text/latex" => MimeType::TextLatex,
            "application/javascript" => MimeType::ApplicationJavascript,
            _ => return None,
        })
    }
}

/// A single `(mimetype, encoded content)` pair within a [`DisplayData`]
/// bundle.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayDatum {
    /// Which MIME representation this is.
    pub mime: MimeType,
    /// The encoded content (text, base64 image bytes, etc).
    pub content: String,
}

/// A bundle of equivalent representations of one piece of rich output, keyed
/// by MIME type. Encodes as two sibling JSON fields, `data` and `metadata`
/// (§4.B), rather than as a single nested object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayData {
    /// The representations making up this bundle, in insertion order.
    pub entries: Vec<DisplayDatum>,
}

impl DisplayData {
    /// An empty bundle (used for the `found: false` case of `inspect_reply`).
    pub fn empty() -> Self {
        DisplayData::default()
    }

    /// Convenience constructor for a single `text/plain` representation.
    pub fn plain_text(text: impl Into<String>) -> Self {
        DisplayData {
            entries: vec![DisplayDatum {
                mime: MimeType::TextPlain,
                content: text.into(),
            }],
        }
    }
}

impl Serialize for DisplayData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut data = Map::new();
        let mut metadata = Map::new();
        for entry in &self.entries {
            data.insert(entry.mime.as_str().to_string(), Value::String(entry.content.clone()));
            if let Some(meta) = entry.mime.metadata_value() {
                metadata.insert(entry.mime.as_str().to_string(), meta);
            }
        }

        #[derive(Serialize)]
        struct Wire {
            data: Map<String, Value>,
            metadata: Map<String, Value>,
        }

        Wire { data, metadata }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DisplayData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            data: Map<String, Value>,
            #[serde(default)]
            metadata: Map<String, Value>,
        }

        let wire = Wire::deserialize(deserializer)?;
        let mut entries = Vec::with_capacity(wire.data.len());
        for (mime, content) in wire.data {
            let content = content
                .as_str()
                .ok_or_else(|| DeError::custom(format!("display data for {mime} was not a string")))?
                .to_string();
            let mime_type = MimeType::from_parts(&mime, wire.metadata.get(&mime))
                .ok_or_else(|| DeError::custom(format!("unsupported mime type: {mime}")))?;
            entries.push(DisplayDatum { mime: mime_type, content });
        }
        Ok(DisplayData { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_round_trips() {
        let display = DisplayData::plain_text("hello");
        let json = serde_json::to_value(&display).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": {"text/plain": "hello"}, "metadata": {}})
        );
        let decoded: DisplayData = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, display);
    }

    #[test]
    fn image_metadata_round_trips() {
        let display = DisplayData {
            entries: vec![DisplayDatum {
                mime: MimeType::ImagePng {
                    width: Some(640),
                    height: Some(480),
                },
                content: "base64==".to_string(),
            }],
        };
        let json = serde_json::to_value(&display).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {"image/png": "base64=="},
                "metadata": {"image/png": {"width": 640, "height": 480}},
            })
        );
        let decoded: DisplayData = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, display);
    }

    #[test]
    fn empty_bundle_round_trips() {
        let display = DisplayData::empty();
        let json = serde_json::to_value(&display).unwrap();
        assert_eq!(json, serde_json::json!({"data": {}, "metadata": {}}));
        let decoded: DisplayData = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, display);
    }
}
