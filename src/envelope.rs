//! Wire envelope & signing (§4.C): frame layout, the `<IDS|MSG>` delimiter,
//! and HMAC-SHA-256 signing/verification.
//!
//! A message on the wire is:
//!
//! ```text
//! <id1> <id2> … <idN> "<IDS|MSG>" <sig> <header> <parent_header> <metadata> <content> [<buf1> …]
//! ```
//!
//! Frames before the delimiter are ZeroMQ routing identities; everything
//! from the signature onward is the signed body.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use zeromq::ZmqMessage;

use crate::error::ProtocolError;
use crate::header::MessageHeader;
use crate::message::Payload;

/// The literal delimiter frame separating routing identities from the
/// signed message body.
pub const DELIMITER: &[u8] = b"<IDS|MSG>";

/// A fully-decoded message, still carrying its routing identities and an
/// un-typed `content` body. The dispatch layer further decodes `content`
/// into a specific payload family once it knows which one to try.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// ZeroMQ routing identity frames, preceding the delimiter.
    pub identities: Vec<Bytes>,
    /// This message's own header.
    pub header: MessageHeader,
    /// The header of the message this one is replying to or was caused by,
    /// if any.
    pub parent_header: Option<MessageHeader>,
    /// Free-form metadata; this crate does not interpret it.
    pub metadata: Map<String, Value>,
    /// The `msg_type`-specific body.
    pub content: Value,
    /// Binary buffers trailing the content frame (large data extensions).
    pub buffers: Vec<Bytes>,
}

impl Envelope {
    /// Build an envelope wrapping `payload`, with the given header/parent.
    pub fn new<T: Payload>(payload: &T, header: MessageHeader, parent_header: Option<MessageHeader>) -> Self {
        Envelope {
            identities: Vec::new(),
            header,
            parent_header,
            metadata: Map::new(),
            content: payload.encode_content(),
            buffers: Vec::new(),
        }
    }

    /// Attach ZeroMQ routing identities (used on the reply path, so a
    /// ROUTER socket sends back to the originating peer).
    pub fn with_identities(mut self, identities: Vec<Bytes>) -> Self {
        self.identities = identities;
        self
    }
}

/// Compute the lowercase-hex HMAC-SHA-256 signature over the four signed
/// frames. Returns the empty string if `key` is empty, meaning "unsigned".
fn sign(key: &[u8], header: &[u8], parent_header: &[u8], metadata: &[u8], content: &[u8]) -> String {
    if key.is_empty() {
        return String::new();
    }
    let mut mac = new_mac(key);
    mac.update(header);
    mac.update(parent_header);
    mac.update(metadata);
    mac.update(content);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature over the four signed frames in constant time. Always
/// succeeds if `key` is empty.
fn verify(key: &[u8], header: &[u8], parent_header: &[u8], metadata: &[u8], content: &[u8], signature: &str) -> bool {
    if key.is_empty() {
        return true;
    }
    let Ok(signature) = hex::decode(signature) else {
        return false;
    };
    let mut mac = new_mac(key);
    mac.update(header);
    mac.update(parent_header);
    mac.update(metadata);
    mac.update(content);
    mac.verify_slice(&signature).is_ok()
}

fn new_mac(key: &[u8]) -> Hmac<Sha256> {
    Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts a key of any length")
}

/// Encode an envelope into its wire frames, signing the body with `key`.
pub fn encode_frames(envelope: &Envelope, key: &[u8]) -> Result<Vec<Bytes>, ProtocolError> {
    let to_json = |value: &dyn erased_serde_json::Encodable, what: &str| -> Result<Bytes, ProtocolError> {
        value
            .to_json_bytes()
            .map(Bytes::from)
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("encoding {what}: {e}")))
    };

    let header = to_json(&envelope.header, "header")?;
    let parent_header = to_json(&envelope.parent_header, "parent_header")?;
    let metadata = to_json(&envelope.metadata, "metadata")?;
    let content = to_json(&envelope.content, "content")?;

    let signature = sign(key, &header, &parent_header, &metadata, &content);

    let mut frames = Vec::with_capacity(envelope.identities.len() + 5 + envelope.buffers.len());
    frames.extend(envelope.identities.iter().cloned());
    frames.push(Bytes::from_static(DELIMITER));
    frames.push(Bytes::from(signature));
    frames.push(header);
    frames.push(parent_header);
    frames.push(metadata);
    frames.push(content);
    frames.extend(envelope.buffers.iter().cloned());
    Ok(frames)
}

/// Pack encoded frames into the `ZmqMessage` envelope-layer sockets send,
/// mirroring the teacher's `to_zmq_payload` helper in `driver_zeromq.rs`.
pub fn into_zmq_message(frames: Vec<Bytes>) -> Result<ZmqMessage, ProtocolError> {
    ZmqMessage::try_from(frames).map_err(|_| ProtocolError::MalformedEnvelope("empty frame list".to_string()))
}

/// Decode wire frames into an envelope, verifying the signature against
/// `key`. An empty `key` disables verification (§4.C).
pub fn decode_frames(frames: Vec<Bytes>, key: &[u8]) -> Result<Envelope, ProtocolError> {
    let delim_idx = frames
        .iter()
        .position(|frame| frame.as_ref() == DELIMITER)
        .ok_or_else(|| ProtocolError::MalformedEnvelope("missing <IDS|MSG> delimiter".to_string()))?;

    let identities = frames[..delim_idx].to_vec();
    let body = &frames[delim_idx + 1..];
    if body.len() < 5 {
        return Err(ProtocolError::MalformedEnvelope(format!(
            "expected at least 5 frames after delimiter, got {}",
            body.len()
        )));
    }

    let signature = std::str::from_utf8(&body[0])
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("signature frame not utf8: {e}")))?;
    let header_frame = &body[1];
    let parent_frame = &body[2];
    let metadata_frame = &body[3];
    let content_frame = &body[4];
    let buffers = body[5..].to_vec();

    if !verify(key, header_frame, parent_frame, metadata_frame, content_frame, signature) {
        return Err(ProtocolError::BadSignature);
    }

    let header: MessageHeader = serde_json::from_slice(header_frame)
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("header: {e}")))?;
    let parent_header: Option<MessageHeader> = serde_json::from_slice(parent_frame)
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("parent_header: {e}")))?;
    let metadata: Map<String, Value> = serde_json::from_slice(metadata_frame)
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("metadata: {e}")))?;
    let content: Value = serde_json::from_slice(content_frame)
        .map_err(|e| ProtocolError::MalformedEnvelope(format!("content: {e}")))?;

    Ok(Envelope {
        identities,
        header,
        parent_header,
        metadata,
        content,
        buffers,
    })
}

/// Minimal local substitute for a hypothetical `erased-serde` dependency:
/// lets [`encode_frames`] treat `MessageHeader`, `Option<MessageHeader>`,
/// `Map<String, Value>`, and `Value` uniformly without pulling in another
/// crate just for four call sites.
mod erased_serde_json {
    use serde::Serialize;

    pub trait Encodable {
        fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>>;
    }

    impl<T: Serialize> Encodable for T {
        fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
            serde_json::to_vec(self)
        }
    }
}
