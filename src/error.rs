//! Error taxonomy for the wire protocol and dispatch engines.

use thiserror::Error;

/// Errors raised while parsing or verifying the wire envelope (§4.C).
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame list had no `<IDS|MSG>` delimiter, or too few frames after it.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The HMAC signature did not match the recomputed one.
    #[error("signature mismatch")]
    BadSignature,

    /// The JSON body did not decode into the type implied by `msg_type`.
    #[error("could not decode {msg_type} body: {detail}")]
    DecodeError {
        /// The `msg_type` the header declared.
        msg_type: String,
        /// Underlying decode failure.
        detail: String,
    },

    /// `msg_type` was not a member of the closed set in §6.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

/// Top-level error type returned by this crate's public API.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket bind/connect/send/recv failure. Fatal to the owning worker.
    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    /// A malformed or unverifiable frame was encountered.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A user-supplied handler returned an error.
    #[error("handler error: {0}")]
    Handler(Box<dyn std::error::Error + Send + Sync>),

    /// A `sendKernelRequest`/`sendClientRequest` waiter observed shutdown
    /// before a reply arrived.
    #[error("operation cancelled")]
    Cancelled,

    /// The dispatch engine's peer disconnected (channel closed).
    #[error("disconnected from peer")]
    Disconnected,

    /// Failure reading or writing a connection file.
    #[error("connection file error: {0}")]
    ConnectionFile(String),

    /// A `signature_scheme` other than `hmac-sha256` was requested.
    #[error("unsupported signature scheme: {0}")]
    UnsupportedSignatureScheme(String),

    /// I/O failure unrelated to the ZeroMQ transport (e.g. reading a file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure serializing or deserializing a connection file / JSON body.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
