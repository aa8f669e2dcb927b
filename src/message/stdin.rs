//! `KernelRequest`/`ClientReply`: the stdin round-trip a kernel uses to
//! prompt a client for input (§3, §4.B, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Tagged;
use crate::error::ProtocolError;

/// Flags accompanying an `input_request`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputOptions {
    /// The prompt text to show the user.
    pub prompt: String,
    /// Whether input should be masked, as for a password.
    #[serde(default)]
    pub password: bool,
}

/// A request the kernel sends to the client over stdin (§3).
#[derive(Clone, Debug, PartialEq)]
pub enum KernelRequest {
    /// Prompt the user for a line of input.
    InputRequest(InputOptions),
}

impl Tagged for KernelRequest {
    fn msg_type(&self) -> &'static str {
        match self {
            KernelRequest::InputRequest(_) => "input_request",
        }
    }
}

impl KernelRequest {
    /// Encode this request's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            KernelRequest::InputRequest(opts) => serde_json::to_value(opts).expect("InputOptions serialization"),
        }
    }

    /// Decode a request's `content` body, given the header's `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "input_request" => {
                let opts: InputOptions = serde_json::from_value(content).map_err(err)?;
                KernelRequest::InputRequest(opts)
            }
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }
}

/// A client's reply to a `KernelRequest`, sent back over stdin (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientReply {
    /// The text the user entered, in answer to an `input_request`.
    InputReply(String),
}

impl Tagged for ClientReply {
    fn msg_type(&self) -> &'static str {
        match self {
            ClientReply::InputReply(_) => "input_reply",
        }
    }
}

impl ClientReply {
    /// Encode this reply's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            ClientReply::InputReply(value) => serde_json::json!({ "value": value }),
        }
    }

    /// Decode a reply's `content` body, given the header's `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "input_reply" => {
                #[derive(Deserialize)]
                struct Wire {
                    value: String,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientReply::InputReply(wire.value)
            }
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }
}
