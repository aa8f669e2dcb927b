//! `ClientRequest`: messages a client sends on the shell or control channel
//! (§3, §4.B, §6).

use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CodeBlock, Restart, Tagged, TargetName};
use crate::error::ProtocolError;

/// Flags that accompany an `execute_request`, besides the code itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Execute as quietly as possible: suppress the reply and outputs.
    #[serde(default)]
    pub silent: bool,
    /// Whether to increment the execution counter and populate history.
    #[serde(default = "default_true")]
    pub store_history: bool,
    /// Whether the kernel may prompt for stdin via `input_request`.
    #[serde(default = "default_true")]
    pub allow_stdin: bool,
    /// Whether to abort queued requests if this one raises.
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            silent: false,
            store_history: true,
            allow_stdin: true,
            stop_on_error: true,
        }
    }
}

/// The `0` (low) or `1` (high) verbosity level of an `inspect_request`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailLevel {
    /// `x?` in IPython: basic info.
    Low,
    /// `x??` in IPython: more detail, e.g. source.
    High,
}

impl Serialize for DetailLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(match self {
            DetailLevel::Low => 0,
            DetailLevel::High => 1,
        })
    }
}

impl<'de> Deserialize<'de> for DetailLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(DetailLevel::Low),
            1 => Ok(DetailLevel::High),
            other => Err(DeError::custom(format!("invalid detail_level: {other}"))),
        }
    }
}

/// Which slice of history a `history_request` selects, and the fields that
/// go with that selection (§4.B: flattened under `hist_access_type`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HistoryAccessType {
    /// A contiguous range of lines from a given session.
    Range {
        /// Session number; `-1` means the current session, `0` means all.
        session: i64,
        /// First line number, inclusive.
        start: i64,
        /// Last line number, exclusive.
        stop: i64,
    },
    /// The most recent `n` lines across all sessions.
    Tail {
        /// Number of lines to return.
        n: i64,
    },
    /// Lines matching a glob-style pattern.
    Search {
        /// The glob pattern to match against input.
        pattern: String,
        /// Only return the first occurrence of each repeated input.
        unique: bool,
        /// Cap on the number of results, if any.
        n: Option<i64>,
    },
}

/// Body of a `history_request`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Whether to include execution outputs, not just inputs.
    pub output: bool,
    /// Whether to return un-transformed source instead of translated code.
    pub raw: bool,
    /// Which lines to select.
    pub access: HistoryAccessType,
}

impl Serialize for HistoryOptions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("output", &self.output)?;
        map.serialize_entry("raw", &self.raw)?;
        match &self.access {
            HistoryAccessType::Range { session, start, stop } => {
                map.serialize_entry("hist_access_type", "range")?;
                map.serialize_entry("session", session)?;
                map.serialize_entry("start", start)?;
                map.serialize_entry("stop", stop)?;
            }
            HistoryAccessType::Tail { n } => {
                map.serialize_entry("hist_access_type", "tail")?;
                map.serialize_entry("n", n)?;
            }
            HistoryAccessType::Search { pattern, unique, n } => {
                map.serialize_entry("hist_access_type", "search")?;
                map.serialize_entry("pattern", pattern)?;
                map.serialize_entry("unique", unique)?;
                map.serialize_entry("n", n)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HistoryOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            output: bool,
            #[serde(default)]
            raw: bool,
            hist_access_type: String,
            #[serde(default)]
            session: i64,
            #[serde(default)]
            start: i64,
            #[serde(default)]
            stop: i64,
            #[serde(default)]
            n: Option<i64>,
            #[serde(default)]
            pattern: String,
            #[serde(default)]
            unique: bool,
        }

        let wire = Wire::deserialize(deserializer)?;
        let access = match wire.hist_access_type.as_str() {
            "range" => HistoryAccessType::Range {
                session: wire.session,
                start: wire.start,
                stop: wire.stop,
            },
            "tail" => HistoryAccessType::Tail {
                n: wire.n.unwrap_or_default(),
            },
            "search" => HistoryAccessType::Search {
                pattern: wire.pattern,
                unique: wire.unique,
                n: wire.n,
            },
            other => return Err(DeError::custom(format!("invalid hist_access_type: {other}"))),
        };
        Ok(HistoryOptions {
            output: wire.output,
            raw: wire.raw,
            access,
        })
    }
}

/// A request a client sends on the shell or control channel (§3).
#[derive(Clone, Debug, PartialEq)]
pub enum ClientRequest {
    /// Execute a block of code.
    ExecuteRequest(CodeBlock, ExecuteOptions),
    /// Request introspection of code at a cursor position.
    InspectRequest(CodeBlock, u32, DetailLevel),
    /// Request a slice of execution history.
    HistoryRequest(HistoryOptions),
    /// Request completions at a cursor position.
    CompleteRequest(CodeBlock, u32),
    /// Ask whether a code block is a complete statement.
    IsCompleteRequest(CodeBlock),
    /// Ask the kernel for its connection info (deprecated, ZeroMQ-only).
    ConnectRequest,
    /// Ask about currently open comms, optionally filtered by target.
    CommInfoRequest(Option<TargetName>),
    /// Ask the kernel to describe itself.
    KernelInfoRequest,
    /// Ask the kernel to shut down, possibly to restart.
    ShutdownRequest(Restart),
}

impl Tagged for ClientRequest {
    fn msg_type(&self) -> &'static str {
        match self {
            ClientRequest::ExecuteRequest(..) => "execute_request",
            ClientRequest::InspectRequest(..) => "inspect_request",
            ClientRequest::HistoryRequest(..) => "history_request",
            ClientRequest::CompleteRequest(..) => "complete_request",
            ClientRequest::IsCompleteRequest(..) => "is_complete_request",
            ClientRequest::ConnectRequest => "connect_request",
            ClientRequest::CommInfoRequest(..) => "comm_info_request",
            ClientRequest::KernelInfoRequest => "kernel_info_request",
            ClientRequest::ShutdownRequest(..) => "shutdown_request",
        }
    }
}

impl ClientRequest {
    /// Encode this request's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            ClientRequest::ExecuteRequest(code, opts) => serde_json::json!({
                "code": code,
                "silent": opts.silent,
                "store_history": opts.store_history,
                "user_expressions": {},
                "allow_stdin": opts.allow_stdin,
                "stop_on_error": opts.stop_on_error,
            }),
            ClientRequest::InspectRequest(code, pos, level) => serde_json::json!({
                "code": code,
                "cursor_pos": pos,
                "detail_level": level,
            }),
            ClientRequest::HistoryRequest(opts) => serde_json::to_value(opts).expect("HistoryOptions serialization"),
            ClientRequest::CompleteRequest(code, pos) => serde_json::json!({
                "code": code,
                "cursor_pos": pos,
            }),
            ClientRequest::IsCompleteRequest(code) => serde_json::json!({ "code": code }),
            ClientRequest::ConnectRequest => serde_json::json!({}),
            ClientRequest::CommInfoRequest(target) => match target {
                Some(target) => serde_json::json!({ "target_name": target }),
                None => serde_json::json!({}),
            },
            ClientRequest::KernelInfoRequest => serde_json::json!({}),
            ClientRequest::ShutdownRequest(restart) => serde_json::json!({ "restart": restart }),
        }
    }

    /// Decode a request's `content` body, given the header's `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "execute_request" => {
                #[derive(Deserialize)]
                struct Wire {
                    code: String,
                    #[serde(flatten)]
                    opts: ExecuteOptions,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::ExecuteRequest(wire.code, wire.opts)
            }
            "inspect_request" => {
                #[derive(Deserialize)]
                struct Wire {
                    code: String,
                    cursor_pos: u32,
                    detail_level: DetailLevel,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::InspectRequest(wire.code, wire.cursor_pos, wire.detail_level)
            }
            "history_request" => {
                let opts: HistoryOptions = serde_json::from_value(content).map_err(err)?;
                ClientRequest::HistoryRequest(opts)
            }
            "complete_request" => {
                #[derive(Deserialize)]
                struct Wire {
                    code: String,
                    cursor_pos: u32,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::CompleteRequest(wire.code, wire.cursor_pos)
            }
            "is_complete_request" => {
                #[derive(Deserialize)]
                struct Wire {
                    code: String,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::IsCompleteRequest(wire.code)
            }
            "connect_request" => ClientRequest::ConnectRequest,
            "comm_info_request" => {
                #[derive(Deserialize, Default)]
                struct Wire {
                    #[serde(default)]
                    target_name: Option<String>,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::CommInfoRequest(wire.target_name)
            }
            "kernel_info_request" => ClientRequest::KernelInfoRequest,
            "shutdown_request" => {
                #[derive(Deserialize)]
                struct Wire {
                    restart: bool,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                ClientRequest::ShutdownRequest(wire.restart)
            }
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }

    /// The `_reply` tag this request pairs with (§3, §6).
    pub fn reply_msg_type(&self) -> String {
        format!("{}_reply", self.msg_type().trim_end_matches("_request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_range_encodes_flattened_fields() {
        let req = ClientRequest::HistoryRequest(HistoryOptions {
            output: true,
            raw: true,
            access: HistoryAccessType::Range {
                session: -1,
                start: 10,
                stop: 100,
            },
        });
        let json = req.encode();
        assert_eq!(json["hist_access_type"], "range");
        assert_eq!(json["session"], -1);
        assert_eq!(json["start"], 10);
        assert_eq!(json["stop"], 100);
        assert_eq!(json["output"], true);
        assert_eq!(json["raw"], true);
    }

    #[test]
    fn execute_request_always_emits_empty_user_expressions() {
        let req = ClientRequest::ExecuteRequest("1+1".into(), ExecuteOptions::default());
        let json = req.encode();
        assert_eq!(json["user_expressions"], serde_json::json!({}));
    }

    #[test]
    fn round_trips_every_variant() {
        let cases = vec![
            ClientRequest::ExecuteRequest("print(1)".into(), ExecuteOptions::default()),
            ClientRequest::InspectRequest("foo".into(), 3, DetailLevel::High),
            ClientRequest::HistoryRequest(HistoryOptions {
                output: false,
                raw: false,
                access: HistoryAccessType::Tail { n: 5 },
            }),
            ClientRequest::CompleteRequest("fo".into(), 2),
            ClientRequest::IsCompleteRequest("if True:".into()),
            ClientRequest::ConnectRequest,
            ClientRequest::CommInfoRequest(Some("jupyter.widget".into())),
            ClientRequest::CommInfoRequest(None),
            ClientRequest::KernelInfoRequest,
            ClientRequest::ShutdownRequest(true),
        ];
        for case in cases {
            let tag = case.msg_type();
            let encoded = case.encode();
            let decoded = ClientRequest::decode(tag, encoded).unwrap();
            assert_eq!(decoded, case);
        }
    }

    #[test]
    fn reply_msg_type_pairs_with_request() {
        assert_eq!(ClientRequest::KernelInfoRequest.reply_msg_type(), "kernel_info_reply");
        assert_eq!(
            ClientRequest::ExecuteRequest(String::new(), ExecuteOptions::default()).reply_msg_type(),
            "execute_reply"
        );
    }
}
