//! `KernelReply`: one variant per [`ClientRequest`](super::ClientRequest)
//! variant, paired 1:1 by message-type tag (§3, §4.B, §6).

use std::collections::BTreeMap;

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{DisplayData, ErrorInfo, OperationResult, Tagged, TargetName};
use crate::error::ProtocolError;

/// Extra fields on a successful `execute_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReplyOk {
    /// The execution counter, incremented on every request that stores
    /// history.
    pub execution_count: i64,
    /// Results of any `user_expressions`; always empty since this crate
    /// never populates `user_expressions` on the request (§4.B).
    #[serde(default)]
    pub user_expressions: BTreeMap<String, Value>,
}

/// Extra fields on a successful `inspect_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InspectReplyOk {
    /// Whether an object was found at the requested cursor position.
    pub found: bool,
    /// The display data describing the inspected object; empty when
    /// `found` is `false`.
    #[serde(flatten)]
    pub display: DisplayData,
}

/// Extra fields on a successful `complete_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompleteReplyOk {
    /// Candidate completions.
    pub matches: Vec<String>,
    /// Start offset of the text the completions would replace.
    pub cursor_start: u32,
    /// End offset of the text the completions would replace.
    pub cursor_end: u32,
    /// Extra metadata about the completions.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// A single history entry: an input, optionally paired with its output.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryEntry {
    /// `(session, line, input)`.
    Input {
        /// Session number the line was entered in.
        session: i64,
        /// Line number within that session.
        line: i64,
        /// The (possibly raw) source text.
        input: String,
    },
    /// `(session, line, (input, output))`.
    InputOutput {
        /// Session number the line was entered in.
        session: i64,
        /// Line number within that session.
        line: i64,
        /// The (possibly raw) source text.
        input: String,
        /// The text representation of the execution's output.
        output: String,
    },
}

impl Serialize for HistoryEntry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeTuple;
        match self {
            HistoryEntry::Input { session, line, input } => {
                let mut tup = serializer.serialize_tuple(3)?;
                tup.serialize_element(session)?;
                tup.serialize_element(line)?;
                tup.serialize_element(input)?;
                tup.end()
            }
            HistoryEntry::InputOutput { session, line, input, output } => {
                let mut tup = serializer.serialize_tuple(3)?;
                tup.serialize_element(session)?;
                tup.serialize_element(line)?;
                tup.serialize_element(&(input, output))?;
                tup.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for HistoryEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (session, line, rest): (i64, i64, Value) = Deserialize::deserialize(deserializer)?;
        Ok(match rest {
            Value::String(input) => HistoryEntry::Input { session, line, input },
            Value::Array(mut pair) if pair.len() == 2 => {
                let output = pair.pop().unwrap();
                let input = pair.pop().unwrap();
                HistoryEntry::InputOutput {
                    session,
                    line,
                    input: input.as_str().ok_or_else(|| DeError::custom("history input not a string"))?.to_string(),
                    output: output.as_str().ok_or_else(|| DeError::custom("history output not a string"))?.to_string(),
                }
            }
            other => return Err(DeError::custom(format!("invalid history entry: {other}"))),
        })
    }
}

/// Extra fields on a successful `history_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryReplyOk {
    /// The selected history entries.
    pub history: Vec<HistoryEntry>,
}

/// Body of a `connect_reply` (deprecated; present for ZeroMQ kernels only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectInfo {
    /// The kernel's shell port.
    pub shell_port: u16,
    /// The kernel's iopub port.
    pub iopub_port: u16,
    /// The kernel's stdin port.
    pub stdin_port: u16,
    /// The kernel's heartbeat port.
    pub hb_port: u16,
}

/// One entry in a `comm_info_reply`'s `comms` map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommInfoEntry {
    /// The comm's target handler name.
    pub target_name: TargetName,
}

/// Body of a `comm_info_reply`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommInfoReply {
    /// Currently open comms, keyed by comm ID.
    pub comms: BTreeMap<Uuid, CommInfoEntry>,
}

impl Serialize for CommInfoReply {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut outer = serializer.serialize_map(Some(1))?;
        let inner: BTreeMap<String, &CommInfoEntry> =
            self.comms.iter().map(|(id, entry)| (id.to_string(), entry)).collect();
        outer.serialize_entry("comms", &inner)?;
        outer.end()
    }
}

impl<'de> Deserialize<'de> for CommInfoReply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            comms: BTreeMap<String, CommInfoEntry>,
        }
        let wire = Wire::deserialize(deserializer)?;
        let mut comms = BTreeMap::new();
        for (id, entry) in wire.comms {
            let id = Uuid::parse_str(&id).map_err(DeError::custom)?;
            comms.insert(id, entry);
        }
        Ok(CommInfoReply { comms })
    }
}

/// Details about the kernel's implementation language, reported in
/// `kernel_info_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Name of the language, e.g. `"python"`.
    pub name: String,
    /// Version of the language.
    pub version: String,
    /// MIME type for source files.
    pub mimetype: String,
    /// Conventional file extension, including the leading dot.
    pub file_extension: String,
}

/// Body of a `kernel_info_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfoReply {
    /// Version of the messaging protocol implemented.
    pub protocol_version: String,
    /// Name of the kernel implementation, e.g. `"ipython"`.
    pub implementation: String,
    /// Version of the kernel implementation.
    pub implementation_version: String,
    /// Details about the target language.
    pub language_info: LanguageInfo,
    /// A banner shown in console frontends.
    pub banner: String,
}

/// The `status`/`indent` body of an `is_complete_reply` (§8, scenario S3).
/// Not an [`OperationResult`]: this family has its own four-way status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IsCompleteStatus {
    /// The code is a complete, executable statement.
    Complete,
    /// The code is incomplete; continuing input should use this indent.
    Incomplete(String),
    /// The code is invalid and will raise a syntax error.
    Invalid,
    /// The kernel doesn't know how to classify the code.
    Unknown,
}

impl Serialize for IsCompleteStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        match self {
            IsCompleteStatus::Complete => map.serialize_entry("status", "complete")?,
            IsCompleteStatus::Incomplete(indent) => {
                map.serialize_entry("status", "incomplete")?;
                map.serialize_entry("indent", indent)?;
            }
            IsCompleteStatus::Invalid => map.serialize_entry("status", "invalid")?,
            IsCompleteStatus::Unknown => map.serialize_entry("status", "unknown")?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for IsCompleteStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wire {
            status: String,
            #[serde(default)]
            indent: String,
        }
        let wire = Wire::deserialize(deserializer)?;
        Ok(match wire.status.as_str() {
            "complete" => IsCompleteStatus::Complete,
            "incomplete" => IsCompleteStatus::Incomplete(wire.indent),
            "invalid" => IsCompleteStatus::Invalid,
            "unknown" => IsCompleteStatus::Unknown,
            other => return Err(DeError::custom(format!("invalid is_complete status: {other}"))),
        })
    }
}

/// Body of a `shutdown_reply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReply {
    /// Echoes the `restart` flag from the request.
    pub restart: bool,
}

/// A reply a kernel sends on the shell or control channel, paired 1:1 with
/// the [`ClientRequest`](super::ClientRequest) variant it answers (§3).
#[derive(Clone, Debug, PartialEq)]
pub enum KernelReply {
    /// Reply to `execute_request`.
    ExecuteReply(OperationResult<ExecuteReplyOk>),
    /// Reply to `inspect_request`.
    InspectReply(OperationResult<InspectReplyOk>),
    /// Reply to `history_request`.
    HistoryReply(OperationResult<HistoryReplyOk>),
    /// Reply to `complete_request`.
    CompleteReply(OperationResult<CompleteReplyOk>),
    /// Reply to `is_complete_request`.
    IsCompleteReply(IsCompleteStatus),
    /// Reply to `connect_request`.
    ConnectReply(ConnectInfo),
    /// Reply to `comm_info_request`.
    CommInfoReply(CommInfoReply),
    /// Reply to `kernel_info_request`.
    KernelInfoReply(KernelInfoReply),
    /// Reply to `shutdown_request`.
    ShutdownReply(ShutdownReply),
}

impl Tagged for KernelReply {
    fn msg_type(&self) -> &'static str {
        match self {
            KernelReply::ExecuteReply(_) => "execute_reply",
            KernelReply::InspectReply(_) => "inspect_reply",
            KernelReply::HistoryReply(_) => "history_reply",
            KernelReply::CompleteReply(_) => "complete_reply",
            KernelReply::IsCompleteReply(_) => "is_complete_reply",
            KernelReply::ConnectReply(_) => "connect_reply",
            KernelReply::CommInfoReply(_) => "comm_info_reply",
            KernelReply::KernelInfoReply(_) => "kernel_info_reply",
            KernelReply::ShutdownReply(_) => "shutdown_reply",
        }
    }
}

impl KernelReply {
    /// Encode this reply's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            KernelReply::ExecuteReply(r) => serde_json::to_value(r),
            KernelReply::InspectReply(r) => serde_json::to_value(r),
            KernelReply::HistoryReply(r) => serde_json::to_value(r),
            KernelReply::CompleteReply(r) => serde_json::to_value(r),
            KernelReply::IsCompleteReply(r) => serde_json::to_value(r),
            KernelReply::ConnectReply(r) => serde_json::to_value(r),
            KernelReply::CommInfoReply(r) => serde_json::to_value(r),
            KernelReply::KernelInfoReply(r) => serde_json::to_value(r),
            KernelReply::ShutdownReply(r) => serde_json::to_value(r),
        }
        .expect("KernelReply serialization")
    }

    /// Decode a reply's `content` body, given the header's `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "execute_reply" => KernelReply::ExecuteReply(serde_json::from_value(content).map_err(err)?),
            "inspect_reply" => KernelReply::InspectReply(serde_json::from_value(content).map_err(err)?),
            "history_reply" => KernelReply::HistoryReply(serde_json::from_value(content).map_err(err)?),
            "complete_reply" => KernelReply::CompleteReply(serde_json::from_value(content).map_err(err)?),
            "is_complete_reply" => KernelReply::IsCompleteReply(serde_json::from_value(content).map_err(err)?),
            "connect_reply" => KernelReply::ConnectReply(serde_json::from_value(content).map_err(err)?),
            "comm_info_reply" => KernelReply::CommInfoReply(serde_json::from_value(content).map_err(err)?),
            "kernel_info_reply" => KernelReply::KernelInfoReply(serde_json::from_value(content).map_err(err)?),
            "shutdown_reply" => KernelReply::ShutdownReply(serde_json::from_value(content).map_err(err)?),
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_complete_incomplete_matches_scenario_s3() {
        let reply = KernelReply::IsCompleteReply(IsCompleteStatus::Incomplete("    ".into()));
        let json = reply.encode();
        assert_eq!(json, serde_json::json!({"status": "incomplete", "indent": "    "}));
    }

    #[test]
    fn operation_result_abort_has_only_status() {
        let reply: OperationResult<ExecuteReplyOk> = OperationResult::Abort;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json, serde_json::json!({"status": "abort"}));
    }

    #[test]
    fn operation_result_accepts_legacy_aborted_alias() {
        let json = serde_json::json!({"status": "aborted"});
        let reply: OperationResult<ExecuteReplyOk> = serde_json::from_value(json).unwrap();
        assert_eq!(reply, OperationResult::Abort);
    }

    #[test]
    fn operation_result_error_flattens_error_info() {
        let reply: OperationResult<ExecuteReplyOk> = OperationResult::Error(ErrorInfo {
            ename: "NameError".into(),
            evalue: "name 'x' is not defined".into(),
            traceback: vec!["line 1".into()],
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["ename"], "NameError");
    }

    #[test]
    fn comm_info_reply_round_trips() {
        let id = Uuid::new_v4();
        let mut comms = BTreeMap::new();
        comms.insert(id, CommInfoEntry { target_name: "jupyter.widget".into() });
        let reply = KernelReply::CommInfoReply(CommInfoReply { comms });
        let encoded = reply.encode();
        assert_eq!(encoded["comms"][id.to_string()]["target_name"], "jupyter.widget");
        let decoded = KernelReply::decode("comm_info_reply", encoded).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn history_entries_round_trip_with_and_without_output() {
        let reply = KernelReply::HistoryReply(OperationResult::Ok(HistoryReplyOk {
            history: vec![
                HistoryEntry::Input { session: 1, line: 1, input: "1+1".into() },
                HistoryEntry::InputOutput {
                    session: 1,
                    line: 2,
                    input: "2+2".into(),
                    output: "4".into(),
                },
            ],
        }));
        let encoded = reply.encode();
        let decoded = KernelReply::decode("history_reply", encoded).unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn round_trips_every_variant() {
        let cases = vec![
            KernelReply::ExecuteReply(OperationResult::Ok(ExecuteReplyOk {
                execution_count: 3,
                user_expressions: BTreeMap::new(),
            })),
            KernelReply::InspectReply(OperationResult::Ok(InspectReplyOk {
                found: false,
                display: DisplayData::empty(),
            })),
            KernelReply::CompleteReply(OperationResult::Ok(CompleteReplyOk {
                matches: vec!["foo".into(), "foobar".into()],
                cursor_start: 0,
                cursor_end: 2,
                metadata: BTreeMap::new(),
            })),
            KernelReply::IsCompleteReply(IsCompleteStatus::Complete),
            KernelReply::ConnectReply(ConnectInfo {
                shell_port: 1,
                iopub_port: 2,
                stdin_port: 3,
                hb_port: 4,
            }),
            KernelReply::KernelInfoReply(KernelInfoReply {
                protocol_version: "5.0".into(),
                implementation: "jupyter-wire".into(),
                implementation_version: "0.1.0".into(),
                language_info: LanguageInfo {
                    name: "text".into(),
                    version: "1.0".into(),
                    mimetype: "text/plain".into(),
                    file_extension: ".txt".into(),
                },
                banner: "hi".into(),
            }),
            KernelReply::ShutdownReply(ShutdownReply { restart: false }),
        ];
        for case in cases {
            let tag = case.msg_type();
            let encoded = case.encode();
            let decoded = KernelReply::decode(tag, encoded).unwrap();
            assert_eq!(decoded, case);
        }
    }
}
