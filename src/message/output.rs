//! `KernelOutput`: broadcast messages a kernel publishes on iopub (§3, §4.B,
//! §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CodeBlock, DisplayData, ErrorInfo, Tagged, WaitBeforeClear};
use crate::error::ProtocolError;

/// Which stream a `stream` output came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// The kernel's busy/idle/starting lifecycle state, reported via `status`
/// (§4.E: brackets execution, §8 scenario S5).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelStatus {
    /// Published exactly once, at kernel process startup.
    Starting,
    /// The kernel is ready for a new request.
    Idle,
    /// The kernel is currently handling a request.
    Busy,
}

/// A message a kernel publishes on iopub, either as a side effect of
/// handling a request or spontaneously (status changes).
#[derive(Clone, Debug, PartialEq)]
pub enum KernelOutput {
    /// Text written to stdout or stderr.
    StreamOutput(Stream, String),
    /// Rich display data to render.
    DisplayDataOutput(DisplayData),
    /// Re-broadcast of the code from an `execute_request`, with its count.
    ExecuteInputOutput(CodeBlock, i64),
    /// The (possibly rich) result of an expression-statement execution.
    ExecuteResultOutput(i64, DisplayData),
    /// An error raised while executing code.
    ExecuteErrorOutput(ErrorInfo),
    /// A change in the kernel's busy/idle/starting status.
    KernelStatusOutput(KernelStatus),
    /// Request that frontends clear previous output.
    ClearOutput(WaitBeforeClear),
}

impl Tagged for KernelOutput {
    fn msg_type(&self) -> &'static str {
        match self {
            KernelOutput::StreamOutput(..) => "stream",
            KernelOutput::DisplayDataOutput(..) => "display_data",
            KernelOutput::ExecuteInputOutput(..) => "execute_input",
            KernelOutput::ExecuteResultOutput(..) => "execute_result",
            KernelOutput::ExecuteErrorOutput(..) => "error",
            KernelOutput::KernelStatusOutput(..) => "status",
            KernelOutput::ClearOutput(..) => "clear_output",
        }
    }
}

impl KernelOutput {
    /// Encode this output's `content` body as JSON.
    pub fn encode(&self) -> Value {
        match self {
            KernelOutput::StreamOutput(stream, text) => serde_json::json!({
                "name": stream,
                "text": text,
            }),
            KernelOutput::DisplayDataOutput(display) => {
                serde_json::to_value(display).expect("DisplayData serialization")
            }
            KernelOutput::ExecuteInputOutput(code, count) => serde_json::json!({
                "code": code,
                "execution_count": count,
            }),
            KernelOutput::ExecuteResultOutput(count, display) => {
                let mut value = serde_json::to_value(display).expect("DisplayData serialization");
                value["execution_count"] = serde_json::json!(count);
                value
            }
            KernelOutput::ExecuteErrorOutput(error) => {
                serde_json::to_value(error).expect("ErrorInfo serialization")
            }
            KernelOutput::KernelStatusOutput(status) => serde_json::json!({
                "execution_state": status,
            }),
            KernelOutput::ClearOutput(wait) => serde_json::json!({ "wait": wait }),
        }
    }

    /// Decode an output's `content` body, given the header's `msg_type`.
    pub fn decode(msg_type: &str, content: Value) -> Result<Self, ProtocolError> {
        let err = |e: serde_json::Error| super::decode_error(msg_type, e);
        Ok(match msg_type {
            "stream" => {
                #[derive(Deserialize)]
                struct Wire {
                    name: Stream,
                    text: String,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                KernelOutput::StreamOutput(wire.name, wire.text)
            }
            "display_data" => {
                let display: DisplayData = serde_json::from_value(content).map_err(err)?;
                KernelOutput::DisplayDataOutput(display)
            }
            "execute_input" => {
                #[derive(Deserialize)]
                struct Wire {
                    code: String,
                    execution_count: i64,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                KernelOutput::ExecuteInputOutput(wire.code, wire.execution_count)
            }
            "execute_result" => {
                #[derive(Deserialize)]
                struct Wire {
                    execution_count: i64,
                    #[serde(flatten)]
                    display: DisplayData,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                KernelOutput::ExecuteResultOutput(wire.execution_count, wire.display)
            }
            "error" => {
                let error: ErrorInfo = serde_json::from_value(content).map_err(err)?;
                KernelOutput::ExecuteErrorOutput(error)
            }
            "status" => {
                #[derive(Deserialize)]
                struct Wire {
                    execution_state: KernelStatus,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                KernelOutput::KernelStatusOutput(wire.execution_state)
            }
            "clear_output" => {
                #[derive(Deserialize)]
                struct Wire {
                    wait: bool,
                }
                let wire: Wire = serde_json::from_value(content).map_err(err)?;
                KernelOutput::ClearOutput(wire.wait)
            }
            other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        let cases = vec![
            KernelOutput::StreamOutput(Stream::Stdout, "hi".into()),
            KernelOutput::DisplayDataOutput(DisplayData::plain_text("hi")),
            KernelOutput::ExecuteInputOutput("1+1".into(), 1),
            KernelOutput::ExecuteResultOutput(1, DisplayData::plain_text("2")),
            KernelOutput::ExecuteErrorOutput(ErrorInfo {
                ename: "ValueError".into(),
                evalue: "bad".into(),
                traceback: vec![],
            }),
            KernelOutput::KernelStatusOutput(KernelStatus::Busy),
            KernelOutput::ClearOutput(true),
        ];
        for case in cases {
            let tag = case.msg_type();
            let encoded = case.encode();
            let decoded = KernelOutput::decode(tag, encoded).unwrap();
            assert_eq!(decoded, case);
        }
    }

    #[test]
    fn execute_result_nests_execution_count_alongside_display_fields() {
        let output = KernelOutput::ExecuteResultOutput(7, DisplayData::plain_text("x"));
        let json = output.encode();
        assert_eq!(json["execution_count"], 7);
        assert_eq!(json["data"]["text/plain"], "x");
    }
}
