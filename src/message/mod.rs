//! The message algebra (§3, §4.B): the closed set of logical messages
//! exchanged over the wire, and their canonical JSON encoding.
//!
//! Each family (`ClientRequest`, `KernelReply`, `KernelOutput`,
//! `KernelRequest`, `ClientReply`, `Comm`) is a tagged union. Every variant
//! knows its own wire `msg_type` tag (via [`Tagged`]) and how to encode or
//! decode its `content` body; the envelope layer (`crate::envelope`) only
//! ever deals with whole headers and opaque JSON content.

mod comm;
mod display;
mod output;
mod reply;
mod request;
mod stdin;
mod tagged;

pub use comm::Comm;
pub use tagged::Payload;
pub use display::{DisplayData, DisplayDatum, MimeType};
pub use output::{KernelOutput, KernelStatus, Stream};
pub use reply::{
    CommInfoEntry, CommInfoReply, CompleteReplyOk, ConnectInfo, ExecuteReplyOk, HistoryEntry,
    HistoryReplyOk, InspectReplyOk, IsCompleteStatus, KernelInfoReply, KernelReply, LanguageInfo,
    ShutdownReply,
};
pub use request::{ClientRequest, DetailLevel, ExecuteOptions, HistoryAccessType, HistoryOptions};
pub use stdin::{ClientReply, InputOptions, KernelRequest};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Source text passed to `execute`/`inspect`/`complete`/`is_complete`
/// requests. A plain string alias: the algebra treats code as opaque text.
pub type CodeBlock = String;

/// Whether a `shutdown_request`/`shutdown_reply` precedes a restart.
pub type Restart = bool;

/// Whether a `clear_output` message should wait for new output before
/// clearing the display.
pub type WaitBeforeClear = bool;

/// The name of a comm's target handler, shared between `comm_open` and
/// `comm_info_reply`.
pub type TargetName = String;

/// The (optional) module a comm target is implemented in.
pub type TargetModule = String;

/// Implemented by every payload family enum; gives the wire `msg_type` tag
/// for a given value (§4.A, §6).
pub trait Tagged {
    /// The `msg_type` string this value would be sent with.
    fn msg_type(&self) -> &'static str;
}

/// Outcome of an operation that can succeed, fail with a structured error, or
/// be silently aborted (§3). Used for `execute_reply`, `inspect_reply`, and
/// `complete_reply`.
///
/// This mirrors the "status"-tagged reply envelope ipykernel uses: a
/// newtype `Ok` variant flattens `T`'s own fields alongside `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult<T> {
    /// The request was processed successfully.
    Ok(T),

    /// The request failed with a structured error.
    Error(ErrorInfo),

    /// The request was aborted with no further information. Some kernels
    /// (see <https://github.com/ipython/ipykernel/issues/367>) emit
    /// `"aborted"` instead of the documented `"abort"`; both are accepted.
    #[serde(alias = "aborted")]
    Abort,
}

/// Structured information about an error raised while handling a request or
/// executing code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The exception name, e.g. `"NameError"`.
    pub ename: String,

    /// The exception message, e.g. `"name 'x' is not defined"`.
    pub evalue: String,

    /// Traceback frames, pre-formatted for display.
    pub traceback: Vec<String>,
}

pub(crate) fn decode_error(msg_type: &str, err: serde_json::Error) -> ProtocolError {
    ProtocolError::DecodeError {
        msg_type: msg_type.to_string(),
        detail: err.to_string(),
    }
}
