//! A typed, bidirectional implementation of the Jupyter kernel messaging
//! protocol: wire envelope and signing, the closed message algebra for
//! every channel, connection profiles, socket transport, and the kernel-
//! and client-side dispatch engines.
//!
//! See <https://jupyter-client.readthedocs.io/en/stable/messaging.html> for
//! the protocol this crate implements.

pub mod client;
pub mod envelope;
pub mod error;
pub mod header;
pub mod identifier;
pub mod kernel;
pub mod message;
pub mod profile;
pub mod transport;

pub use client::ClientEngine;
pub use envelope::Envelope;
pub use error::{Error, ProtocolError, Result};
pub use header::MessageHeader;
pub use kernel::KernelEngine;
pub use message::{
    ClientReply, ClientRequest, Comm, CommInfoEntry, CommInfoReply, CompleteReplyOk, ConnectInfo,
    DetailLevel, DisplayData, ErrorInfo, ExecuteOptions, ExecuteReplyOk, HistoryAccessType, HistoryEntry,
    HistoryOptions, HistoryReplyOk, InputOptions, InspectReplyOk, IsCompleteStatus, KernelInfoReply,
    KernelOutput, KernelReply, KernelRequest, KernelStatus, LanguageInfo, OperationResult, ShutdownReply,
    Stream, Tagged,
};
pub use profile::KernelProfile;
