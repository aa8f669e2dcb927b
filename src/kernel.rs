//! Kernel Dispatch Engine (§4.E): the concurrent worker tasks a kernel runs
//! to answer shell/control requests, publish outputs, and echo heartbeats.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;
use zeromq::{PubSocket, RouterSocket, Socket, SocketRecv, SocketSend};

use crate::envelope::{decode_frames, encode_frames, Envelope};
use crate::error::{Error, Result};
use crate::header::{make_reply_header, make_request_header, MessageHeader};
use crate::identifier::DEFAULT_USERNAME;
use crate::message::{
    ClientReply, ClientRequest, Comm, KernelOutput, KernelReply, KernelRequest, KernelStatus, Payload, Tagged,
};
use crate::profile::KernelProfile;
use crate::transport::{bind_kernel_sockets, run_heartbeat_echo, KernelSockets};

/// A future a handler returns; boxed so [`RequestHandler`]/[`CommHandler`]
/// can be stored as trait objects without an `async fn` in a trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles one `ClientRequest`, producing the `KernelReply` sent back on
/// the same channel.
pub type RequestHandler = Arc<dyn Fn(KernelCallbacks, ClientRequest) -> BoxFuture<'static, KernelReply> + Send + Sync>;

/// Handles one `Comm` message received on shell or control.
pub type CommHandler = Arc<dyn Fn(KernelCallbacks, Comm) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callbacks a request/comm handler uses to talk back to the client while
/// it is running, bound to the header of the message currently being
/// processed.
#[derive(Clone)]
pub struct KernelCallbacks {
    iopub: Arc<Mutex<PubSocket>>,
    stdin: Arc<Mutex<RouterSocket>>,
    key: Arc<Vec<u8>>,
    session: Uuid,
    parent: MessageHeader,
    parent_identities: Vec<Bytes>,
}

impl KernelCallbacks {
    /// Publish a `KernelOutput` on iopub, parented to the message currently
    /// being handled.
    pub async fn send_kernel_output(&self, output: KernelOutput) -> Result<()> {
        self.publish(&output).await
    }

    /// Publish a `Comm` message on iopub, parented to the message currently
    /// being handled.
    pub async fn send_comm(&self, comm: Comm) -> Result<()> {
        self.publish(&comm).await
    }

    async fn publish<T: Payload>(&self, payload: &T) -> Result<()> {
        let header = make_reply_header(&self.parent, payload.msg_type());
        let envelope = Envelope::new(payload, header, Some(self.parent.clone()));
        let frames = encode_frames(&envelope, &self.key).map_err(Error::Protocol)?;
        let message = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;
        self.iopub.lock().await.send(message).await?;
        Ok(())
    }

    /// Send a `KernelRequest` on stdin and block for the client's
    /// `ClientReply`, serialized against concurrent stdin round trips by a
    /// per-socket mutex (§4.E). Addresses the send using the identity
    /// frames of the shell/control message currently being handled: this
    /// crate assumes a single frontend per kernel whose channels share one
    /// ZeroMQ routing identity, which is the common case for interactive
    /// frontends and avoids a separate identity-announcement handshake.
    pub async fn send_kernel_request(&self, request: KernelRequest) -> Result<ClientReply> {
        let header = make_reply_header(&self.parent, request.msg_type());
        let envelope = Envelope::new(&request, header, Some(self.parent.clone())).with_identities(self.parent_identities.clone());
        let frames = encode_frames(&envelope, &self.key).map_err(Error::Protocol)?;
        let outbound = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;

        let mut stdin = self.stdin.lock().await;
        stdin.send(outbound).await?;
        let inbound = stdin.recv().await?;
        drop(stdin);

        let frames: Vec<Bytes> = inbound.into_vec();
        let envelope = decode_frames(frames, &self.key).map_err(Error::Protocol)?;
        ClientReply::decode(&envelope.header.msg_type, envelope.content).map_err(Error::Protocol)
    }
}

/// The kernel-side dispatch engine: owns the five bound sockets and runs
/// the heartbeat, shell, and control workers until cancelled or a worker
/// fails.
pub struct KernelEngine {
    sockets: KernelSockets,
    profile: KernelProfile,
    session: Uuid,
    signal: CancellationToken,
}

impl KernelEngine {
    /// Bind a kernel's sockets against `profile`, resolving any dynamic
    /// (`0`) ports before returning.
    pub async fn bind(mut profile: KernelProfile) -> Result<Self> {
        let sockets = bind_kernel_sockets(&mut profile).await?;
        Ok(KernelEngine {
            sockets,
            profile,
            session: Uuid::new_v4(),
            signal: CancellationToken::new(),
        })
    }

    /// The effective profile, with dynamic ports resolved. Write this to a
    /// connection file for frontends to discover.
    pub fn profile(&self) -> &KernelProfile {
        &self.profile
    }

    /// A token that cancels every worker task when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Run the engine until cancelled or a worker task fails. Only
    /// `ExecuteRequest` gets busy/idle status brackets (§4.E, §8 scenario
    /// S5); every other `ClientRequest` replies without one.
    pub async fn serve(self, request_handler: RequestHandler, comm_handler: CommHandler) -> Result<()> {
        let KernelEngine {
            sockets,
            profile,
            session,
            signal,
        } = self;
        let KernelSockets {
            shell,
            control,
            iopub,
            stdin,
            heartbeat,
        } = sockets;

        let key = Arc::new(profile.key.clone());
        let iopub = Arc::new(Mutex::new(iopub));
        let stdin = Arc::new(Mutex::new(stdin));

        let mut workers = JoinSet::new();

        workers.spawn(run_heartbeat_echo(heartbeat));

        workers.spawn(run_channel_worker(
            "shell",
            shell,
            session,
            key.clone(),
            iopub.clone(),
            stdin.clone(),
            request_handler.clone(),
            comm_handler.clone(),
        ));

        workers.spawn(run_channel_worker(
            "control",
            control,
            session,
            key.clone(),
            iopub.clone(),
            stdin.clone(),
            request_handler,
            comm_handler,
        ));

        tokio::select! {
            result = join_first_failure(&mut workers) => {
                signal.cancel();
                result
            }
            _ = signal.cancelled() => Ok(()),
        }
    }
}

async fn join_first_failure(workers: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(outcome) = workers.join_next().await {
        match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => return Err(err),
            Err(join_err) => return Err(Error::Handler(Box::new(join_err))),
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_channel_worker(
    channel: &'static str,
    mut socket: RouterSocket,
    session: Uuid,
    key: Arc<Vec<u8>>,
    iopub: Arc<Mutex<PubSocket>>,
    stdin: Arc<Mutex<RouterSocket>>,
    request_handler: RequestHandler,
    comm_handler: CommHandler,
) -> Result<()> {
    loop {
        let inbound = socket.recv().await?;
        let frames: Vec<Bytes> = inbound.into_vec();

        let envelope = match decode_frames(frames, &key) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(channel, error = %err, "discarding malformed inbound frame");
                continue;
            }
        };
        trace!(channel, msg_type = %envelope.header.msg_type, "dispatching inbound message");

        let callbacks = KernelCallbacks {
            iopub: iopub.clone(),
            stdin: stdin.clone(),
            key: key.clone(),
            session,
            parent: envelope.header.clone(),
            parent_identities: envelope.identities.clone(),
        };

        if let Ok(comm) = Comm::decode(&envelope.header.msg_type, envelope.content.clone()) {
            comm_handler(callbacks, comm).await;
            continue;
        }

        let request = match ClientRequest::decode(&envelope.header.msg_type, envelope.content) {
            Ok(request) => request,
            Err(err) => {
                warn!(channel, error = %err, "could not decode client request body");
                continue;
            }
        };

        let reply_msg_type = request.reply_msg_type();
        let brackets_status = matches!(request, ClientRequest::ExecuteRequest(..));

        if brackets_status {
            let busy = KernelOutput::KernelStatusOutput(KernelStatus::Busy);
            if let Err(err) = callbacks.send_kernel_output(busy).await {
                error!(channel, error = %err, "failed to publish busy status");
            }
        }

        let reply = request_handler(callbacks.clone(), request).await;

        if brackets_status {
            let idle = KernelOutput::KernelStatusOutput(KernelStatus::Idle);
            if let Err(err) = callbacks.send_kernel_output(idle).await {
                error!(channel, error = %err, "failed to publish idle status");
            }
        }

        let header = make_reply_header(&envelope.header, &reply_msg_type);
        debug_assert_eq!(header.msg_type, reply.msg_type());
        let reply_envelope = Envelope::new(&reply, header, Some(envelope.header.clone()))
            .with_identities(envelope.identities.clone());
        let frames = encode_frames(&reply_envelope, &key).map_err(Error::Protocol)?;
        let outbound = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;
        socket.send(outbound).await?;

        debug!(channel, msg_type = %reply_msg_type, "handled client request");
    }
}

/// Convenience constructor for a request header this engine sends on its
/// own initiative (used by tests and simple embedders that don't go
/// through [`KernelEngine::serve`]).
pub fn standalone_request_header(session: Uuid, msg_type: &str) -> MessageHeader {
    make_request_header(session, Some(DEFAULT_USERNAME), msg_type)
}
