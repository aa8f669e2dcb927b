//! Client Dispatch Engine (§4.F): the concurrent worker tasks a frontend
//! runs to listen for kernel output/comms on iopub, answer stdin prompts,
//! and send requests on shell/control.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;
use uuid::Uuid;
use zeromq::{DealerSocket, ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::envelope::{decode_frames, encode_frames, Envelope};
use crate::error::{Error, Result};
use crate::header::{make_reply_header, make_request_header, MessageHeader};
use crate::message::{ClientReply, ClientRequest, Comm, KernelOutput, KernelReply, KernelRequest, Tagged};
use crate::profile::KernelProfile;
use crate::transport::connect_client_sockets;

/// A future a handler returns; boxed so handlers can be stored as trait
/// objects without an `async fn` in a trait (mirrors `kernel::BoxFuture`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles a `KernelRequest` arriving on stdin, producing the `ClientReply`
/// sent back.
pub type KernelRequestHandler = Arc<dyn Fn(ClientCallbacks, KernelRequest) -> BoxFuture<'static, ClientReply> + Send + Sync>;

/// Handles a `Comm` message arriving on iopub.
pub type CommHandler = Arc<dyn Fn(ClientCallbacks, Comm) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handles a `KernelOutput` message arriving on iopub.
pub type KernelOutputHandler = Arc<dyn Fn(ClientCallbacks, KernelOutput) + Send + Sync>;

/// Callbacks available to handlers while processing one inbound message,
/// bound to that message's header.
#[derive(Clone)]
pub struct ClientCallbacks {
    shell: Arc<Mutex<DealerSocket>>,
    key: Arc<Vec<u8>>,
    parent: MessageHeader,
}

impl ClientCallbacks {
    /// Reply to a comm on the **shell** socket (not iopub — clients publish
    /// comms upstream, §4.F), parented to the message being handled.
    pub async fn send_reply_comm(&self, comm: Comm) -> Result<()> {
        let header = make_reply_header(&self.parent, comm.msg_type());
        let envelope = Envelope::new(&comm, header, Some(self.parent.clone()));
        let frames = encode_frames(&envelope, &self.key).map_err(Error::Protocol)?;
        let message = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;
        self.shell.lock().await.send(message).await?;
        Ok(())
    }
}

/// The client-side dispatch engine: owns the five connected sockets,
/// correlates shell/control replies by `msg_id`, and runs the iopub and
/// stdin listener tasks.
pub struct ClientEngine {
    shell: Arc<Mutex<DealerSocket>>,
    control: Arc<Mutex<DealerSocket>>,
    iopub: Arc<Mutex<SubSocket>>,
    stdin: Arc<Mutex<DealerSocket>>,
    heartbeat: Arc<Mutex<ReqSocket>>,
    key: Arc<Vec<u8>>,
    session: Uuid,
    username: String,
    reply_waiters: Arc<DashMap<Uuid, oneshot::Sender<Envelope>>>,
    signal: CancellationToken,
    _drop_guard: Arc<DropGuard>,
}

impl ClientEngine {
    /// Connect a client's five sockets against `profile`.
    pub async fn connect(profile: &KernelProfile, username: Option<&str>) -> Result<Self> {
        let sockets = connect_client_sockets(profile).await?;
        let signal = CancellationToken::new();
        Ok(ClientEngine {
            shell: Arc::new(Mutex::new(sockets.shell)),
            control: Arc::new(Mutex::new(sockets.control)),
            iopub: Arc::new(Mutex::new(sockets.iopub)),
            stdin: Arc::new(Mutex::new(sockets.stdin)),
            heartbeat: Arc::new(Mutex::new(sockets.heartbeat)),
            key: Arc::new(profile.key.clone()),
            session: Uuid::new_v4(),
            username: username.unwrap_or(crate::identifier::DEFAULT_USERNAME).to_string(),
            reply_waiters: Arc::new(DashMap::new()),
            _drop_guard: Arc::new(signal.clone().drop_guard()),
            signal,
        })
    }

    /// A token that cancels the background listener tasks when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.signal.clone()
    }

    /// Send a `ClientRequest` on shell and block for the matching
    /// `KernelReply`.
    pub async fn send_client_request(&self, request: ClientRequest) -> Result<KernelReply> {
        self.call(&self.shell, request).await
    }

    /// Send a `ClientRequest` on control and block for the matching
    /// `KernelReply`. Identical to [`Self::send_client_request`] except for
    /// the channel, matching §4.E's "control is just like shell" framing.
    pub async fn send_control_request(&self, request: ClientRequest) -> Result<KernelReply> {
        self.call(&self.control, request).await
    }

    async fn call(&self, socket: &Arc<Mutex<DealerSocket>>, request: ClientRequest) -> Result<KernelReply> {
        let header = make_request_header(self.session, Some(&self.username), request.msg_type());
        let message_id = header.message_id;
        let envelope = Envelope::new(&request, header, None);
        let frames = encode_frames(&envelope, &self.key).map_err(Error::Protocol)?;
        let outbound = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.reply_waiters.insert(message_id, reply_tx);

        socket.lock().await.send(outbound).await?;

        let envelope = tokio::select! {
            result = reply_rx => result.map_err(|_| Error::Disconnected)?,
            _ = self.signal.cancelled() => {
                self.reply_waiters.remove(&message_id);
                return Err(Error::Cancelled);
            }
        };
        KernelReply::decode(&envelope.header.msg_type, envelope.content).map_err(Error::Protocol)
    }

    /// Send a raw frame on the heartbeat REQ socket and return the echoed
    /// reply (§4.D, §8 scenario S1). Not part of the message algebra: the
    /// heartbeat channel carries opaque bytes, never an envelope.
    pub async fn ping(&self, payload: Bytes) -> Result<Bytes> {
        let mut heartbeat = self.heartbeat.lock().await;
        heartbeat.send(ZmqMessage::from(payload.to_vec())).await?;
        let reply = heartbeat.recv().await?;
        Ok(reply.into_vec().pop().unwrap_or_default())
    }

    /// Send a `Comm` message on shell, without waiting for any reply
    /// (fire-and-forget, §4.F).
    pub async fn send_client_comm(&self, comm: Comm) -> Result<()> {
        let header = make_request_header(self.session, Some(&self.username), comm.msg_type());
        let envelope = Envelope::new(&comm, header, None);
        let frames = encode_frames(&envelope, &self.key).map_err(Error::Protocol)?;
        let outbound = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;
        self.shell.lock().await.send(outbound).await?;
        Ok(())
    }

    /// Drain shell replies into `reply_waiters`, and run the iopub and
    /// stdin listeners, until cancelled or a listener fails. Per §7, the
    /// iopub listener treats unrecoverable decode errors as fatal; the
    /// shell-reply drain and stdin listener log-and-continue on malformed
    /// frames like the kernel side does.
    pub async fn serve(
        &self,
        kernel_output_handler: KernelOutputHandler,
        comm_handler: CommHandler,
        kernel_request_handler: KernelRequestHandler,
    ) -> Result<()> {
        let mut workers = JoinSet::new();

        let shell = self.shell.clone();
        let key = self.key.clone();
        let waiters = self.reply_waiters.clone();
        workers.spawn(async move { drain_shell_replies(shell, key, waiters).await });

        let control = self.control.clone();
        let key = self.key.clone();
        let waiters = self.reply_waiters.clone();
        workers.spawn(async move { drain_shell_replies(control, key, waiters).await });

        let key = self.key.clone();
        let shell_for_comm = self.shell.clone();
        let iopub = self.iopub.clone();
        workers.spawn(run_iopub_listener(iopub, key, shell_for_comm, kernel_output_handler, comm_handler));

        let stdin = self.stdin.clone();
        let shell_for_stdin = self.shell.clone();
        let key = self.key.clone();
        workers.spawn(run_stdin_listener(stdin, shell_for_stdin, key, kernel_request_handler));

        let signal = self.signal.clone();
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

async fn drain_shell_replies(
    socket: Arc<Mutex<DealerSocket>>,
    key: Arc<Vec<u8>>,
    waiters: Arc<DashMap<Uuid, oneshot::Sender<Envelope>>>,
) -> Result<()> {
    loop {
        let inbound = socket.lock().await.recv().await?;
        let frames: Vec<Bytes> = inbound.into_vec();
        let envelope = match decode_frames(frames, &key) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "discarding malformed shell/control reply");
                continue;
            }
        };
        let Some(parent) = &envelope.parent_header else {
            warn!("shell/control reply had no parent_header; dropping");
            continue;
        };
        if let Some((_, reply_tx)) = waiters.remove(&parent.message_id) {
            let _ = reply_tx.send(envelope);
        }
    }
}

async fn run_iopub_listener(
    socket: Arc<Mutex<SubSocket>>,
    key: Arc<Vec<u8>>,
    shell: Arc<Mutex<DealerSocket>>,
    kernel_output_handler: KernelOutputHandler,
    comm_handler: CommHandler,
) -> Result<()> {
    loop {
        let inbound = socket.lock().await.recv().await?;
        let frames: Vec<Bytes> = inbound.into_vec();
        let envelope = decode_frames(frames, &key).map_err(Error::Protocol)?;

        let callbacks = ClientCallbacks {
            shell: shell.clone(),
            key: key.clone(),
            parent: envelope.header.clone(),
        };

        if let Ok(comm) = Comm::decode(&envelope.header.msg_type, envelope.content.clone()) {
            comm_handler(callbacks, comm).await;
            continue;
        }

        let output = KernelOutput::decode(&envelope.header.msg_type, envelope.content).map_err(Error::Protocol)?;
        kernel_output_handler(callbacks, output);
    }
}

async fn run_stdin_listener(
    socket: Arc<Mutex<DealerSocket>>,
    shell: Arc<Mutex<DealerSocket>>,
    key: Arc<Vec<u8>>,
    kernel_request_handler: KernelRequestHandler,
) -> Result<()> {
    loop {
        let inbound = socket.lock().await.recv().await?;
        let frames: Vec<Bytes> = inbound.into_vec();
        let envelope = match decode_frames(frames, &key) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "discarding malformed stdin request");
                continue;
            }
        };

        // Unlike a malformed envelope, a decode failure here means the
        // header's own `msg_type` doesn't match its `content` — ordering can
        // no longer be trusted, so this is fatal (§7), matching the iopub
        // listener's handling of the same failure.
        let request = KernelRequest::decode(&envelope.header.msg_type, envelope.content).map_err(Error::Protocol)?;

        // `ClientCallbacks::send_reply_comm` always targets shell (§4.F), even
        // while handling a stdin-originated request.
        let callbacks = ClientCallbacks {
            shell: shell.clone(),
            key: key.clone(),
            parent: envelope.header.clone(),
        };
        let reply = kernel_request_handler(callbacks, request).await;

        let header = make_reply_header(&envelope.header, reply.msg_type());
        let reply_envelope = Envelope::new(&reply, header, Some(envelope.header.clone()));
        let frames = encode_frames(&reply_envelope, &key).map_err(Error::Protocol)?;
        let outbound = crate::envelope::into_zmq_message(frames).map_err(Error::Protocol)?;
        socket.lock().await.send(outbound).await?;
    }
}
