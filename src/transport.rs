//! Socket role bindings for the five Jupyter channels (§4.D).
//!
//! The kernel side binds ROUTER/PUB/REP sockets to a [`KernelProfile`]'s
//! ports (allocating dynamic ports if requested); the client side connects
//! DEALER/SUB/REQ sockets to an existing profile. This mirrors the
//! `create_zeromq_connection`/socket-role split in the teacher's
//! `driver_zeromq.rs`, generalized from five hardcoded ports to a shared
//! profile type.

use std::net::TcpListener;

use zeromq::{DealerSocket, PubSocket, ReqSocket, RepSocket, RouterSocket, Socket, SocketRecv, SocketSend, SubSocket};

use crate::error::{Error, Result};
use crate::profile::KernelProfile;

/// The five sockets a kernel binds, with dynamic ports resolved.
pub struct KernelSockets {
    pub shell: RouterSocket,
    pub control: RouterSocket,
    pub iopub: PubSocket,
    pub stdin: RouterSocket,
    pub heartbeat: RepSocket,
}

/// The five sockets a client connects.
pub struct ClientSockets {
    pub shell: DealerSocket,
    pub control: DealerSocket,
    pub iopub: SubSocket,
    pub stdin: DealerSocket,
    pub heartbeat: ReqSocket,
}

/// Bind a kernel's five sockets against `profile`, writing back any
/// dynamically-allocated ports (port `0`) before returning.
pub async fn bind_kernel_sockets(profile: &mut KernelProfile) -> Result<KernelSockets> {
    profile.shell_port = resolve_port(profile.shell_port)?;
    profile.control_port = resolve_port(profile.control_port)?;
    profile.iopub_port = resolve_port(profile.iopub_port)?;
    profile.stdin_port = resolve_port(profile.stdin_port)?;
    profile.hb_port = resolve_port(profile.hb_port)?;

    let mut shell = RouterSocket::new();
    shell.bind(&profile.endpoint(profile.shell_port)).await?;

    let mut control = RouterSocket::new();
    control.bind(&profile.endpoint(profile.control_port)).await?;

    let mut iopub = PubSocket::new();
    iopub.bind(&profile.endpoint(profile.iopub_port)).await?;

    let mut stdin = RouterSocket::new();
    stdin.bind(&profile.endpoint(profile.stdin_port)).await?;

    let mut heartbeat = RepSocket::new();
    heartbeat.bind(&profile.endpoint(profile.hb_port)).await?;

    Ok(KernelSockets {
        shell,
        control,
        iopub,
        stdin,
        heartbeat,
    })
}

/// If `requested_port` is `0`, reserve an ephemeral TCP port on the loopback
/// interface and return it so the effective `KernelProfile` can be written
/// out before any ZeroMQ socket binds; otherwise pass the port through
/// unchanged. The listener is dropped immediately so ZeroMQ can rebind it,
/// which is racy only under concurrent dynamic-port allocation on the same
/// host — acceptable for the single-kernel-per-profile use this crate
/// targets.
fn resolve_port(requested_port: u16) -> Result<u16> {
    if requested_port != 0 {
        return Ok(requested_port);
    }
    let listener = TcpListener::bind("127.0.0.1:0").map_err(Error::Io)?;
    Ok(listener.local_addr().map_err(Error::Io)?.port())
}

/// Connect a client's five sockets against an already-bound `profile`.
pub async fn connect_client_sockets(profile: &KernelProfile) -> Result<ClientSockets> {
    let mut shell = DealerSocket::new();
    shell.connect(&profile.endpoint(profile.shell_port)).await?;

    let mut control = DealerSocket::new();
    control.connect(&profile.endpoint(profile.control_port)).await?;

    let mut iopub = SubSocket::new();
    iopub.connect(&profile.endpoint(profile.iopub_port)).await?;
    iopub.subscribe("").await?;

    let mut stdin = DealerSocket::new();
    stdin.connect(&profile.endpoint(profile.stdin_port)).await?;

    let mut heartbeat = ReqSocket::new();
    heartbeat.connect(&profile.endpoint(profile.hb_port)).await?;

    Ok(ClientSockets {
        shell,
        control,
        iopub,
        stdin,
        heartbeat,
    })
}

/// Run the heartbeat echo loop: block on `recv`, write the frame back
/// verbatim, forever (§4.E). Returns only on a transport error.
pub async fn run_heartbeat_echo(mut socket: RepSocket) -> Result<()> {
    loop {
        let message = socket.recv().await?;
        socket.send(message).await?;
    }
}
