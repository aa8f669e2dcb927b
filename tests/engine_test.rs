//! Integration tests exercising the kernel and client dispatch engines
//! together over real ZeroMQ sockets on loopback TCP (§4.I, §8). The engine
//! types hold concrete `zeromq` sockets rather than a transport trait (§9),
//! so "loopback" here means an ephemeral TCP port on 127.0.0.1 rather than
//! an in-process channel pair.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use jupyter_wire::client::{ClientCallbacks, CommHandler as ClientCommHandler, KernelOutputHandler, KernelRequestHandler};
use jupyter_wire::kernel::{CommHandler as KernelCommHandler, KernelCallbacks, RequestHandler};
use jupyter_wire::{
    ClientEngine, ClientRequest, Comm, ConnectInfo, ExecuteOptions, ExecuteReplyOk, KernelEngine,
    KernelInfoReply, KernelOutput, KernelProfile, KernelReply, KernelStatus, LanguageInfo, OperationResult,
    Stream, Tagged,
};
use tokio::time::timeout;

async fn spawn_kernel(request_handler: RequestHandler, comm_handler: KernelCommHandler) -> (KernelProfile, tokio_util::sync::CancellationToken) {
    let profile = KernelProfile::new_dynamic();
    let engine = KernelEngine::bind(profile).await.expect("bind kernel sockets");
    let profile = engine.profile().clone();
    let token = engine.cancellation_token();
    tokio::spawn(async move {
        let _ = engine.serve(request_handler, comm_handler).await;
    });
    (profile, token)
}

fn noop_comm_handler() -> KernelCommHandler {
    Arc::new(|_callbacks: KernelCallbacks, _comm: Comm| Box::pin(async {}))
}

fn noop_client_comm_handler() -> ClientCommHandler {
    Arc::new(|_callbacks: ClientCallbacks, _comm: Comm| Box::pin(async {}))
}

fn noop_kernel_request_handler() -> KernelRequestHandler {
    Arc::new(|_callbacks: ClientCallbacks, _request| {
        Box::pin(async { jupyter_wire::ClientReply::InputReply(String::new()) })
    })
}

#[tokio::test]
async fn heartbeat_echoes_frame_verbatim() {
    let request_handler: RequestHandler =
        Arc::new(|_callbacks, _request| Box::pin(async { unreachable!("no requests sent in this test") }));
    let (profile, token) = spawn_kernel(request_handler, noop_comm_handler()).await;

    let client = ClientEngine::connect(&profile, None).await.expect("connect client sockets");
    let echoed = timeout(Duration::from_secs(5), client.ping(Bytes::from_static(b"ping")))
        .await
        .expect("heartbeat did not respond in time")
        .expect("heartbeat send/recv failed");
    assert_eq!(echoed, Bytes::from_static(b"ping"));

    token.cancel();
}

#[tokio::test]
async fn connect_reply_reports_the_negotiated_ports() {
    // The handler reports whatever `KernelEngine::bind` resolved the dynamic
    // ports to; it can't see `profile` from outside, so it's built after
    // `spawn_kernel` hands the resolved profile back.
    let pending_profile: Arc<Mutex<Option<KernelProfile>>> = Arc::new(Mutex::new(None));
    let pending_for_handler = pending_profile.clone();
    let request_handler: RequestHandler = Arc::new(move |_callbacks, request| {
        let profile = pending_for_handler.lock().unwrap().clone().expect("profile set before first request");
        Box::pin(async move {
            match request {
                ClientRequest::ConnectRequest => KernelReply::ConnectReply(ConnectInfo {
                    shell_port: profile.shell_port,
                    iopub_port: profile.iopub_port,
                    stdin_port: profile.stdin_port,
                    hb_port: profile.hb_port,
                }),
                other => panic!("unexpected request: {}", other.msg_type()),
            }
        })
    });

    let (profile, token) = spawn_kernel(request_handler, noop_comm_handler()).await;
    *pending_profile.lock().unwrap() = Some(profile.clone());

    let client = ClientEngine::connect(&profile, Some("alice")).await.expect("connect client sockets");
    let reply = timeout(Duration::from_secs(5), client.send_client_request(ClientRequest::ConnectRequest))
        .await
        .expect("connect_request timed out")
        .expect("connect_request failed");

    match reply {
        KernelReply::ConnectReply(info) => {
            assert_eq!(info.shell_port, profile.shell_port);
            assert_eq!(info.iopub_port, profile.iopub_port);
            assert_eq!(info.stdin_port, profile.stdin_port);
            assert_eq!(info.hb_port, profile.hb_port);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    token.cancel();
}

#[tokio::test]
async fn kernel_info_request_round_trips_through_both_engines() {
    let request_handler: RequestHandler = Arc::new(|_callbacks, request| {
        Box::pin(async move {
            match request {
                ClientRequest::KernelInfoRequest => KernelReply::KernelInfoReply(KernelInfoReply {
                    protocol_version: "5.0".into(),
                    implementation: "jupyter-wire-test".into(),
                    implementation_version: "0.1.0".into(),
                    language_info: LanguageInfo {
                        name: "text".into(),
                        version: "1.0".into(),
                        mimetype: "text/plain".into(),
                        file_extension: ".txt".into(),
                    },
                    banner: "hello".into(),
                }),
                other => panic!("unexpected request: {}", other.msg_type()),
            }
        })
    });

    let (profile, token) = spawn_kernel(request_handler, noop_comm_handler()).await;
    let client = ClientEngine::connect(&profile, None).await.expect("connect client sockets");

    let reply = timeout(Duration::from_secs(5), client.send_client_request(ClientRequest::KernelInfoRequest))
        .await
        .expect("kernel_info_request timed out")
        .expect("kernel_info_request failed");

    match reply {
        KernelReply::KernelInfoReply(info) => assert_eq!(info.implementation, "jupyter-wire-test"),
        other => panic!("unexpected reply: {other:?}"),
    }

    token.cancel();
}

#[tokio::test]
async fn execute_request_brackets_output_with_busy_and_idle_status() {
    let request_handler: RequestHandler = Arc::new(|callbacks: KernelCallbacks, request| {
        Box::pin(async move {
            match request {
                ClientRequest::ExecuteRequest(_, _) => {
                    callbacks
                        .send_kernel_output(KernelOutput::StreamOutput(Stream::Stdout, "hi".into()))
                        .await
                        .expect("publish stream output");
                    KernelReply::ExecuteReply(OperationResult::Ok(ExecuteReplyOk {
                        execution_count: 1,
                        user_expressions: Default::default(),
                    }))
                }
                other => panic!("unexpected request: {}", other.msg_type()),
            }
        })
    });

    let (profile, token) = spawn_kernel(request_handler, noop_comm_handler()).await;

    let observed: Arc<Mutex<Vec<KernelOutput>>> = Arc::new(Mutex::new(Vec::new()));
    let observed_for_handler = observed.clone();
    let kernel_output_handler: KernelOutputHandler = Arc::new(move |_callbacks, output| {
        observed_for_handler.lock().unwrap().push(output);
    });

    let client = ClientEngine::connect(&profile, None).await.expect("connect client sockets");
    // PUB/SUB subscriptions propagate asynchronously over TCP; give the
    // subscribe a moment to land on the kernel's PUB socket before the
    // kernel starts publishing, or the first status/stream frames are lost.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = Arc::new(client);
    let serve_client = client.clone();
    let serve_handle = tokio::spawn(async move {
        let _ = serve_client
            .serve(kernel_output_handler, noop_client_comm_handler(), noop_kernel_request_handler())
            .await;
    });

    let reply = timeout(
        Duration::from_secs(5),
        client.send_client_request(ClientRequest::ExecuteRequest("print('hi')".into(), ExecuteOptions::default())),
    )
    .await
    .expect("execute_request timed out")
    .expect("execute_request failed");
    assert!(matches!(reply, KernelReply::ExecuteReply(OperationResult::Ok(_))));

    // Wait for all three iopub outputs (busy, stream, idle) to arrive.
    for _ in 0..50 {
        if observed.lock().unwrap().len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let outputs = observed.lock().unwrap().clone();
    assert_eq!(outputs.len(), 3, "expected busy, stream, idle; got {outputs:?}");
    assert_eq!(outputs[0], KernelOutput::KernelStatusOutput(KernelStatus::Busy));
    assert_eq!(outputs[1], KernelOutput::StreamOutput(Stream::Stdout, "hi".into()));
    assert_eq!(outputs[2], KernelOutput::KernelStatusOutput(KernelStatus::Idle));

    token.cancel();
    serve_handle.abort();
}
