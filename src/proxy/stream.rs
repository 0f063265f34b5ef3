//! Bridges an upgraded client WebSocket to the pod attach stream.
//!
//! The attach subresource multiplexes stdin/stdout/stderr with a one-byte
//! channel prefix per frame; the kube attach client applies and strips that
//! prefix and hands us plain byte pipes. On the client side every frame is
//! raw terminal bytes with no prefix: inbound payloads go straight to the
//! stdin pipe, stdout bytes go out as binary frames. Each direction runs in
//! its own task so a stalled writer never blocks the other direction.

use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, AttachParams, TerminalSize},
    Client,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
    time,
};
use tracing::{debug, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(5);
const READ_BUFFER_SIZE: usize = 4096;
const INITIAL_TERMINAL_WIDTH: u16 = 120;
const INITIAL_TERMINAL_HEIGHT: u16 = 40;

/// Traffic for the single writer task owning the client sink.
enum Outbound {
    Data(Vec<u8>),
    Ping,
    Close(Option<CloseFrame>),
}

/// Attach to the debugger container and pump bytes both ways until either
/// side closes.
pub async fn bridge(socket: WebSocket, client: Client, ns: String, pod: String, container: String) {
    let pods: Api<Pod> = Api::namespaced(client, &ns);
    let params = AttachParams::interactive_tty().container(&container);

    let attached = match pods.attach(&pod, &params).await {
        Ok(attached) => attached,
        Err(err) => {
            warn!("Failed to open attach stream for {ns}/{pod}: {err}");
            close_with(socket, close_code::ERROR, &format!("attach failed: {err}")).await;
            return;
        }
    };

    pump(socket, attached, &ns, &pod).await;
    info!("Attach session for {ns}/{pod} ended");
}

async fn close_with(mut socket: WebSocket, code: u16, reason: &str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

async fn pump(socket: WebSocket, mut attached: kube::api::AttachedProcess, ns: &str, pod: &str) {
    let Some(mut stdin) = attached.stdin() else {
        close_with(socket, close_code::ERROR, "attach stream has no stdin").await;
        return;
    };
    let Some(mut stdout) = attached.stdout() else {
        close_with(socket, close_code::ERROR, "attach stream has no stdout").await;
        return;
    };

    // Seed the terminal size once; the queue closes when the sender drops at
    // the end of the session.
    let mut size_tx = attached.terminal_size();
    if let Some(tx) = &mut size_tx {
        let _ = tx
            .send(TerminalSize {
                width: INITIAL_TERMINAL_WIDTH,
                height: INITIAL_TERMINAL_HEIGHT,
            })
            .await;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(32);

    // Writer: sole owner of the client sink. Pings get a short write
    // deadline; a missed ping alone never ends the session.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let result = match outbound {
                Outbound::Data(data) => ws_tx.send(Message::Binary(data.into())).await,
                Outbound::Ping => {
                    match time::timeout(
                        PING_WRITE_DEADLINE,
                        ws_tx.send(Message::Ping(Vec::new().into())),
                    )
                    .await
                    {
                        Ok(sent) => sent,
                        Err(_) => {
                            debug!("Keepalive ping write timed out");
                            continue;
                        }
                    }
                }
                Outbound::Close(frame) => {
                    let _ = ws_tx.send(Message::Close(frame)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let pinger = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(PING_INTERVAL);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                if out_tx.send(Outbound::Ping).await.is_err() {
                    return;
                }
            }
        })
    };

    // Container -> client: forward stdout bytes as binary frames; EOF closes
    // the client normally, a read error closes it with an error code.
    let stdout_task = {
        let out_tx = out_tx.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        let _ = out_tx
                            .send(Outbound::Close(Some(CloseFrame {
                                code: close_code::NORMAL,
                                reason: "".into(),
                            })))
                            .await;
                        return;
                    }
                    Ok(n) => {
                        if out_tx.send(Outbound::Data(buf[..n].to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = out_tx
                            .send(Outbound::Close(Some(CloseFrame {
                                code: close_code::ERROR,
                                reason: err.to_string().into(),
                            })))
                            .await;
                        return;
                    }
                }
            }
        })
    };

    // Client -> container: frame payloads are raw stdin bytes. Client EOF
    // ends the loop and closes the stdin pipe below.
    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Binary(data)) => {
                if stdin.write_all(&data).await.is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                if stdin.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // pings and pongs are handled by the transport
            Err(err) => {
                debug!("Client read error for {ns}/{pod}: {err}");
                break;
            }
        }
    }

    let _ = stdin.shutdown().await;
    drop(stdin);
    drop(size_tx);
    drop(out_tx);

    // Give the writer a moment to flush a pending close frame, then tear
    // everything down.
    pinger.abort();
    stdout_task.abort();
    let _ = time::timeout(Duration::from_secs(1), writer).await;
}
