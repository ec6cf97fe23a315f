//! Integration test: boots an in-process HTTP server speaking just enough
//! Server-Sent Events, connects a real client with the built-in SSE
//! transport, and checks the outage-and-recovery path end to end:
//!
//! - the first connection gets a 500 and is reported as a transport error
//! - after the back-off delay a new connection is opened
//! - the snapshot and command streamed on it are dispatched normally
//! - the client ends up open with a reset failure count
//!
//! It also checks that the transport gives up on servers that never send
//! headers or never finish an event.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use kiosk_stream::{
    ConfigValue, ConnectionState, MapSource, ReconnectPolicy, ServerMessage, SseOptions,
    SseTransport, StreamClient, StreamError, StreamHandlers, Transport, TransportEvent,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// ── Mini push server ────────────────────────────────────────────────────

const FAILURE: &str =
    "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

const STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\nconnection: close\r\n\r\n";

/// Connection 1 fails with a 500; every later connection streams a
/// snapshot and a command (split across writes) and stays open.
async fn start_push_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((socket, _peer)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(serve(socket, n));
        }
    });

    (addr, accepted)
}

async fn serve(mut socket: TcpStream, n: usize) {
    if read_request_head(&mut socket).await.is_none() {
        return;
    }

    if n == 1 {
        let _ = socket.write_all(FAILURE.as_bytes()).await;
        return;
    }

    let writes = [
        STREAM_HEAD.to_string(),
        ": connected\n\n".to_string(),
        "event: message\ndata: {\"type\":\"kiosk.state.snapshot\",\"seq\":1,".to_string(),
        "\"data\":{\"avatar\":\"mika\"}}\n\n".to_string(),
        "data: {\"type\":\"kiosk.command.play_motion\",\"seq\":2,\"data\":{\"motion\":\"wave\"}}\n\n"
            .to_string(),
    ];
    for chunk in writes {
        if socket.write_all(chunk.as_bytes()).await.is_err() {
            return;
        }
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    hold_open(socket).await;
}

async fn read_request_head(socket: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let read = socket.read(&mut buf).await.ok()?;
        if read == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..read]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return Some(String::from_utf8_lossy(&head).into_owned());
        }
    }
}

#[derive(Debug)]
enum Seen {
    Snapshot(Value),
    Message(ServerMessage),
    Error(StreamError),
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for handler call")
        .expect("handlers dropped")
}

// ── Test ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn recovers_from_server_error_and_dispatches() {
    let (addr, accepted) = start_push_server().await;

    // Same values a deployment would put in its environment.
    let config = MapSource::new()
        .set("reconnect-enabled", ConfigValue::Text("true".into()))
        .set("reconnect-base-delay-ms", ConfigValue::Text("50".into()))
        .set("reconnect-max-delay-ms", ConfigValue::Text("50".into()));
    let policy = ReconnectPolicy::from_source(&config);
    assert_eq!(policy.base_delay(), Duration::from_millis(50));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (t1, t2, t3) = (tx.clone(), tx.clone(), tx);
    let handlers = StreamHandlers::<Value>::new(move |data| {
        let _ = t1.send(Seen::Snapshot(data));
    })
    .on_message(move |msg| {
        let _ = t2.send(Seen::Message(msg));
    })
    .on_error(move |err| {
        let _ = t3.send(Seen::Error(err));
    });

    let started = Instant::now();
    let control = StreamClient::builder()
        .url(format!("http://{addr}/v1/kiosk/events"))
        .reconnect_policy(policy)
        .build()
        .unwrap()
        .connect(handlers);

    match next_seen(&mut rx).await {
        Seen::Error(StreamError::Transport(e)) => {
            assert!(e.message().contains("500"), "unexpected error: {e}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }

    match next_seen(&mut rx).await {
        Seen::Snapshot(data) => assert_eq!(data, json!({"avatar": "mika"})),
        other => panic!("expected snapshot, got {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(50));

    match next_seen(&mut rx).await {
        Seen::Message(msg) => {
            assert_eq!(msg.msg_type, "kiosk.command.play_motion");
            assert_eq!(msg.seq_i64(), Some(2));
            assert_eq!(msg.data, json!({"motion": "wave"}));
        }
        other => panic!("expected message, got {other:?}"),
    }

    assert_eq!(control.state(), ConnectionState::Open);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);

    control.close();
    let mut state = control.watch_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await
    .expect("timeout waiting for close")
    .unwrap();
}

// ── Misbehaving servers ─────────────────────────────────────────────────

/// Accepts every connection, reads the request, then runs `respond`.
async fn start_server<F, Fut>(respond: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        while let Ok((mut socket, _peer)) = listener.accept().await {
            let respond = respond.clone();
            tokio::spawn(async move {
                if read_request_head(&mut socket).await.is_some() {
                    respond(socket).await;
                }
            });
        }
    });
    addr
}

/// Keep the socket open until the client goes away.
async fn hold_open(mut socket: TcpStream) {
    let mut buf = [0u8; 64];
    while let Ok(read) = socket.read(&mut buf).await {
        if read == 0 {
            break;
        }
    }
}

async fn next_event(events: &mut BoxStream<'static, TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("timeout waiting for transport event")
        .expect("transport stream ended")
}

#[tokio::test]
async fn silent_server_times_out_waiting_for_headers() {
    let addr = start_server(hold_open).await;
    let transport = SseTransport::new(SseOptions {
        response_timeout: Duration::from_millis(100),
        ..SseOptions::default()
    })
    .unwrap();

    let mut events = transport.open(&format!("http://{addr}/v1/kiosk/events"));
    match next_event(&mut events).await {
        TransportEvent::Error(e) => assert!(e.message().contains("no response"), "{e}"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(events.next().await.is_none());
}

#[tokio::test]
async fn endless_event_is_cut_off() {
    let addr = start_server(|mut socket: TcpStream| async move {
        let _ = socket.write_all(STREAM_HEAD.as_bytes()).await;
        let _ = socket.write_all(format!("data: {}", "x".repeat(256)).as_bytes()).await;
        let _ = socket.flush().await;
        hold_open(socket).await;
    })
    .await;
    let transport = SseTransport::new(SseOptions {
        max_event_bytes: 64,
        ..SseOptions::default()
    })
    .unwrap();

    let mut events = transport.open(&format!("http://{addr}/v1/kiosk/events"));
    assert_eq!(next_event(&mut events).await, TransportEvent::Open);
    match next_event(&mut events).await {
        TransportEvent::Error(e) => assert!(e.message().contains("exceeded 64 bytes"), "{e}"),
        other => panic!("expected error, got {other:?}"),
    }
}
