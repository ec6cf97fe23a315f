//! Reference consumer for the kiosk push stream.
//!
//! Connects to the kiosk server's event endpoint and logs every snapshot
//! and command it receives, standing in for the avatar renderer.
//!
//! Usage:
//!   kiosk-viewer http://localhost:8080/v1/kiosk/events
//!
//! While running, type on stdin:
//!   r | reconnect  — drop the connection and reconnect now
//!   c | close      — close the stream (reconnect reopens it)
//!   q | quit       — exit (Ctrl-C works too)
//!
//! Env vars:
//!   KIOSK_STREAM_URL               — endpoint when no argument is given
//!   KIOSK_RECONNECT_ENABLED        — "true"/"false" (default: true)
//!   KIOSK_RECONNECT_BASE_DELAY_MS  — first retry delay (default: 3000)
//!   KIOSK_RECONNECT_MAX_DELAY_MS   — retry delay cap (default: 30000)
//!   RUST_LOG                       — log filter (default: info)

use std::time::Duration;

use clap::Parser;
use kiosk_stream::{ConnectionState, ReconnectPolicy, SseOptions, StreamClient, StreamHandlers};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kiosk-viewer", version, about = "Log the kiosk push stream")]
struct Args {
    /// Push endpoint (Server-Sent Events).
    #[arg(env = "KIOSK_STREAM_URL", default_value = "http://localhost:8080/v1/kiosk/events")]
    url: String,

    /// Treat the connection as dead after this many seconds without data.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let policy = ReconnectPolicy::from_env();

    let handlers = StreamHandlers::<serde_json::Value>::new(|state| {
        tracing::info!(state = %state, "snapshot");
    })
    .on_message(|msg| {
        tracing::info!(
            msg_type = %msg.msg_type,
            seq = msg.seq_i64(),
            data = %msg.data,
            "command"
        );
    })
    .on_error(|err| {
        tracing::warn!(error = %err, "stream error");
    });

    let control = StreamClient::builder()
        .url(&args.url)
        .reconnect_policy(policy)
        .sse_options(SseOptions {
            idle_timeout: args.idle_timeout_secs.map(Duration::from_secs),
            ..SseOptions::default()
        })
        .build()?
        .connect(handlers);

    // Log state transitions.
    let mut state = control.watch_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = state.borrow_and_update().clone();
            tracing::info!(state = ?current, "connection state");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => match line.trim() {
                    "r" | "reconnect" => control.reconnect(),
                    "c" | "close" => control.close(),
                    "q" | "quit" => break,
                    "" => {}
                    other => tracing::warn!(input = %other, "unknown command (r, c, q)"),
                },
                // stdin closed (e.g. running under a service manager).
                None => {
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
        }
    }

    control.close();
    let mut state = control.watch_state();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(|s| *s == ConnectionState::Closed),
    )
    .await;
    tracing::info!("viewer exiting");
    Ok(())
}
