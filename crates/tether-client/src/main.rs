//! # tether
//!
//! Terminal chat client. Finds peers through a WebSocket signaling relay,
//! talks to them over direct WebRTC data channels, and keeps a local SQLite
//! log so messages that arrived while offline are replayed on startup.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tether_client::events::{render, UiEvent};
use tether_client::{relay, App, AppInputs, ClientConfig};
use tether_session::{SendOptions, SessionManager, WebRtcTransport};
use tether_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing goes to stderr; stdout is the chat surface
    // -----------------------------------------------------------------------
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("tether_client=debug,tether_session=debug,tether_store=info,warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("Starting tether v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration and storage
    // -----------------------------------------------------------------------
    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    tokio::fs::create_dir_all(&config.downloads_dir)
        .await
        .with_context(|| format!("creating {}", config.downloads_dir.display()))?;

    // -----------------------------------------------------------------------
    // 3. Relay, sessions, UI
    // -----------------------------------------------------------------------
    let relay = relay::connect(&config.relay_url).await?;

    let transport = Arc::new(WebRtcTransport::new(config.ice_servers.clone()));
    let (sessions, session_channels) =
        SessionManager::new(transport, relay.outbound.clone(), &config.downloads_dir);
    let sessions = sessions.with_send_options(SendOptions {
        chunk_delay: config.chunk_delay,
        ..SendOptions::default()
    });

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiEvent>();
    tokio::spawn(async move {
        let mut current: Option<String> = None;
        while let Some(event) = ui_rx.recv().await {
            if let UiEvent::Show { recipient, .. } = &event {
                current = Some(recipient.clone());
            }
            let mut out = std::io::stdout().lock();
            for line in render(&event, current.as_deref()) {
                let _ = writeln!(out, "{line}");
            }
            let _ = out.flush();
        }
    });

    let (line_tx, line_rx) = mpsc::channel::<String>(64);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    // -----------------------------------------------------------------------
    // 4. Run until /quit, end of input, relay loss or Ctrl+C
    // -----------------------------------------------------------------------
    let app = App::new(db, sessions, relay.outbound.clone(), ui_tx);
    let inputs = AppInputs {
        relay: relay.inbound,
        sessions: session_channels,
        commands: line_rx,
    };

    tokio::select! {
        result = app.run(inputs) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
