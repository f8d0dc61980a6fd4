//! WebSocket connection to the signaling relay.
//!
//! One writer task serializes outbound [`SignalMessage`]s as JSON text frames;
//! one reader task parses inbound text frames and forwards them. When the
//! socket closes the inbound channel closes with it.

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use tether_shared::SignalMessage;

const RELAY_QUEUE: usize = 256;

pub struct RelayConnection {
    /// Queue frames for the relay. Clone freely.
    pub outbound: mpsc::Sender<SignalMessage>,
    /// Closes when the socket does.
    pub inbound: mpsc::Receiver<SignalMessage>,
}

/// Open the relay socket and spawn its reader and writer tasks. The writer
/// stops once every clone of `outbound` is dropped.
pub async fn connect(relay_url: &str) -> anyhow::Result<RelayConnection> {
    let url = Url::parse(relay_url).with_context(|| format!("invalid relay url {relay_url}"))?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to relay at {url}"))?;
    info!(url = %url, "Connected to relay");

    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<SignalMessage>(RELAY_QUEUE);
    let (in_tx, in_rx) = mpsc::channel::<SignalMessage>(RELAY_QUEUE);

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(event = msg.event_name(), error = %e, "Failed to encode signal");
                    continue;
                }
            };
            debug!(event = msg.event_name(), "Relay send");
            if let Err(e) = write.send(Message::Text(text)).await {
                warn!(error = %e, "Relay send failed");
                break;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bin)) => match String::from_utf8(bin) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Relay socket error");
                    break;
                }
            };
            let Some(msg) = decode(&text) else {
                continue;
            };
            if in_tx.send(msg).await.is_err() {
                break;
            }
        }
        info!("Relay connection closed");
    });

    Ok(RelayConnection {
        outbound: out_tx,
        inbound: in_rx,
    })
}

/// Parse one relay frame. Unknown events are logged and skipped.
fn decode(text: &str) -> Option<SignalMessage> {
    match SignalMessage::from_json(text) {
        Ok(msg) => {
            debug!(event = msg.event_name(), "Relay recv");
            Some(msg)
        }
        Err(e) => {
            warn!(error = %e, len = text.len(), "Ignoring unrecognised relay frame");
            None
        }
    }
}
