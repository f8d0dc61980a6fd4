//! Chunked file transfer over a session's data channel.
//!
//! Frame sequence, identical in both directions:
//!
//! ```text
//! text   {"type":"file-meta","name":"report.pdf","size":40000}
//! binary <16384 bytes>
//! binary <16384 bytes>
//! binary <7232 bytes>
//! text   {"type":"file-end"}
//! ```
//!
//! There is no receiver-driven flow control. The sender sleeps a fixed delay
//! between chunks, which bounds its burstiness and nothing else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use tether_shared::constants::{FILE_CHUNK_DELAY_MS, FILE_CHUNK_SIZE, PROGRESS_STEPS};
use tether_shared::{PeerId, TransferFrame};

use crate::error::TransferError;
use crate::transport::{ChannelFrame, ChannelHandle};

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Classification of one inbound channel frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Control(TransferFrame),
    Chunk(Bytes),
    Chat(String),
}

/// Text frames are tried as transfer control frames first; anything that is
/// not one of those shapes is chat.
pub fn decode(frame: ChannelFrame) -> Inbound {
    match frame {
        ChannelFrame::Binary(data) => Inbound::Chunk(data),
        ChannelFrame::Text(text) => match TransferFrame::parse(&text) {
            Some(control) => Inbound::Control(control),
            None => Inbound::Chat(text),
        },
    }
}

/// Percentage to report when cumulative progress moves from `before` to
/// `after` bytes, if that move crosses a 10% boundary.
pub fn progress_step(before: u64, after: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let steps = PROGRESS_STEPS as u128;
    let (before, after, total) = (before as u128, after as u128, total as u128);
    if after * steps / total > before * steps / total {
        Some((after * 100 / total).min(100) as u8)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferNotice {
    Started {
        peer: PeerId,
        name: String,
        size: u64,
    },
    Progress {
        peer: PeerId,
        direction: Direction,
        percent: u8,
    },
    Completed {
        peer: PeerId,
        name: String,
        path: PathBuf,
        bytes_received: u64,
        declared_size: u64,
    },
    /// Outgoing file fully handed to the channel.
    Sent {
        peer: PeerId,
        name: String,
        size: u64,
    },
    Aborted {
        peer: PeerId,
        name: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Receiving
// ---------------------------------------------------------------------------

/// Bookkeeping for a file that is mid-flight from one peer.
#[derive(Debug)]
pub struct TransferState {
    pub file_name: String,
    pub declared_size: u64,
    pub bytes_received: u64,
    pub path: PathBuf,
    sink: File,
}

/// Per-peer table of inbound transfers, at most one per peer.
#[derive(Debug)]
pub struct InboundTransfers {
    downloads_dir: PathBuf,
    active: HashMap<PeerId, TransferState>,
}

impl InboundTransfers {
    pub fn new(downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloads_dir: downloads_dir.into(),
            active: HashMap::new(),
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn is_active(&self, peer: &PeerId) -> bool {
        self.active.contains_key(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&TransferState> {
        self.active.get(peer)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Feed one decoded control frame or chunk from `peer`.
    pub async fn handle(&mut self, peer: &PeerId, inbound: Inbound) -> Vec<TransferNotice> {
        match inbound {
            Inbound::Control(TransferFrame::FileMeta { name, size }) => {
                self.on_meta(peer, &name, size).await
            }
            Inbound::Control(TransferFrame::FileEnd) => self.on_end(peer).await,
            Inbound::Chunk(data) => self.on_chunk(peer, &data).await,
            Inbound::Chat(_) => Vec::new(),
        }
    }

    async fn on_meta(&mut self, peer: &PeerId, name: &str, size: u64) -> Vec<TransferNotice> {
        let mut notices = Vec::new();

        if self.active.contains_key(peer) {
            warn!(peer = %peer.short(), "file-meta while a transfer is active, aborting it");
            notices.extend(self.abort(peer, "superseded by a new file-meta").await);
        }

        let Some(file_name) = sanitize_file_name(name) else {
            warn!(peer = %peer.short(), name, "rejecting file-meta with unusable name");
            notices.push(TransferNotice::Aborted {
                peer: peer.clone(),
                name: name.to_string(),
                reason: "unusable file name".to_string(),
            });
            return notices;
        };

        let path = self.downloads_dir.join(&file_name);
        let sink = match File::create(&path).await {
            Ok(f) => f,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to create download sink");
                notices.push(TransferNotice::Aborted {
                    peer: peer.clone(),
                    name: file_name,
                    reason: e.to_string(),
                });
                return notices;
            }
        };

        info!(peer = %peer.short(), name = %file_name, size, "receiving file");
        notices.push(TransferNotice::Started {
            peer: peer.clone(),
            name: file_name.clone(),
            size,
        });

        self.active.insert(
            peer.clone(),
            TransferState {
                file_name,
                declared_size: size,
                bytes_received: 0,
                path,
                sink,
            },
        );
        notices
    }

    async fn on_chunk(&mut self, peer: &PeerId, data: &[u8]) -> Vec<TransferNotice> {
        let Some(state) = self.active.get_mut(peer) else {
            warn!(peer = %peer.short(), len = data.len(), "binary frame with no active transfer, dropped");
            return Vec::new();
        };

        if let Err(e) = state.sink.write_all(data).await {
            error!(path = %state.path.display(), error = %e, "write to download sink failed");
            return self.abort(peer, &e.to_string()).await;
        }

        let before = state.bytes_received;
        state.bytes_received += data.len() as u64;

        match progress_step(before, state.bytes_received, state.declared_size) {
            Some(percent) => {
                debug!(peer = %peer.short(), percent, "receive progress");
                vec![TransferNotice::Progress {
                    peer: peer.clone(),
                    direction: Direction::Incoming,
                    percent,
                }]
            }
            None => Vec::new(),
        }
    }

    async fn on_end(&mut self, peer: &PeerId) -> Vec<TransferNotice> {
        let Some(mut state) = self.active.remove(peer) else {
            warn!(peer = %peer.short(), "file-end with no active transfer, dropped");
            return Vec::new();
        };

        if let Err(e) = state.sink.flush().await {
            error!(path = %state.path.display(), error = %e, "flushing download sink failed");
            return vec![TransferNotice::Aborted {
                peer: peer.clone(),
                name: state.file_name,
                reason: e.to_string(),
            }];
        }

        if state.bytes_received != state.declared_size {
            warn!(
                peer = %peer.short(),
                received = state.bytes_received,
                declared = state.declared_size,
                "received size does not match declared size"
            );
        }
        info!(peer = %peer.short(), path = %state.path.display(), "file received");

        vec![TransferNotice::Completed {
            peer: peer.clone(),
            name: state.file_name,
            path: state.path,
            bytes_received: state.bytes_received,
            declared_size: state.declared_size,
        }]
    }

    /// Force-close any active sink for `peer`. The partial file stays on disk.
    pub async fn abort(&mut self, peer: &PeerId, reason: &str) -> Vec<TransferNotice> {
        let Some(mut state) = self.active.remove(peer) else {
            return Vec::new();
        };
        if let Err(e) = state.sink.flush().await {
            debug!(error = %e, "flush on abort failed");
        }
        warn!(
            peer = %peer.short(),
            name = %state.file_name,
            received = state.bytes_received,
            reason,
            "transfer aborted"
        );
        vec![TransferNotice::Aborted {
            peer: peer.clone(),
            name: state.file_name,
            reason: reason.to_string(),
        }]
    }
}

/// Keep only the final path component of a declared name.
fn sanitize_file_name(name: &str) -> Option<String> {
    let file_name = Path::new(name).file_name()?.to_str()?;
    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return None;
    }
    Some(file_name.to_string())
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub chunk_size: usize,
    pub chunk_delay: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunk_size: FILE_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(FILE_CHUNK_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFile {
    pub name: String,
    pub size: u64,
    pub chunks: usize,
}

/// Read `path` fully and stream it over `channel`.
///
/// On a read or send error the transfer stops and no `file-end` is sent; the
/// receiver keeps whatever partial file it has.
pub async fn send_file(
    channel: ChannelHandle,
    path: &Path,
    options: &SendOptions,
    on_progress: impl FnMut(u8),
) -> Result<SentFile, TransferError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(TransferError::InvalidFileName)?
        .to_string();

    let data = tokio::fs::read(path).await?;
    info!(name = %name, size = data.len(), "sending file");

    send_bytes(channel, &name, Bytes::from(data), options, on_progress).await
}

/// Stream an in-memory buffer as a named file.
pub async fn send_bytes(
    channel: ChannelHandle,
    name: &str,
    data: Bytes,
    options: &SendOptions,
    mut on_progress: impl FnMut(u8),
) -> Result<SentFile, TransferError> {
    let size = data.len() as u64;
    let chunk_size = options.chunk_size.max(1);

    let meta = TransferFrame::FileMeta {
        name: name.to_string(),
        size,
    };
    channel.send(ChannelFrame::Text(meta.to_json()?)).await?;

    let mut sent: u64 = 0;
    let mut chunks = 0;
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        let chunk = data.slice(offset..end);
        let len = chunk.len() as u64;
        channel.send(ChannelFrame::Binary(chunk)).await?;
        chunks += 1;
        offset = end;

        if let Some(percent) = progress_step(sent, sent + len, size) {
            on_progress(percent);
        }
        sent += len;

        if !options.chunk_delay.is_zero() {
            tokio::time::sleep(options.chunk_delay).await;
        }
    }

    channel
        .send(ChannelFrame::Text(TransferFrame::FileEnd.to_json()?))
        .await?;

    info!(name, size, chunks, "file sent");
    Ok(SentFile {
        name: name.to_string(),
        size,
        chunks,
    })
}
