//! The seam between the session state machine and whatever performs the
//! actual negotiation (WebRTC in production, an in-memory hub in tests).
//!
//! Transports never call back into the manager. Everything they observe
//! asynchronously (local ICE candidates, channel open/close, inbound frames,
//! failures) is pushed as a [`SessionEvent`] into the manager's queue, tagged
//! with the epoch of the session that produced it so events from a torn-down
//! session can be recognised and dropped.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use tether_shared::{IceCandidate, PeerId, SessionDescription};

use crate::error::TransportError;

/// One message on the session's data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    Text(String),
    Binary(Bytes),
}

impl ChannelFrame {
    pub fn len(&self) -> usize {
        match self {
            ChannelFrame::Text(s) => s.len(),
            ChannelFrame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a transport observed for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    /// Local ICE candidate to trickle to the remote side.
    LocalCandidate(IceCandidate),
    /// The data channel is open in both directions.
    ChannelOpened,
    /// The data channel closed or errored after being established.
    ChannelClosed,
    /// Inbound frame on the data channel.
    Frame(ChannelFrame),
    /// Negotiation or connectivity failed; the session cannot recover.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub peer: PeerId,
    pub epoch: u64,
    pub kind: SessionEventKind,
}

/// Handle a transport uses to report events for one session.
#[derive(Debug, Clone)]
pub struct EventSink {
    peer: PeerId,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub(crate) fn new(peer: PeerId, epoch: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { peer, epoch, tx }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Queue an event. Silently dropped once the manager is gone.
    pub fn emit(&self, kind: SessionEventKind) {
        let _ = self.tx.send(SessionEvent {
            peer: self.peer.clone(),
            epoch: self.epoch,
            kind,
        });
    }
}

/// Sending half of an established data channel.
pub trait DataChannel: Send + Sync {
    fn is_open(&self) -> bool;

    /// Resolves once the transport has accepted the frame for transmission.
    fn send(&self, frame: ChannelFrame) -> BoxFuture<'_, Result<(), TransportError>>;

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Cloneable channel handle handed to senders (file transfers run outside
/// the event loop and hold one of these).
pub type ChannelHandle = Arc<dyn DataChannel>;

/// One negotiated (or negotiating) connection to a single peer.
pub trait PeerLink: Send + Sync {
    /// Open the outbound data channel, create an offer and apply it locally.
    fn create_offer(&self) -> BoxFuture<'_, Result<SessionDescription, TransportError>>;

    /// Apply a remote offer, create an answer and apply it locally. The
    /// inbound data channel is accepted when the remote side opens it.
    fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> BoxFuture<'_, Result<SessionDescription, TransportError>>;

    /// Apply the remote answer to a link that created an offer.
    fn apply_answer(&self, answer: SessionDescription) -> BoxFuture<'_, Result<(), TransportError>>;

    fn add_ice_candidate(&self, candidate: IceCandidate)
        -> BoxFuture<'_, Result<(), TransportError>>;

    fn has_remote_description(&self) -> BoxFuture<'_, bool>;

    /// The data channel, once one exists on this link.
    fn channel(&self) -> Option<ChannelHandle>;

    /// Close channel and connection. Callers treat failures as best-effort.
    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Factory for [`PeerLink`]s.
pub trait Transport: Send + Sync {
    fn open_link(
        &self,
        peer: &PeerId,
        events: EventSink,
    ) -> BoxFuture<'_, Result<Box<dyn PeerLink>, TransportError>>;
}
