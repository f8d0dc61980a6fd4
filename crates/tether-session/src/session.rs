use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tether_shared::constants::MAX_PENDING_CANDIDATES;
use tether_shared::{IceCandidate, PeerId};

use crate::transport::{ChannelHandle, PeerLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing negotiated yet
    Idle,
    /// Local offer sent, waiting for the answer
    Offering,
    /// Remote description applied, waiting for the channel
    Negotiating,
    /// Channel open
    Connected,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// The live connection state for one peer. Owns its transport link.
pub struct Session {
    pub peer: PeerId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    /// Set while our offer is outstanding
    pub pending_offer: bool,
    pub(crate) epoch: u64,
    link: Box<dyn PeerLink>,
    pending_candidates: Vec<IceCandidate>,
}

impl Session {
    pub(crate) fn new(peer: PeerId, epoch: u64, link: Box<dyn PeerLink>) -> Self {
        Self {
            peer,
            state: SessionState::Idle,
            created_at: Utc::now(),
            pending_offer: false,
            epoch,
            link,
            pending_candidates: Vec::new(),
        }
    }

    pub(crate) fn link(&self) -> &dyn PeerLink {
        self.link.as_ref()
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        debug!(peer = %self.peer.short(), from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Channel handle, only while connected and the channel reports open.
    pub fn open_channel(&self) -> Option<ChannelHandle> {
        if self.state != SessionState::Connected {
            return None;
        }
        self.link.channel().filter(|ch| ch.is_open())
    }

    pub(crate) fn buffer_candidate(&mut self, candidate: IceCandidate) {
        if self.pending_candidates.len() >= MAX_PENDING_CANDIDATES {
            warn!(peer = %self.peer.short(), "candidate buffer full, dropping candidate");
            return;
        }
        self.pending_candidates.push(candidate);
    }

    #[cfg(test)]
    pub(crate) fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    pub(crate) fn take_pending_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    /// Close channel and link. Never fails: errors are logged and dropped.
    pub(crate) async fn shutdown(&mut self) {
        if let Some(channel) = self.link.channel() {
            if let Err(e) = channel.close().await {
                debug!(peer = %self.peer.short(), error = %e, "error closing data channel");
            }
        }
        if let Err(e) = self.link.close().await {
            warn!(peer = %self.peer.short(), error = %e, "error closing peer connection");
        }
        if !self.state.is_terminal() {
            self.transition(SessionState::Closed);
        }
    }
}
