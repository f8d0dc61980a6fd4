//! Per-peer session orchestration.
//!
//! [`SessionManager`] is the single owner of the session table and the
//! inbound transfer table. Signaling events, transport events and user
//! requests all arrive as `&mut self` calls on one task, so replacing a
//! session ("tear down old, install new") is atomic with respect to every
//! other event for that peer.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use tether_shared::{IceCandidate, PeerId, SessionDescription, SignalMessage};

use crate::error::{SessionError, TransportError};
use crate::session::{Session, SessionState};
use crate::transfer::{self, Inbound, InboundTransfers, SendOptions, TransferNotice};
use crate::transport::{
    ChannelFrame, ChannelHandle, EventSink, SessionEvent, SessionEventKind, Transport,
};

/// What the manager reports to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Connected(PeerId),
    Disconnected(PeerId),
    Failed { peer: PeerId, reason: String },
    Chat { peer: PeerId, text: String },
    Transfer(TransferNotice),
}

/// Receiving ends handed back by [`SessionManager::new`].
pub struct SessionChannels {
    /// Transport events; feed each one back into [`SessionManager::handle_event`].
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    signal_tx: mpsc::Sender<SignalMessage>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    notices_tx: mpsc::UnboundedSender<SessionNotice>,
    sessions: HashMap<PeerId, Session>,
    transfers: InboundTransfers,
    send_options: SendOptions,
    next_epoch: u64,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        signal_tx: mpsc::Sender<SignalMessage>,
        downloads_dir: impl Into<PathBuf>,
    ) -> (Self, SessionChannels) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (notices_tx, notices) = mpsc::unbounded_channel();
        let manager = Self {
            transport,
            signal_tx,
            events_tx,
            notices_tx,
            sessions: HashMap::new(),
            transfers: InboundTransfers::new(downloads_dir),
            send_options: SendOptions::default(),
            next_epoch: 0,
        };
        (manager, SessionChannels { events, notices })
    }

    pub fn with_send_options(mut self, options: SendOptions) -> Self {
        self.send_options = options;
        self
    }

    // ------------------------------------------------------------------
    // Signaling-driven lifecycle
    // ------------------------------------------------------------------

    /// Establish a session with `peer` unless one is already connected.
    pub async fn connect(&mut self, peer: &PeerId) -> Result<(), SessionError> {
        if self.channel(peer).is_some() {
            debug!(peer = %peer.short(), "Already connected");
            return Ok(());
        }
        self.teardown(peer).await;

        let mut session = self.open_session(peer).await?;
        let created = session.link().create_offer().await;
        let offer = match created {
            Ok(offer) => offer,
            Err(e) => return Err(self.abandon(session, e).await),
        };
        session.pending_offer = true;
        session.transition(SessionState::Offering);
        self.sessions.insert(peer.clone(), session);

        info!(peer = %peer.short(), "Sending offer");
        self.signal(SignalMessage::Offer {
            peer: peer.clone(),
            description: offer,
        })
        .await
    }

    /// Inbound offer. The most recent offer always wins: any existing
    /// session for `peer` is discarded first.
    ///
    /// Glare is not resolved: if both sides connect at once, each answers the
    /// other's offer, drops the other's answer as stale and stays Negotiating.
    pub async fn handle_offer(
        &mut self,
        peer: &PeerId,
        offer: SessionDescription,
    ) -> Result<(), SessionError> {
        if self.sessions.contains_key(peer) {
            info!(peer = %peer.short(), "Offer replaces existing session");
        }
        self.teardown(peer).await;

        let mut session = self.open_session(peer).await?;
        let accepted = session.link().accept_offer(offer).await;
        let answer = match accepted {
            Ok(answer) => answer,
            Err(e) => return Err(self.abandon(session, e).await),
        };
        session.transition(SessionState::Negotiating);
        self.sessions.insert(peer.clone(), session);

        debug!(peer = %peer.short(), "Sending answer");
        self.signal(SignalMessage::Answer {
            peer: peer.clone(),
            description: answer,
        })
        .await
    }

    /// Apply an answer to a session that is waiting for one. Anything else
    /// is a stale or duplicate answer and is ignored.
    pub async fn handle_answer(
        &mut self,
        peer: &PeerId,
        answer: SessionDescription,
    ) -> Result<(), SessionError> {
        let Some(session) = self.sessions.get_mut(peer) else {
            debug!(peer = %peer.short(), "Answer for unknown session ignored");
            return Ok(());
        };
        if !session.pending_offer || session.state != SessionState::Offering {
            debug!(peer = %peer.short(), state = ?session.state, "Stale answer ignored");
            return Ok(());
        }

        let applied = session.link().apply_answer(answer).await;
        if let Err(e) = applied {
            return Err(self.fail(peer, e).await);
        }
        session.pending_offer = false;
        session.transition(SessionState::Negotiating);

        self.flush_candidates(peer).await
    }

    /// Remote ICE candidate. Buffered until the remote description lands.
    pub async fn handle_ice_candidate(
        &mut self,
        peer: &PeerId,
        candidate: IceCandidate,
    ) -> Result<(), SessionError> {
        let Some(session) = self.sessions.get_mut(peer) else {
            trace!(peer = %peer.short(), "Candidate for unknown session ignored");
            return Ok(());
        };

        if !session.link().has_remote_description().await {
            session.buffer_candidate(candidate);
            return Ok(());
        }
        let added = session.link().add_ice_candidate(candidate).await;
        if let Err(e) = added {
            return Err(self.fail(peer, e).await);
        }
        Ok(())
    }

    /// Tear down the session for `peer`, if any.
    pub async fn close(&mut self, peer: &PeerId) {
        if self.sessions.contains_key(peer) {
            info!(peer = %peer.short(), "Closing session");
        }
        self.teardown(peer).await;
    }

    /// Tear down every session. Used on shutdown.
    pub async fn close_all(&mut self) {
        let peers: Vec<PeerId> = self.sessions.keys().cloned().collect();
        for peer in peers {
            self.teardown(&peer).await;
        }
    }

    // ------------------------------------------------------------------
    // Data
    // ------------------------------------------------------------------

    /// Write one frame to a connected peer. Returns once the transport has
    /// accepted it; there is no delivery acknowledgment.
    pub async fn send(&self, peer: &PeerId, frame: ChannelFrame) -> Result<(), SessionError> {
        let channel = self
            .channel(peer)
            .ok_or_else(|| SessionError::NoActiveConnection(peer.clone()))?;
        channel.send(frame).await.map_err(|source| SessionError::Send {
            peer: peer.clone(),
            source,
        })
    }

    pub async fn send_text(&self, peer: &PeerId, text: &str) -> Result<(), SessionError> {
        self.send(peer, ChannelFrame::Text(text.to_string())).await
    }

    /// Stream a file to `peer` on a background task. Progress and the final
    /// outcome arrive as [`SessionNotice::Transfer`].
    pub fn send_file(&self, peer: &PeerId, path: PathBuf) -> Result<JoinHandle<()>, SessionError> {
        let channel = self
            .channel(peer)
            .ok_or_else(|| SessionError::NoActiveConnection(peer.clone()))?;
        let options = self.send_options.clone();
        let notices = self.notices_tx.clone();
        let peer = peer.clone();

        Ok(tokio::spawn(async move {
            let progress_peer = peer.clone();
            let progress = |percent| {
                let _ = notices.send(SessionNotice::Transfer(TransferNotice::Progress {
                    peer: progress_peer.clone(),
                    direction: transfer::Direction::Outgoing,
                    percent,
                }));
            };
            let outcome = match transfer::send_file(channel, &path, &options, progress).await {
                Ok(sent) => TransferNotice::Sent {
                    peer,
                    name: sent.name,
                    size: sent.size,
                },
                Err(e) => {
                    warn!(peer = %peer.short(), path = %path.display(), error = %e, "File send failed");
                    TransferNotice::Aborted {
                        peer,
                        name: path.display().to_string(),
                        reason: e.to_string(),
                    }
                }
            };
            let _ = notices.send(SessionNotice::Transfer(outcome));
        }))
    }

    /// Channel handle for a connected peer.
    pub fn channel(&self, peer: &PeerId) -> Option<ChannelHandle> {
        self.sessions.get(peer)?.open_channel()
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    pub async fn handle_event(&mut self, event: SessionEvent) {
        let SessionEvent { peer, epoch, kind } = event;
        let Some(session) = self.sessions.get_mut(&peer) else {
            trace!(peer = %peer.short(), "Event for unknown session dropped");
            return;
        };
        if session.epoch != epoch {
            debug!(peer = %peer.short(), epoch, current = session.epoch, "Event from superseded session dropped");
            return;
        }

        match kind {
            SessionEventKind::LocalCandidate(candidate) => {
                let msg = SignalMessage::IceCandidate {
                    peer: peer.clone(),
                    candidate,
                };
                if let Err(e) = self.signal(msg).await {
                    warn!(peer = %peer.short(), error = %e, "Could not forward local candidate");
                }
            }
            SessionEventKind::ChannelOpened => {
                if session.state == SessionState::Connected {
                    return;
                }
                session.pending_offer = false;
                session.transition(SessionState::Connected);
                info!(peer = %peer.short(), "Session connected");
                self.notify(SessionNotice::Connected(peer));
            }
            SessionEventKind::ChannelClosed => {
                info!(peer = %peer.short(), "Channel closed by transport");
                self.teardown(&peer).await;
            }
            SessionEventKind::Failed(reason) => {
                if session.state == SessionState::Connected {
                    warn!(peer = %peer.short(), reason = %reason, "Transport failed after connect");
                    self.teardown(&peer).await;
                } else {
                    self.fail(&peer, TransportError::Other(reason)).await;
                }
            }
            SessionEventKind::Frame(frame) => self.on_frame(&peer, frame).await,
        }
    }

    async fn on_frame(&mut self, peer: &PeerId, frame: ChannelFrame) {
        match transfer::decode(frame) {
            Inbound::Chat(text) => self.notify(SessionNotice::Chat {
                peer: peer.clone(),
                text,
            }),
            inbound => {
                for notice in self.transfers.handle(peer, inbound).await {
                    self.notify(SessionNotice::Transfer(notice));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self, peer: &PeerId) -> Option<SessionState> {
        self.sessions.get(peer).map(|s| s.state)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.channel(peer).is_some()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.state == SessionState::Connected)
            .map(|(p, _)| p.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn has_active_transfer(&self, peer: &PeerId) -> bool {
        self.transfers.is_active(peer)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn open_session(&mut self, peer: &PeerId) -> Result<Session, SessionError> {
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let sink = EventSink::new(peer.clone(), epoch, self.events_tx.clone());

        match self.transport.open_link(peer, sink).await {
            Ok(link) => Ok(Session::new(peer.clone(), epoch, link)),
            Err(source) => {
                warn!(peer = %peer.short(), error = %source, "Could not create transport link");
                self.notify(SessionNotice::Failed {
                    peer: peer.clone(),
                    reason: source.to_string(),
                });
                Err(SessionError::Negotiation {
                    peer: peer.clone(),
                    source,
                })
            }
        }
    }

    /// Discard a session that never made it into the table.
    async fn abandon(&mut self, mut session: Session, source: TransportError) -> SessionError {
        let peer = session.peer.clone();
        warn!(peer = %peer.short(), error = %source, "Negotiation failed");
        session.transition(SessionState::Failed);
        session.shutdown().await;
        self.notify(SessionNotice::Failed {
            peer: peer.clone(),
            reason: source.to_string(),
        });
        SessionError::Negotiation { peer, source }
    }

    /// Remove a session after a negotiation or transport failure.
    async fn fail(&mut self, peer: &PeerId, source: TransportError) -> SessionError {
        for notice in self.transfers.abort(peer, "session failed").await {
            self.notify(SessionNotice::Transfer(notice));
        }
        match self.sessions.remove(peer) {
            Some(session) => self.abandon(session, source).await,
            None => SessionError::Negotiation {
                peer: peer.clone(),
                source,
            },
        }
    }

    /// Close and forget the session for `peer`. Never fails.
    async fn teardown(&mut self, peer: &PeerId) {
        for notice in self.transfers.abort(peer, "session closed").await {
            self.notify(SessionNotice::Transfer(notice));
        }
        let Some(mut session) = self.sessions.remove(peer) else {
            return;
        };
        let was_connected = session.state == SessionState::Connected;
        session.shutdown().await;
        if was_connected {
            self.notify(SessionNotice::Disconnected(peer.clone()));
        }
    }

    async fn flush_candidates(&mut self, peer: &PeerId) -> Result<(), SessionError> {
        let Some(session) = self.sessions.get_mut(peer) else {
            return Ok(());
        };
        let pending = session.take_pending_candidates();
        if !pending.is_empty() {
            debug!(peer = %peer.short(), count = pending.len(), "Applying buffered candidates");
        }
        for candidate in pending {
            let added = session.link().add_ice_candidate(candidate).await;
            if let Err(e) = added {
                return Err(self.fail(peer, e).await);
            }
        }
        Ok(())
    }

    async fn signal(&self, msg: SignalMessage) -> Result<(), SessionError> {
        self.signal_tx
            .send(msg)
            .await
            .map_err(|_| SessionError::SignalingClosed)
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices_tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tether_shared::constants::MAX_PENDING_CANDIDATES;
    use tether_shared::TransferFrame;

    use super::*;
    use crate::loopback::LoopbackHub;

    struct Node {
        id: PeerId,
        manager: SessionManager,
        signals: mpsc::Receiver<SignalMessage>,
        channels: SessionChannels,
        _downloads: tempfile::TempDir,
    }

    impl Node {
        fn new(hub: &LoopbackHub, id: &str) -> Self {
            let downloads = tempfile::tempdir().unwrap();
            let (signal_tx, signals) = mpsc::channel(64);
            let (manager, channels) =
                SessionManager::new(Arc::new(hub.transport()), signal_tx, downloads.path());
            let manager = manager.with_send_options(SendOptions {
                chunk_delay: Duration::ZERO,
                ..SendOptions::default()
            });
            Self {
                id: PeerId::new(id),
                manager,
                signals,
                channels,
                _downloads: downloads,
            }
        }

        async fn drain_events(&mut self) -> bool {
            let mut any = false;
            while let Ok(event) = self.channels.events.try_recv() {
                self.manager.handle_event(event).await;
                any = true;
            }
            any
        }

        fn notices(&mut self) -> Vec<SessionNotice> {
            let mut out = Vec::new();
            while let Ok(notice) = self.channels.notices.try_recv() {
                out.push(notice);
            }
            out
        }

        fn next_signal(&mut self) -> SignalMessage {
            self.signals.try_recv().expect("expected a signal")
        }
    }

    /// Act as the relay: deliver `msg`, sent by `from`, to `to`.
    async fn route(from: &PeerId, to: &mut Node, msg: SignalMessage) {
        match msg {
            SignalMessage::Offer { description, .. } => {
                let _ = to.manager.handle_offer(from, description).await;
            }
            SignalMessage::Answer { description, .. } => {
                let _ = to.manager.handle_answer(from, description).await;
            }
            SignalMessage::IceCandidate { candidate, .. } => {
                let _ = to.manager.handle_ice_candidate(from, candidate).await;
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }

    async fn pump_one(from: &mut Node, to: &mut Node) -> bool {
        let mut any = from.drain_events().await;
        while let Ok(msg) = from.signals.try_recv() {
            route(&from.id, to, msg).await;
            any = true;
        }
        any
    }

    /// Run both nodes until neither has queued work.
    async fn settle(a: &mut Node, b: &mut Node) {
        loop {
            let left = pump_one(a, b).await;
            let right = pump_one(b, a).await;
            if !left && !right {
                break;
            }
        }
    }

    async fn connected_pair(hub: &LoopbackHub) -> (Node, Node) {
        let mut a = Node::new(hub, "alice");
        let mut b = Node::new(hub, "bob");
        a.manager.connect(&b.id).await.unwrap();
        settle(&mut a, &mut b).await;
        assert!(a.manager.is_connected(&b.id));
        assert!(b.manager.is_connected(&a.id));
        (a, b)
    }

    #[tokio::test]
    async fn test_end_to_end_handshake_and_chat() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let mut b = Node::new(&hub, "bob");

        a.manager.connect(&b.id).await.unwrap();
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Offering));

        let offer = match a.next_signal() {
            SignalMessage::Offer { peer, description } => {
                assert_eq!(peer, b.id);
                description
            }
            other => panic!("expected offer, got {other:?}"),
        };

        b.manager.handle_offer(&a.id, offer).await.unwrap();
        assert_eq!(b.manager.state(&a.id), Some(SessionState::Negotiating));

        let answer = match b.next_signal() {
            SignalMessage::Answer { description, .. } => description,
            other => panic!("expected answer, got {other:?}"),
        };

        a.manager.handle_answer(&b.id, answer).await.unwrap();
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Negotiating));

        settle(&mut a, &mut b).await;
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Connected));
        assert_eq!(b.manager.state(&a.id), Some(SessionState::Connected));
        assert!(a.notices().contains(&SessionNotice::Connected(b.id.clone())));

        a.manager.send_text(&b.id, "hello").await.unwrap();
        b.drain_events().await;
        assert!(b.notices().contains(&SessionNotice::Chat {
            peer: a.id.clone(),
            text: "hello".into()
        }));
    }

    #[tokio::test]
    async fn test_at_most_one_session_per_peer() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let mut b = Node::new(&hub, "bob");

        a.manager.connect(&b.id).await.unwrap();
        assert_eq!(a.manager.session_count(), 1);
        a.manager.connect(&b.id).await.unwrap();
        assert_eq!(a.manager.session_count(), 1);

        // Bob offers while Alice is still offering: the newest offer wins.
        b.manager.connect(&a.id).await.unwrap();
        let offer = match b.next_signal() {
            SignalMessage::Offer { description, .. } => description,
            other => panic!("expected offer, got {other:?}"),
        };
        a.manager.handle_offer(&b.id, offer.clone()).await.unwrap();
        assert_eq!(a.manager.session_count(), 1);
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Negotiating));

        // Relay retry of the same offer.
        a.manager.handle_offer(&b.id, offer).await.unwrap();
        assert_eq!(a.manager.session_count(), 1);

        a.manager.connect(&b.id).await.unwrap();
        assert_eq!(a.manager.session_count(), 1);
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Offering));
    }

    #[tokio::test]
    async fn test_events_from_replaced_session_are_dropped() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let bob = PeerId::new("bob");

        // Each offer queues one local candidate for its own epoch.
        a.manager.connect(&bob).await.unwrap();
        a.manager.connect(&bob).await.unwrap();
        while a.signals.try_recv().is_ok() {}

        a.drain_events().await;
        let mut candidates = 0;
        while let Ok(msg) = a.signals.try_recv() {
            assert!(matches!(msg, SignalMessage::IceCandidate { .. }));
            candidates += 1;
        }
        assert_eq!(candidates, 1);
    }

    #[tokio::test]
    async fn test_stale_answer_is_ignored() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let carol = PeerId::new("carol");

        a.manager
            .handle_answer(&carol, SessionDescription::answer("loopback:99"))
            .await
            .unwrap();
        assert_eq!(a.manager.session_count(), 0);

        let (mut a, b) = connected_pair(&hub).await;
        a.notices();
        a.manager
            .handle_answer(&b.id, SessionDescription::answer("loopback:99"))
            .await
            .unwrap();
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Connected));
        assert!(a.notices().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_for_unknown_peer_is_ignored() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let candidate = IceCandidate {
            candidate: "candidate:1".into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        };
        a.manager
            .handle_ice_candidate(&PeerId::new("ghost"), candidate)
            .await
            .unwrap();
        assert_eq!(a.manager.session_count(), 0);
        assert!(a.signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_offer_discards_session() {
        let hub = LoopbackHub::new();
        let mut b = Node::new(&hub, "bob");
        let alice = PeerId::new("alice");

        let result = b
            .manager
            .handle_offer(&alice, SessionDescription::offer("not-an-sdp"))
            .await;
        assert!(matches!(result, Err(SessionError::Negotiation { .. })));
        assert_eq!(b.manager.session_count(), 0);
        assert!(matches!(
            b.notices().as_slice(),
            [SessionNotice::Failed { peer, .. }] if *peer == alice
        ));
        assert_eq!(hub.live_links(), 0);
    }

    fn candidate(n: usize) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    fn live_epoch(node: &Node, peer: &PeerId) -> u64 {
        node.manager.sessions[peer].epoch
    }

    #[tokio::test]
    async fn test_early_candidate_is_buffered_until_answer() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let mut b = Node::new(&hub, "bob");

        a.manager.connect(&b.id).await.unwrap();
        let offer = match a.next_signal() {
            SignalMessage::Offer { description, .. } => description,
            other => panic!("expected offer, got {other:?}"),
        };
        b.manager.handle_offer(&a.id, offer).await.unwrap();
        let answer = match b.next_signal() {
            SignalMessage::Answer { description, .. } => description,
            other => panic!("expected answer, got {other:?}"),
        };
        b.drain_events().await;
        let remote = match b.next_signal() {
            SignalMessage::IceCandidate { candidate, .. } => candidate,
            other => panic!("expected candidate, got {other:?}"),
        };

        // The relay delivers Bob's candidate ahead of his answer.
        a.manager.handle_ice_candidate(&b.id, remote).await.unwrap();
        assert_eq!(a.manager.sessions[&b.id].pending_candidate_count(), 1);
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Offering));

        a.manager.handle_answer(&b.id, answer).await.unwrap();
        assert_eq!(a.manager.sessions[&b.id].pending_candidate_count(), 0);
        assert_eq!(a.manager.state(&b.id), Some(SessionState::Negotiating));

        settle(&mut a, &mut b).await;
        assert!(a.manager.is_connected(&b.id));
        assert!(!a
            .notices()
            .iter()
            .any(|n| matches!(n, SessionNotice::Failed { .. })));
    }

    #[tokio::test]
    async fn test_candidate_buffer_is_bounded() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let bob = PeerId::new("bob");
        a.manager.connect(&bob).await.unwrap();

        for n in 0..MAX_PENDING_CANDIDATES + 5 {
            a.manager.handle_ice_candidate(&bob, candidate(n)).await.unwrap();
        }
        assert_eq!(
            a.manager.sessions[&bob].pending_candidate_count(),
            MAX_PENDING_CANDIDATES
        );
        assert_eq!(a.manager.state(&bob), Some(SessionState::Offering));
    }

    #[tokio::test]
    async fn test_transport_failure_while_negotiating_removes_session() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let bob = PeerId::new("bob");
        a.manager.connect(&bob).await.unwrap();

        let epoch = live_epoch(&a, &bob);
        a.manager
            .handle_event(SessionEvent {
                peer: bob.clone(),
                epoch,
                kind: SessionEventKind::Failed("ice".into()),
            })
            .await;

        assert_eq!(a.manager.session_count(), 0);
        assert!(matches!(
            a.notices().as_slice(),
            [SessionNotice::Failed { peer, .. }] if *peer == bob
        ));
        assert_eq!(hub.live_links(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_after_connect_is_a_disconnect() {
        let hub = LoopbackHub::new();
        let (mut a, b) = connected_pair(&hub).await;
        a.notices();

        let epoch = live_epoch(&a, &b.id);
        a.manager
            .handle_event(SessionEvent {
                peer: b.id.clone(),
                epoch,
                kind: SessionEventKind::Failed("ice".into()),
            })
            .await;

        assert_eq!(a.manager.session_count(), 0);
        assert!(!a.manager.is_connected(&b.id));
        assert_eq!(a.notices(), vec![SessionNotice::Disconnected(b.id.clone())]);
    }

    #[tokio::test]
    async fn test_send_without_session_fails() {
        let hub = LoopbackHub::new();
        let mut a = Node::new(&hub, "alice");
        let bob = PeerId::new("bob");

        let err = a.manager.send_text(&bob, "hi").await.unwrap_err();
        assert!(matches!(err, SessionError::NoActiveConnection(p) if p == bob));

        // Offering is not enough either.
        a.manager.connect(&bob).await.unwrap();
        assert!(matches!(
            a.manager.send_text(&bob, "hi").await,
            Err(SessionError::NoActiveConnection(_))
        ));
        assert!(a.manager.send_file(&bob, PathBuf::from("x")).is_err());
    }

    #[tokio::test]
    async fn test_connect_when_connected_is_noop() {
        let hub = LoopbackHub::new();
        let (mut a, b) = connected_pair(&hub).await;
        while a.signals.try_recv().is_ok() {}

        a.manager.connect(&b.id).await.unwrap();
        assert!(a.manager.is_connected(&b.id));
        assert!(a.signals.try_recv().is_err());
        assert_eq!(a.manager.connected_peers(), vec![b.id.clone()]);
    }

    #[tokio::test]
    async fn test_remote_close_tears_down_both_sides() {
        let hub = LoopbackHub::new();
        let (mut a, mut b) = connected_pair(&hub).await;
        b.notices();

        a.manager.close(&b.id).await;
        assert_eq!(a.manager.session_count(), 0);
        assert!(a.notices().contains(&SessionNotice::Disconnected(b.id.clone())));

        b.drain_events().await;
        assert_eq!(b.manager.session_count(), 0);
        assert!(b.notices().contains(&SessionNotice::Disconnected(a.id.clone())));
        assert_eq!(hub.live_links(), 0);
    }

    #[tokio::test]
    async fn test_file_transfer_between_managers() {
        let hub = LoopbackHub::new();
        let (mut a, mut b) = connected_pair(&hub).await;

        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("notes.txt");
        let body = vec![7u8; 40_000];
        tokio::fs::write(&path, &body).await.unwrap();

        a.manager.send_file(&b.id, path).unwrap().await.unwrap();
        b.drain_events().await;

        assert!(!b.manager.has_active_transfer(&a.id));
        let notices = b.notices();
        let completed = notices.iter().find_map(|n| match n {
            SessionNotice::Transfer(TransferNotice::Completed { path, bytes_received, .. }) => {
                Some((path.clone(), *bytes_received))
            }
            _ => None,
        });
        let (written, bytes) = completed.expect("transfer completed");
        assert_eq!(bytes, 40_000);
        assert_eq!(tokio::fs::read(written).await.unwrap(), body);

        assert!(a.notices().iter().any(|n| matches!(
            n,
            SessionNotice::Transfer(TransferNotice::Sent { size: 40_000, .. })
        )));
    }

    #[tokio::test]
    async fn test_teardown_closes_inbound_transfer() {
        let hub = LoopbackHub::new();
        let (mut a, mut b) = connected_pair(&hub).await;

        let meta = TransferFrame::FileMeta {
            name: "partial.bin".into(),
            size: 100,
        };
        a.manager
            .send(&b.id, ChannelFrame::Text(meta.to_json().unwrap()))
            .await
            .unwrap();
        b.drain_events().await;
        assert!(b.manager.has_active_transfer(&a.id));

        a.manager.close(&b.id).await;
        b.drain_events().await;
        assert!(!b.manager.has_active_transfer(&a.id));
        assert!(b.notices().iter().any(|n| matches!(
            n,
            SessionNotice::Transfer(TransferNotice::Aborted { .. })
        )));
    }
}
