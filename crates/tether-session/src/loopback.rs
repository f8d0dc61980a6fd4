//! In-process transport: links created from the same [`LoopbackHub`] pair
//! up through their offer/answer tokens and deliver frames to each other's
//! event sinks directly. No sockets, no ICE.
//!
//! Every callback fires synchronously inside the call that caused it, so a
//! test can drive two managers deterministically by draining their queues.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::debug;

use tether_shared::{IceCandidate, PeerId, SdpKind, SessionDescription};

use crate::error::TransportError;
use crate::transport::{
    ChannelFrame, ChannelHandle, DataChannel, EventSink, PeerLink, SessionEventKind, Transport,
};

const SDP_PREFIX: &str = "loopback:";

struct Endpoint {
    events: EventSink,
    channel: Arc<LoopbackChannel>,
    remote: Option<u64>,
}

#[derive(Default)]
struct HubState {
    next_token: u64,
    endpoints: HashMap<u64, Endpoint>,
}

/// Shared switchboard for every loopback transport in a test.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for one node on this hub.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport { hub: self.clone() }
    }

    /// Links that have not been closed yet.
    pub fn live_links(&self) -> usize {
        self.lock().map(|s| s.endpoints.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HubState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::Other("loopback hub poisoned".into()))
    }

    fn register(&self, events: EventSink) -> Result<(u64, Arc<LoopbackChannel>), TransportError> {
        let mut state = self.lock()?;
        state.next_token += 1;
        let token = state.next_token;
        let channel = Arc::new(LoopbackChannel {
            token,
            hub: self.clone(),
            open: AtomicBool::new(false),
        });
        state.endpoints.insert(
            token,
            Endpoint {
                events,
                channel: channel.clone(),
                remote: None,
            },
        );
        Ok((token, channel))
    }

    fn set_remote(&self, token: u64, remote: u64) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if !state.endpoints.contains_key(&remote) {
            return Err(TransportError::Other(format!("unknown loopback link {remote}")));
        }
        let endpoint = state
            .endpoints
            .get_mut(&token)
            .ok_or(TransportError::Closed)?;
        endpoint.remote = Some(remote);
        Ok(())
    }

    /// Both sides know each other: open both channels.
    fn open_pair(&self, a: u64, b: u64) -> Result<(), TransportError> {
        let state = self.lock()?;
        for token in [a, b] {
            let endpoint = state.endpoints.get(&token).ok_or(TransportError::Closed)?;
            endpoint.channel.open.store(true, Ordering::SeqCst);
            endpoint.events.emit(SessionEventKind::ChannelOpened);
        }
        Ok(())
    }

    fn deliver(&self, from: u64, frame: ChannelFrame) -> Result<(), TransportError> {
        let state = self.lock()?;
        let remote = state
            .endpoints
            .get(&from)
            .and_then(|e| e.remote)
            .ok_or(TransportError::ChannelNotOpen)?;
        let target = state.endpoints.get(&remote).ok_or(TransportError::Closed)?;
        target.events.emit(SessionEventKind::Frame(frame));
        Ok(())
    }

    /// Drop `token` and tell its counterpart the channel went away.
    fn disconnect(&self, token: u64) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        let Some(endpoint) = state.endpoints.remove(&token) else {
            return Ok(());
        };
        endpoint.channel.open.store(false, Ordering::SeqCst);

        if let Some(remote) = endpoint.remote {
            if let Some(peer) = state.endpoints.get_mut(&remote) {
                if peer.remote == Some(token) && peer.channel.open.swap(false, Ordering::SeqCst) {
                    peer.events.emit(SessionEventKind::ChannelClosed);
                }
            }
        }
        Ok(())
    }
}

fn encode_token(token: u64) -> String {
    format!("{SDP_PREFIX}{token}")
}

fn decode_token(desc: &SessionDescription) -> Result<u64, TransportError> {
    desc.sdp
        .strip_prefix(SDP_PREFIX)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| TransportError::Other(format!("not a loopback description: {}", desc.sdp)))
}

pub struct LoopbackTransport {
    hub: LoopbackHub,
}

impl Transport for LoopbackTransport {
    fn open_link(
        &self,
        peer: &PeerId,
        events: EventSink,
    ) -> BoxFuture<'_, Result<Box<dyn PeerLink>, TransportError>> {
        let peer = peer.clone();
        Box::pin(async move {
            let (token, channel) = self.hub.register(events.clone())?;
            debug!(peer = %peer.short(), token, "loopback link opened");
            Ok(Box::new(LoopbackLink {
                token,
                hub: self.hub.clone(),
                events,
                channel,
                has_remote: AtomicBool::new(false),
                offered: AtomicBool::new(false),
            }) as Box<dyn PeerLink>)
        })
    }
}

struct LoopbackLink {
    token: u64,
    hub: LoopbackHub,
    events: EventSink,
    channel: Arc<LoopbackChannel>,
    has_remote: AtomicBool,
    offered: AtomicBool,
}

impl LoopbackLink {
    fn announce_candidate(&self) {
        self.events.emit(SessionEventKind::LocalCandidate(IceCandidate {
            candidate: format!("candidate:{} 1 udp 1 127.0.0.1 9 typ host", self.token),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }));
    }
}

impl PeerLink for LoopbackLink {
    fn create_offer(&self) -> BoxFuture<'_, Result<SessionDescription, TransportError>> {
        Box::pin(async move {
            self.offered.store(true, Ordering::SeqCst);
            self.announce_candidate();
            Ok(SessionDescription::offer(encode_token(self.token)))
        })
    }

    fn accept_offer(
        &self,
        offer: SessionDescription,
    ) -> BoxFuture<'_, Result<SessionDescription, TransportError>> {
        Box::pin(async move {
            if offer.kind != SdpKind::Offer {
                return Err(TransportError::Other("expected an offer".into()));
            }
            let remote = decode_token(&offer)?;
            self.hub.set_remote(self.token, remote)?;
            self.has_remote.store(true, Ordering::SeqCst);
            self.announce_candidate();
            Ok(SessionDescription::answer(encode_token(self.token)))
        })
    }

    fn apply_answer(&self, answer: SessionDescription) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if answer.kind != SdpKind::Answer || !self.offered.load(Ordering::SeqCst) {
                return Err(TransportError::Other("unexpected answer".into()));
            }
            let remote = decode_token(&answer)?;
            self.hub.set_remote(self.token, remote)?;
            self.has_remote.store(true, Ordering::SeqCst);
            self.hub.open_pair(self.token, remote)
        })
    }

    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.has_remote.load(Ordering::SeqCst) {
                return Err(TransportError::Other("candidate before remote description".into()));
            }
            debug!(token = self.token, candidate = %candidate.candidate, "loopback candidate");
            Ok(())
        })
    }

    fn has_remote_description(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.has_remote.load(Ordering::SeqCst) })
    }

    fn channel(&self) -> Option<ChannelHandle> {
        Some(self.channel.clone() as ChannelHandle)
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { self.hub.disconnect(self.token) })
    }
}

struct LoopbackChannel {
    token: u64,
    hub: LoopbackHub,
    open: AtomicBool,
}

impl DataChannel for LoopbackChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, frame: ChannelFrame) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(TransportError::ChannelNotOpen);
            }
            self.hub.deliver(self.token, frame)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move { self.hub.disconnect(self.token) })
    }
}
