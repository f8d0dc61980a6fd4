use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use tether_shared::constants::{DATA_CHANNEL_LABEL, DEFAULT_STUN_URL};
use tether_shared::{IceCandidate, PeerId, SdpKind, SessionDescription};

use crate::error::TransportError;
use crate::transport::{
    ChannelFrame, ChannelHandle, DataChannel, EventSink, PeerLink, SessionEventKind, Transport,
};

/// One STUN or TURN entry.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

// Configs get logged at startup; keep the TURN secret out of them.
impl fmt::Debug for IceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

/// Opens real WebRTC peer connections with a single ordered data channel.
pub struct WebRtcTransport {
    ice_servers: Vec<IceServer>,
}

impl WebRtcTransport {
    pub fn new(ice_servers: Vec<IceServer>) -> Self {
        Self { ice_servers }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = self
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    async fn new_link(&self, peer: &PeerId, events: EventSink) -> Result<WebRtcLink, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(self.rtc_configuration()).await?);
        debug!(peer = %peer.short(), "Peer connection created");

        let link = WebRtcLink {
            pc,
            channel: Arc::new(Mutex::new(None)),
            events,
        };
        link.install_handlers();
        Ok(link)
    }
}

impl Default for WebRtcTransport {
    fn default() -> Self {
        Self::new(vec![IceServer::stun(DEFAULT_STUN_URL)])
    }
}

impl Transport for WebRtcTransport {
    fn open_link(
        &self,
        peer: &PeerId,
        events: EventSink,
    ) -> BoxFuture<'_, Result<Box<dyn PeerLink>, TransportError>> {
        let peer = peer.clone();
        Box::pin(async move {
            let link = self.new_link(&peer, events).await?;
            Ok(Box::new(link) as Box<dyn PeerLink>)
        })
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

type ChannelSlot = Arc<Mutex<Option<ChannelHandle>>>;

struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
    channel: ChannelSlot,
    events: EventSink,
}

impl WebRtcLink {
    fn install_handlers(&self) {
        let events = self.events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                Box::pin(async move {
                    let Some(candidate) = candidate else {
                        return;
                    };
                    match candidate.to_json() {
                        Ok(init) => events.emit(SessionEventKind::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        })),
                        Err(e) => warn!(error = %e, "Failed to serialize local ICE candidate"),
                    }
                })
            }));

        let events = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let events = events.clone();
                Box::pin(async move {
                    debug!(peer = %events.peer().short(), ?state, "Peer connection state");
                    match state {
                        RTCPeerConnectionState::Failed => {
                            events.emit(SessionEventKind::Failed("ICE connectivity failed".into()))
                        }
                        RTCPeerConnectionState::Closed => {
                            events.emit(SessionEventKind::ChannelClosed)
                        }
                        _ => {}
                    }
                })
            }));

        // The answering side receives the channel the offerer created.
        let events = self.events.clone();
        let slot = self.channel.clone();
        self.pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let events = events.clone();
            let slot = slot.clone();
            Box::pin(async move {
                if dc.label() != DATA_CHANNEL_LABEL {
                    warn!(label = dc.label(), "Ignoring unexpected data channel");
                    return;
                }
                info!(peer = %events.peer().short(), "Data channel opened (incoming)");
                attach_channel(dc, &slot, &events);
            })
        }));
    }

    async fn local_sdp(&self) -> Result<String, TransportError> {
        self.pc
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or(TransportError::MissingLocalDescription)
    }
}

/// Wire channel callbacks into the event sink and publish the handle.
fn attach_channel(dc: Arc<RTCDataChannel>, slot: &ChannelSlot, events: &EventSink) {
    let on_open = events.clone();
    dc.on_open(Box::new(move || {
        let events = on_open.clone();
        Box::pin(async move {
            events.emit(SessionEventKind::ChannelOpened);
        })
    }));

    let on_close = events.clone();
    dc.on_close(Box::new(move || {
        let events = on_close.clone();
        Box::pin(async move {
            events.emit(SessionEventKind::ChannelClosed);
        })
    }));

    let on_message = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = on_message.clone();
        Box::pin(async move {
            let frame = if msg.is_string {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => ChannelFrame::Text(text),
                    Err(_) => {
                        warn!(peer = %events.peer().short(), "Dropping non UTF-8 text frame");
                        return;
                    }
                }
            } else {
                ChannelFrame::Binary(msg.data)
            };
            events.emit(SessionEventKind::Frame(frame));
        })
    }));

    if let Ok(mut guard) = slot.lock() {
        *guard = Some(Arc::new(WebRtcChannel { dc }) as ChannelHandle);
    }
}

fn rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let parsed = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(parsed)
}

impl PeerLink for WebRtcLink {
    fn create_offer(&self) -> BoxFuture<'_, Result<SessionDescription, TransportError>> {
        Box::pin(async move {
            let init = RTCDataChannelInit {
                ordered: Some(true),
                ..Default::default()
            };
            let dc = self
                .pc
                .create_data_channel(DATA_CHANNEL_LABEL, Some(init))
                .await?;
            attach_channel(dc, &self.channel, &self.events);

            let offer = self.pc.create_offer(None).await?;
            self.pc.set_local_description(offer).await?;
            Ok(SessionDescription::offer(self.local_sdp().await?))
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
            self.pc.set_remote_description(rtc_description(offer)?).await?;

            let answer = self.pc.create_answer(None).await?;
            self.pc.set_local_description(answer).await?;
            Ok(SessionDescription::answer(self.local_sdp().await?))
        })
    }

    fn apply_answer(&self, answer: SessionDescription) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if answer.kind != SdpKind::Answer {
                return Err(TransportError::Other("expected an answer".into()));
            }
            self.pc.set_remote_description(rtc_description(answer)?).await?;
            Ok(())
        })
    }

    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let init = RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                ..Default::default()
            };
            self.pc.add_ice_candidate(init).await?;
            Ok(())
        })
    }

    fn has_remote_description(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.pc.remote_description().await.is_some() })
    }

    fn channel(&self) -> Option<ChannelHandle> {
        self.channel.lock().ok()?.clone()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.pc.close().await?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

impl DataChannel for WebRtcChannel {
    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    fn send(&self, frame: ChannelFrame) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(TransportError::ChannelNotOpen);
            }
            match frame {
                ChannelFrame::Text(text) => self.dc.send_text(text).await?,
                ChannelFrame::Binary(data) => self.dc.send(&data).await?,
            };
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.dc.close().await?;
            Ok(())
        })
    }
}
