//! Peer sessions: one negotiated data channel per remote peer, driven by
//! relay signaling, plus the chunked file-transfer protocol on top of it.

pub mod error;
#[cfg(any(test, feature = "loopback"))]
pub mod loopback;
pub mod manager;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod webrtc_peer;

pub use error::{SessionError, TransferError, TransportError};
pub use manager::{SessionChannels, SessionManager, SessionNotice};
pub use session::SessionState;
pub use transfer::{Direction, SendOptions, TransferNotice};
pub use transport::{ChannelFrame, ChannelHandle, SessionEvent, Transport};
pub use webrtc_peer::{IceServer, WebRtcTransport};
