use thiserror::Error;

use tether_shared::PeerId;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Data channel is not open")]
    ChannelNotOpen,

    #[error("No local description after negotiation")]
    MissingLocalDescription,

    #[error("Transport closed")]
    Closed,

    #[error("Transport error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No active connection to {0}")]
    NoActiveConnection(PeerId),

    #[error("Negotiation with {peer} failed: {source}")]
    Negotiation {
        peer: PeerId,
        #[source]
        source: TransportError,
    },

    #[error("Send to {peer} failed: {source}")]
    Send {
        peer: PeerId,
        #[source]
        source: TransportError,
    },

    #[error("Signaling channel closed")]
    SignalingClosed,
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Protocol(#[from] tether_shared::ProtocolError),

    #[error("File path has no usable file name")]
    InvalidFileName,
}
