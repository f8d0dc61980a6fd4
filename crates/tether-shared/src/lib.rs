//! Identifiers, wire shapes and constants shared by every tether crate.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{IceCandidate, SdpKind, SessionDescription, SignalMessage, TransferFrame};
pub use types::{GroupId, PeerId, Recipient, RecipientType};
