use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{GroupId, PeerId};

/// Messages carried by the signaling relay.
///
/// On frames sent by this client `peer` names the target; on frames delivered
/// by the relay it names the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Relay tells a freshly connected client which id it was assigned
    #[serde(rename_all = "camelCase")]
    Welcome { peer_id: PeerId },

    /// Current roster, in relay order
    UsersUpdate { users: Vec<PeerId> },

    /// SDP offer
    Offer {
        peer: PeerId,
        description: SessionDescription,
    },

    /// SDP answer
    Answer {
        peer: PeerId,
        description: SessionDescription,
    },

    /// Trickled ICE candidate
    IceCandidate { peer: PeerId, candidate: IceCandidate },

    /// Membership announcement for a group
    #[serde(rename_all = "camelCase")]
    GroupInvite { group_id: GroupId, user_id: PeerId },

    /// Group chat line fanned out by the relay
    #[serde(rename_all = "camelCase")]
    GroupMessage {
        group_id: GroupId,
        sender_id: PeerId,
        message: String,
    },
}

impl SignalMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Short event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalMessage::Welcome { .. } => "welcome",
            SignalMessage::UsersUpdate { .. } => "users-update",
            SignalMessage::Offer { .. } => "offer",
            SignalMessage::Answer { .. } => "answer",
            SignalMessage::IceCandidate { .. } => "ice-candidate",
            SignalMessage::GroupInvite { .. } => "group-invite",
            SignalMessage::GroupMessage { .. } => "group-message",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// SDP blob in the `{type, sdp}` shape browsers and WebRTC stacks exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

/// Control frames of the file-transfer protocol. Data chunks travel as raw
/// binary frames between `FileMeta` and `FileEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransferFrame {
    FileMeta { name: String, size: u64 },
    FileEnd,
}

impl TransferFrame {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text frame as a transfer control frame. `None` means the text
    /// is not one of the transfer shapes and should be treated as chat.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_shape() {
        let msg = SignalMessage::Offer {
            peer: PeerId::new("bob"),
            description: SessionDescription::offer("v=0"),
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "offer");
        assert_eq!(value["peer"], "bob");
        assert_eq!(value["description"]["type"], "offer");
        assert_eq!(value["description"]["sdp"], "v=0");
    }

    #[test]
    fn test_inbound_group_message() {
        let raw = r#"{"event":"group-message","groupId":"group_7","senderId":"alice","message":"hey"}"#;
        match SignalMessage::from_json(raw).unwrap() {
            SignalMessage::GroupMessage {
                group_id,
                sender_id,
                message,
            } => {
                assert_eq!(group_id.as_str(), "group_7");
                assert_eq!(sender_id.as_str(), "alice");
                assert_eq!(message, "hey");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_group_message_rejects_unprefixed_group() {
        let raw = r#"{"event":"group-message","groupId":"alice","senderId":"bob","message":"x"}"#;
        assert!(SignalMessage::from_json(raw).is_err());
    }

    #[test]
    fn test_ice_candidate_field_names() {
        let raw = r#"{"event":"ice-candidate","peer":"p1","candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#;
        let msg = SignalMessage::from_json(raw).unwrap();
        assert_eq!(msg.event_name(), "ice-candidate");
        if let SignalMessage::IceCandidate { candidate, .. } = msg {
            assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
            assert_eq!(candidate.sdp_m_line_index, Some(0));
        }
    }

    #[test]
    fn test_users_update() {
        let raw = r#"{"event":"users-update","users":["a","b","c"]}"#;
        let msg = SignalMessage::from_json(raw).unwrap();
        assert_eq!(
            msg,
            SignalMessage::UsersUpdate {
                users: vec!["a".into(), "b".into(), "c".into()]
            }
        );
    }

    #[test]
    fn test_transfer_frames_match_wire() {
        let meta = TransferFrame::FileMeta {
            name: "notes.txt".into(),
            size: 20_000,
        };
        assert_eq!(
            meta.to_json().unwrap(),
            r#"{"type":"file-meta","name":"notes.txt","size":20000}"#
        );
        assert_eq!(TransferFrame::FileEnd.to_json().unwrap(), r#"{"type":"file-end"}"#);
        assert_eq!(TransferFrame::parse(r#"{"type":"file-end"}"#), Some(TransferFrame::FileEnd));
    }

    #[test]
    fn test_non_transfer_text_is_not_a_frame() {
        assert_eq!(TransferFrame::parse("hello there"), None);
        assert_eq!(TransferFrame::parse("42"), None);
        assert_eq!(TransferFrame::parse(r#"{"type":"file-chunk"}"#), None);
        assert_eq!(TransferFrame::parse(r#"{"type":"file-meta","name":"a"}"#), None);
    }
}
