use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::GROUP_ID_PREFIX;
use crate::error::ProtocolError;

// Participant identity as assigned by the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a multi-party chat. Always carries the `group_` prefix so it
/// can never be mistaken for a [`PeerId`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    pub fn new() -> Self {
        Self(format!("{GROUP_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        if is_group_id(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ProtocolError::InvalidGroupId(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GroupId {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if is_group_id(&s) {
            Ok(Self(s))
        } else {
            Err(ProtocolError::InvalidGroupId(s))
        }
    }
}

impl From<GroupId> for String {
    fn from(id: GroupId) -> Self {
        id.0
    }
}

fn is_group_id(s: &str) -> bool {
    s.len() > GROUP_ID_PREFIX.len() && s.starts_with(GROUP_ID_PREFIX)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    Private,
    Group,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::Private => "private",
            RecipientType::Group => "group",
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipientType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(RecipientType::Private),
            "group" => Ok(RecipientType::Group),
            other => Err(ProtocolError::InvalidRecipientType(other.to_string())),
        }
    }
}

/// Where a chat line is addressed: a single peer over its session, or a group
/// fanned out by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    Peer(PeerId),
    Group(GroupId),
}

impl Recipient {
    /// Route a raw identifier by its namespace.
    pub fn parse(s: &str) -> Self {
        match GroupId::parse(s) {
            Ok(group) => Recipient::Group(group),
            Err(_) => Recipient::Peer(PeerId::new(s)),
        }
    }

    pub fn kind(&self) -> RecipientType {
        match self {
            Recipient::Peer(_) => RecipientType::Private,
            Recipient::Group(_) => RecipientType::Group,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Recipient::Peer(p) => p.as_str(),
            Recipient::Group(g) => g.as_str(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
