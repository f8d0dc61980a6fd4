//! Domain model structs persisted in the local SQLite database.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use tether_shared::RecipientType;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat line, private or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Store-assigned id, strictly increasing.
    pub id: i64,
    /// Peer that wrote the message.
    pub sender_id: String,
    /// Whether `recipient_id` names a peer or a group.
    pub recipient_type: RecipientType,
    /// Peer id or group id.
    pub recipient_id: String,
    /// Message text.
    pub body: String,
    /// When the message was stored.
    pub timestamp: DateTime<Utc>,
    /// Set by [`Database::mark_messages_as_read`](crate::Database::mark_messages_as_read).
    pub is_read: bool,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A multi-party chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 (millisecond precision, `Z` suffix) so that text
/// ordering in SQL matches chronological ordering.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Wrap a conversion failure for column `idx` in the error type
/// `rusqlite::Row::get` callers expect.
pub(crate) fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
