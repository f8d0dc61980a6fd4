//! Append-only message log and the unread/replay queries built on it.

use chrono::Utc;
use rusqlite::params;

use tether_shared::RecipientType;

use crate::database::Database;
use crate::error::Result;
use crate::models::{conversion_error, format_timestamp, parse_timestamp, Message};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, recipient_type, recipient_id, message, timestamp, is_read";

impl Database {
    /// Append a message with `is_read = 0` and the current time.
    ///
    /// Returns the stored record, including its store-assigned id.
    pub fn save_message(
        &self,
        sender_id: &str,
        recipient_type: RecipientType,
        recipient_id: &str,
        body: &str,
    ) -> Result<Message> {
        let now = Utc::now();

        self.conn().execute(
            "INSERT INTO messages (sender_id, recipient_type, recipient_id, message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sender_id,
                recipient_type.as_str(),
                recipient_id,
                body,
                format_timestamp(now),
            ],
        )?;

        let id = self.conn().last_insert_rowid();
        tracing::debug!(id, recipient_type = %recipient_type, "message stored");

        Ok(Message {
            id,
            sender_id: sender_id.to_string(),
            recipient_type,
            recipient_id: recipient_id.to_string(),
            body: body.to_string(),
            timestamp: parse_timestamp(&format_timestamp(now)).unwrap_or(now),
            is_read: false,
        })
    }

    /// Messages to replay for `user_id`: everything addressed privately to
    /// the user plus every group message not yet marked read, oldest first.
    ///
    /// The group clause is not joined against `group_members`; any unread
    /// group message is returned to any user.
    pub fn get_unread_messages(&self, user_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE (recipient_type = 'private' AND recipient_id = ?1)
                OR (recipient_type = 'group' AND is_read = 0)
             ORDER BY timestamp ASC, id ASC"
        ))?;

        let rows = stmt.query_map(params![user_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Mark every private message to `user_id` and every group message as
    /// read. Returns the number of rows touched.
    pub fn mark_messages_as_read(&self, user_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages
             SET is_read = 1
             WHERE (recipient_type = 'private' AND recipient_id = ?1)
                OR (recipient_type = 'group')",
            params![user_id],
        )?;
        Ok(affected)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let recipient_type_str: String = row.get(2)?;
    let recipient_id: String = row.get(3)?;
    let body: String = row.get(4)?;
    let ts_str: String = row.get(5)?;
    let is_read: i64 = row.get(6)?;

    let recipient_type: RecipientType = recipient_type_str
        .parse()
        .map_err(|e| conversion_error(2, e))?;
    let timestamp = parse_timestamp(&ts_str).map_err(|e| conversion_error(5, e))?;

    Ok(Message {
        id,
        sender_id,
        recipient_type,
        recipient_id,
        body,
        timestamp,
        is_read: is_read != 0,
    })
}
