//! v001: `messages`, `group_chats` and `group_members`.

use rusqlite::Connection;

/// Schema for an empty database.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages (append-only; only is_read is ever updated)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,   -- never reused
    sender_id      TEXT NOT NULL,
    recipient_type TEXT NOT NULL CHECK (recipient_type IN ('private', 'group')),
    recipient_id   TEXT NOT NULL,
    message        TEXT NOT NULL,
    timestamp      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    is_read        INTEGER NOT NULL DEFAULT 0            -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_messages_recipient
    ON messages(recipient_type, recipient_id, timestamp);

-- ----------------------------------------------------------------
-- Group chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_chats (
    id         TEXT PRIMARY KEY NOT NULL,               -- "group_" prefixed
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- ----------------------------------------------------------------
-- Group membership (no FK: groups are never deleted)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS group_members (
    group_id  TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    joined_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),

    PRIMARY KEY (group_id, user_id)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
