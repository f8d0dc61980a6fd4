//! Group chat records and membership.

use chrono::Utc;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{conversion_error, format_timestamp, parse_timestamp, Group};

impl Database {
    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Insert or replace a group. Replaying with the same id overwrites the
    /// name.
    pub fn create_group(&self, group_id: &str, name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO group_chats (id, name, created_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, name, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// Fetch a single group by id.
    pub fn get_group(&self, group_id: &str) -> Result<Group> {
        self.conn()
            .query_row(
                "SELECT id, name, created_at FROM group_chats WHERE id = ?1",
                params![group_id],
                row_to_group,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::GroupNotFound(group_id.to_string())
                }
                other => StoreError::Sqlite(other),
            })
    }

    /// List all groups, oldest first.
    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, created_at
             FROM group_chats
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map([], row_to_group)?;

        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Record that `user_id` belongs to `group_id`. Duplicate calls are
    /// no-ops; returns `true` only when a new row was written.
    pub fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at)
             VALUES (?1, ?2, ?3)",
            params![group_id, user_id, format_timestamp(Utc::now())],
        )?;
        Ok(affected > 0)
    }

    /// All user ids recorded for a group, in no particular order.
    pub fn get_group_members(&self, group_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;

        let rows = stmt.query_map(params![group_id], |row| row.get::<_, String>(0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let created_str: String = row.get(2)?;

    let created_at = parse_timestamp(&created_str).map_err(|e| conversion_error(2, e))?;

    Ok(Group {
        id,
        name,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_group("group_1", "ops").unwrap();

        assert!(db.add_group_member("group_1", "alice").unwrap());
        assert!(!db.add_group_member("group_1", "alice").unwrap());

        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params!["group_1", "alice"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.get_group_members("group_1").unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_members_are_per_group() {
        let db = Database::open_in_memory().unwrap();
        db.add_group_member("group_1", "alice").unwrap();
        db.add_group_member("group_1", "bob").unwrap();
        db.add_group_member("group_2", "carol").unwrap();

        let mut members = db.get_group_members("group_1").unwrap();
        members.sort();
        assert_eq!(members, vec!["alice", "bob"]);
        assert!(db.get_group_members("group_3").unwrap().is_empty());
    }

    #[test]
    fn test_create_group_upserts_name() {
        let db = Database::open_in_memory().unwrap();
        db.create_group("group_1", "first").unwrap();
        db.create_group("group_1", "renamed").unwrap();

        let groups = db.list_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(db.get_group("group_1").unwrap().name, "renamed");
    }

    #[test]
    fn test_missing_group_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_group("group_x"), Err(StoreError::GroupNotFound(_))));
    }
}
