//! Schema upgrades, tracked in SQLite's `user_version` pragma.
//!
//! Each step runs inside its own transaction together with the version bump,
//! so a failed upgrade leaves the database at the last good version.

pub mod v001_initial;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Upgrade = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered upgrade steps. The schema version after step `i` is `i + 1`.
const UPGRADES: &[(&str, Upgrade)] = &[("initial", v001_initial::up)];

pub fn schema_version() -> u32 {
    UPGRADES.len() as u32
}

/// Bring `conn` up to [`schema_version`].
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    debug!(found, target = schema_version(), "Schema version");

    for (index, (name, upgrade)) in UPGRADES.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        let step = || -> rusqlite::Result<()> {
            let tx = conn.unchecked_transaction()?;
            upgrade(&tx)?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()
        };
        step().map_err(|source| StoreError::Schema { version, source })?;
        info!(version, name, "Schema upgraded");
    }
    Ok(())
}
