//! SQLite handle. Opening always upgrades the schema first.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;
use tether_shared::constants::APP_NAME;

use crate::error::{Result, StoreError};
use crate::migrations;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `tether.db` under the platform data directory, creating the
    /// directory if needed.
    pub fn new() -> Result<Self> {
        let db_path = Self::default_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %db_path.display(), "Opening message store");

        Self::open_at(&db_path)
    }

    /// Location used by [`Database::new`].
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("org", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().join(format!("{APP_NAME}.db")))
    }

    /// Separate paths let several clients run side by side on one machine.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a throwaway database that lives only as long as the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL is a no-op for in-memory databases, SQLite reports "memory".
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn
            .path()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}
