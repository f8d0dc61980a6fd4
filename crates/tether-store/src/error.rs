use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// No platform data directory to put the default database in.
    #[error("no application data directory on this platform")]
    NoDataDir,

    #[error("unknown group {0}")]
    GroupNotFound(String),

    /// Upgrading the schema to `version` failed; the database is left at the
    /// previous version.
    #[error("schema upgrade to v{version} failed: {source}")]
    Schema {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;
