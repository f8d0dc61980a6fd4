//! # tether-store
//!
//! Durable message log and group membership tables for the tether client,
//! backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`. Every write is committed before the call returns,
//! so a message handed to [`Database::save_message`] survives a crash or a
//! dropped relay connection and is replayed on the next start.

pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
