pub mod app;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod events;
pub mod history;
pub mod relay;
pub mod state;

pub use app::{App, AppInputs, Flow};
pub use config::ClientConfig;
