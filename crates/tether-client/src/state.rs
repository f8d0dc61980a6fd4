//! Application state owned by the event loop.

use tether_shared::{PeerId, Recipient};

use crate::history::ChatHistory;

/// Central application state.
#[derive(Debug, Default)]
pub struct AppState {
    /// Id the relay assigned to us. `None` until the welcome frame arrives.
    pub local: Option<PeerId>,

    /// Conversation that plain input lines are sent to.
    pub current: Option<Recipient>,

    /// Last roster pushed by the relay, in relay order. Includes ourselves.
    pub roster: Vec<PeerId>,

    pub history: ChatHistory,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roster without our own id.
    pub fn others(&self) -> impl Iterator<Item = &PeerId> {
        self.roster
            .iter()
            .filter(move |p| Some(*p) != self.local.as_ref())
    }
}
