use tracing::info;

use tether_shared::{PeerId, Recipient};

use crate::app::App;
use crate::events::{Level, UiEvent};

impl App {
    /// Switch to `peer` and make sure a session exists.
    pub(crate) async fn cmd_connect(&mut self, peer: PeerId) -> anyhow::Result<()> {
        if Some(&peer) == self.state.local.as_ref() {
            anyhow::bail!("cannot connect to yourself");
        }
        self.cmd_open(Recipient::Peer(peer.clone()));

        if self.sessions.is_connected(&peer) {
            return Ok(());
        }
        info!(peer = %peer.short(), "Connecting");
        self.status(Level::Info, format!("Initiating connection to: {peer}"));
        self.sessions.connect(&peer).await?;
        Ok(())
    }

    pub(crate) fn cmd_open(&mut self, recipient: Recipient) {
        let key = recipient.as_str().to_string();
        let lines = self.state.history.lines(&key).to_vec();
        self.state.current = Some(recipient);
        self.emit(UiEvent::Show {
            recipient: key,
            lines,
        });
    }

    pub(crate) async fn cmd_close(&mut self, peer: &PeerId) {
        if self.sessions.state(peer).is_none() {
            self.status(Level::Warning, format!("No session with {peer}"));
            return;
        }
        self.sessions.close(peer).await;
    }

    pub(crate) fn cmd_users(&self) {
        self.emit(UiEvent::Roster(self.roster()));
    }
}
