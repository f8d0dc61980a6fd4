use std::path::PathBuf;

use tracing::info;

use tether_session::SessionError;
use tether_shared::Recipient;

use crate::app::App;
use crate::events::Level;

impl App {
    /// Start streaming `path` to the current peer. The transfer runs on its
    /// own task; progress comes back as session notices.
    pub(crate) fn cmd_file(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let Some(Recipient::Peer(peer)) = self.state.current.clone() else {
            anyhow::bail!("files can only be sent to a peer");
        };

        match self.sessions.send_file(&peer, path.clone()) {
            Ok(_task) => {
                info!(peer = %peer.short(), path = %path.display(), "File send started");
                self.status(
                    Level::Info,
                    format!("Starting to send file: {}", path.display()),
                );
                Ok(())
            }
            Err(SessionError::NoActiveConnection(_)) => {
                anyhow::bail!("No active connection to send file")
            }
            Err(e) => Err(e.into()),
        }
    }
}
