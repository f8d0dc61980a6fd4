use tether_session::SessionError;
use tether_shared::{Recipient, RecipientType, SignalMessage};

use crate::app::App;

impl App {
    /// Send a plain line to the current conversation.
    ///
    /// Private lines go over the peer session; group lines are fanned out by
    /// the relay. Either way the line is persisted once it has been handed
    /// off, never before.
    pub(crate) async fn cmd_say(&mut self, text: &str) -> anyhow::Result<()> {
        let local = self.local()?;
        let Some(current) = self.state.current.clone() else {
            anyhow::bail!("no conversation selected (use /connect or /open)");
        };

        match current {
            Recipient::Peer(peer) => {
                match self.sessions.send_text(&peer, text).await {
                    Ok(()) => {}
                    Err(SessionError::NoActiveConnection(_)) => {
                        anyhow::bail!("No active connection to send message")
                    }
                    Err(e) => return Err(e.into()),
                }
                self.record(
                    local.as_str(),
                    RecipientType::Private,
                    peer.as_str(),
                    peer.as_str(),
                    text,
                )
            }
            Recipient::Group(group) => {
                self.relay_send(SignalMessage::GroupMessage {
                    group_id: group.clone(),
                    sender_id: local.clone(),
                    message: text.to_string(),
                })
                .await?;
                self.record(
                    local.as_str(),
                    RecipientType::Group,
                    group.as_str(),
                    group.as_str(),
                    text,
                )
            }
        }
    }
}
