//! Inbound side of the loop: relay frames and session notices become store
//! writes, history lines and UI events.

use tracing::{debug, info, warn};

use tether_session::{SessionNotice, TransferNotice};
use tether_shared::{GroupId, PeerId, RecipientType, SignalMessage};
use tether_store::StoreError;

use crate::app::App;
use crate::events::{Level, UiEvent};

impl App {
    pub async fn handle_signal(&mut self, msg: SignalMessage) -> anyhow::Result<()> {
        match msg {
            SignalMessage::Welcome { peer_id } => self.on_welcome(peer_id)?,

            SignalMessage::UsersUpdate { users } => {
                debug!(count = users.len(), "Roster update");
                self.state.roster = users;
                self.emit(UiEvent::Roster(self.roster()));
            }

            SignalMessage::Offer { peer, description } => {
                self.status(Level::Info, format!("Received connection offer from: {peer}"));
                self.sessions.handle_offer(&peer, description).await?;
            }

            SignalMessage::Answer { peer, description } => {
                self.sessions.handle_answer(&peer, description).await?;
            }

            SignalMessage::IceCandidate { peer, candidate } => {
                self.sessions.handle_ice_candidate(&peer, candidate).await?;
            }

            SignalMessage::GroupInvite { group_id, user_id } => {
                self.on_group_invite(group_id, user_id)?;
            }

            SignalMessage::GroupMessage {
                group_id,
                sender_id,
                message,
            } => {
                if Some(&sender_id) == self.state.local.as_ref() {
                    debug!(group = %group_id, "Skipping echo of own group message");
                    return Ok(());
                }
                self.record(
                    sender_id.as_str(),
                    RecipientType::Group,
                    group_id.as_str(),
                    group_id.as_str(),
                    &message,
                )?;
            }
        }
        Ok(())
    }

    /// Learn our id, then replay what arrived while we were away and mark it
    /// read.
    fn on_welcome(&mut self, peer_id: PeerId) -> anyhow::Result<()> {
        info!(peer = %peer_id, "Registered with relay");
        let unread = self.db.get_unread_messages(peer_id.as_str())?;
        let replayed = self.state.history.load(&unread, &peer_id);
        let marked = self.db.mark_messages_as_read(peer_id.as_str())?;
        debug!(replayed, marked, "Unread messages replayed");

        self.status(Level::Success, format!("Your id: {peer_id}"));
        if replayed > 0 {
            self.status(Level::Info, format!("{replayed} stored messages loaded"));
        }
        self.state.local = Some(peer_id);
        Ok(())
    }

    fn on_group_invite(&mut self, group: GroupId, user: PeerId) -> anyhow::Result<()> {
        let known = match self.db.get_group(group.as_str()) {
            Ok(_) => true,
            Err(StoreError::GroupNotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };

        if Some(&user) == self.state.local.as_ref() {
            if !known {
                // The invite carries no name; the id stands in until renamed.
                self.db.create_group(group.as_str(), group.as_str())?;
            }
            self.db.add_group_member(group.as_str(), user.as_str())?;
            info!(group = %group, "Joined group");
            self.status(Level::Success, format!("You were added to group {group}"));
        } else if known {
            self.db.add_group_member(group.as_str(), user.as_str())?;
            debug!(group = %group, user = %user, "Group member recorded");
        } else {
            debug!(group = %group, "Invite for unknown group ignored");
        }
        Ok(())
    }

    pub async fn handle_notice(&mut self, notice: SessionNotice) -> anyhow::Result<()> {
        match notice {
            SessionNotice::Connected(peer) => {
                self.status(Level::Success, format!("Connected to peer: {peer}"));
                self.emit(UiEvent::Roster(self.roster()));
            }
            SessionNotice::Disconnected(peer) => {
                self.status(Level::Warning, format!("Disconnected from peer: {peer}"));
                self.emit(UiEvent::Roster(self.roster()));
            }
            SessionNotice::Failed { peer, reason } => {
                self.status(Level::Error, format!("Connection to {peer} failed: {reason}"));
            }
            SessionNotice::Chat { peer, text } => {
                let local = self.local()?;
                self.record(
                    peer.as_str(),
                    RecipientType::Private,
                    local.as_str(),
                    peer.as_str(),
                    &text,
                )?;
            }
            SessionNotice::Transfer(notice) => self.on_transfer(notice),
        }
        Ok(())
    }

    fn on_transfer(&mut self, notice: TransferNotice) {
        match notice {
            TransferNotice::Started { peer, name, size } => self.status(
                Level::Info,
                format!("Receiving file from {peer}: {name} ({} KB)", size.div_ceil(1024)),
            ),
            TransferNotice::Progress {
                peer,
                direction,
                percent,
            } => self.emit(UiEvent::Progress {
                peer,
                direction,
                percent,
            }),
            TransferNotice::Completed {
                path,
                bytes_received,
                declared_size,
                ..
            } => {
                if bytes_received == declared_size {
                    self.status(Level::Success, format!("File received: {}", path.display()));
                } else {
                    warn!(bytes_received, declared_size, "Incomplete file");
                    self.status(
                        Level::Warning,
                        format!(
                            "File received with {bytes_received} of {declared_size} bytes: {}",
                            path.display()
                        ),
                    );
                }
            }
            TransferNotice::Sent { name, .. } => {
                self.status(Level::Success, format!("File sent successfully: {name}"))
            }
            TransferNotice::Aborted { name, reason, .. } => {
                self.status(Level::Error, format!("Transfer of {name} aborted: {reason}"))
            }
        }
    }
}
