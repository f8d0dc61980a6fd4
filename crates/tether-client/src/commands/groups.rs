use tracing::info;

use tether_shared::{GroupId, PeerId, Recipient, SignalMessage};

use crate::app::App;
use crate::events::Level;

impl App {
    /// Create a group with ourselves as the first member and switch to it.
    pub(crate) fn cmd_create_group(&mut self, name: &str) -> anyhow::Result<()> {
        let local = self.local()?;
        let group = GroupId::new();

        self.db.create_group(group.as_str(), name)?;
        self.db.add_group_member(group.as_str(), local.as_str())?;
        info!(group = %group, name, "Group created");

        self.status(Level::Success, format!("Created group {name} ({group})"));
        self.cmd_open(Recipient::Group(group));
        Ok(())
    }

    /// Add `peer` to the current group and tell them through the relay.
    pub(crate) async fn cmd_invite(&mut self, peer: PeerId) -> anyhow::Result<()> {
        let Some(Recipient::Group(group)) = self.state.current.clone() else {
            anyhow::bail!("open a group before inviting");
        };

        self.db.add_group_member(group.as_str(), peer.as_str())?;
        self.relay_send(SignalMessage::GroupInvite {
            group_id: group.clone(),
            user_id: peer.clone(),
        })
        .await?;

        self.status(Level::Info, format!("Invited {peer} to {group}"));
        Ok(())
    }

    pub(crate) fn cmd_groups(&self) -> anyhow::Result<()> {
        let groups = self.db.list_groups()?;
        if groups.is_empty() {
            self.status(Level::Info, "No groups yet (use /create-group <name>)");
            return Ok(());
        }
        for group in groups {
            let members = self.db.get_group_members(&group.id)?.len();
            self.status(
                Level::Info,
                format!("{} ({}, {members} members)", group.name, group.id),
            );
        }
        Ok(())
    }
}
