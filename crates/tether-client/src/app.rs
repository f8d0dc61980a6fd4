//! The single event loop that owns the session manager, the store and the
//! display state.

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tether_session::{SessionChannels, SessionManager};
use tether_shared::{PeerId, RecipientType, SignalMessage};
use tether_store::Database;

use crate::commands::{Command, HELP};
use crate::events::{Level, RosterEntry, UiEvent};
use crate::history::format_line;
use crate::state::AppState;

/// Whether the loop keeps running after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Inputs the loop selects over.
pub struct AppInputs {
    pub relay: mpsc::Receiver<SignalMessage>,
    pub sessions: SessionChannels,
    pub commands: mpsc::Receiver<String>,
}

pub struct App {
    pub(crate) db: Database,
    pub(crate) sessions: SessionManager,
    pub(crate) relay: mpsc::Sender<SignalMessage>,
    pub(crate) ui: mpsc::UnboundedSender<UiEvent>,
    pub(crate) state: AppState,
}

impl App {
    pub fn new(
        db: Database,
        sessions: SessionManager,
        relay: mpsc::Sender<SignalMessage>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self {
            db,
            sessions,
            relay,
            ui,
            state: AppState::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Run until `/quit`, end of input, or the relay going away.
    pub async fn run(mut self, mut inputs: AppInputs) -> anyhow::Result<()> {
        info!("Event loop started");
        self.status(Level::Info, "Connected to relay, waiting for welcome");

        loop {
            tokio::select! {
                msg = inputs.relay.recv() => {
                    let Some(msg) = msg else {
                        warn!("Relay channel closed");
                        self.status(Level::Error, "Disconnected from relay");
                        break;
                    };
                    let event = msg.event_name();
                    if let Err(e) = self.handle_signal(msg).await {
                        self.report(event, &e);
                    }
                }
                Some(event) = inputs.sessions.events.recv() => {
                    self.sessions.handle_event(event).await;
                }
                Some(notice) = inputs.sessions.notices.recv() => {
                    if let Err(e) = self.handle_notice(notice).await {
                        self.report("session-notice", &e);
                    }
                }
                line = inputs.commands.recv() => {
                    let Some(line) = line else {
                        info!("Input closed");
                        break;
                    };
                    match self.handle_line(&line).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => self.report("command", &e),
                    }
                }
            }
        }

        self.sessions.close_all().await;
        info!("Event loop stopped");
        Ok(())
    }

    /// Parse and execute one line of user input.
    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        match Command::parse(line)? {
            Some(cmd) => self.execute(cmd).await,
            None => Ok(Flow::Continue),
        }
    }

    pub async fn execute(&mut self, cmd: Command) -> anyhow::Result<Flow> {
        match cmd {
            Command::Connect(peer) => self.cmd_connect(peer).await?,
            Command::Open(recipient) => self.cmd_open(recipient),
            Command::Close(peer) => self.cmd_close(&peer).await,
            Command::Users => self.cmd_users(),
            Command::File(path) => self.cmd_file(path)?,
            Command::CreateGroup(name) => self.cmd_create_group(&name)?,
            Command::Invite(peer) => self.cmd_invite(peer).await?,
            Command::Groups => self.cmd_groups()?,
            Command::Help => self.status(Level::Info, HELP),
            Command::Say(text) => self.cmd_say(&text).await?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------
    // Helpers shared by commands and the bridge
    // ------------------------------------------------------------------

    pub(crate) fn local(&self) -> anyhow::Result<PeerId> {
        self.state
            .local
            .clone()
            .ok_or_else(|| anyhow!("not registered with the relay yet"))
    }

    pub(crate) async fn relay_send(&self, msg: SignalMessage) -> anyhow::Result<()> {
        self.relay
            .send(msg)
            .await
            .map_err(|_| anyhow!("relay connection closed"))
    }

    /// Persist a chat line, then add it to history and the screen.
    pub(crate) fn record(
        &mut self,
        sender: &str,
        kind: RecipientType,
        recipient: &str,
        conversation: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let local = self.local()?;
        self.db.save_message(sender, kind, recipient, body)?;
        let line = format_line(sender, body, &local);
        self.state.history.append(conversation, line.clone());
        self.emit(UiEvent::Append {
            recipient: conversation.to_string(),
            line,
        });
        Ok(())
    }

    pub(crate) fn roster(&self) -> Vec<RosterEntry> {
        self.state
            .others()
            .map(|peer| RosterEntry {
                peer: peer.clone(),
                connected: self.sessions.is_connected(peer),
            })
            .collect()
    }

    pub(crate) fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            warn!("UI receiver dropped");
        }
    }

    pub(crate) fn status(&self, level: Level, text: impl Into<String>) {
        self.emit(UiEvent::status(level, text));
    }

    fn report(&self, context: &str, err: &anyhow::Error) {
        error!(context, error = %err, "Handler failed");
        self.status(Level::Error, err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tether_session::loopback::LoopbackHub;
    use tether_session::SendOptions;
    use tether_shared::{GroupId, Recipient};

    use super::*;

    struct Client {
        id: PeerId,
        app: App,
        relay_out: mpsc::Receiver<SignalMessage>,
        channels: SessionChannels,
        ui: mpsc::UnboundedReceiver<UiEvent>,
        seen: Vec<UiEvent>,
        downloads: tempfile::TempDir,
    }

    impl Client {
        fn new(hub: &LoopbackHub, id: &str, db: Database) -> Self {
            let downloads = tempfile::tempdir().unwrap();
            let (relay_tx, relay_out) = mpsc::channel(256);
            let (ui_tx, ui) = mpsc::unbounded_channel();
            let (sessions, channels) =
                SessionManager::new(Arc::new(hub.transport()), relay_tx.clone(), downloads.path());
            let sessions = sessions.with_send_options(SendOptions {
                chunk_delay: Duration::ZERO,
                ..SendOptions::default()
            });
            Self {
                id: PeerId::new(id),
                app: App::new(db, sessions, relay_tx, ui_tx),
                relay_out,
                channels,
                ui,
                seen: Vec::new(),
                downloads,
            }
        }

        async fn welcome(&mut self, roster: &[PeerId]) {
            self.app
                .handle_signal(SignalMessage::Welcome {
                    peer_id: self.id.clone(),
                })
                .await
                .unwrap();
            self.app
                .handle_signal(SignalMessage::UsersUpdate {
                    users: roster.to_vec(),
                })
                .await
                .unwrap();
        }

        fn collect_ui(&mut self) {
            while let Ok(event) = self.ui.try_recv() {
                self.seen.push(event);
            }
        }

        fn saw_status(&mut self, needle: &str) -> bool {
            self.collect_ui();
            self.seen.iter().any(|e| {
                matches!(e, UiEvent::Status { text, .. } if text.contains(needle))
            })
        }
    }

    /// Stand-in for the relay: forward what `from` queued to `to`, with
    /// addressed frames rewritten to name their origin.
    async fn pump(from: &mut Client, to: &mut Client) -> bool {
        let mut any = false;
        while let Ok(event) = from.channels.events.try_recv() {
            from.app.sessions.handle_event(event).await;
            any = true;
        }
        while let Ok(notice) = from.channels.notices.try_recv() {
            from.app.handle_notice(notice).await.unwrap();
            any = true;
        }
        while let Ok(msg) = from.relay_out.try_recv() {
            let origin = from.id.clone();
            let delivered = match msg {
                SignalMessage::Offer { description, .. } => SignalMessage::Offer {
                    peer: origin,
                    description,
                },
                SignalMessage::Answer { description, .. } => SignalMessage::Answer {
                    peer: origin,
                    description,
                },
                SignalMessage::IceCandidate { candidate, .. } => SignalMessage::IceCandidate {
                    peer: origin,
                    candidate,
                },
                other => other,
            };
            to.app.handle_signal(delivered).await.unwrap();
            any = true;
        }
        any
    }

    async fn settle(a: &mut Client, b: &mut Client) {
        loop {
            let left = pump(a, b).await;
            let right = pump(b, a).await;
            if !left && !right {
                break;
            }
        }
    }

    async fn registered_pair(hub: &LoopbackHub) -> (Client, Client) {
        let mut alice = Client::new(hub, "alice", Database::open_in_memory().unwrap());
        let mut bob = Client::new(hub, "bob", Database::open_in_memory().unwrap());
        let roster = [alice.id.clone(), bob.id.clone()];
        alice.welcome(&roster).await;
        bob.welcome(&roster).await;
        (alice, bob)
    }

    async fn connected_pair(hub: &LoopbackHub) -> (Client, Client) {
        let (mut alice, mut bob) = registered_pair(hub).await;
        alice.app.handle_line("/connect bob").await.unwrap();
        settle(&mut alice, &mut bob).await;
        assert!(alice.app.sessions().is_connected(&bob.id));
        assert!(bob.app.sessions().is_connected(&alice.id));
        (alice, bob)
    }

    #[tokio::test]
    async fn test_welcome_replays_and_marks_unread() {
        let hub = LoopbackHub::new();
        let db = Database::open_in_memory().unwrap();
        db.save_message("carol", RecipientType::Private, "alice", "while you were out")
            .unwrap();

        let mut alice = Client::new(&hub, "alice", db);
        alice.welcome(&[]).await;

        assert_eq!(alice.app.state().local, Some(PeerId::new("alice")));
        assert_eq!(
            alice.app.state().history.lines("carol"),
            ["carol: while you were out".to_string()]
        );
        assert!(alice.app.db().get_unread_messages("alice").unwrap().is_empty());
        assert!(alice.saw_status("1 stored messages loaded"));
    }

    #[tokio::test]
    async fn test_private_chat_is_persisted_on_both_sides() {
        let hub = LoopbackHub::new();
        let (mut alice, mut bob) = connected_pair(&hub).await;
        assert!(alice.saw_status("Connected to peer: bob"));

        alice.app.handle_line("hello bob").await.unwrap();
        settle(&mut alice, &mut bob).await;

        assert_eq!(alice.app.state().history.lines("bob"), ["You: hello bob".to_string()]);
        assert_eq!(bob.app.state().history.lines("alice"), ["alice: hello bob".to_string()]);

        let unread = bob.app.db().get_unread_messages("bob").unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].sender_id, "alice");
        assert_eq!(unread[0].recipient_type, RecipientType::Private);
        assert_eq!(unread[0].body, "hello bob");
    }

    #[tokio::test]
    async fn test_say_without_session_is_refused() {
        let hub = LoopbackHub::new();
        let (mut alice, _bob) = registered_pair(&hub).await;

        alice
            .app
            .execute(Command::Open(Recipient::Peer(PeerId::new("bob"))))
            .await
            .unwrap();
        let err = alice.app.handle_line("anyone there?").await.unwrap_err();
        assert_eq!(err.to_string(), "No active connection to send message");
        assert!(alice.app.state().history.lines("bob").is_empty());

        let err = alice.app.handle_line("/file /tmp/whatever.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "No active connection to send file");
    }

    #[tokio::test]
    async fn test_commands_before_welcome_fail() {
        let hub = LoopbackHub::new();
        let mut alice = Client::new(&hub, "alice", Database::open_in_memory().unwrap());
        assert!(alice.app.handle_line("/create-group early").await.is_err());
        assert!(alice.app.handle_line("/groups").await.is_ok());
        assert!(alice.app.db().list_groups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_self_is_rejected() {
        let hub = LoopbackHub::new();
        let (mut alice, _bob) = registered_pair(&hub).await;
        assert!(alice.app.handle_line("/connect alice").await.is_err());
        assert_eq!(alice.app.sessions().session_count(), 0);
    }

    #[tokio::test]
    async fn test_group_create_invite_and_message() {
        let hub = LoopbackHub::new();
        let (mut alice, mut bob) = registered_pair(&hub).await;

        alice.app.handle_line("/create-group friends").await.unwrap();
        let group = match alice.app.state().current.clone() {
            Some(Recipient::Group(group)) => group,
            other => panic!("expected a group, got {other:?}"),
        };

        alice.app.handle_line("/invite bob").await.unwrap();
        settle(&mut alice, &mut bob).await;

        assert!(bob.saw_status(&format!("You were added to group {group}")));
        let members = bob.app.db().get_group_members(group.as_str()).unwrap();
        assert_eq!(members, vec!["bob".to_string()]);
        let members = alice.app.db().get_group_members(group.as_str()).unwrap();
        assert_eq!(members.len(), 2);

        alice.app.handle_line("hi all").await.unwrap();
        settle(&mut alice, &mut bob).await;

        assert_eq!(
            bob.app.state().history.lines(group.as_str()),
            ["alice: hi all".to_string()]
        );
        assert_eq!(
            alice.app.state().history.lines(group.as_str()),
            ["You: hi all".to_string()]
        );
    }

    #[tokio::test]
    async fn test_own_group_echo_is_skipped() {
        let hub = LoopbackHub::new();
        let (mut alice, _bob) = registered_pair(&hub).await;
        let group = GroupId::new();

        alice
            .app
            .handle_signal(SignalMessage::GroupMessage {
                group_id: group.clone(),
                sender_id: alice.id.clone(),
                message: "echo".into(),
            })
            .await
            .unwrap();
        assert!(alice.app.state().history.lines(group.as_str()).is_empty());
    }

    #[tokio::test]
    async fn test_invite_for_someone_else_in_unknown_group_is_ignored() {
        let hub = LoopbackHub::new();
        let (mut alice, _bob) = registered_pair(&hub).await;
        let group = GroupId::new();

        alice
            .app
            .handle_signal(SignalMessage::GroupInvite {
                group_id: group.clone(),
                user_id: PeerId::new("carol"),
            })
            .await
            .unwrap();
        assert!(alice.app.db().list_groups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_transfer_over_session() {
        let hub = LoopbackHub::new();
        let (mut alice, mut bob) = connected_pair(&hub).await;

        let src = tempfile::tempdir().unwrap();
        let path = src.path().join("photo.bin");
        let body = vec![3u8; 50_000];
        tokio::fs::write(&path, &body).await.unwrap();

        alice
            .app
            .handle_line(&format!("/file {}", path.display()))
            .await
            .unwrap();

        for _ in 0..1_000 {
            settle(&mut alice, &mut bob).await;
            if bob.saw_status("File received") && alice.saw_status("File sent successfully") {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(bob.saw_status("Receiving file from alice: photo.bin"));
        assert!(bob.saw_status("File received"));
        assert!(alice.saw_status("File sent successfully: photo.bin"));
        let written = tokio::fs::read(bob.downloads.path().join("photo.bin")).await.unwrap();
        assert_eq!(written, body);
    }

    #[tokio::test]
    async fn test_roster_marks_connected_peers() {
        let hub = LoopbackHub::new();
        let (alice, _bob) = connected_pair(&hub).await;
        let roster = alice.app.roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].peer, PeerId::new("bob"));
        assert!(roster[0].connected);
    }

    #[tokio::test]
    async fn test_quit_and_unknown_command() {
        let hub = LoopbackHub::new();
        let (mut alice, _bob) = registered_pair(&hub).await;
        assert_eq!(alice.app.handle_line("/quit").await.unwrap(), Flow::Quit);
        assert!(alice.app.handle_line("/dance").await.is_err());
        assert_eq!(alice.app.handle_line("   ").await.unwrap(), Flow::Continue);
    }
}
