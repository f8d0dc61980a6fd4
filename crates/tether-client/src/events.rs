use tether_session::Direction;
use tether_shared::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub peer: PeerId,
    pub connected: bool,
}

/// Everything the terminal front end is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// New chat line in a conversation.
    Append { recipient: String, line: String },
    /// Redraw a conversation from history.
    Show { recipient: String, lines: Vec<String> },
    Progress {
        peer: PeerId,
        direction: Direction,
        percent: u8,
    },
    Roster(Vec<RosterEntry>),
    Status { level: Level, text: String },
}

impl UiEvent {
    pub fn status(level: Level, text: impl Into<String>) -> Self {
        UiEvent::Status {
            level,
            text: text.into(),
        }
    }
}

/// Render one event as terminal lines. `current` is the open conversation;
/// chat lines for other conversations collapse into a one-line notice.
pub fn render(event: &UiEvent, current: Option<&str>) -> Vec<String> {
    match event {
        UiEvent::Append { recipient, line } if Some(recipient.as_str()) == current => {
            vec![line.clone()]
        }
        UiEvent::Append { recipient, .. } => vec![format!("* new message in {recipient}")],
        UiEvent::Show { recipient, lines } => {
            let mut out = vec![format!("--- {recipient} ---")];
            out.extend(lines.iter().cloned());
            out
        }
        UiEvent::Progress {
            peer,
            direction,
            percent,
        } => {
            let verb = match direction {
                Direction::Incoming => "Receiving",
                Direction::Outgoing => "Sending",
            };
            vec![format!("{verb} progress ({}): {percent}%", peer.short())]
        }
        UiEvent::Roster(entries) => {
            let mut out = vec!["Users:".to_string()];
            out.extend(entries.iter().map(|e| {
                let dot = if e.connected { '●' } else { '○' };
                format!("  {dot} {}", e.peer)
            }));
            out
        }
        UiEvent::Status { level, text } => {
            let tag = match level {
                Level::Info => "info",
                Level::Success => "ok",
                Level::Warning => "warn",
                Level::Error => "error",
            };
            vec![format!("[{tag}] {text}")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_prints_for_open_conversation() {
        let event = UiEvent::Append {
            recipient: "alice".into(),
            line: "alice: hi".into(),
        };
        assert_eq!(render(&event, Some("alice")), vec!["alice: hi"]);
        assert_eq!(render(&event, Some("bob")), vec!["* new message in alice"]);
    }

    #[test]
    fn test_roster_marks_connected_peers() {
        let event = UiEvent::Roster(vec![
            RosterEntry {
                peer: PeerId::new("a"),
                connected: true,
            },
            RosterEntry {
                peer: PeerId::new("b"),
                connected: false,
            },
        ]);
        assert_eq!(render(&event, None), vec!["Users:", "  ● a", "  ○ b"]);
    }
}
