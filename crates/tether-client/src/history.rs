//! In-memory display cache, keyed by peer id or group id.
//!
//! Not authoritative: the message store is. Rebuilt from unread messages at
//! startup and appended to as lines arrive.

use std::collections::HashMap;

use tether_shared::{PeerId, RecipientType};
use tether_store::Message;

#[derive(Debug, Default)]
pub struct ChatHistory {
    lines: HashMap<String, Vec<String>>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, recipient: &str, line: impl Into<String>) {
        self.lines
            .entry(recipient.to_string())
            .or_default()
            .push(line.into());
    }

    pub fn lines(&self, recipient: &str) -> &[String] {
        self.lines.get(recipient).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn recipients(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.lines.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Replay stored messages. Private lines are filed under the other party,
    /// group lines under the group. Returns how many lines were added.
    pub fn load(&mut self, messages: &[Message], local: &PeerId) -> usize {
        for msg in messages {
            let key = conversation_key(msg, local);
            let line = format_line(&msg.sender_id, &msg.body, local);
            self.append(key, line);
        }
        messages.len()
    }
}

/// Which conversation a stored message belongs to, seen from `local`.
pub fn conversation_key<'a>(msg: &'a Message, local: &PeerId) -> &'a str {
    match msg.recipient_type {
        RecipientType::Group => &msg.recipient_id,
        RecipientType::Private if msg.sender_id == local.as_str() => &msg.recipient_id,
        RecipientType::Private => &msg.sender_id,
    }
}

pub fn format_line(sender: &str, body: &str, local: &PeerId) -> String {
    if sender == local.as_str() {
        format!("You: {body}")
    } else {
        format!("{sender}: {body}")
    }
}
