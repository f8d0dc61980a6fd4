//! Input line parsing. Handlers live in the submodules as `impl App` blocks.

pub mod files;
pub mod groups;
pub mod messaging;
pub mod network;

use std::path::PathBuf;

use thiserror::Error;

use tether_shared::{PeerId, Recipient};

pub const HELP: &str = "\
/connect <peer>       open a session and switch to it
/open <peer|group>    switch conversation
/close <peer>         close a session
/users                show the roster
/file <path>          send a file to the current peer
/create-group <name>  create a group and switch to it
/invite <peer>        invite a peer to the current group
/groups               list groups
/help                 this text
/quit                 exit
anything else         send to the current conversation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(PeerId),
    Open(Recipient),
    Close(PeerId),
    Users,
    File(PathBuf),
    CreateGroup(String),
    Invite(PeerId),
    Groups,
    Help,
    Quit,
    Say(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command: {0} (try /help)")]
    Unknown(String),
}

impl Command {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Say(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let cmd = match name {
            "connect" => Command::Connect(PeerId::new(required(arg, "/connect <peer>")?)),
            "open" => Command::Open(Recipient::parse(required(arg, "/open <peer|group>")?)),
            "close" => Command::Close(PeerId::new(required(arg, "/close <peer>")?)),
            "users" => Command::Users,
            "file" => Command::File(PathBuf::from(required(arg, "/file <path>")?)),
            "create-group" => {
                Command::CreateGroup(required(arg, "/create-group <name>")?.to_string())
            }
            "invite" => Command::Invite(PeerId::new(required(arg, "/invite <peer>")?)),
            "groups" => Command::Groups,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(format!("/{other}"))),
        };
        Ok(Some(cmd))
    }
}

fn required<'a>(arg: &'a str, usage: &'static str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(arg)
    }
}
