//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for the types that
//! cross the core/host boundary in either direction.

use tokio::sync::oneshot;

use crate::common::types::{ChatMessage, ChatType, Guid, GuildEventKind, WhoEntry};

/// Event emitted by the core toward the host.
#[derive(Debug)]
pub enum BridgeEvent {
    /// The character entered the world on the named realm. Fires at
    /// most once per session.
    Connected { realm: String },
    /// The session ended; `reason` is human-readable.
    Disconnected { reason: String },
    /// An in-game chat message passed the language filter.
    Chat(ChatMessage),
    /// A guild event with its optional actors.
    GuildEvent {
        kind: GuildEventKind,
        user: String,
        target: Option<String>,
        rank: Option<String>,
        message: Option<String>,
    },
    /// A GUID was resolved to a player name.
    NameResolved { guid: Guid, name: String },
    /// Server notification, MOTD line, or channel notice.
    System { text: String },
}

/// Chat sent by the host into the game.
#[derive(Debug, Clone)]
pub struct OutgoingChat {
    pub chat_type: ChatType,
    /// Channel name, required iff `chat_type == Channel`.
    pub channel: Option<String>,
    pub text: String,
}

/// Request from the host, answered through the attached oneshot.
/// Requests expire after 10 s with an empty result.
#[derive(Debug)]
pub enum BridgeCommand {
    Who {
        name: Option<String>,
        reply: oneshot::Sender<Vec<WhoEntry>>,
    },
    GuildMotd {
        reply: oneshot::Sender<Option<String>>,
    },
}
