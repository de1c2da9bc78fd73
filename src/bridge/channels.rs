//! Bridge channel plumbing.
//!
//! The core and the host talk exclusively through these channels: the
//! core owns `GameChannels`, the host owns `BridgeHandle`. Neither
//! side imports the other.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use crate::common::messages::{BridgeCommand, BridgeEvent, OutgoingChat};
use crate::common::types::{ChatType, WhoEntry};

/// Core-side endpoints, moved into the session driver.
pub struct GameChannels {
    /// Events toward the host.
    pub event_tx: mpsc::UnboundedSender<BridgeEvent>,
    /// Chat from the host into the game.
    pub outgoing_rx: mpsc::UnboundedReceiver<OutgoingChat>,
    /// Who/guild-motd requests from the host.
    pub command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
    /// Host-triggered shutdown.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Host-side endpoints. The event receiver travels separately so the
/// host can park it in its own rendering task.
pub struct BridgeHandle {
    outgoing_tx: mpsc::UnboundedSender<OutgoingChat>,
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    shutdown_tx: watch::Sender<bool>,
}

impl BridgeHandle {
    /// Queue a chat line for the game. The text is passed through
    /// unmodified; length limits are the host's concern.
    pub fn send_chat(&self, chat_type: ChatType, channel: Option<String>, text: String) {
        let message = OutgoingChat { chat_type, channel, text };
        if self.outgoing_tx.send(message).is_err() {
            warn!("Core is gone; dropping outgoing chat");
        }
    }

    /// Ask the game who is online. Resolves with an empty list when
    /// the session is down or the request expires.
    pub async fn query_who(&self, name: Option<String>) -> Vec<WhoEntry> {
        let (reply, response) = oneshot::channel();
        if self.command_tx.send(BridgeCommand::Who { name, reply }).is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Fetch the guild message of the day.
    pub async fn query_guild_motd(&self) -> Option<String> {
        let (reply, response) = oneshot::channel();
        if self.command_tx.send(BridgeCommand::GuildMotd { reply }).is_err() {
            return None;
        }
        response.await.ok().flatten()
    }

    /// Request a graceful logout and session teardown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Build both halves of the bridge plus the host's event stream.
pub fn bridge_channels() -> (
    GameChannels,
    BridgeHandle,
    mpsc::UnboundedReceiver<BridgeEvent>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    (
        GameChannels {
            event_tx,
            outgoing_rx,
            command_rx,
            shutdown_rx,
        },
        BridgeHandle {
            outgoing_tx,
            command_tx,
            shutdown_tx,
        },
        event_rx,
    )
}
