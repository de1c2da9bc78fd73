//! World session state: authentication material, caches, and the
//! packet-level bookkeeping behind the session driver.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rand::Rng;
use tracing::{debug, info};

use crate::common::types::{ChatMessage, ChatType, Guid, GuildEventKind, GuildMember};
use crate::config::types::ClientIdentity;
use crate::protocol::game::chat::{languages, ChannelNotify, MessageChat, SendChatMessage};
use crate::protocol::game::guild::{GuildEventPacket, GuildQueryResponse, GuildRoster};
use crate::protocol::game::packets::{session_digest, AuthChallenge, AuthSession, CharacterInfo, CharEnum};
use crate::common::resources::Race;

/// A decoded chat packet, or the name query that must complete first.
pub enum ChatOutcome {
    Ready(ChatMessage),
    /// Sender unknown; the message is queued and this GUID needs a
    /// name query unless one is already in flight.
    NeedName(Guid),
    Ignored,
}

/// What a guild event asks of the session loop.
pub enum GuildEventAction {
    Emit {
        kind: GuildEventKind,
        user: String,
        target: Option<String>,
        rank: Option<String>,
        message: Option<String>,
        refresh_roster: bool,
    },
    /// Presence packets only refresh the roster; the diff emits.
    RefreshRoster,
    None,
}

/// Mutable state for one world session.
pub struct WorldHandler {
    identity: ClientIdentity,
    session_key: [u8; 40],
    realm_id: u32,

    pub in_world: bool,
    connected_announced: bool,
    pub character_guid: Option<Guid>,
    character_race: Option<Race>,
    pub guild_id: u32,
    pub guild_info: Option<GuildQueryResponse>,
    pub guild_motd: Option<String>,

    roster: HashMap<Guid, GuildMember>,
    roster_primed: bool,
    name_cache: HashMap<Guid, String>,
    pending_messages: HashMap<Guid, Vec<MessageChat>>,
    pending_name_queries: HashSet<Guid>,
    joined_channels: HashSet<String>,

    ping_sequence: u32,
    started: Instant,
}

impl WorldHandler {
    pub fn new(identity: ClientIdentity, session_key: [u8; 40], realm_id: u32) -> Self {
        Self {
            identity,
            session_key,
            realm_id,
            in_world: false,
            connected_announced: false,
            character_guid: None,
            character_race: None,
            guild_id: 0,
            guild_info: None,
            guild_motd: None,
            roster: HashMap::new(),
            roster_primed: false,
            name_cache: HashMap::new(),
            pending_messages: HashMap::new(),
            pending_name_queries: HashSet::new(),
            joined_channels: HashSet::new(),
            ping_sequence: 0,
            started: Instant::now(),
        }
    }

    pub fn session_key(&self) -> &[u8; 40] {
        &self.session_key
    }

    /// Answer SMSG_AUTH_CHALLENGE. The client seed is a 31-bit
    /// non-negative value from the CSPRNG.
    pub fn handle_auth_challenge(&self, challenge: &AuthChallenge) -> AuthSession {
        let client_seed: u32 = rand::thread_rng().gen_range(0..0x8000_0000u32);
        let digest = session_digest(
            &self.identity.account,
            client_seed,
            challenge.server_seed,
            &self.session_key,
        );
        debug!(
            "Server seed {:#010X}, client seed {:#010X}",
            challenge.server_seed, client_seed
        );

        AuthSession {
            expansion: self.identity.expansion,
            build: self.identity.game_build as u32,
            account: self.identity.account.clone(),
            client_seed,
            realm_id: self.realm_id,
            digest,
        }
    }

    /// Pick the configured character from the enumeration.
    pub fn handle_char_enum(&mut self, char_enum: CharEnum) -> Option<CharacterInfo> {
        info!("Received {} characters", char_enum.characters.len());
        let wanted = &self.identity.character;
        let found = char_enum
            .characters
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))?;

        debug!("Found {} (guid {}, level {})", found.name, found.guid, found.level);
        self.character_guid = Some(found.guid);
        self.character_race = Race::from_id(found.race);
        self.guild_id = found.guild_id;
        self.name_cache.insert(found.guid, found.name.clone());
        Some(found)
    }

    /// First SMSG_LOGIN_VERIFY_WORLD flips the session in-world and
    /// is the only one announced.
    pub fn handle_login_verify_world(&mut self) -> bool {
        self.in_world = true;
        if self.connected_announced {
            return false;
        }
        self.connected_announced = true;
        true
    }

    /// Spoken language for outgoing chat, from the character's race.
    pub fn language(&self) -> u32 {
        self.character_race
            .map(|race| race.language())
            .unwrap_or(languages::LANG_UNIVERSAL)
    }

    pub fn build_chat_message(
        &self,
        chat_type: ChatType,
        channel: Option<&str>,
        text: &str,
    ) -> SendChatMessage {
        SendChatMessage {
            chat_type,
            language: self.language(),
            target: channel.map(str::to_string),
            text: text.to_string(),
        }
    }

    pub fn next_ping_sequence(&mut self) -> u32 {
        self.ping_sequence += 1;
        self.ping_sequence
    }

    /// Milliseconds since the session started, for time sync answers.
    pub fn ticks(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Resolve a decoded chat packet against the name cache.
    pub fn resolve_chat(&mut self, message: MessageChat) -> ChatOutcome {
        let Some(chat_type) = ChatType::from_id(message.chat_type) else {
            return ChatOutcome::Ignored;
        };

        let sender_name = if let Some(gm_name) = &message.gm_sender {
            Some(gm_name.clone())
        } else if message.sender_guid == 0 || chat_type == ChatType::System {
            Some(String::new())
        } else {
            self.name_cache.get(&message.sender_guid).cloned()
        };

        match sender_name {
            Some(name) => ChatOutcome::Ready(chat_message(chat_type, name, &message)),
            None => {
                let guid = message.sender_guid;
                self.pending_messages.entry(guid).or_default().push(message);
                ChatOutcome::NeedName(guid)
            }
        }
    }

    /// Whether a name query should be sent for this GUID, marking it
    /// in flight if so.
    pub fn mark_name_query(&mut self, guid: Guid) -> bool {
        self.pending_name_queries.insert(guid)
    }

    /// Store a resolved name and flush the chat queued behind it.
    pub fn handle_name_resolved(&mut self, guid: Guid, name: String) -> Vec<ChatMessage> {
        self.pending_name_queries.remove(&guid);
        self.name_cache.insert(guid, name.clone());

        self.pending_messages
            .remove(&guid)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                ChatType::from_id(message.chat_type)
                    .map(|chat_type| chat_message(chat_type, name.clone(), &message))
            })
            .collect()
    }

    pub fn handle_invalidate_player(&mut self, guid: Guid) {
        self.name_cache.remove(&guid);
    }

    pub fn handle_channel_notify(&mut self, notify: &ChannelNotify) {
        if notify.joined() {
            self.joined_channels.insert(notify.channel_name.clone());
        } else if notify.left() {
            self.joined_channels.remove(&notify.channel_name);
        }
    }

    pub fn joined_channels(&self) -> &HashSet<String> {
        &self.joined_channels
    }

    pub fn handle_guild_query(&mut self, response: GuildQueryResponse) {
        info!("Guild: {} ({} ranks)", response.name, response.ranks.len());
        self.guild_info = Some(response);
    }

    /// Swap in a fresh roster snapshot, returning presence changes
    /// against the prior one. The first roster after login only
    /// primes the snapshot.
    pub fn handle_guild_roster(&mut self, roster: GuildRoster) -> Vec<(GuildEventKind, String)> {
        self.guild_motd = Some(roster.motd.clone());

        let mut changes = Vec::new();
        if self.roster_primed {
            for member in &roster.members {
                let was_online = self
                    .roster
                    .get(&member.guid)
                    .map(|prior| prior.online)
                    .unwrap_or(false);
                if member.online && !was_online {
                    changes.push((GuildEventKind::Online, member.name.clone()));
                } else if !member.online && was_online {
                    changes.push((GuildEventKind::Offline, member.name.clone()));
                }
            }
        }

        self.roster = roster
            .members
            .into_iter()
            .map(|member| (member.guid, member))
            .collect();
        self.roster_primed = true;
        changes
    }

    pub fn online_members(&self) -> Vec<GuildMember> {
        let mut members: Vec<_> = self.roster.values().filter(|m| m.online).cloned().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    pub fn handle_guild_event(&mut self, packet: GuildEventPacket) -> GuildEventAction {
        use crate::protocol::game::guild::guild_events;

        match packet.event_type {
            guild_events::GE_SIGNED_ON | guild_events::GE_SIGNED_OFF => {
                // The roster diff reports presence exactly once.
                GuildEventAction::RefreshRoster
            }
            _ => match packet.to_event() {
                Some((kind, user, target, rank, message)) => {
                    if kind == GuildEventKind::Motd {
                        self.guild_motd = message.clone();
                    }
                    let refresh_roster = matches!(
                        kind,
                        GuildEventKind::Joined | GuildEventKind::Left | GuildEventKind::Removed
                    );
                    GuildEventAction::Emit { kind, user, target, rank, message, refresh_roster }
                }
                None => GuildEventAction::None,
            },
        }
    }
}

fn chat_message(chat_type: ChatType, sender_name: String, message: &MessageChat) -> ChatMessage {
    ChatMessage {
        chat_type,
        language: message.language,
        sender_guid: message.sender_guid,
        sender_name,
        channel_name: message.channel_name.clone(),
        content: message.text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::resources::Class;
    use crate::config::types::{ChatConfig, Config, Expansion, GuildEventsConfig, WowConfig};
    use crate::protocol::game::guild::guild_events;

    fn handler() -> WorldHandler {
        let config = Config {
            wow: WowConfig {
                version: "3.3.5".to_string(),
                realm_build: None,
                game_build: None,
                realmlist: "localhost".to_string(),
                realm: "Test".to_string(),
                account: "tester".to_string(),
                password: "secret".to_string(),
                character: "Herald".to_string(),
                locale: "enUS".to_string(),
                platform: "Mac".to_string(),
                enable_server_motd: true,
            },
            guild: GuildEventsConfig::default(),
            chat: ChatConfig::default(),
        };
        let identity = ClientIdentity::from_config(&config).unwrap();
        WorldHandler::new(identity, [0u8; 40], 1)
    }

    #[test]
    fn auth_session_uses_31_bit_client_seed() {
        let handler = handler();
        for _ in 0..32 {
            let session = handler.handle_auth_challenge(&AuthChallenge { server_seed: 0x11223344 });
            assert_eq!(session.client_seed & 0x8000_0000, 0);
            assert_eq!(session.expansion, Expansion::Wotlk);
            assert_eq!(session.build, 12340);
        }
    }

    #[test]
    fn login_verify_world_announces_once() {
        let mut handler = handler();
        assert!(!handler.in_world);
        assert!(handler.handle_login_verify_world());
        assert!(handler.in_world);
        // Servers resend the packet on teleports; no second event.
        assert!(!handler.handle_login_verify_world());
        assert!(handler.in_world);
    }

    fn incoming(chat_type: ChatType, sender_guid: Guid, text: &str) -> MessageChat {
        MessageChat {
            chat_type: chat_type.to_id(),
            language: 7,
            sender_guid,
            target_guid: 0,
            channel_name: None,
            gm_sender: None,
            text: text.to_string(),
            chat_tag: 0,
        }
    }

    #[test]
    fn chat_from_unknown_sender_queues_one_name_query() {
        let mut handler = handler();

        match handler.resolve_chat(incoming(ChatType::Guild, 99, "first")) {
            ChatOutcome::NeedName(guid) => assert_eq!(guid, 99),
            _ => panic!("expected pending name"),
        }
        assert!(handler.mark_name_query(99));

        // Second message from the same GUID queues without a new query.
        match handler.resolve_chat(incoming(ChatType::Guild, 99, "second")) {
            ChatOutcome::NeedName(guid) => assert_eq!(guid, 99),
            _ => panic!("expected pending name"),
        }
        assert!(!handler.mark_name_query(99));

        let flushed = handler.handle_name_resolved(99, "Aldor".to_string());
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].sender_name, "Aldor");
        assert_eq!(flushed[0].content, "first");
        assert_eq!(flushed[1].content, "second");

        // Cache hit from now on.
        match handler.resolve_chat(incoming(ChatType::Guild, 99, "third")) {
            ChatOutcome::Ready(msg) => assert_eq!(msg.sender_name, "Aldor"),
            _ => panic!("expected cached sender"),
        }
    }

    #[test]
    fn invalidate_drops_cached_name() {
        let mut handler = handler();
        handler.handle_name_resolved(5, "Gone".to_string());
        handler.handle_invalidate_player(5);
        match handler.resolve_chat(incoming(ChatType::Say, 5, "hi")) {
            ChatOutcome::NeedName(_) => {}
            _ => panic!("name should be gone"),
        }
    }

    fn member(guid: Guid, name: &str, online: bool) -> GuildMember {
        GuildMember {
            guid,
            name: name.to_string(),
            level: 80,
            class: Class::from_id(4),
            rank: 1,
            zone_id: 0,
            online,
        }
    }

    #[test]
    fn roster_diff_emits_presence_changes_after_priming() {
        let mut handler = handler();

        // First roster only primes.
        let changes = handler.handle_guild_roster(GuildRoster {
            motd: "hi".to_string(),
            info: String::new(),
            members: vec![member(1, "Aldor", true), member(2, "Brann", false)],
        });
        assert!(changes.is_empty());
        assert_eq!(handler.guild_motd.as_deref(), Some("hi"));

        // Brann logs in, Aldor logs out.
        let changes = handler.handle_guild_roster(GuildRoster {
            motd: "hi".to_string(),
            info: String::new(),
            members: vec![member(1, "Aldor", false), member(2, "Brann", true)],
        });
        assert_eq!(changes.len(), 2);
        assert!(changes.contains(&(GuildEventKind::Offline, "Aldor".to_string())));
        assert!(changes.contains(&(GuildEventKind::Online, "Brann".to_string())));

        let online = handler.online_members();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].name, "Brann");
    }

    #[test]
    fn sign_on_events_defer_to_roster_diff() {
        let mut handler = handler();
        let action = handler.handle_guild_event(GuildEventPacket {
            event_type: guild_events::GE_SIGNED_ON,
            strings: vec!["Aldor".to_string()],
        });
        assert!(matches!(action, GuildEventAction::RefreshRoster));
    }

    #[test]
    fn motd_event_updates_cached_motd() {
        let mut handler = handler();
        let action = handler.handle_guild_event(GuildEventPacket {
            event_type: guild_events::GE_MOTD,
            strings: vec!["fresh motd".to_string()],
        });
        match action {
            GuildEventAction::Emit { kind, message, refresh_roster, .. } => {
                assert_eq!(kind, GuildEventKind::Motd);
                assert_eq!(message.as_deref(), Some("fresh motd"));
                assert!(!refresh_roster);
            }
            _ => panic!("expected emit"),
        }
        assert_eq!(handler.guild_motd.as_deref(), Some("fresh motd"));
    }

    #[test]
    fn channel_notify_tracks_membership() {
        let mut handler = handler();
        handler.handle_channel_notify(&ChannelNotify {
            notify_type: 0x00,
            channel_name: "world".to_string(),
        });
        assert!(handler.joined_channels().contains("world"));

        handler.handle_channel_notify(&ChannelNotify {
            notify_type: 0x01,
            channel_name: "world".to_string(),
        });
        assert!(!handler.joined_channels().contains("world"));
    }
}
