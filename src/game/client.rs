//! World session driver: one select! loop owning the socket, the
//! session state, and the bridge endpoints.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::bridge::GameChannels;
use crate::common::error::{ConnectionError, ProtocolError, SessionError, SessionResult};
use crate::common::messages::{BridgeCommand, BridgeEvent, OutgoingChat};
use crate::common::types::WhoEntry;
use crate::config::types::{ClientIdentity, Config};
use crate::protocol::game::chat::{ChannelNotify, JoinChannel, MessageChat, NameQuery, NameQueryResponse};
use crate::protocol::game::guild::{
    guild_roster_request, GuildEventPacket, GuildQuery, GuildQueryResponse, GuildRoster,
    WhoRequest, WhoResponse,
};
use crate::protocol::game::handler::{ChatOutcome, GuildEventAction, WorldHandler};
use crate::protocol::game::packets::{
    char_enum_request, decode_motd, decode_notification, decode_server_message, logout_request,
    warden_ack, AuthChallenge, AuthResponse, CharEnum, InvalidatePlayer, Ping, PlayerLogin,
    TimeSyncReq, TimeSyncResp,
};
use crate::protocol::game::{new_game_connection, GameConnection};
use crate::protocol::packets::opcodes::*;
use crate::protocol::packets::Packet;
use crate::protocol::realm::connector::RealmSession;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(20);

/// Actions packet handlers can request from the connection loop.
enum Flow {
    Continue,
    LoggedOut,
}

struct PendingWho {
    reply: oneshot::Sender<Vec<WhoEntry>>,
    issued: Instant,
}

struct PendingMotd {
    reply: oneshot::Sender<Option<String>>,
    issued: Instant,
}

pub struct GameClient {
    config: Config,
    identity: ClientIdentity,
    pub channels: GameChannels,
    pending_who: Option<PendingWho>,
    pending_motd: Option<PendingMotd>,
}

impl GameClient {
    pub fn new(config: Config, identity: ClientIdentity, channels: GameChannels) -> Self {
        Self {
            config,
            identity,
            channels,
            pending_who: None,
            pending_motd: None,
        }
    }

    /// Connect to the world server named by the realm hand-off and run
    /// the session until logout or failure.
    pub async fn run(&mut self, session: RealmSession) -> SessionResult<()> {
        let (host, port) = session.realm.parse_address().ok_or_else(|| {
            SessionError::Protocol(ProtocolError::BadRealmAddress {
                address: session.realm.address.clone(),
            })
        })?;
        info!("Connecting to game server {host}:{port} (realm: {})", session.realm.name);

        let stream = TcpStream::connect((host, port)).await.map_err(|source| {
            SessionError::Connection(ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source,
            })
        })?;
        self.handle_connection(stream, session).await
    }

    /// Session loop over an established stream.
    pub async fn handle_connection<S>(
        &mut self,
        stream: S,
        session: RealmSession,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut connection = new_game_connection(stream, self.identity.expansion);
        let mut handler = WorldHandler::new(
            self.identity.clone(),
            session.session_key,
            session.realm.id as u32,
        );
        let realm_name = session.realm.name.clone();
        let mut shutdown_rx = self.channels.shutdown_rx.clone();

        let now = Instant::now();
        let mut ping_interval = tokio::time::interval_at(now + PING_INTERVAL, PING_INTERVAL);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut expiry_interval =
            tokio::time::interval_at(now + Duration::from_secs(1), Duration::from_secs(1));
        expiry_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let idle = tokio::time::sleep(IDLE_TIMEOUT);
        tokio::pin!(idle);
        let mut logout_timeout: Option<Pin<Box<Sleep>>> = None;

        info!("Game connection established");

        let result = loop {
            tokio::select! {
                packet = connection.next() => {
                    match packet {
                        Some(Ok(packet)) => {
                            idle.as_mut().reset(Instant::now() + IDLE_TIMEOUT);
                            match self
                                .handle_packet(&mut handler, &mut connection, &realm_name, packet)
                                .await?
                            {
                                Flow::Continue => {}
                                Flow::LoggedOut => break Ok(()),
                            }
                        }
                        Some(Err(e)) => {
                            break Err(SessionError::Protocol(ProtocolError::InvalidPacket {
                                message: e.to_string(),
                            }));
                        }
                        None => break Err(SessionError::Connection(ConnectionError::ConnectionClosed)),
                    }
                }

                _ = &mut idle => {
                    break Err(SessionError::Connection(ConnectionError::IdleTimeout {
                        seconds: IDLE_TIMEOUT.as_secs(),
                    }));
                }

                // Shutdown: ask for a clean logout, bounded by a timer.
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        if handler.in_world {
                            info!("Shutdown signal received - logging out character...");
                            connection.send(logout_request()).await?;
                            logout_timeout =
                                Some(Box::pin(tokio::time::sleep(LOGOUT_TIMEOUT)));
                        } else {
                            break Ok(());
                        }
                    }
                }

                _ = async { logout_timeout.as_mut().unwrap().as_mut().await },
                    if logout_timeout.is_some() => {
                    warn!("Logout timed out after {}s - closing connection", LOGOUT_TIMEOUT.as_secs());
                    break Ok(());
                }

                _ = ping_interval.tick() => {
                    if handler.in_world {
                        let ping = Ping { sequence: handler.next_ping_sequence(), latency: 0 };
                        connection.send(ping.into()).await?;
                    }
                }

                _ = expiry_interval.tick() => {
                    self.expire_requests();
                }

                Some(outgoing) = self.channels.outgoing_rx.recv() => {
                    self.handle_outgoing(&mut handler, &mut connection, outgoing).await?;
                }

                Some(command) = self.channels.command_rx.recv() => {
                    self.handle_command(&mut handler, &mut connection, command).await?;
                }
            }
        };

        // Outstanding requests answer empty rather than hang.
        if let Some(pending) = self.pending_who.take() {
            let _ = pending.reply.send(Vec::new());
        }
        if let Some(pending) = self.pending_motd.take() {
            let _ = pending.reply.send(None);
        }

        let reason = match &result {
            Ok(()) => "logged out".to_string(),
            Err(e) => e.to_string(),
        };
        self.emit(BridgeEvent::Disconnected { reason });
        result
    }

    /// Answer queued commands and drop outgoing chat while the session
    /// is down, until the delay elapses or shutdown is requested.
    pub async fn idle_drain(&mut self, delay: Duration) {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut shutdown_rx = self.channels.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = &mut sleep => return,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                Some(_) = self.channels.outgoing_rx.recv() => {
                    debug!("Dropping outgoing message - game disconnected");
                }
                Some(command) = self.channels.command_rx.recv() => {
                    match command {
                        BridgeCommand::Who { reply, .. } => {
                            let _ = reply.send(Vec::new());
                        }
                        BridgeCommand::GuildMotd { reply } => {
                            let _ = reply.send(None);
                        }
                    }
                }
            }
        }
    }

    fn emit(&self, event: BridgeEvent) {
        if self.channels.event_tx.send(event).is_err() {
            warn!("Bridge receiver gone; dropping event");
        }
    }

    fn expire_requests(&mut self) {
        if let Some(pending) = &self.pending_who {
            if pending.issued.elapsed() >= REQUEST_TIMEOUT {
                let pending = self.pending_who.take().unwrap();
                let _ = pending.reply.send(Vec::new());
            }
        }
        if let Some(pending) = &self.pending_motd {
            if pending.issued.elapsed() >= REQUEST_TIMEOUT {
                let pending = self.pending_motd.take().unwrap();
                let _ = pending.reply.send(None);
            }
        }
    }

    async fn handle_packet<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        realm_name: &str,
        packet: Packet,
    ) -> SessionResult<Flow>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut payload = packet.payload;

        match packet.opcode {
            SMSG_AUTH_CHALLENGE => {
                self.on_auth_challenge(handler, connection, &mut payload).await?;
            }
            SMSG_AUTH_RESPONSE => {
                self.on_auth_response(connection, &mut payload).await?;
            }
            SMSG_CHAR_ENUM => {
                self.on_char_enum(handler, connection, &mut payload).await?;
            }
            SMSG_LOGIN_VERIFY_WORLD => {
                self.on_login_verify_world(handler, connection, realm_name).await?;
            }
            SMSG_MESSAGECHAT => {
                self.on_messagechat(handler, connection, payload, false).await?;
            }
            SMSG_GM_MESSAGECHAT => {
                self.on_messagechat(handler, connection, payload, true).await?;
            }
            SMSG_NAME_QUERY => {
                self.on_name_query(handler, &mut payload)?;
            }
            SMSG_CHANNEL_NOTIFY => {
                let notify = ChannelNotify::decode(&mut payload)?;
                handler.handle_channel_notify(&notify);
                debug!("In {} channels", handler.joined_channels().len());
                self.emit(BridgeEvent::System { text: notify.description() });
            }
            SMSG_GUILD_QUERY => {
                let response = GuildQueryResponse::decode(&mut payload)?;
                handler.handle_guild_query(response);
            }
            SMSG_GUILD_ROSTER => {
                self.on_guild_roster(handler, &mut payload)?;
            }
            SMSG_GUILD_EVENT => {
                self.on_guild_event(handler, connection, &mut payload).await?;
            }
            SMSG_WHO => {
                let response = WhoResponse::decode(&mut payload, self.identity.expansion)?;
                if let Some(pending) = self.pending_who.take() {
                    let _ = pending.reply.send(response.entries);
                }
            }
            SMSG_NOTIFICATION => {
                let text = decode_notification(&mut payload)?;
                if self.config.wow.enable_server_motd {
                    self.emit(BridgeEvent::System { text });
                }
            }
            SMSG_SERVER_MESSAGE => {
                let text = decode_server_message(&mut payload)?;
                if self.config.wow.enable_server_motd {
                    self.emit(BridgeEvent::System { text });
                }
            }
            SMSG_MOTD => {
                let lines = decode_motd(&mut payload)?;
                if self.config.wow.enable_server_motd {
                    for text in lines {
                        self.emit(BridgeEvent::System { text });
                    }
                }
            }
            SMSG_TIME_SYNC_REQ => {
                let request = TimeSyncReq::decode(&mut payload)?;
                let response = TimeSyncResp {
                    counter: request.counter,
                    ticks: handler.ticks(),
                };
                connection.send(response.into()).await?;
            }
            SMSG_WARDEN_DATA => {
                // Acknowledged, never solved.
                connection.send(warden_ack()).await?;
            }
            SMSG_INVALIDATE_PLAYER => {
                let invalidate = InvalidatePlayer::decode(&mut payload)?;
                handler.handle_invalidate_player(invalidate.guid);
            }
            SMSG_PONG => {
                debug!("Pong received");
            }
            SMSG_LOGOUT_COMPLETE => {
                info!("Logout complete - character logged out gracefully");
                return Ok(Flow::LoggedOut);
            }
            other => {
                debug!("Ignoring {} ({other:#06X})", opcode_name(other));
            }
        }

        Ok(Flow::Continue)
    }

    // ========================================================================
    // Authentication handlers
    // ========================================================================

    async fn on_auth_challenge<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        payload: &mut Bytes,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let challenge = AuthChallenge::decode(payload)?;
        let auth_session = handler.handle_auth_challenge(&challenge);
        // Cipher comes up before the response goes out; the codec
        // still sends this one header in clear.
        connection.codec_mut().init_crypt(handler.session_key());
        connection.send(auth_session.into()).await?;
        info!("Sent auth challenge response");
        Ok(())
    }

    async fn on_auth_response<S>(
        &mut self,
        connection: &mut GameConnection<S>,
        payload: &mut Bytes,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match AuthResponse::decode(payload)? {
            AuthResponse::Success => {
                info!("Auth successful, requesting character list");
                connection.send(char_enum_request()).await?;
                Ok(())
            }
            AuthResponse::WaitQueue(position) => {
                info!("In login queue, position {position}");
                Ok(())
            }
            AuthResponse::Failure(code) => Err(AuthResponse::classify_failure(code).into()),
        }
    }

    async fn on_char_enum<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        payload: &mut Bytes,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let char_enum = CharEnum::decode(payload, self.identity.expansion)?;
        match handler.handle_char_enum(char_enum) {
            Some(character) => {
                info!("Logging in as {} (guid {})", character.name, character.guid);
                connection.send(PlayerLogin { guid: character.guid }.into()).await?;
                Ok(())
            }
            None => Err(SessionError::Protocol(ProtocolError::CharacterNotFound {
                name: self.identity.character.clone(),
            })),
        }
    }

    async fn on_login_verify_world<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        realm_name: &str,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if !handler.handle_login_verify_world() {
            return Ok(());
        }
        info!("In world on {realm_name}");
        self.emit(BridgeEvent::Connected { realm: realm_name.to_string() });

        if handler.guild_id > 0 {
            connection.send(GuildQuery { guild_id: handler.guild_id }.into()).await?;
            connection.send(guild_roster_request()).await?;
        }

        for channel in self.config.channels_to_join() {
            info!("Joining channel: {channel}");
            let join = JoinChannel {
                expansion: self.identity.expansion,
                channel_name: channel,
            };
            connection.send(join.into()).await?;
        }

        Ok(())
    }

    // ========================================================================
    // Chat handlers
    // ========================================================================

    async fn on_messagechat<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        payload: Bytes,
        gm: bool,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut payload = payload;
        let Some(message) = MessageChat::decode(&mut payload, gm)? else {
            return Ok(());
        };

        match handler.resolve_chat(message) {
            ChatOutcome::Ready(chat) => self.emit(BridgeEvent::Chat(chat)),
            ChatOutcome::NeedName(guid) => {
                if handler.mark_name_query(guid) {
                    connection.send(NameQuery { guid }.into()).await?;
                }
            }
            ChatOutcome::Ignored => {}
        }
        Ok(())
    }

    fn on_name_query(&mut self, handler: &mut WorldHandler, payload: &mut Bytes) -> SessionResult<()> {
        let response = NameQueryResponse::decode(payload)?;
        self.emit(BridgeEvent::NameResolved {
            guid: response.guid,
            name: response.name.clone(),
        });
        for chat in handler.handle_name_resolved(response.guid, response.name) {
            self.emit(BridgeEvent::Chat(chat));
        }
        Ok(())
    }

    // ========================================================================
    // Guild handlers
    // ========================================================================

    fn on_guild_roster(&mut self, handler: &mut WorldHandler, payload: &mut Bytes) -> SessionResult<()> {
        let roster = GuildRoster::decode(payload, self.identity.expansion)?;
        match &handler.guild_info {
            Some(info) => info!("Roster for <{}>: {} members", info.name, roster.members.len()),
            None => info!("Guild roster received: {} members", roster.members.len()),
        }

        for (kind, name) in handler.handle_guild_roster(roster) {
            self.emit(BridgeEvent::GuildEvent {
                kind,
                user: name,
                target: None,
                rank: None,
                message: None,
            });
        }

        if let Some(pending) = self.pending_motd.take() {
            let _ = pending.reply.send(handler.guild_motd.clone());
        }
        Ok(())
    }

    async fn on_guild_event<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        payload: &mut Bytes,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let packet = GuildEventPacket::decode(payload)?;
        match handler.handle_guild_event(packet) {
            GuildEventAction::Emit { kind, user, target, rank, message, refresh_roster } => {
                self.emit(BridgeEvent::GuildEvent { kind, user, target, rank, message });
                if refresh_roster {
                    connection.send(guild_roster_request()).await?;
                }
            }
            GuildEventAction::RefreshRoster => {
                connection.send(guild_roster_request()).await?;
            }
            GuildEventAction::None => {}
        }
        Ok(())
    }

    // ========================================================================
    // Bridge-driven handlers
    // ========================================================================

    async fn handle_outgoing<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        outgoing: OutgoingChat,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        if !handler.in_world {
            debug!("Dropping outgoing chat - not in world yet");
            return Ok(());
        }
        let message =
            handler.build_chat_message(outgoing.chat_type, outgoing.channel.as_deref(), &outgoing.text);
        connection.send(message.into()).await?;
        Ok(())
    }

    async fn handle_command<S>(
        &mut self,
        handler: &mut WorldHandler,
        connection: &mut GameConnection<S>,
        command: BridgeCommand,
    ) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match command {
            BridgeCommand::Who { name, reply } => {
                if !handler.in_world {
                    let _ = reply.send(Vec::new());
                    return Ok(());
                }
                if let Some(prior) = self.pending_who.take() {
                    let _ = prior.reply.send(Vec::new());
                }
                connection.send(WhoRequest { name }.into()).await?;
                self.pending_who = Some(PendingWho { reply, issued: Instant::now() });
            }
            BridgeCommand::GuildMotd { reply } => {
                if let Some(motd) = handler.guild_motd.clone() {
                    let _ = reply.send(Some(motd));
                } else if !handler.in_world || handler.guild_id == 0 {
                    let _ = reply.send(None);
                } else {
                    if let Some(prior) = self.pending_motd.take() {
                        let _ = prior.reply.send(None);
                    }
                    connection.send(guild_roster_request()).await?;
                    self.pending_motd = Some(PendingMotd { reply, issued: Instant::now() });
                }
            }
        }
        Ok(())
    }
}
