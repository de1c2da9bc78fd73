//! World server session packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::common::error::{AuthError, ProtocolError};
use crate::config::types::Expansion;
use crate::protocol::packets::codec::{read_cstring, MAX_CSTRING_LONG, MAX_CSTRING_SHORT};
use crate::protocol::packets::opcodes;
use crate::protocol::packets::{Packet, PacketEncode};

/// Compressed addon-list blob reused verbatim on every logon.
pub const ADDON_INFO: [u8; 215] = hex_literal::hex!(
    "9E020000789C75D2C16AC3300CC671EF2976E99BECB4B450C2EACBE29E8B627F"
    "4B446C39384EB7F63DFABE65B70D94F34F48F047AFC69826F2FD4E255CDEFDC8"
    "B82241EAB9352FE97B7732FFBC404897D557CEA25A43A54759C63C6F70AD115F"
    "8C182C0B279AB52196C032A80BF61421818A4639F5544F79D834879FAAE001FD"
    "3AB89CE3A2E0D1EE47D20B1D6DB7962B6E3AC6DB3CEAB2720C0DC9A46A2BCB0C"
    "AF1F6C2B5297FD84BA95C7922F59954FE2A082FB2DAADF739C60496880D6DBE5"
    "09FA13B84201DDC4316E310BCA5F7B7B1C3E9EE193C88D"
);

/// SMSG_AUTH_CHALLENGE body.
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub server_seed: u32,
}

impl AuthChallenge {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 8 {
            return Err(ProtocolError::PacketTooShort {
                needed: 8,
                got: buf.remaining(),
            });
        }
        buf.advance(4);
        let server_seed = buf.get_u32();
        Ok(Self { server_seed })
    }
}

/// Proof digest sent in CMSG_AUTH_CHALLENGE:
/// SHA1(account || 0u32 || client_seed BE || server_seed BE || session key).
pub fn session_digest(
    account: &[u8],
    client_seed: u32,
    server_seed: u32,
    session_key: &[u8; 40],
) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(account);
    hasher.update([0, 0, 0, 0]);
    hasher.update(client_seed.to_be_bytes());
    hasher.update(server_seed.to_be_bytes());
    hasher.update(session_key);
    hasher.finalize().into()
}

/// CMSG_AUTH_CHALLENGE body, laid out per era.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub expansion: Expansion,
    pub build: u32,
    pub account: Vec<u8>,
    pub client_seed: u32,
    pub realm_id: u32,
    pub digest: [u8; 20],
}

impl PacketEncode for AuthSession {
    fn encode(&self, buf: &mut BytesMut) {
        match self.expansion {
            Expansion::Vanilla | Expansion::Tbc => {
                buf.put_u32_le(self.build);
                buf.put_slice(&self.account);
                buf.put_u8(0);
                buf.put_u32(self.client_seed);
                buf.put_slice(&self.digest);
                buf.put_slice(&ADDON_INFO);
            }
            // WotLK layout; Cataclysm and MoP keep it with their own
            // build numbers.
            Expansion::Wotlk | Expansion::Cataclysm | Expansion::Mop => {
                buf.put_u16_le(0);
                buf.put_u32_le(self.build);
                buf.put_u32_le(0);
                buf.put_slice(&self.account);
                buf.put_u8(0);
                buf.put_u32(0);
                buf.put_u32(self.client_seed);
                buf.put_u32_le(0);
                buf.put_u32_le(0);
                buf.put_u32_le(self.realm_id);
                buf.put_u64_le(3);
                buf.put_slice(&self.digest);
                buf.put_slice(&ADDON_INFO);
            }
        }
    }
}

impl From<AuthSession> for Packet {
    fn from(auth: AuthSession) -> Self {
        let mut buf = BytesMut::new();
        auth.encode(&mut buf);
        Packet::new(opcodes::CMSG_AUTH_CHALLENGE, buf.freeze())
    }
}

/// World auth response codes (SMSG_AUTH_RESPONSE).
pub mod auth_codes {
    pub const AUTH_OK: u8 = 0x0C;
    pub const AUTH_FAILED: u8 = 0x0D;
    pub const AUTH_REJECT: u8 = 0x0E;
    pub const AUTH_BAD_SERVER_PROOF: u8 = 0x0F;
    pub const AUTH_UNAVAILABLE: u8 = 0x10;
    pub const AUTH_SYSTEM_ERROR: u8 = 0x11;
    pub const AUTH_BILLING_ERROR: u8 = 0x12;
    pub const AUTH_BILLING_EXPIRED: u8 = 0x13;
    pub const AUTH_VERSION_MISMATCH: u8 = 0x14;
    pub const AUTH_UNKNOWN_ACCOUNT: u8 = 0x15;
    pub const AUTH_INCORRECT_PASSWORD: u8 = 0x16;
    pub const AUTH_SESSION_EXPIRED: u8 = 0x17;
    pub const AUTH_SERVER_SHUTTING_DOWN: u8 = 0x18;
    pub const AUTH_ALREADY_LOGGING_IN: u8 = 0x19;
    pub const AUTH_LOGIN_SERVER_NOT_FOUND: u8 = 0x1A;
    pub const AUTH_WAIT_QUEUE: u8 = 0x1B;
    pub const AUTH_BANNED: u8 = 0x1C;
    pub const AUTH_ALREADY_ONLINE: u8 = 0x1D;
    pub const AUTH_NO_TIME: u8 = 0x1E;
    pub const AUTH_DB_BUSY: u8 = 0x1F;
    pub const AUTH_SUSPENDED: u8 = 0x20;
    pub const AUTH_PARENTAL_CONTROL: u8 = 0x21;
    pub const AUTH_LOCKED_ENFORCED: u8 = 0x22;
}

/// SMSG_AUTH_RESPONSE, reduced to what the session reacts to.
#[derive(Debug, Clone)]
pub enum AuthResponse {
    Success,
    /// Position in the login queue; the session keeps waiting.
    WaitQueue(u32),
    Failure(u8),
}

impl AuthResponse {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 1 {
            return Err(ProtocolError::PacketTooShort {
                needed: 1,
                got: buf.remaining(),
            });
        }
        let code = buf.get_u8();
        Ok(match code {
            auth_codes::AUTH_OK => Self::Success,
            auth_codes::AUTH_WAIT_QUEUE => {
                // Billing block precedes the queue position when present.
                let position = if buf.remaining() >= 4 {
                    let skip = buf.remaining().saturating_sub(4);
                    buf.advance(skip);
                    buf.get_u32_le()
                } else {
                    0
                };
                Self::WaitQueue(position)
            }
            other => Self::Failure(other),
        })
    }

    /// Classify a failure code per the reconnect policy.
    pub fn classify_failure(code: u8) -> AuthError {
        let reason = Self::message(code);
        match code {
            auth_codes::AUTH_VERSION_MISMATCH
            | auth_codes::AUTH_UNKNOWN_ACCOUNT
            | auth_codes::AUTH_INCORRECT_PASSWORD
            | auth_codes::AUTH_BANNED
            | auth_codes::AUTH_SUSPENDED
            | auth_codes::AUTH_PARENTAL_CONTROL
            | auth_codes::AUTH_LOCKED_ENFORCED => AuthError::Fatal { reason },
            _ => AuthError::Transient { reason },
        }
    }

    pub fn message(code: u8) -> String {
        match code {
            auth_codes::AUTH_OK => "Success!".to_string(),
            auth_codes::AUTH_UNKNOWN_ACCOUNT | auth_codes::AUTH_INCORRECT_PASSWORD => {
                "Incorrect username or password!".to_string()
            }
            auth_codes::AUTH_VERSION_MISMATCH => {
                "Invalid game version for this server!".to_string()
            }
            auth_codes::AUTH_BANNED => "Your account has been banned!".to_string(),
            auth_codes::AUTH_ALREADY_LOGGING_IN | auth_codes::AUTH_ALREADY_ONLINE => {
                "Your account is already online!".to_string()
            }
            auth_codes::AUTH_SUSPENDED => "Your account has been suspended!".to_string(),
            other => format!("Failed to login to game server! Error code: {other:#04X}"),
        }
    }
}

/// Information about one character from SMSG_CHAR_ENUM.
#[derive(Debug, Clone)]
pub struct CharacterInfo {
    pub guid: u64,
    pub name: String,
    pub race: u8,
    pub class: u8,
    pub level: u8,
    pub zone_id: u32,
    pub guild_id: u32,
}

/// SMSG_CHAR_ENUM response.
#[derive(Debug, Clone)]
pub struct CharEnum {
    pub characters: Vec<CharacterInfo>,
}

impl CharEnum {
    pub fn decode(buf: &mut Bytes, expansion: Expansion) -> Result<Self, ProtocolError> {
        if buf.remaining() < 1 {
            return Err(ProtocolError::PacketTooShort {
                needed: 1,
                got: buf.remaining(),
            });
        }

        let count = buf.get_u8();
        let mut characters = Vec::with_capacity(count as usize);

        for _ in 0..count {
            if buf.remaining() < 8 {
                break;
            }
            let guid = buf.get_u64_le();
            let name = read_cstring(buf, MAX_CSTRING_SHORT)
                .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
            if buf.remaining() < 9 {
                break;
            }
            let race = buf.get_u8();
            let class = buf.get_u8();
            let _gender = buf.get_u8();
            buf.advance(5); // skin, face, hair, hair color, facial hair
            let level = buf.get_u8();

            if buf.remaining() < 36 {
                break;
            }
            let zone_id = buf.get_u32_le();
            let _map = buf.get_u32_le();
            let _x = buf.get_f32_le();
            let _y = buf.get_f32_le();
            let _z = buf.get_f32_le();
            let guild_id = buf.get_u32_le();
            let _flags = buf.get_u32_le();

            if expansion >= Expansion::Wotlk {
                if buf.remaining() < 5 {
                    break;
                }
                let _char_flags = buf.get_u32_le();
                let _first_login = buf.get_u8();
            }

            if buf.remaining() < 12 {
                break;
            }
            buf.advance(12); // pet display, level, family

            // 19 equipment slots plus the first bag, 9 bytes each.
            let gear = 20 * 9;
            if buf.remaining() < gear {
                break;
            }
            buf.advance(gear);

            characters.push(CharacterInfo {
                guid,
                name,
                race,
                class,
                level,
                zone_id,
                guild_id,
            });
        }

        Ok(Self { characters })
    }
}

/// CMSG_CHAR_ENUM request (empty payload).
pub fn char_enum_request() -> Packet {
    Packet::empty(opcodes::CMSG_CHAR_ENUM)
}

/// CMSG_PLAYER_LOGIN.
#[derive(Debug, Clone)]
pub struct PlayerLogin {
    pub guid: u64,
}

impl PacketEncode for PlayerLogin {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.guid);
    }
}

impl From<PlayerLogin> for Packet {
    fn from(login: PlayerLogin) -> Self {
        let mut buf = BytesMut::new();
        login.encode(&mut buf);
        Packet::new(opcodes::CMSG_PLAYER_LOGIN, buf.freeze())
    }
}

/// CMSG_PING.
#[derive(Debug, Clone)]
pub struct Ping {
    pub sequence: u32,
    pub latency: u32,
}

impl PacketEncode for Ping {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.sequence);
        buf.put_u32_le(self.latency);
    }
}

impl From<Ping> for Packet {
    fn from(ping: Ping) -> Self {
        let mut buf = BytesMut::new();
        ping.encode(&mut buf);
        Packet::new(opcodes::CMSG_PING, buf.freeze())
    }
}

/// CMSG_LOGOUT_REQUEST (empty payload).
pub fn logout_request() -> Packet {
    Packet::empty(opcodes::CMSG_LOGOUT_REQUEST)
}

/// SMSG_TIME_SYNC_REQ.
#[derive(Debug, Clone)]
pub struct TimeSyncReq {
    pub counter: u32,
}

impl TimeSyncReq {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 4 {
            return Err(ProtocolError::PacketTooShort {
                needed: 4,
                got: buf.remaining(),
            });
        }
        Ok(Self { counter: buf.get_u32_le() })
    }
}

/// CMSG_TIME_SYNC_RESP: echoes the counter with the client tick count.
#[derive(Debug, Clone)]
pub struct TimeSyncResp {
    pub counter: u32,
    pub ticks: u32,
}

impl PacketEncode for TimeSyncResp {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.counter);
        buf.put_u32_le(self.ticks);
    }
}

impl From<TimeSyncResp> for Packet {
    fn from(resp: TimeSyncResp) -> Self {
        let mut buf = BytesMut::new();
        resp.encode(&mut buf);
        Packet::new(opcodes::CMSG_TIME_SYNC_RESP, buf.freeze())
    }
}

/// Empty CMSG_WARDEN_DATA acknowledgement; challenges are never solved.
pub fn warden_ack() -> Packet {
    Packet::empty(opcodes::CMSG_WARDEN_DATA)
}

/// SMSG_INVALIDATE_PLAYER.
#[derive(Debug, Clone)]
pub struct InvalidatePlayer {
    pub guid: u64,
}

impl InvalidatePlayer {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 8 {
            return Err(ProtocolError::PacketTooShort {
                needed: 8,
                got: buf.remaining(),
            });
        }
        Ok(Self { guid: buf.get_u64_le() })
    }
}

/// SMSG_NOTIFICATION: a single server-pushed line.
pub fn decode_notification(buf: &mut Bytes) -> Result<String, ProtocolError> {
    read_cstring(buf, MAX_CSTRING_LONG)
        .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })
}

/// SMSG_SERVER_MESSAGE: typed broadcast; the type prefix is dropped.
pub fn decode_server_message(buf: &mut Bytes) -> Result<String, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::PacketTooShort {
            needed: 4,
            got: buf.remaining(),
        });
    }
    let _message_type = buf.get_u32_le();
    read_cstring(buf, MAX_CSTRING_LONG)
        .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })
}

/// SMSG_MOTD: counted list of lines.
pub fn decode_motd(buf: &mut Bytes) -> Result<Vec<String>, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::PacketTooShort {
            needed: 4,
            got: buf.remaining(),
        });
    }
    let count = buf.get_u32_le();
    let mut lines = Vec::with_capacity(count.min(32) as usize);
    for _ in 0..count {
        if !buf.has_remaining() {
            break;
        }
        lines.push(
            read_cstring(buf, MAX_CSTRING_LONG)
                .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?,
        );
    }
    Ok(lines)
}
