//! Guild packets: query, roster, events, and the who list.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::error::ProtocolError;
use crate::common::resources::Class;
use crate::common::types::{GuildEventKind, GuildMember, WhoEntry};
use crate::config::types::Expansion;
use crate::protocol::packets::codec::{put_cstring, read_cstring, MAX_CSTRING_LONG, MAX_CSTRING_SHORT};
use crate::protocol::packets::opcodes;
use crate::protocol::packets::{Packet, PacketEncode};

fn cstring(buf: &mut Bytes, max: usize) -> Result<String, ProtocolError> {
    read_cstring(buf, max).map_err(|e| ProtocolError::InvalidString { message: e.to_string() })
}

/// CMSG_GUILD_QUERY.
#[derive(Debug, Clone)]
pub struct GuildQuery {
    pub guild_id: u32,
}

impl PacketEncode for GuildQuery {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.guild_id);
    }
}

impl From<GuildQuery> for Packet {
    fn from(query: GuildQuery) -> Self {
        let mut buf = BytesMut::new();
        query.encode(&mut buf);
        Packet::new(opcodes::CMSG_GUILD_QUERY, buf.freeze())
    }
}

/// SMSG_GUILD_QUERY: guild name and rank titles.
#[derive(Debug, Clone, Default)]
pub struct GuildQueryResponse {
    pub guild_id: u32,
    pub name: String,
    pub ranks: Vec<String>,
}

impl GuildQueryResponse {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 4 {
            return Err(ProtocolError::PacketTooShort {
                needed: 4,
                got: buf.remaining(),
            });
        }
        let guild_id = buf.get_u32_le();
        let name = cstring(buf, MAX_CSTRING_SHORT)?;

        // Ten rank slots, unused ones empty.
        let mut ranks = Vec::new();
        for _ in 0..10 {
            let rank = cstring(buf, MAX_CSTRING_SHORT)?;
            if !rank.is_empty() {
                ranks.push(rank);
            }
        }

        Ok(Self { guild_id, name, ranks })
    }
}

/// CMSG_GUILD_ROSTER request (empty payload).
pub fn guild_roster_request() -> Packet {
    Packet::empty(opcodes::CMSG_GUILD_ROSTER)
}

/// SMSG_GUILD_ROSTER.
#[derive(Debug, Clone, Default)]
pub struct GuildRoster {
    pub motd: String,
    pub info: String,
    pub members: Vec<GuildMember>,
}

impl GuildRoster {
    pub fn decode(buf: &mut Bytes, expansion: Expansion) -> Result<Self, ProtocolError> {
        if buf.remaining() < 4 {
            return Err(ProtocolError::PacketTooShort {
                needed: 4,
                got: buf.remaining(),
            });
        }
        let member_count = buf.get_u32_le();
        let motd = cstring(buf, MAX_CSTRING_LONG)?;
        let info = cstring(buf, MAX_CSTRING_LONG)?;

        if buf.remaining() < 4 {
            return Err(ProtocolError::PacketTooShort {
                needed: 4,
                got: buf.remaining(),
            });
        }
        let rank_count = buf.get_u32_le() as usize;
        // Rank rights; WotLK+ adds gold withdrawals and six bank tabs.
        let rank_stride = if expansion >= Expansion::Wotlk { 56 } else { 4 };
        let rank_bytes = rank_count.saturating_mul(rank_stride);
        if buf.remaining() < rank_bytes {
            return Err(ProtocolError::PacketTooShort {
                needed: rank_bytes,
                got: buf.remaining(),
            });
        }
        buf.advance(rank_bytes);

        let mut members = Vec::with_capacity(member_count.min(5000) as usize);
        for _ in 0..member_count {
            if buf.remaining() < 9 {
                break;
            }
            let guid = buf.get_u64_le();
            let online = buf.get_u8() != 0;
            let name = cstring(buf, MAX_CSTRING_SHORT)?;
            if buf.remaining() < 6 {
                break;
            }
            let rank = buf.get_u32_le();
            let level = buf.get_u8();
            let class = buf.get_u8();
            if expansion >= Expansion::Wotlk {
                if !buf.has_remaining() {
                    break;
                }
                let _gender = buf.get_u8();
            }
            if buf.remaining() < 4 {
                break;
            }
            let zone_id = buf.get_u32_le();
            if !online {
                if buf.remaining() < 4 {
                    break;
                }
                let _last_logoff = buf.get_f32_le();
            }
            let _public_note = cstring(buf, MAX_CSTRING_SHORT)?;
            let _officer_note = cstring(buf, MAX_CSTRING_SHORT)?;

            members.push(GuildMember {
                guid,
                name,
                level,
                class: Class::from_id(class),
                rank,
                zone_id,
                online,
            });
        }

        Ok(Self { motd, info, members })
    }
}

/// Guild event ids from SMSG_GUILD_EVENT.
pub mod guild_events {
    pub const GE_PROMOTION: u8 = 0x00;
    pub const GE_DEMOTION: u8 = 0x01;
    pub const GE_MOTD: u8 = 0x02;
    pub const GE_JOINED: u8 = 0x03;
    pub const GE_LEFT: u8 = 0x04;
    pub const GE_REMOVED: u8 = 0x05;
    pub const GE_SIGNED_ON: u8 = 0x0C;
    pub const GE_SIGNED_OFF: u8 = 0x0D;
}

/// Decoded SMSG_GUILD_EVENT.
#[derive(Debug, Clone)]
pub struct GuildEventPacket {
    pub event_type: u8,
    pub strings: Vec<String>,
}

impl GuildEventPacket {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 2 {
            return Err(ProtocolError::PacketTooShort {
                needed: 2,
                got: buf.remaining(),
            });
        }
        let event_type = buf.get_u8();
        let num_strings = buf.get_u8();
        let mut strings = Vec::with_capacity(num_strings as usize);
        for _ in 0..num_strings {
            strings.push(cstring(buf, MAX_CSTRING_LONG)?);
        }
        Ok(Self { event_type, strings })
    }

    /// Map to the bridge-level event. Sign-on/off packets return the
    /// presence kinds; the session decides whether to forward them or
    /// lean on the roster diff.
    pub fn to_event(&self) -> Option<(GuildEventKind, String, Option<String>, Option<String>, Option<String>)> {
        let first = |i: usize| self.strings.get(i).cloned();
        match self.event_type {
            guild_events::GE_PROMOTION => Some((
                GuildEventKind::Promoted,
                first(0)?,
                first(1),
                first(2),
                None,
            )),
            guild_events::GE_DEMOTION => Some((
                GuildEventKind::Demoted,
                first(0)?,
                first(1),
                first(2),
                None,
            )),
            guild_events::GE_MOTD => Some((
                GuildEventKind::Motd,
                String::new(),
                None,
                None,
                first(0),
            )),
            guild_events::GE_JOINED => {
                Some((GuildEventKind::Joined, first(0)?, None, None, None))
            }
            guild_events::GE_LEFT => Some((GuildEventKind::Left, first(0)?, None, None, None)),
            guild_events::GE_REMOVED => Some((
                GuildEventKind::Removed,
                first(1).unwrap_or_default(),
                first(0),
                None,
                None,
            )),
            guild_events::GE_SIGNED_ON => {
                Some((GuildEventKind::Online, first(0)?, None, None, None))
            }
            guild_events::GE_SIGNED_OFF => {
                Some((GuildEventKind::Offline, first(0)?, None, None, None))
            }
            _ => None,
        }
    }
}

/// CMSG_WHO with the stock filter: any level, any race or class.
#[derive(Debug, Clone)]
pub struct WhoRequest {
    pub name: Option<String>,
}

impl PacketEncode for WhoRequest {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(0); // min level
        buf.put_u32_le(100); // max level
        put_cstring(buf, self.name.as_deref().unwrap_or(""));
        put_cstring(buf, ""); // guild filter
        buf.put_u32_le(0xFFFF_FFFF); // race mask
        buf.put_u32_le(0xFFFF_FFFF); // class mask
        buf.put_u32_le(0); // zone count
        buf.put_u32_le(0); // string count
    }
}

impl From<WhoRequest> for Packet {
    fn from(request: WhoRequest) -> Self {
        let mut buf = BytesMut::new();
        request.encode(&mut buf);
        Packet::new(opcodes::CMSG_WHO, buf.freeze())
    }
}

/// SMSG_WHO.
#[derive(Debug, Clone, Default)]
pub struct WhoResponse {
    pub total_count: u32,
    pub entries: Vec<WhoEntry>,
}

impl WhoResponse {
    pub fn decode(buf: &mut Bytes, expansion: Expansion) -> Result<Self, ProtocolError> {
        if buf.remaining() < 8 {
            return Err(ProtocolError::PacketTooShort {
                needed: 8,
                got: buf.remaining(),
            });
        }
        let display_count = buf.get_u32_le();
        let total_count = buf.get_u32_le();

        let mut entries = Vec::with_capacity(display_count.min(64) as usize);
        for _ in 0..display_count {
            if !buf.has_remaining() {
                break;
            }
            let name = cstring(buf, MAX_CSTRING_SHORT)?;
            let guild = cstring(buf, MAX_CSTRING_SHORT)?;
            if buf.remaining() < 12 {
                break;
            }
            let level = buf.get_u32_le();
            let class = buf.get_u32_le();
            let _race = buf.get_u32_le();
            if expansion >= Expansion::Tbc {
                if !buf.has_remaining() {
                    break;
                }
                let _gender = buf.get_u8();
            }
            if buf.remaining() < 4 {
                break;
            }
            let zone_id = buf.get_u32_le();

            entries.push(WhoEntry {
                name,
                guild,
                level,
                class: Class::from_id(class as u8),
                zone_id,
            });
        }

        Ok(Self { total_count, entries })
    }
}
