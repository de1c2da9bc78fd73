//! Chat packets: SMSG_MESSAGECHAT in, CMSG_MESSAGECHAT out, channel
//! membership, and name queries.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::error::ProtocolError;
use crate::common::types::{ChatType, Guid};
use crate::config::types::Expansion;
use crate::protocol::packets::codec::{put_cstring, read_cstring, MAX_CSTRING_SHORT};
use crate::protocol::packets::opcodes;
use crate::protocol::packets::{Packet, PacketEncode};

/// Channel notification types.
pub mod chat_notify {
    pub const CHAT_YOU_JOINED_NOTICE: u8 = 0x00;
    pub const CHAT_YOU_LEFT_NOTICE: u8 = 0x01;
    pub const CHAT_WRONG_PASSWORD_NOTICE: u8 = 0x02;
    pub const CHAT_MUTED_NOTICE: u8 = 0x03;
    pub const CHAT_BANNED_NOTICE: u8 = 0x06;
    pub const CHAT_WRONG_FACTION_NOTICE: u8 = 0x08;
    pub const CHAT_INVALID_NAME_NOTICE: u8 = 0x09;
    pub const CHAT_THROTTLED_NOTICE: u8 = 0x0E;
    pub const CHAT_NOT_IN_AREA_NOTICE: u8 = 0x0F;
    pub const CHAT_NOT_IN_LFG_NOTICE: u8 = 0x10;
}

/// Language ids for chat messages.
pub mod languages {
    pub const LANG_UNIVERSAL: u32 = 0;
    /// -1 as u32; addon traffic, always filtered.
    pub const LANG_ADDON: u32 = 0xFFFF_FFFF;
}

/// Decoded SMSG_MESSAGECHAT / SMSG_GM_MESSAGECHAT.
#[derive(Debug, Clone)]
pub struct MessageChat {
    pub chat_type: u8,
    pub language: u32,
    pub sender_guid: Guid,
    pub target_guid: Guid,
    pub channel_name: Option<String>,
    /// GM packets embed the sender name instead of relying on queries.
    pub gm_sender: Option<String>,
    pub text: String,
    pub chat_tag: u8,
}

impl MessageChat {
    /// Decode a chat packet. Returns `None` for addon-language
    /// traffic, which is never bridged.
    pub fn decode(buf: &mut Bytes, gm: bool) -> Result<Option<Self>, ProtocolError> {
        if buf.remaining() < 5 {
            return Err(ProtocolError::PacketTooShort {
                needed: 5,
                got: buf.remaining(),
            });
        }

        let chat_type = buf.get_u8();
        let language = buf.get_u32_le();
        if language == languages::LANG_ADDON {
            return Ok(None);
        }

        if buf.remaining() < 12 {
            return Err(ProtocolError::PacketTooShort {
                needed: 12,
                got: buf.remaining(),
            });
        }
        let sender_guid = buf.get_u64_le();
        let _flags = buf.get_u32_le();

        let gm_sender = if gm {
            if buf.remaining() < 4 {
                return Err(ProtocolError::PacketTooShort {
                    needed: 4,
                    got: buf.remaining(),
                });
            }
            let name_len = buf.get_u32_le() as usize;
            if buf.remaining() < name_len {
                return Err(ProtocolError::PacketTooShort {
                    needed: name_len,
                    got: buf.remaining(),
                });
            }
            let name = buf.copy_to_bytes(name_len);
            let name = name.strip_suffix(&[0u8][..]).unwrap_or(&name[..]);
            Some(String::from_utf8_lossy(name).to_string())
        } else {
            None
        };

        let channel_name = if chat_type == ChatType::Channel.to_id() {
            Some(
                read_cstring(buf, MAX_CSTRING_SHORT)
                    .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?,
            )
        } else {
            None
        };

        if buf.remaining() < 12 {
            return Err(ProtocolError::PacketTooShort {
                needed: 12,
                got: buf.remaining(),
            });
        }
        let target_guid = buf.get_u64_le();
        let text_len = buf.get_u32_le() as usize;

        // Length counts the null terminator.
        let body_len = text_len.saturating_sub(1);
        if buf.remaining() < body_len {
            return Err(ProtocolError::PacketTooShort {
                needed: body_len,
                got: buf.remaining(),
            });
        }
        let text_bytes = buf.copy_to_bytes(body_len);
        let text = String::from_utf8_lossy(&text_bytes).to_string();
        if buf.has_remaining() {
            buf.advance(1); // terminator
        }
        let chat_tag = if buf.has_remaining() { buf.get_u8() } else { 0 };

        Ok(Some(Self {
            chat_type,
            language,
            sender_guid,
            target_guid,
            channel_name,
            gm_sender,
            text,
            chat_tag,
        }))
    }
}

/// CMSG_MESSAGECHAT.
#[derive(Debug, Clone)]
pub struct SendChatMessage {
    pub chat_type: ChatType,
    pub language: u32,
    /// Whisper recipient or channel name.
    pub target: Option<String>,
    pub text: String,
}

impl PacketEncode for SendChatMessage {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.chat_type.to_id() as u32);
        buf.put_u32_le(self.language);
        if let Some(ref target) = self.target {
            put_cstring(buf, target);
        }
        put_cstring(buf, &self.text);
    }
}

impl From<SendChatMessage> for Packet {
    fn from(msg: SendChatMessage) -> Self {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf);
        Packet::new(opcodes::CMSG_MESSAGECHAT, buf.freeze())
    }
}

/// CMSG_JOIN_CHANNEL, era-specific framing.
#[derive(Debug, Clone)]
pub struct JoinChannel {
    pub expansion: Expansion,
    pub channel_name: String,
}

impl PacketEncode for JoinChannel {
    fn encode(&self, buf: &mut BytesMut) {
        if self.expansion >= Expansion::Wotlk {
            buf.put_u32_le(0); // channel id
            buf.put_u8(0); // has voice
            buf.put_u8(0); // joined by zone update
        }
        put_cstring(buf, &self.channel_name);
        put_cstring(buf, ""); // password
    }
}

impl From<JoinChannel> for Packet {
    fn from(join: JoinChannel) -> Self {
        let mut buf = BytesMut::new();
        join.encode(&mut buf);
        Packet::new(opcodes::CMSG_JOIN_CHANNEL, buf.freeze())
    }
}

/// SMSG_CHANNEL_NOTIFY.
#[derive(Debug, Clone)]
pub struct ChannelNotify {
    pub notify_type: u8,
    pub channel_name: String,
}

impl ChannelNotify {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 2 {
            return Err(ProtocolError::PacketTooShort {
                needed: 2,
                got: buf.remaining(),
            });
        }
        let notify_type = buf.get_u8();
        let channel_name = read_cstring(buf, MAX_CSTRING_SHORT)
            .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
        Ok(Self { notify_type, channel_name })
    }

    /// Whether this notice means the session is now in the channel.
    pub fn joined(&self) -> bool {
        self.notify_type == chat_notify::CHAT_YOU_JOINED_NOTICE
    }

    pub fn left(&self) -> bool {
        self.notify_type == chat_notify::CHAT_YOU_LEFT_NOTICE
    }

    /// Human-readable description of the notification.
    pub fn description(&self) -> String {
        match self.notify_type {
            chat_notify::CHAT_YOU_JOINED_NOTICE => {
                format!("Joined channel: [{}]", self.channel_name)
            }
            chat_notify::CHAT_YOU_LEFT_NOTICE => {
                format!("Left channel: [{}]", self.channel_name)
            }
            chat_notify::CHAT_WRONG_PASSWORD_NOTICE => {
                format!("Wrong password for channel: {}", self.channel_name)
            }
            chat_notify::CHAT_MUTED_NOTICE => {
                format!("[{}] You do not have permission to speak", self.channel_name)
            }
            chat_notify::CHAT_BANNED_NOTICE => {
                format!("[{}] You are banned from that channel", self.channel_name)
            }
            chat_notify::CHAT_WRONG_FACTION_NOTICE => {
                format!("Wrong faction for channel: {}", self.channel_name)
            }
            chat_notify::CHAT_INVALID_NAME_NOTICE => "Invalid channel name".to_string(),
            chat_notify::CHAT_THROTTLED_NOTICE => {
                format!("[{}] Message rate limited, please wait", self.channel_name)
            }
            chat_notify::CHAT_NOT_IN_AREA_NOTICE => format!(
                "[{}] You are not in the correct area for this channel",
                self.channel_name
            ),
            chat_notify::CHAT_NOT_IN_LFG_NOTICE => format!(
                "[{}] You must be queued in LFG to join this channel",
                self.channel_name
            ),
            _ => format!(
                "Channel notification {} for {}",
                self.notify_type, self.channel_name
            ),
        }
    }
}

/// CMSG_NAME_QUERY.
#[derive(Debug, Clone)]
pub struct NameQuery {
    pub guid: Guid,
}

impl PacketEncode for NameQuery {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.guid);
    }
}

impl From<NameQuery> for Packet {
    fn from(query: NameQuery) -> Self {
        let mut buf = BytesMut::new();
        query.encode(&mut buf);
        Packet::new(opcodes::CMSG_NAME_QUERY, buf.freeze())
    }
}

/// SMSG_NAME_QUERY response.
#[derive(Debug, Clone)]
pub struct NameQueryResponse {
    pub guid: Guid,
    pub name: String,
    pub realm_name: String,
    pub race: u32,
    pub gender: u32,
    pub class: u32,
}

impl NameQueryResponse {
    pub fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        if buf.remaining() < 8 {
            return Err(ProtocolError::PacketTooShort {
                needed: 8,
                got: buf.remaining(),
            });
        }
        let guid = buf.get_u64_le();
        let name = read_cstring(buf, MAX_CSTRING_SHORT)
            .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
        let realm_name = read_cstring(buf, MAX_CSTRING_SHORT)
            .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
        if buf.remaining() < 12 {
            return Err(ProtocolError::PacketTooShort {
                needed: 12,
                got: buf.remaining(),
            });
        }
        Ok(Self {
            guid,
            name,
            realm_name,
            race: buf.get_u32_le(),
            gender: buf.get_u32_le(),
            class: buf.get_u32_le(),
        })
    }
}
