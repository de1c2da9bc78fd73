//! World server connection codec: framing plus header encryption.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};

use crate::config::types::Expansion;
use crate::protocol::game::header::GameHeaderCrypt;
use crate::protocol::packets::Packet;
use anyhow::{anyhow, Error};

/// Decoder position between calls. Header bytes are decrypted the
/// moment they are buffered, exactly once; a short read must never
/// replay them through the cipher.
enum DecodeState {
    /// Waiting for the 4 leading header bytes.
    Header,
    /// High bit was set on the decrypted size: one more byte follows.
    ExtendedHeader { prefix: [u8; 4] },
    /// Header complete, waiting for the payload.
    Payload { size: usize, opcode: u16 },
}

/// Codec for world server packets.
pub struct GamePacketCodec {
    expansion: Expansion,
    crypt: GameHeaderCrypt,
    state: DecodeState,
    /// One outbound header stays unencrypted after `init_crypt`: the
    /// server expects the CMSG_AUTH_CHALLENGE header in clear.
    clear_headers_remaining: u32,
}

impl GamePacketCodec {
    pub fn new(expansion: Expansion) -> Self {
        Self {
            expansion,
            crypt: GameHeaderCrypt::new(expansion),
            state: DecodeState::Header,
            clear_headers_remaining: 0,
        }
    }

    /// Key the header cipher from the session key. Called immediately
    /// before the auth challenge response is sent; that one packet's
    /// header still goes out unencrypted.
    pub fn init_crypt(&mut self, session_key: &[u8]) {
        self.crypt.init(session_key);
        self.clear_headers_remaining = 1;
    }

    /// Client header length for this era: size u16 plus a u32 opcode
    /// everywhere except WotLK, which shrank the opcode to u16.
    fn client_header_len(&self) -> usize {
        if self.expansion == Expansion::Wotlk {
            4
        } else {
            6
        }
    }
}

impl Decoder for GamePacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if src.len() < 4 {
                        return Ok(None);
                    }
                    let mut header = [0u8; 4];
                    header.copy_from_slice(&src[..4]);
                    src.advance(4);
                    self.crypt.decrypt(&mut header);

                    if self.expansion.uses_rc4_header_cipher() && (header[0] & 0x80) != 0 {
                        self.state = DecodeState::ExtendedHeader { prefix: header };
                        continue;
                    }

                    let raw_size = ((header[0] as usize) << 8) | header[1] as usize;
                    let size = raw_size
                        .checked_sub(2)
                        .ok_or_else(|| anyhow!("Frame size {raw_size} below opcode length"))?;
                    let opcode = u16::from_le_bytes([header[2], header[3]]);
                    self.state = DecodeState::Payload { size, opcode };
                }
                DecodeState::ExtendedHeader { prefix } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let mut extra = [src[0]];
                    src.advance(1);
                    self.crypt.decrypt(&mut extra);

                    let raw_size = (((prefix[0] & 0x7F) as usize) << 16)
                        | ((prefix[1] as usize) << 8)
                        | prefix[2] as usize;
                    let size = raw_size
                        .checked_sub(2)
                        .ok_or_else(|| anyhow!("Frame size {raw_size} below opcode length"))?;
                    let opcode = ((extra[0] as u16) << 8) | prefix[3] as u16;
                    self.state = DecodeState::Payload { size, opcode };
                }
                DecodeState::Payload { size, opcode } => {
                    if src.len() < size {
                        src.reserve(size - src.len());
                        return Ok(None);
                    }
                    let payload = src.split_to(size).freeze();
                    self.state = DecodeState::Header;
                    return Ok(Some(Packet { opcode, payload }));
                }
            }
        }
    }
}

impl Encoder<Packet> for GamePacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let header_len = self.client_header_len();
        let opcode_len = header_len - 2;
        let total_size = item.payload.len() + opcode_len;
        if total_size > 0x7FFF {
            return Err(anyhow!(
                "Outbound packet {:#06X} too large: {} bytes",
                item.opcode,
                item.payload.len()
            ));
        }

        let mut header = [0u8; 6];
        header[0] = (total_size >> 8) as u8;
        header[1] = (total_size & 0xFF) as u8;
        header[2] = (item.opcode & 0xFF) as u8;
        header[3] = (item.opcode >> 8) as u8;
        // Bytes 4..6 stay zero: the u32 opcode's high half.
        let header = &mut header[..header_len];

        if self.crypt.is_initialized() {
            if self.clear_headers_remaining > 0 {
                self.clear_headers_remaining -= 1;
            } else {
                self.crypt.encrypt(header);
            }
        }

        dst.reserve(header.len() + item.payload.len());
        dst.put_slice(header);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

/// A framed world server connection.
pub type GameConnection<S> = Framed<S, GamePacketCodec>;

/// Create a new world connection from a stream.
pub fn new_game_connection<S: AsyncRead + AsyncWrite>(
    stream: S,
    expansion: Expansion,
) -> GameConnection<S> {
    Framed::new(stream, GamePacketCodec::new(expansion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::game::header::WotlkHeaderCrypt;

    /// Build a server→client frame the way a server would, picking the
    /// extended header iff payload + opcode exceeds 0x7FFF.
    fn build_server_frame(opcode: u16, body: &[u8]) -> Vec<u8> {
        let total = body.len() + 2;
        let mut frame = Vec::new();
        if total > 0x7FFF {
            frame.push(0x80 | ((total >> 16) as u8 & 0x7F));
            frame.push((total >> 8) as u8);
            frame.push(total as u8);
            frame.push((opcode & 0xFF) as u8);
            frame.push((opcode >> 8) as u8);
        } else {
            frame.push((total >> 8) as u8);
            frame.push(total as u8);
            frame.extend_from_slice(&opcode.to_le_bytes());
        }
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn short_frame_round_trips() {
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        let body = vec![0xAAu8; 24];
        let mut src = BytesMut::from(&build_server_frame(0x01EC, &body)[..]);

        let packet = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(packet.opcode, 0x01EC);
        assert_eq!(&packet.payload[..], &body[..]);
        assert!(src.is_empty());
    }

    #[test]
    fn extended_frame_round_trips() {
        // Payload of 0xC000 - 2 bytes forces the 5-byte header.
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        let body = vec![0x55u8; 0xC000 - 2];
        let frame = build_server_frame(0x01AB, &body);
        assert_eq!(frame[0] & 0x80, 0x80);
        assert_eq!(frame.len(), 5 + body.len());

        let mut src = BytesMut::from(&frame[..]);
        let packet = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(packet.opcode, 0x01AB);
        assert_eq!(packet.payload.len(), 0xBFFE);
    }

    #[test]
    fn extended_header_is_short_form_threshold() {
        // Exactly 0x7FFF total stays on the 4-byte header.
        let body = vec![0u8; 0x7FFF - 2];
        let frame = build_server_frame(0x0001, &body);
        assert_eq!(frame.len(), 4 + body.len());

        let body = vec![0u8; 0x8000 - 2];
        let frame = build_server_frame(0x0001, &body);
        assert_eq!(frame.len(), 5 + body.len());
    }

    #[test]
    fn legacy_era_never_sees_extended_headers() {
        // Vanilla sizes fit 15 bits; a set high bit is part of the size.
        let mut codec = GamePacketCodec::new(Expansion::Vanilla);
        let mut src = BytesMut::from(&[0x80u8, 0x02, 0x96, 0x00][..]);
        // Decoder treats this as size 0x8002 and waits for the payload.
        assert!(codec.decode(&mut src).unwrap().is_none());
        assert!(matches!(
            codec.state,
            DecodeState::Payload { size: 0x8000, opcode: 0x0096 }
        ));
    }

    #[test]
    fn undersized_frame_is_rejected() {
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        let mut src = BytesMut::from(&[0x00u8, 0x01, 0x12, 0x00][..]);
        assert!(codec.decode(&mut src).is_err());
    }

    #[test]
    fn wotlk_client_header_is_four_bytes() {
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        let mut dst = BytesMut::new();
        codec
            .encode(Packet::new(0x0095, &b"hi"[..]), &mut dst)
            .unwrap();

        // size = payload + u16 opcode
        assert_eq!(&dst[..], &[0x00, 0x04, 0x95, 0x00, b'h', b'i']);
    }

    #[test]
    fn legacy_client_header_is_six_bytes() {
        for expansion in [Expansion::Vanilla, Expansion::Tbc, Expansion::Cataclysm, Expansion::Mop] {
            let mut codec = GamePacketCodec::new(expansion);
            let mut dst = BytesMut::new();
            codec
                .encode(Packet::new(0x0095, &b"hi"[..]), &mut dst)
                .unwrap();

            // size = payload + u32 opcode
            assert_eq!(&dst[..], &[0x00, 0x06, 0x95, 0x00, 0x00, 0x00, b'h', b'i']);
        }
    }

    #[test]
    fn first_header_after_init_goes_out_in_clear() {
        let key = [0u8; 40];
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        codec.init_crypt(&key);

        let mut dst = BytesMut::new();
        codec
            .encode(Packet::new(0x01ED, &[0xAB, 0xCD][..]), &mut dst)
            .unwrap();
        assert_eq!(&dst[..4], &[0x00, 0x04, 0xED, 0x01]);

        // The next header must be encrypted with an untouched client
        // stream: the clear header consumed no keystream.
        dst.clear();
        codec
            .encode(Packet::new(0x0037, &[][..]), &mut dst)
            .unwrap();

        let mut expected = [0x00u8, 0x02, 0x37, 0x00];
        WotlkHeaderCrypt::new(&key).encrypt(&mut expected);
        assert_eq!(&dst[..], &expected);
    }

    #[test]
    fn encrypted_headers_decode_across_partial_reads() {
        let key = [9u8; 40];
        let mut codec = GamePacketCodec::new(Expansion::Wotlk);
        codec.init_crypt(&key);

        // Server side: encrypt two consecutive frames with the
        // server-direction stream. RC4 is a keystream XOR, so a peer
        // keyed identically produces the ciphertext by running its
        // decrypt direction over the plaintext.
        let mut server_crypt = WotlkHeaderCrypt::new(&key);
        let mut wire = Vec::new();
        for (opcode, body) in [(0x01EEu16, &[0x0Cu8, 0, 0][..]), (0x0096, &[1, 2, 3, 4][..])] {
            let mut frame = build_server_frame(opcode, body);
            server_crypt.decrypt(&mut frame[..4]);
            wire.extend_from_slice(&frame);
        }

        // Feed the stream one byte at a time.
        let mut src = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in wire {
            src.put_u8(byte);
            while let Some(packet) = codec.decode(&mut src).unwrap() {
                decoded.push(packet);
            }
        }

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].opcode, 0x01EE);
        assert_eq!(&decoded[0].payload[..], &[0x0C, 0, 0]);
        assert_eq!(decoded[1].opcode, 0x0096);
        assert_eq!(&decoded[1].payload[..], &[1, 2, 3, 4]);
    }
}
