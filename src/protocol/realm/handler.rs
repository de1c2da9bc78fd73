//! Realm packet building, parsing, and the SRP6 exchange state.

use bytes::{Buf, BufMut, BytesMut};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::common::error::{AuthError, ProtocolError, SessionError};
use crate::config::types::{ClientIdentity, Expansion, Platform};
use crate::protocol::packets::codec::{read_cstring, MAX_CSTRING_SHORT};
use crate::protocol::packets::opcodes::realm;
use crate::protocol::realm::bignum::BigNumber;
use crate::protocol::realm::packets::{AuthResult, RealmInfo};
use crate::protocol::realm::srp::SrpSession;

/// Integrity hashes sent in the logon proof, keyed by (build, platform).
/// Unknown combinations fall back to zeros, which most cores accept.
fn crc_bytes(build: u16, platform: Platform) -> [u8; 20] {
    match (build, platform) {
        (12340, Platform::Mac) => {
            hex_literal::hex!("B706D13FF2F4018839729461E3F8A0E2B5FDC034")
        }
        (12340, Platform::Windows) => {
            hex_literal::hex!("CDCBBD5188315E6B4D19449D492DBCFAF156A347")
        }
        _ => [0u8; 20],
    }
}

/// Server parameters delivered by the logon challenge.
#[derive(Debug)]
pub struct LogonChallenge {
    pub b_pub: BigNumber,
    pub g: BigNumber,
    pub n: BigNumber,
    pub salt: BigNumber,
    pub security_flag: u8,
}

/// Drives one realm logon: challenge out, proof exchange, realm list.
pub struct RealmHandler {
    identity: ClientIdentity,
    srp: Option<SrpSession>,
}

impl RealmHandler {
    pub fn new(identity: ClientIdentity) -> Self {
        Self { identity, srp: None }
    }

    /// Session key derived by the proof exchange. Only valid once
    /// `handle_logon_challenge` has run.
    pub fn session_key(&self) -> Option<[u8; 40]> {
        self.srp.as_ref().map(|srp| srp.session_key)
    }

    /// Build the complete CMD_AUTH_LOGON_CHALLENGE packet.
    pub fn build_logon_challenge(&self) -> Vec<u8> {
        let identity = &self.identity;
        let account = &identity.account;

        let mut out = BytesMut::with_capacity(38 + account.len());
        out.put_u8(realm::CMD_AUTH_LOGON_CHALLENGE);
        out.put_u8(if identity.expansion == Expansion::Vanilla { 3 } else { 8 });
        out.put_u16_le(30 + account.len() as u16);
        out.put_slice(b"\0WoW");
        out.put_slice(&identity.version);
        out.put_u16_le(identity.realm_build);
        out.put_slice(b"\0x86");
        out.put_u8(0);
        out.put_slice(identity.platform.tag());
        out.put_slice(&identity.locale);
        out.put_u32_le(0); // timezone
        out.put_slice(&[127, 0, 0, 1]);
        out.put_u8(account.len() as u8);
        out.put_slice(account);
        out.to_vec()
    }

    /// Run the SRP6 agreement against the received challenge and build
    /// the CMD_AUTH_LOGON_PROOF packet.
    pub fn handle_logon_challenge(&mut self, challenge: &LogonChallenge) -> Result<Vec<u8>, SessionError> {
        if challenge.security_flag != 0 {
            return Err(AuthError::TwoFactorRequired { flag: challenge.security_flag }.into());
        }

        let srp = SrpSession::authenticate(
            &self.identity.account,
            &self.identity.password,
            &challenge.b_pub,
            &challenge.g,
            &challenge.n,
            &challenge.salt,
        );

        let mut crc = Sha1::new();
        crc.update(srp.public_key);
        crc.update(crc_bytes(self.identity.realm_build, self.identity.platform));
        let crc_hash: [u8; 20] = crc.finalize().into();

        let mut out = BytesMut::with_capacity(76);
        out.put_u8(realm::CMD_AUTH_LOGON_PROOF);
        out.put_slice(&srp.public_key);
        out.put_slice(&srp.client_proof);
        out.put_slice(&crc_hash);
        out.put_u8(0); // number of telemetry keys
        out.put_u8(challenge.security_flag);

        self.srp = Some(srp);
        Ok(out.to_vec())
    }

    /// Check the server proof from the logon proof response. A
    /// mismatch is logged but not fatal; some cores answer with an
    /// inconsistent proof and the realm list works regardless.
    pub fn verify_server_proof(&self, server_proof: &[u8; 20]) {
        match &self.srp {
            Some(srp) if &srp.expected_server_proof == server_proof => {
                debug!("SRP server proof OK");
            }
            Some(srp) => {
                warn!(
                    "SRP server proof mismatch! Expected {} got {}",
                    hex_string(&srp.expected_server_proof),
                    hex_string(server_proof)
                );
            }
            None => warn!("Server proof received before challenge"),
        }
    }

    /// Build the CMD_REALM_LIST request.
    pub fn build_realm_list_request(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(5);
        out.put_u8(realm::CMD_REALM_LIST);
        out.put_u32_le(0);
        out.to_vec()
    }

    /// Parse the realm list payload (after the u16 size prefix).
    pub fn parse_realm_list(&self, payload: &[u8]) -> Result<Vec<RealmInfo>, ProtocolError> {
        let mut buf = payload;
        if buf.remaining() < 5 {
            return Err(ProtocolError::PacketTooShort { needed: 5, got: buf.remaining() });
        }

        buf.advance(4); // unused
        let num_realms = buf.get_u8();

        let mut realms = Vec::with_capacity(num_realms as usize);
        for i in 0..num_realms {
            if buf.remaining() < 4 {
                break;
            }
            buf.advance(3); // realm type block
            let flags = buf.get_u8();
            let name = read_cstring(&mut buf, MAX_CSTRING_SHORT)
                .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
            let address = read_cstring(&mut buf, MAX_CSTRING_SHORT)
                .map_err(|e| ProtocolError::InvalidString { message: e.to_string() })?;
            if buf.remaining() < 7 {
                break;
            }
            buf.advance(4); // population
            buf.advance(1); // characters
            buf.advance(1); // timezone
            let id = buf.get_u8();

            debug!("Realm[{i}]: flags={flags:02x} name={name} addr={address} id={id}");
            realms.push(RealmInfo { id, name, address });
        }

        Ok(realms)
    }

    /// First realm whose name matches the configured one,
    /// case-insensitively.
    pub fn select_realm(&self, realms: Vec<RealmInfo>) -> Result<RealmInfo, SessionError> {
        let wanted = &self.identity.realm_name;
        realms
            .into_iter()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                SessionError::Protocol(ProtocolError::RealmNotFound { name: wanted.clone() })
            })
    }

    /// Map a non-success result code to its classified error.
    pub fn classify_result(&self, code: u8) -> SessionError {
        AuthResult::from_code(code).into_error().into()
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{ChatConfig, Config, GuildEventsConfig, WowConfig};

    fn identity(version: &str, realm: &str) -> ClientIdentity {
        let config = Config {
            wow: WowConfig {
                version: version.to_string(),
                realm_build: None,
                game_build: None,
                realmlist: "localhost".to_string(),
                realm: realm.to_string(),
                account: "tester".to_string(),
                password: "secret".to_string(),
                character: "Herald".to_string(),
                locale: "enUS".to_string(),
                platform: "Win".to_string(),
                enable_server_motd: true,
            },
            guild: GuildEventsConfig::default(),
            chat: ChatConfig::default(),
        };
        ClientIdentity::from_config(&config).unwrap()
    }

    #[test]
    fn logon_challenge_layout() {
        let handler = RealmHandler::new(identity("3.3.5", "Test"));
        let packet = handler.build_logon_challenge();

        assert_eq!(packet[0], 0x00); // command
        assert_eq!(packet[1], 8); // protocol version for non-Vanilla
        let size = u16::from_le_bytes([packet[2], packet[3]]);
        assert_eq!(size, 30 + 6); // "TESTER"
        assert_eq!(&packet[4..8], b"\0WoW");
        assert_eq!(&packet[8..11], [3, 3, 5]);
        assert_eq!(u16::from_le_bytes([packet[11], packet[12]]), 12340);
        assert_eq!(&packet[13..17], b"\0x86");
        assert_eq!(&packet[17..21], b"\0Win");
        assert_eq!(&packet[21..25], b"enUS");
        assert_eq!(&packet[25..29], [0, 0, 0, 0]); // timezone
        assert_eq!(&packet[29..33], [127, 0, 0, 1]);
        assert_eq!(packet[33], 6);
        assert_eq!(&packet[34..], b"TESTER");
    }

    #[test]
    fn vanilla_uses_protocol_version_3() {
        let handler = RealmHandler::new(identity("1.12.1", "Test"));
        let packet = handler.build_logon_challenge();
        assert_eq!(packet[1], 3);
        assert_eq!(u16::from_le_bytes([packet[11], packet[12]]), 5875);
    }

    fn test_challenge() -> LogonChallenge {
        LogonChallenge {
            b_pub: BigNumber::from_bytes_le(&[0x21; 32]),
            g: BigNumber::from_u32(7),
            n: BigNumber::from_bytes_be(&hex_literal::hex!(
                "894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7"
            )),
            salt: BigNumber::from_bytes_le(&[0x42; 32]),
            security_flag: 0,
        }
    }

    #[test]
    fn logon_proof_layout() {
        let mut handler = RealmHandler::new(identity("3.3.5", "Test"));
        let packet = handler.handle_logon_challenge(&test_challenge()).unwrap();

        // cmd + A(32) + M1(20) + crc(20) + keys(1) + security(1)
        assert_eq!(packet.len(), 75);
        assert_eq!(packet[0], 0x01);
        assert_eq!(packet[73], 0);
        assert_eq!(packet[74], 0);

        let srp_key = handler.session_key().unwrap();
        assert_eq!(srp_key.len(), 40);
    }

    #[test]
    fn two_factor_flag_aborts() {
        let mut handler = RealmHandler::new(identity("3.3.5", "Test"));
        let mut challenge = test_challenge();
        challenge.security_flag = 0x04;

        let err = handler.handle_logon_challenge(&challenge).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn realm_list_request_layout() {
        let handler = RealmHandler::new(identity("3.3.5", "Test"));
        assert_eq!(handler.build_realm_list_request(), [0x10, 0, 0, 0, 0]);
    }

    fn realm_entry(name: &str, address: &str, id: u8) -> Vec<u8> {
        let mut entry = vec![0, 0, 0]; // type block
        entry.push(0x00); // flags
        entry.extend_from_slice(name.as_bytes());
        entry.push(0);
        entry.extend_from_slice(address.as_bytes());
        entry.push(0);
        entry.extend_from_slice(&[0, 0, 0, 0]); // population
        entry.push(1); // characters
        entry.push(1); // timezone
        entry.push(id);
        entry
    }

    #[test]
    fn realm_selection_is_case_insensitive_first_match() {
        let mut payload = vec![0, 0, 0, 0]; // unused
        payload.push(3);
        payload.extend(realm_entry("Alpha", "1.2.3.4:8085", 1));
        payload.extend(realm_entry("Beta", "5.6.7.8:8086", 2));
        payload.extend(realm_entry("Gamma", "9.9.9.9:8087", 3));

        let handler = RealmHandler::new(identity("3.3.5", "beta"));
        let realms = handler.parse_realm_list(&payload).unwrap();
        assert_eq!(realms.len(), 3);

        let selected = handler.select_realm(realms).unwrap();
        assert_eq!(selected.id, 2);
        assert_eq!(selected.parse_address(), Some(("5.6.7.8", 8086)));
    }

    #[test]
    fn missing_realm_is_a_permanent_failure() {
        let mut payload = vec![0, 0, 0, 0];
        payload.push(1);
        payload.extend(realm_entry("Alpha", "1.2.3.4:8085", 1));

        let handler = RealmHandler::new(identity("3.3.5", "Delta"));
        let realms = handler.parse_realm_list(&payload).unwrap();
        let err = handler.select_realm(realms).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Protocol(ProtocolError::RealmNotFound { .. })
        ));
    }

    #[test]
    fn result_classification() {
        let handler = RealmHandler::new(identity("3.3.5", "Test"));
        assert!(handler.classify_result(0x05).is_fatal()); // incorrect password
        assert!(!handler.classify_result(0x08).is_fatal()); // db busy
    }
}
