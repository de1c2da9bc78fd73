//! Realm server TCP connection and logon sequence.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::common::error::{ConnectionError, ProtocolError, SessionError, SessionResult};
use crate::config::types::{ClientIdentity, Expansion};
use crate::protocol::packets::opcodes::realm;
use crate::protocol::realm::bignum::BigNumber;
use crate::protocol::realm::handler::{LogonChallenge, RealmHandler};
use crate::protocol::realm::packets::RealmInfo;

/// Result of a successful realm logon: everything the world leg needs.
#[derive(Debug)]
pub struct RealmSession {
    /// 40-byte SRP6 session key, keying material for the world headers.
    pub session_key: [u8; 40],
    /// The selected realm.
    pub realm: RealmInfo,
}

/// Connect to the realm server and run the logon sequence.
pub async fn connect_and_authenticate(
    host: &str,
    port: u16,
    identity: &ClientIdentity,
) -> SessionResult<RealmSession> {
    info!("Connecting to realm server {host}:{port}");
    let mut stream = TcpStream::connect((host, port)).await.map_err(|source| {
        SessionError::Connection(ConnectionError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        })
    })?;

    let session = authenticate_stream(&mut stream, identity).await;
    // The realm socket is done either way; the world leg opens its own.
    let _ = stream.shutdown().await;
    session
}

/// Drive CMD_AUTH_LOGON_CHALLENGE → CMD_AUTH_LOGON_PROOF →
/// CMD_REALM_LIST over an established stream.
pub async fn authenticate_stream<S>(
    stream: &mut S,
    identity: &ClientIdentity,
) -> SessionResult<RealmSession>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handler = RealmHandler::new(identity.clone());

    stream.write_all(&handler.build_logon_challenge()).await?;
    debug!("Sent logon challenge");

    expect_command(stream, realm::CMD_AUTH_LOGON_CHALLENGE).await?;
    let challenge = read_logon_challenge(stream, &mut handler).await?;
    let proof = handler.handle_logon_challenge(&challenge)?;
    stream.write_all(&proof).await?;
    debug!("Sent logon proof");

    expect_command(stream, realm::CMD_AUTH_LOGON_PROOF).await?;
    read_logon_proof(stream, &handler, identity.expansion).await?;
    stream.write_all(&handler.build_realm_list_request()).await?;

    expect_command(stream, realm::CMD_REALM_LIST).await?;
    let size = read_u16_le(stream).await?;
    let mut payload = vec![0u8; size as usize];
    stream.read_exact(&mut payload).await?;

    let realms = handler.parse_realm_list(&payload)?;
    let selected = handler.select_realm(realms)?;
    info!("Selected realm {} at {} (id={})", selected.name, selected.address, selected.id);

    let session_key = handler
        .session_key()
        .expect("proof exchange completed above");
    Ok(RealmSession { session_key, realm: selected })
}

async fn expect_command<S>(stream: &mut S, expected: u8) -> SessionResult<()>
where
    S: AsyncRead + Unpin,
{
    let actual = read_u8(stream).await?;
    if actual != expected {
        return Err(SessionError::Protocol(ProtocolError::UnexpectedOpcode {
            expected: expected as u16,
            actual: actual as u16,
        }));
    }
    Ok(())
}

async fn read_logon_challenge<S>(
    stream: &mut S,
    handler: &mut RealmHandler,
) -> SessionResult<LogonChallenge>
where
    S: AsyncRead + Unpin,
{
    let _error = read_u8(stream).await?;
    let result = read_u8(stream).await?;
    if !crate::protocol::realm::packets::AuthResult::from_code(result).is_success() {
        return Err(handler.classify_result(result));
    }

    // Wire order: B, g_len, g, N_len, N, salt, crc salt, security flag.
    // All big numbers arrive little-endian.
    let mut b_bytes = [0u8; 32];
    stream.read_exact(&mut b_bytes).await?;

    let g_len = read_u8(stream).await? as usize;
    let mut g_bytes = vec![0u8; g_len];
    stream.read_exact(&mut g_bytes).await?;

    let n_len = read_u8(stream).await? as usize;
    let mut n_bytes = vec![0u8; n_len];
    stream.read_exact(&mut n_bytes).await?;

    let mut salt_bytes = [0u8; 32];
    stream.read_exact(&mut salt_bytes).await?;

    let mut crc_salt = [0u8; 16];
    stream.read_exact(&mut crc_salt).await?;

    let security_flag = read_u8(stream).await?;

    Ok(LogonChallenge {
        b_pub: BigNumber::from_bytes_le(&b_bytes),
        g: BigNumber::from_bytes_le(&g_bytes),
        n: BigNumber::from_bytes_le(&n_bytes),
        salt: BigNumber::from_bytes_le(&salt_bytes),
        security_flag,
    })
}

async fn read_logon_proof<S>(
    stream: &mut S,
    handler: &RealmHandler,
    expansion: Expansion,
) -> SessionResult<()>
where
    S: AsyncRead + Unpin,
{
    let result = read_u8(stream).await?;
    if !crate::protocol::realm::packets::AuthResult::from_code(result).is_success() {
        return Err(handler.classify_result(result));
    }

    let mut server_proof = [0u8; 20];
    stream.read_exact(&mut server_proof).await?;
    handler.verify_server_proof(&server_proof);

    // Trailing account flags differ per era; drain them so the realm
    // list command lands on a packet boundary.
    let trailing = if expansion == Expansion::Vanilla { 4 } else { 10 };
    let mut rest = vec![0u8; trailing];
    stream.read_exact(&mut rest).await?;
    Ok(())
}

async fn read_u8<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u8, std::io::Error> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).await?;
    Ok(byte[0])
}

async fn read_u16_le<S: AsyncRead + Unpin>(stream: &mut S) -> Result<u16, std::io::Error> {
    let mut bytes = [0u8; 2];
    stream.read_exact(&mut bytes).await?;
    Ok(u16::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::AuthError;
    use crate::config::types::{ChatConfig, Config, GuildEventsConfig, WowConfig};
    use sha1::{Digest, Sha1};
    use tokio::io::AsyncWriteExt;

    fn identity() -> ClientIdentity {
        let config = Config {
            wow: WowConfig {
                version: "3.3.5".to_string(),
                realm_build: None,
                game_build: None,
                realmlist: "localhost".to_string(),
                realm: "Beta".to_string(),
                account: "TEST".to_string(),
                password: "PASSWORD".to_string(),
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

    const N_BYTES: [u8; 32] = hex_literal::hex!(
        "894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7"
    );

    /// Plays the server side of the whole realm leg over a duplex
    /// pipe, deriving the same SRP6 values the client must reach.
    #[tokio::test]
    async fn full_realm_leg_hands_off_session_key() {
        let (mut client_stream, mut server_stream) = tokio::io::duplex(4096);
        let identity_for_client = identity();

        let client = tokio::spawn(async move {
            authenticate_stream(&mut client_stream, &identity_for_client).await
        });

        let g = BigNumber::from_u32(7);
        let n = BigNumber::from_bytes_be(&N_BYTES);
        let salt = BigNumber::from_bytes_le(&[0u8; 32]);
        let b = BigNumber::from_bytes_be(&[0x61; 24]);

        // Verifier from the same identity hash the client computes.
        let mut identity_hash = Sha1::new();
        identity_hash.update(b"TEST:PASSWORD");
        let identity_hash: [u8; 20] = identity_hash.finalize().into();
        let mut x_hash = Sha1::new();
        x_hash.update(salt.as_bytes_le(32));
        x_hash.update(identity_hash);
        let x = BigNumber::from_bytes_le(&x_hash.finalize());
        let verifier = g.mod_pow(&x, &n);
        let b_pub = BigNumber::from_u32(3)
            .mul(&verifier)
            .add(&g.mod_pow(&b, &n))
            .mod_pow(&BigNumber::from_u32(1), &n);

        // Read the logon challenge request.
        let mut request = vec![0u8; 34 + 4];
        server_stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request[0], 0x00);
        assert_eq!(&request[34..], b"TEST");

        // Challenge response.
        let mut response = vec![0x00u8, 0x00, 0x00];
        response.extend_from_slice(&b_pub.as_bytes_le(32));
        response.push(1);
        response.extend_from_slice(&g.as_bytes_le(1));
        response.push(32);
        response.extend_from_slice(&n.as_bytes_le(32));
        response.extend_from_slice(&salt.as_bytes_le(32));
        response.extend_from_slice(&[0u8; 16]);
        response.push(0); // security flag
        server_stream.write_all(&response).await.unwrap();

        // Read the proof: cmd + A + M1 + crc + keys + security.
        let mut proof = vec![0u8; 75];
        server_stream.read_exact(&mut proof).await.unwrap();
        assert_eq!(proof[0], 0x01);
        let a_pub: [u8; 32] = proof[1..33].try_into().unwrap();
        let client_m1: [u8; 20] = proof[33..53].try_into().unwrap();

        // Server-side agreement for the proof answer.
        let u_digest = {
            let mut h = Sha1::new();
            h.update(a_pub);
            h.update(b_pub.as_bytes_le(32));
            h.finalize()
        };
        let u = BigNumber::from_bytes_le(&u_digest);
        let shared = BigNumber::from_bytes_le(&a_pub)
            .mul(&verifier.mod_pow(&u, &n))
            .mod_pow(&b, &n);
        let session_key = {
            let shared_bytes = shared.as_bytes_le(32);
            let mut even = [0u8; 16];
            let mut odd = [0u8; 16];
            for i in 0..16 {
                even[i] = shared_bytes[i * 2];
                odd[i] = shared_bytes[i * 2 + 1];
            }
            let even_hash: [u8; 20] = Sha1::digest(even).into();
            let odd_hash: [u8; 20] = Sha1::digest(odd).into();
            let mut key = [0u8; 40];
            for i in 0..20 {
                key[i * 2] = even_hash[i];
                key[i * 2 + 1] = odd_hash[i];
            }
            key
        };
        let mut m2 = Sha1::new();
        m2.update(a_pub);
        m2.update(client_m1);
        m2.update(session_key);
        let m2: [u8; 20] = m2.finalize().into();

        // Proof response: cmd, result, M2, 10 trailing bytes.
        let mut response = vec![0x01u8, 0x00];
        response.extend_from_slice(&m2);
        response.extend_from_slice(&[0u8; 10]);
        server_stream.write_all(&response).await.unwrap();

        // Realm list request.
        let mut request = [0u8; 5];
        server_stream.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x10, 0, 0, 0, 0]);

        // Realm list with two realms; the client wants "Beta".
        let mut payload = vec![0u8, 0, 0, 0];
        payload.push(2);
        for (name, addr, id) in [("Alpha", "1.2.3.4:8085", 1u8), ("Beta", "5.6.7.8:8086", 2)] {
            payload.extend_from_slice(&[0, 0, 0, 0]); // type + flags
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(addr.as_bytes());
            payload.push(0);
            payload.extend_from_slice(&[0, 0, 0, 0, 1, 1]);
            payload.push(id);
        }
        let mut response = vec![0x10u8];
        response.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        response.extend_from_slice(&payload);
        server_stream.write_all(&response).await.unwrap();

        let session = client.await.unwrap().unwrap();
        assert_eq!(session.session_key, session_key);
        assert_eq!(session.realm.id, 2);
        assert_eq!(session.realm.parse_address(), Some(("5.6.7.8", 8086)));
    }

    #[tokio::test]
    async fn incorrect_password_is_fatal() {
        let (mut client_stream, mut server_stream) = tokio::io::duplex(1024);
        let identity_for_client = identity();

        let client = tokio::spawn(async move {
            authenticate_stream(&mut client_stream, &identity_for_client).await
        });

        let mut request = vec![0u8; 38];
        server_stream.read_exact(&mut request).await.unwrap();
        // cmd, error, result = incorrect password
        server_stream.write_all(&[0x00, 0x00, 0x05]).await.unwrap();

        let err = client.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Auth(AuthError::Fatal { .. })));
    }
}
