//! World packet header encryption.
//!
//! Two schemes, selected by era. Vanilla and TBC run an additive-XOR
//! cipher keyed directly by the session key, with independent send and
//! receive state. WotLK and later run one RC4 stream per direction,
//! each keyed by HMAC-SHA1 of the session key with a fixed seed and
//! advanced past its first 1024 keystream bytes before use.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::config::types::Expansion;

type HmacSha1 = Hmac<Sha1>;

/// HMAC seed for the server-to-client stream.
const SERVER_HMAC_SEED: [u8; 16] =
    hex_literal::hex!("CC98AE04E897EACA12DDC09342915357");

/// HMAC seed for the client-to-server stream.
const CLIENT_HMAC_SEED: [u8; 16] =
    hex_literal::hex!("C2B3723CC6AED9B5343C53EE2F4367CE");

/// Additive-XOR header cipher (Vanilla/TBC).
#[derive(Debug)]
pub struct LegacyHeaderCrypt {
    key: Vec<u8>,
    send_i: usize,
    send_j: u8,
    recv_i: usize,
    recv_j: u8,
}

impl LegacyHeaderCrypt {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: key.to_vec(),
            send_i: 0,
            send_j: 0,
            recv_i: 0,
            recv_j: 0,
        }
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.send_i %= self.key.len();
            let x = (*byte ^ self.key[self.send_i]).wrapping_add(self.send_j);
            self.send_i += 1;
            *byte = x;
            self.send_j = x;
        }
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.recv_i %= self.key.len();
            // The next round chains on the ciphertext byte.
            let encrypted = *byte;
            *byte = encrypted.wrapping_sub(self.recv_j) ^ self.key[self.recv_i];
            self.recv_i += 1;
            self.recv_j = encrypted;
        }
    }
}

/// Plain RC4 keystream generator.
#[derive(Debug)]
struct Rc4 {
    sbox: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        let mut sbox = [0u8; 256];
        for (i, slot) in sbox.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(sbox[i])
                .wrapping_add(key[i % key.len()]);
            sbox.swap(i, j as usize);
        }
        Self { sbox, i: 0, j: 0 }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.sbox[self.i as usize]);
            self.sbox.swap(self.i as usize, self.j as usize);
            let index = self.sbox[self.i as usize].wrapping_add(self.sbox[self.j as usize]);
            *byte ^= self.sbox[index as usize];
        }
    }

    /// Discard the first `n` keystream bytes (RC4-drop).
    fn skip(&mut self, n: usize) {
        let mut sink = [0u8; 256];
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(sink.len());
            self.apply(&mut sink[..chunk]);
            remaining -= chunk;
        }
    }
}

/// Per-direction RC4 header cipher (WotLK and later).
#[derive(Debug)]
pub struct WotlkHeaderCrypt {
    client: Rc4,
    server: Rc4,
}

impl WotlkHeaderCrypt {
    pub fn new(session_key: &[u8]) -> Self {
        let mut client = Rc4::new(&hmac_sha1(&CLIENT_HMAC_SEED, session_key));
        let mut server = Rc4::new(&hmac_sha1(&SERVER_HMAC_SEED, session_key));
        client.skip(1024);
        server.skip(1024);
        Self { client, server }
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.client.apply(data);
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.server.apply(data);
    }
}

fn hmac_sha1(seed: &[u8], key: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(seed).expect("HMAC accepts any key size");
    mac.update(key);
    mac.finalize().into_bytes().into()
}

enum CryptKind {
    Legacy(LegacyHeaderCrypt),
    Wotlk(WotlkHeaderCrypt),
}

/// Era-selected header cipher. Uninitialized until the session key is
/// known; both directions pass headers through untouched before that.
pub struct GameHeaderCrypt {
    expansion: Expansion,
    inner: Option<CryptKind>,
}

impl GameHeaderCrypt {
    pub fn new(expansion: Expansion) -> Self {
        Self { expansion, inner: None }
    }

    /// Key both directions from the session key. Must happen before
    /// CMSG_AUTH_CHALLENGE is sent; stream state starts there.
    pub fn init(&mut self, session_key: &[u8]) {
        self.inner = Some(if self.expansion.uses_rc4_header_cipher() {
            CryptKind::Wotlk(WotlkHeaderCrypt::new(session_key))
        } else {
            CryptKind::Legacy(LegacyHeaderCrypt::new(session_key))
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        match &mut self.inner {
            Some(CryptKind::Legacy(crypt)) => crypt.encrypt(data),
            Some(CryptKind::Wotlk(crypt)) => crypt.encrypt(data),
            None => {}
        }
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        match &mut self.inner {
            Some(CryptKind::Legacy(crypt)) => crypt.decrypt(data),
            Some(CryptKind::Wotlk(crypt)) => crypt.decrypt(data),
            None => {}
        }
    }
}
