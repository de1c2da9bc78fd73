//! SRP6 client side of the realm logon.
//!
//! The handshake uses k = 3, a 19-byte client private key, SHA-1
//! digests read as little-endian integers, and a 40-byte session key
//! built by interleaving the hashes of the even and odd bytes of the
//! shared secret.

use sha1::{Digest, Sha1};

use crate::protocol::realm::bignum::BigNumber;

/// Completed key agreement for one realm logon.
pub struct SrpSession {
    /// Client public key `A`, little-endian.
    pub public_key: [u8; 32],
    /// Session key `K`, reused by the world-header ciphers.
    pub session_key: [u8; 40],
    /// Client proof `M1` sent in the logon proof.
    pub client_proof: [u8; 20],
    /// What the server must answer with.
    pub expected_server_proof: [u8; 20],
}

impl SrpSession {
    /// Run the client side of the agreement against the challenge
    /// parameters. `account` must already be upper-cased.
    pub fn authenticate(
        account: &[u8],
        password: &str,
        b_pub: &BigNumber,
        g: &BigNumber,
        n: &BigNumber,
        salt: &BigNumber,
    ) -> Self {
        Self::with_private_key(account, password, b_pub, g, n, salt, &BigNumber::random(19))
    }

    /// Deterministic variant; `a` is the client private key.
    pub fn with_private_key(
        account: &[u8],
        password: &str,
        b_pub: &BigNumber,
        g: &BigNumber,
        n: &BigNumber,
        salt: &BigNumber,
        a: &BigNumber,
    ) -> Self {
        let k = BigNumber::from_u32(3);

        let a_pub = g.mod_pow(a, n);
        let a_bytes = a_pub.as_bytes_le(32);
        let b_bytes = b_pub.as_bytes_le(32);
        let salt_bytes = salt.as_bytes_le(32);

        // u = H(A || B), little-endian
        let u = BigNumber::from_bytes_le(&sha1(&[&a_bytes, &b_bytes]));

        // x = H(s || H(account:PASSWORD)), little-endian
        let identity = sha1(&[account, b":", password.to_uppercase().as_bytes()]);
        let x = BigNumber::from_bytes_le(&sha1(&[&salt_bytes, &identity]));

        // S = (B - k*g^x) ^ (a + u*x) mod N
        let shared = b_pub
            .sub_mod(&g.mod_pow(&x, n).mul(&k), n)
            .mod_pow(&a.add(&u.mul(&x)), n);

        let session_key = interleave_session_key(&shared.as_bytes_le(32));

        // M1 = H(H(N) xor H(g) || H(account) || s || A || B || K)
        let n_hash = sha1(&[&n.as_bytes_le(32)]);
        let g_hash = sha1(&[&g.as_bytes_le(1)]);
        let mut ng_hash = [0u8; 20];
        for i in 0..20 {
            ng_hash[i] = n_hash[i] ^ g_hash[i];
        }
        let account_hash = sha1(&[account]);

        let client_proof: [u8; 20] = sha1(&[
            &ng_hash,
            &account_hash,
            &salt_bytes,
            &a_bytes,
            &b_bytes,
            &session_key,
        ]);

        // M2 = H(A || M1 || K)
        let expected_server_proof: [u8; 20] = sha1(&[&a_bytes, &client_proof, &session_key]);

        Self {
            public_key: a_bytes.try_into().expect("A is 32 bytes"),
            session_key,
            client_proof,
            expected_server_proof,
        }
    }
}

/// Split the 32-byte shared secret into even and odd bytes, hash each
/// half, and interleave the digests into the 40-byte session key.
fn interleave_session_key(shared: &[u8]) -> [u8; 40] {
    let mut even = [0u8; 16];
    let mut odd = [0u8; 16];
    for i in 0..16 {
        even[i] = shared[i * 2];
        odd[i] = shared[i * 2 + 1];
    }

    let even_hash = sha1(&[&even]);
    let odd_hash = sha1(&[&odd]);

    let mut key = [0u8; 40];
    for i in 0..20 {
        key[i * 2] = even_hash[i];
        key[i * 2 + 1] = odd_hash[i];
    }
    key
}

fn sha1(parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const N_BYTES: [u8; 32] = hex_literal::hex!(
        "894B645E89E1535BBDAD5B8B290650530801B18EBFBF5E8FAB3C82872A3E9BB7"
    );

    /// Reference server computation: registers the account (verifier
    /// from the same x the client derives), publishes B from a fixed
    /// private key, and completes the agreement the server way.
    struct ReferenceServer {
        b_pub: BigNumber,
        b: BigNumber,
        verifier: BigNumber,
        salt: BigNumber,
        g: BigNumber,
        n: BigNumber,
    }

    impl ReferenceServer {
        fn new(account: &[u8], password: &str, salt: BigNumber, b: BigNumber) -> Self {
            let g = BigNumber::from_u32(7);
            let n = BigNumber::from_bytes_be(&N_BYTES);

            let identity = sha1(&[account, b":", password.to_uppercase().as_bytes()]);
            let x = BigNumber::from_bytes_le(&sha1(&[&salt.as_bytes_le(32), &identity]));
            let verifier = g.mod_pow(&x, &n);

            // B = (k*v + g^b) mod N
            let k = BigNumber::from_u32(3);
            let b_pub = k
                .mul(&verifier)
                .add(&g.mod_pow(&b, &n))
                .mod_pow(&BigNumber::from_u32(1), &n);

            Self { b_pub, b, verifier, salt, g, n }
        }

        fn session_key_and_proofs(
            &self,
            account: &[u8],
            a_pub: &[u8; 32],
            client_m1: &[u8; 20],
        ) -> ([u8; 40], [u8; 20], [u8; 20]) {
            let a_num = BigNumber::from_bytes_le(a_pub);
            let u = BigNumber::from_bytes_le(&sha1(&[a_pub, &self.b_pub.as_bytes_le(32)]));

            // S = (A * v^u) ^ b mod N
            let shared = a_num
                .mul(&self.verifier.mod_pow(&u, &self.n))
                .mod_pow(&self.b, &self.n);
            let session_key = interleave_session_key(&shared.as_bytes_le(32));

            let n_hash = sha1(&[&self.n.as_bytes_le(32)]);
            let g_hash = sha1(&[&self.g.as_bytes_le(1)]);
            let mut ng_hash = [0u8; 20];
            for i in 0..20 {
                ng_hash[i] = n_hash[i] ^ g_hash[i];
            }
            let m1 = sha1(&[
                &ng_hash,
                &sha1(&[account]),
                &self.salt.as_bytes_le(32),
                a_pub,
                &self.b_pub.as_bytes_le(32),
                &session_key,
            ]);
            let m2 = sha1(&[a_pub, client_m1, &session_key]);
            (session_key, m1, m2)
        }
    }

    fn run_agreement(
        account: &[u8],
        password: &str,
        salt: BigNumber,
        a: BigNumber,
        b: BigNumber,
    ) -> (SrpSession, [u8; 40], [u8; 20], [u8; 20]) {
        let server = ReferenceServer::new(account, password, salt.clone(), b);
        let client = SrpSession::with_private_key(
            account,
            password,
            &server.b_pub,
            &server.g,
            &server.n,
            &salt,
            &a,
        );
        let (key, m1, m2) =
            server.session_key_and_proofs(account, &client.public_key, &client.client_proof);
        (client, key, m1, m2)
    }

    #[test]
    fn client_agrees_with_reference_server() {
        let a = BigNumber::from_bytes_be(&[
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
            0x0F, 0x10, 0x11, 0x12, 0x13,
        ]);
        let b = BigNumber::from_bytes_be(&[0xDE, 0xAD, 0xBE, 0xEF, 0x42, 0x17, 0x33, 0x01]);
        let salt = BigNumber::from_bytes_le(&[0u8; 32]);

        let (client, server_key, server_m1, server_m2) =
            run_agreement(b"TEST", "PASSWORD", salt, a, b);

        assert_eq!(client.session_key, server_key);
        assert_eq!(client.client_proof, server_m1);
        assert_eq!(client.expected_server_proof, server_m2);
    }

    #[test]
    fn agreement_holds_for_varied_inputs() {
        for seed in 1u8..5 {
            let a = BigNumber::from_bytes_be(&[seed; 19]);
            let b = BigNumber::from_bytes_be(&[seed.wrapping_mul(31); 24]);
            let salt = BigNumber::from_bytes_le(&[seed.wrapping_mul(7); 32]);

            let (client, server_key, server_m1, server_m2) =
                run_agreement(b"ACCOUNT", "hunter2", salt, a, b);

            assert_eq!(client.session_key, server_key);
            assert_eq!(client.client_proof, server_m1);
            assert_eq!(client.expected_server_proof, server_m2);
        }
    }

    #[test]
    fn password_case_is_normalized() {
        let a = BigNumber::from_bytes_be(&[5; 19]);
        let salt = BigNumber::from_bytes_le(&[9; 32]);
        let b = BigNumber::from_bytes_be(&[77; 16]);

        let server = ReferenceServer::new(b"TEST", "PASSWORD", salt.clone(), b);
        let lower = SrpSession::with_private_key(
            b"TEST", "password", &server.b_pub, &server.g, &server.n, &salt, &a,
        );
        let upper = SrpSession::with_private_key(
            b"TEST", "PASSWORD", &server.b_pub, &server.g, &server.n, &salt, &a,
        );
        assert_eq!(lower.client_proof, upper.client_proof);
    }

    #[test]
    fn key_material_has_pinned_widths() {
        let a = BigNumber::from_bytes_be(&[3; 19]);
        let salt = BigNumber::from_bytes_le(&[1; 32]);
        let b = BigNumber::from_bytes_be(&[2; 32]);
        let (client, _, _, _) = run_agreement(b"WIDTH", "CHECK", salt, a, b);

        assert_eq!(client.public_key.len(), 32);
        assert_eq!(client.session_key.len(), 40);
        assert_eq!(client.client_proof.len(), 20);
        assert_eq!(client.expected_server_proof.len(), 20);
    }
}
