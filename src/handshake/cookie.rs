//! HelloVerifyRequest cookie round-trip (spec 4.4, DTLS-specific DoS
//! defense).
//!
//! Per spec 9's open question, this crate follows the RFC 6347-recommended
//! pattern rather than the embedded source's literal recompute-with-no-
//! binding behavior: the cookie is `HMAC(secret, peer_ip || peer_port ||
//! client_random)`, so it can be verified by recomputation with no
//! per-peer server-side state, which is the actual DoS-resistance property
//! the spec is after (spec 3: "the concrete repo recomputes rather than
//! caches").

use std::net::IpAddr;

use bytes::{Buf, BufMut, Bytes, BytesMut, IntoBuf};
use ring::digest;
use ring::hmac;

use crate::coding::BufDtlsExt;
use crate::error::DtlsError;

pub const DEFAULT_COOKIE_LEN: usize = 32;
pub const MAX_COOKIE_LEN: usize = 255;

/// Server-side secret used to derive cookies; regenerated whenever the
/// server is (re)started (spec 6: `ListenKeys`-equivalent persistent-across-
/// restarts material is explicitly out of scope here -- a fresh secret per
/// process lifetime is sufficient since the cookie only needs to survive
/// one handshake round-trip, not a server restart).
pub struct CookieSecret {
    key: hmac::SigningKey,
    cookie_len: usize,
}

impl CookieSecret {
    pub fn new<R: rand::RngCore>(rng: &mut R, cookie_len: usize) -> Result<Self, DtlsError> {
        if cookie_len > MAX_COOKIE_LEN {
            return Err(DtlsError::IncorrectMessageLength);
        }
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Ok(CookieSecret {
            key: hmac::SigningKey::new(&digest::SHA256, &secret),
            cookie_len: cookie_len.max(1),
        })
    }

    pub fn generate(&self, peer_ip: IpAddr, peer_port: u16, client_random: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(19 + client_random.len());
        match peer_ip {
            IpAddr::V4(v4) => input.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => input.extend_from_slice(&v6.octets()),
        }
        input.extend_from_slice(&peer_port.to_be_bytes());
        input.extend_from_slice(client_random);
        let mac = hmac::sign(&self.key, &input);
        let mut cookie = mac.as_ref().to_vec();
        cookie.truncate(self.cookie_len);
        cookie
    }

    pub fn verify(&self, peer_ip: IpAddr, peer_port: u16, client_random: &[u8], candidate: &[u8]) -> bool {
        let expected = self.generate(peer_ip, peer_port, client_random);
        constant_time_eq::constant_time_eq(&expected, candidate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub version: u16,
    pub cookie: Bytes,
}

impl HelloVerifyRequest {
    /// Parses the body of a HelloVerifyRequest: `version(2) | cookie_len(1)
    /// | cookie(cookie_len)` (spec 4.4/6, bit-exact).
    pub fn decode(body: &[u8]) -> Result<Self, DtlsError> {
        let mut buf = Bytes::from(body.to_vec()).into_buf();
        if buf.remaining() < 3 {
            return Err(DtlsError::IncorrectMessageLength);
        }
        let version = buf.get_u16_be();
        let cookie_len = buf.get_u8() as usize;
        if cookie_len > MAX_COOKIE_LEN {
            return Err(DtlsError::IncorrectMessageLength);
        }
        if 3 + cookie_len > body.len() {
            return Err(DtlsError::IncorrectMessageLength);
        }
        let cookie = Bytes::from(body[3..3 + cookie_len].to_vec());
        Ok(HelloVerifyRequest { version, cookie })
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(3 + self.cookie.len());
        buf.put_u16_be(self.version);
        buf.put_u8(self.cookie.len() as u8);
        buf.put_slice(&self.cookie);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn s1_cookie_round_trips_through_hello_verify_request() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, DEFAULT_COOKIE_LEN).unwrap();
        let client_random = [0u8; 32];
        let peer = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));

        let cookie = secret.generate(peer, 4433, &client_random);
        assert_eq!(cookie.len(), DEFAULT_COOKIE_LEN);

        let hvr = HelloVerifyRequest {
            version: crate::record::DTLS_1_2,
            cookie: Bytes::from(cookie.clone()),
        };
        let wire = hvr.encode();
        let decoded = HelloVerifyRequest::decode(&wire).unwrap();
        assert_eq!(decoded.version, crate::record::DTLS_1_2);
        assert_eq!(&decoded.cookie[..], &cookie[..]);

        assert!(secret.verify(peer, 4433, &client_random, &decoded.cookie));
        assert!(!secret.verify(peer, 4434, &client_random, &decoded.cookie));
    }

    #[test]
    fn rejects_cookie_length_overrunning_message() {
        let mut body = vec![0xfe, 0xfd, 10];
        body.extend_from_slice(&[0u8; 5]); // only 5 of the claimed 10 bytes present
        assert_matches::assert_matches!(HelloVerifyRequest::decode(&body), Err(DtlsError::IncorrectMessageLength));
    }

    #[test]
    fn rejects_cookie_length_over_255() {
        // L > 255 is impossible to encode in one byte, so decode() cannot
        // observe it directly; this documents the invariant on the encode
        // side instead, at `CookieSecret::new`.
        let mut rng = rand::rngs::OsRng::new().unwrap();
        assert_matches::assert_matches!(CookieSecret::new(&mut rng, 256), Err(DtlsError::IncorrectMessageLength));
    }
}
