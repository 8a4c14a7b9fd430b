//! Server-side handshake state machine (spec 4.4).
//!
//! `Idle -> ClientHelloReceived(cookieless) -> HelloVerifyRequestSent ->
//! ClientHelloReceived(with cookie) -> ServerHelloSent -> (cert /
//! key-exchange / cert-request) -> CcsReceived -> FinishedReceived ->
//! FinishedSent -> HandshakeFinished`.

use std::net::IpAddr;

use bytes::Bytes;

use crate::crypto::Transcript;
use crate::error::DtlsError;
use crate::handshake::cookie::{CookieSecret, HelloVerifyRequest};
use crate::handshake::fragment::{encode_whole, HandshakeType};
use crate::handshake::hello::ClientHello;
use crate::handshake::HandshakeAccounting;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    ClientHelloReceivedCookieless,
    HelloVerifyRequestSent,
    ClientHelloReceivedWithCookie,
    ServerHelloSent,
    ServerFlightSent,
    CcsReceived,
    FinishedReceived,
    FinishedSent,
    HandshakeFinished,
}

pub struct ServerHandshake {
    pub state: ServerState,
    pub accounting: HandshakeAccounting,
    pub transcript: Transcript,
    peer_ip: IpAddr,
    peer_port: u16,
    client_hello: Option<ClientHello>,
    client_hello_seq: u16,
    pending_peer_finished: Option<Bytes>,
}

impl ServerHandshake {
    pub fn new(peer_ip: IpAddr, peer_port: u16) -> Self {
        ServerHandshake {
            state: ServerState::Idle,
            accounting: HandshakeAccounting::default(),
            transcript: Transcript::new(),
            peer_ip,
            peer_port,
            client_hello: None,
            client_hello_seq: 0,
            pending_peer_finished: None,
        }
    }

    /// Feeds the first ClientHello in. Always responds with
    /// HelloVerifyRequest (spec 4.4: the cookie round-trip happens on
    /// every handshake, not just under load) and does not advance the
    /// transcript or accept the ClientHello as authentic until the cookie
    /// comes back verified.
    pub fn on_client_hello(&mut self, seq: u16, hello: ClientHello, cookie_secret: &CookieSecret) -> Result<Vec<u8>, DtlsError> {
        match self.state {
            ServerState::Idle => {
                self.state = ServerState::ClientHelloReceivedCookieless;
                let cookie = cookie_secret.generate(self.peer_ip, self.peer_port, &hello.random);
                let hvr = HelloVerifyRequest {
                    version: hello.version,
                    cookie: Bytes::from(cookie),
                };
                let seq = self.accounting.next_local_seq();
                let framed = encode_whole(HandshakeType::HelloVerifyRequest, seq, &hvr.encode());
                self.state = ServerState::HelloVerifyRequestSent;
                Ok(framed.to_vec())
            }
            ServerState::HelloVerifyRequestSent => {
                if !cookie_secret.verify(self.peer_ip, self.peer_port, &hello.random, &hello.cookie) {
                    // Stay in HelloVerifyRequestSent; the caller should
                    // resend the HelloVerifyRequest rather than accept an
                    // unverified retry.
                    return Err(DtlsError::CertificateVerifyFailure);
                }
                self.state = ServerState::ClientHelloReceivedWithCookie;
                self.client_hello_seq = seq;
                self.client_hello = Some(hello);
                Ok(Vec::new())
            }
            _ => Err(DtlsError::OutOfOrderMessage),
        }
    }

    /// Emits ServerHello, (optional Certificate / ServerKeyExchange /
    /// CertificateRequest,) and ServerHelloDone as one flight (spec 4.4
    /// flight 4).
    pub fn emit_server_flight(&mut self, server_hello_body: &[u8], extra_messages: &[(HandshakeType, Vec<u8>)]) -> Result<Vec<Vec<u8>>, DtlsError> {
        if self.state != ServerState::ClientHelloReceivedWithCookie {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let client_hello = self.client_hello.as_ref().ok_or(DtlsError::OutOfOrderMessage)?;
        self.transcript.push(&encode_whole(HandshakeType::ClientHello, self.client_hello_seq, &client_hello.encode()));

        let mut out = Vec::new();
        let hello_seq = self.accounting.next_local_seq();
        let hello = encode_whole(HandshakeType::ServerHello, hello_seq, server_hello_body);
        self.transcript.push(&hello);
        out.push(hello.to_vec());
        self.state = ServerState::ServerHelloSent;

        for (msg_type, body) in extra_messages {
            let seq = self.accounting.next_local_seq();
            let framed = encode_whole(*msg_type, seq, body);
            self.transcript.push(&framed);
            out.push(framed.to_vec());
        }

        let done_seq = self.accounting.next_local_seq();
        let done = encode_whole(HandshakeType::ServerHelloDone, done_seq, &[]);
        self.transcript.push(&done);
        out.push(done.to_vec());
        self.state = ServerState::ServerFlightSent;

        Ok(out)
    }

    /// Feeds ClientKeyExchange in.
    pub fn on_client_key_exchange(&mut self, seq: u16, body: Bytes) -> Result<(), DtlsError> {
        if self.state != ServerState::ServerFlightSent {
            return Err(DtlsError::OutOfOrderMessage);
        }
        self.transcript.push(&encode_whole(HandshakeType::ClientKeyExchange, seq, &body));
        Ok(())
    }

    pub fn on_change_cipher_spec(&mut self) -> Result<(), DtlsError> {
        if self.state != ServerState::ServerFlightSent {
            return Err(DtlsError::OutOfOrderMessage);
        }
        self.state = ServerState::CcsReceived;
        Ok(())
    }

    /// Records the client's Finished message off the wire. The comparison
    /// against the host-computed verify_data happens separately in
    /// `verify_client_finished`, since this driver has no access to the
    /// master secret (spec 1: bulk key material is an external capability).
    pub fn on_client_finished_received(&mut self, body: Bytes) -> Result<(), DtlsError> {
        if self.state != ServerState::CcsReceived {
            return Err(DtlsError::OutOfOrderMessage);
        }
        self.pending_peer_finished = Some(body);
        Ok(())
    }

    pub fn verify_client_finished(&mut self, expected: &[u8]) -> Result<(), DtlsError> {
        if self.state != ServerState::CcsReceived {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let verify_data = self.pending_peer_finished.take().ok_or(DtlsError::OutOfOrderMessage)?;
        if !constant_time_eq::constant_time_eq(&verify_data, expected) {
            return Err(DtlsError::CertificateVerifyFailure);
        }
        self.state = ServerState::FinishedReceived;
        Ok(())
    }

    pub fn emit_server_finished(&mut self, verify_data: &[u8]) -> Result<Vec<u8>, DtlsError> {
        if self.state != ServerState::FinishedReceived {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let seq = self.accounting.next_local_seq();
        let framed = encode_whole(HandshakeType::Finished, seq, verify_data);
        self.transcript.push(&framed);
        self.state = ServerState::HandshakeFinished;
        Ok(framed.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn client_hello() -> ClientHello {
        ClientHello {
            version: crate::record::DTLS_1_2,
            random: [7u8; 32],
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: vec![0xc02b],
            named_groups: vec![0x0017],
            ecdhe_offered: true,
        }
    }

    #[test]
    fn s1_first_client_hello_always_gets_hello_verify_request() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let mut server = ServerHandshake::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), 4433);

        let out = server.on_client_hello(0, client_hello(), &secret).unwrap();
        assert_eq!(server.state, ServerState::HelloVerifyRequestSent);
        assert!(!out.is_empty());
    }

    #[test]
    fn cookie_bearing_retry_advances_past_verification() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let peer = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));
        let mut server = ServerHandshake::new(peer, 4433);

        server.on_client_hello(0, client_hello(), &secret).unwrap();

        let cookie = secret.generate(peer, 4433, &client_hello().random);
        let mut retry = client_hello();
        retry.cookie = Bytes::from(cookie);
        server.on_client_hello(1, retry, &secret).unwrap();
        assert_eq!(server.state, ServerState::ClientHelloReceivedWithCookie);
        assert_eq!(server.client_hello_seq, 1);
    }

    #[test]
    fn forged_cookie_is_rejected_without_advancing_state() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let peer = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7));
        let mut server = ServerHandshake::new(peer, 4433);
        server.on_client_hello(0, client_hello(), &secret).unwrap();

        let mut retry = client_hello();
        retry.cookie = Bytes::from(vec![0u8; 32]);
        let err = server.on_client_hello(1, retry, &secret).unwrap_err();
        assert_matches::assert_matches!(err, DtlsError::CertificateVerifyFailure);
        assert_eq!(server.state, ServerState::HelloVerifyRequestSent);
    }
}
