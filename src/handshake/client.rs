//! Client-side handshake state machine (spec 4.4).
//!
//! `Idle -> HelloSent -> HelloVerifyReceived -> HelloSent' ->
//! ServerHelloReceived -> (cert / key-exchange / cert-request processing)
//! -> ClientKeyExchangeSent -> CcsSent -> FinishedSent -> FinishedReceived
//! -> HandshakeFinished`.

use bytes::Bytes;

use crate::crypto::{self, PeerCertificate, ProtocolVersion, SignatureScheme, Transcript};
use crate::error::DtlsError;
use crate::handshake::cookie::MAX_COOKIE_LEN;
use crate::handshake::fragment::{encode_whole, HandshakeType};
use crate::handshake::hello::ClientHello;
use crate::handshake::HandshakeAccounting;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    HelloSent,
    HelloVerifyReceived,
    HelloSentRetry,
    ServerHelloReceived,
    ServerFlightReceived,
    ClientKeyExchangeSent,
    CcsSent,
    FinishedSent,
    FinishedReceived,
    HandshakeFinished,
}

pub struct ClientHandshake {
    pub state: ClientState,
    pub accounting: HandshakeAccounting,
    pub transcript: Transcript,
    hello_template: ClientHello,
    server_key_exchange: Option<Bytes>,
    server_key_exchange_signature: Option<(SignatureScheme, Bytes)>,
    pending_peer_finished: Option<Bytes>,
}

impl ClientHandshake {
    pub fn new(hello_template: ClientHello) -> Self {
        ClientHandshake {
            state: ClientState::Idle,
            accounting: HandshakeAccounting::default(),
            transcript: Transcript::new(),
            hello_template,
            server_key_exchange: None,
            server_key_exchange_signature: None,
            pending_peer_finished: None,
        }
    }

    /// Emits the initial (cookie-less) ClientHello and transitions to
    /// `HelloSent`. This is flight 1 (spec 4.4's cookie round-trip
    /// diagram); the caller pushes the returned bytes onto the retransmit
    /// queue.
    pub fn start(&mut self) -> Result<Vec<u8>, DtlsError> {
        if self.state != ClientState::Idle {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let message = self.emit_client_hello();
        self.state = ClientState::HelloSent;
        Ok(message)
    }

    fn emit_client_hello(&mut self) -> Vec<u8> {
        let body = self.hello_template.encode();
        let seq = self.accounting.next_local_seq();
        let framed = encode_whole(HandshakeType::ClientHello, seq, &body);
        self.transcript.push(&framed);
        framed.to_vec()
    }

    /// Feeds one reassembled handshake message in, tagged with the
    /// `message_seq` it arrived under (needed to reconstruct the exact
    /// wire bytes for the transcript hash). Returns the next outbound
    /// flight (possibly empty) to send.
    pub fn on_message(&mut self, msg_type: HandshakeType, seq: u16, body: Bytes) -> Result<Vec<Vec<u8>>, DtlsError> {
        use ClientState::*;
        match (self.state, msg_type) {
            (HelloSent, HandshakeType::HelloVerifyRequest) => {
                let hvr = crate::handshake::cookie::HelloVerifyRequest::decode(&body)?;
                if hvr.cookie.len() > MAX_COOKIE_LEN {
                    return Err(DtlsError::IncorrectMessageLength);
                }
                self.state = HelloVerifyReceived;
                self.hello_template.cookie = hvr.cookie;
                // The client immediately resends ClientHello with the
                // cookie spliced in (spec 4.4); no separate round trip is
                // observable at this layer, so we fold HelloVerifyReceived
                // straight into HelloSentRetry.
                let retry = self.emit_client_hello();
                self.state = HelloSentRetry;
                Ok(vec![retry])
            }
            (HelloSent, HandshakeType::ServerHello) | (HelloSentRetry, HandshakeType::ServerHello) => {
                self.transcript.push(&encode_whole(HandshakeType::ServerHello, seq, &body));
                self.state = ServerHelloReceived;
                Ok(Vec::new())
            }
            (ServerHelloReceived, HandshakeType::Certificate)
            | (ServerHelloReceived, HandshakeType::ServerKeyExchange)
            | (ServerHelloReceived, HandshakeType::CertificateRequest) => {
                if msg_type == HandshakeType::ServerKeyExchange {
                    self.server_key_exchange = Some(body.clone());
                }
                self.transcript.push(&encode_whole(msg_type, seq, &body));
                Ok(Vec::new())
            }
            (ServerHelloReceived, HandshakeType::ServerHelloDone) => {
                self.transcript.push(&encode_whole(msg_type, seq, &body));
                self.state = ServerFlightReceived;
                Ok(Vec::new())
            }
            (FinishedSent, HandshakeType::Finished) => {
                // The transcript used for the client's own Finished
                // verify_data must not include the server's Finished
                // message, so this is recorded for later comparison
                // (`verify_peer_finished`) without touching `transcript`.
                self.pending_peer_finished = Some(body);
                self.state = FinishedReceived;
                Ok(Vec::new())
            }
            _ => Err(DtlsError::OutOfOrderMessage),
        }
    }

    /// Records the signature carried by ServerKeyExchange for later
    /// verification via `verify_server_key_exchange` (spec 4.4: C5 is
    /// called from C4 at well-defined points -- this is one of them).
    pub fn record_server_key_exchange_signature(&mut self, scheme: SignatureScheme, signature: Bytes) {
        self.server_key_exchange_signature = Some((scheme, signature));
    }

    pub fn verify_server_key_exchange(&self, cert: &dyn PeerCertificate, version: ProtocolVersion) -> Result<(), DtlsError> {
        let (scheme, signature) = self
            .server_key_exchange_signature
            .as_ref()
            .ok_or(DtlsError::CertificateVerifyFailure)?;
        crypto::verify_transcript_signature(cert, version, *scheme, &self.transcript, true, signature)
    }

    /// Emits ClientKeyExchange, ChangeCipherSpec, and Finished as one
    /// flight once the server's flight is complete (spec 4.4 flight 5).
    pub fn emit_final_flight(&mut self, client_key_exchange_body: &[u8], verify_data: &[u8]) -> Result<Vec<Vec<u8>>, DtlsError> {
        if self.state != ClientState::ServerFlightReceived {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let mut out = Vec::new();

        let seq = self.accounting.next_local_seq();
        let cke = encode_whole(HandshakeType::ClientKeyExchange, seq, client_key_exchange_body);
        self.transcript.push(&cke);
        out.push(cke.to_vec());
        self.state = ClientState::ClientKeyExchangeSent;

        // ChangeCipherSpec is not a handshake message (it has its own
        // content type) so it is not pushed into the transcript or given a
        // handshake sequence number; the session layer frames it.
        self.state = ClientState::CcsSent;

        let fin_seq = self.accounting.next_local_seq();
        let finished = encode_whole(HandshakeType::Finished, fin_seq, verify_data);
        self.transcript.push(&finished);
        out.push(finished.to_vec());
        self.state = ClientState::FinishedSent;

        Ok(out)
    }

    /// Compares the server's Finished message (captured by `on_message`)
    /// against `expected`, the verify_data the host computed from the
    /// master secret and running transcript hash. Completes the handshake
    /// on success (spec 4.4 flight 6).
    pub fn verify_peer_finished(&mut self, expected: &[u8]) -> Result<(), DtlsError> {
        if self.state != ClientState::FinishedReceived {
            return Err(DtlsError::OutOfOrderMessage);
        }
        let verify_data = self.pending_peer_finished.take().ok_or(DtlsError::OutOfOrderMessage)?;
        if !constant_time_eq::constant_time_eq(&verify_data, expected) {
            return Err(DtlsError::CertificateVerifyFailure);
        }
        self.state = ClientState::HandshakeFinished;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ClientHello {
        ClientHello {
            version: crate::record::DTLS_1_2,
            random: [0u8; 32],
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: vec![0xc02b],
            named_groups: vec![0x0017],
            ecdhe_offered: true,
        }
    }

    #[test]
    fn s2_hello_verify_request_triggers_immediate_cookie_retry() {
        let mut client = ClientHandshake::new(template());
        client.start().unwrap();
        assert_eq!(client.state, ClientState::HelloSent);

        let cookie = vec![0xaa; 32];
        let hvr = crate::handshake::cookie::HelloVerifyRequest {
            version: crate::record::DTLS_1_2,
            cookie: Bytes::from(cookie.clone()),
        };
        let messages = client.on_message(HandshakeType::HelloVerifyRequest, 0, Bytes::from(hvr.encode().to_vec())).unwrap();
        assert_eq!(client.state, ClientState::HelloSentRetry);
        assert_eq!(messages.len(), 1);

        let decoded = ClientHello::decode(&messages[0][crate::handshake::fragment::HEADER_LEN..]).unwrap();
        assert_eq!(&decoded.cookie[..], &cookie[..]);
    }

    #[test]
    fn out_of_order_message_in_idle_state_is_rejected() {
        let mut client = ClientHandshake::new(template());
        let err = client
            .on_message(HandshakeType::ServerHello, 0, Bytes::from(vec![0u8; 4]))
            .unwrap_err();
        assert_matches::assert_matches!(err, DtlsError::OutOfOrderMessage);
    }
}
