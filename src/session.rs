//! Per-peer session state: keys, epochs, queues, timers, callbacks, remote
//! address (spec 4.6, 4.12). This is the crate's `quinn-proto::Connection`
//! analogue, driving one client or server handshake plus its application
//! data after completion.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::task::Waker;

use bytes::Bytes;
use slog::Logger;

use crate::alert::Alert;
use crate::config::Config;
use crate::crypto::{CertKeyType, PeerCertificate, ProtocolVersion};
use crate::error::DtlsError;
use crate::handshake::client::{ClientHandshake, ClientState};
use crate::handshake::cookie::CookieSecret;
use crate::handshake::fragment::{FragmentHeader, HandshakeType};
use crate::handshake::hello::ClientHello;
use crate::handshake::server::{ServerHandshake, ServerState};
use crate::handshake::Role;
use crate::record::{self, ContentType, NullRecordProtection, RecordProtection};
use crate::registry::{self, REGISTRY};
use crate::replay::EpochState;
use crate::retransmit::RetransmitQueue;
use crate::{Event, Io};

enum Driver {
    Client(ClientHandshake),
    Server(ServerHandshake),
}

/// A single local certificate, PSK identity, or trusted anchor stashed for
/// later handshake use (spec 4.12).
struct CertEntry {
    der: Vec<u8>,
    key_type: CertKeyType,
}

pub struct ClientInfo {
    pub remote: SocketAddr,
    pub handshake_complete: bool,
}

pub struct Session {
    id: u64,
    log: Logger,
    config: Config,
    role: Role,
    remote: Option<SocketAddr>,
    epoch_state: EpochState,
    retransmit: RetransmitQueue,
    protection: Box<dyn RecordProtection>,
    driver: Option<Driver>,
    recv_queue: VecDeque<Bytes>,
    waker: Option<Waker>,
    io: VecDeque<Io>,
    events: VecDeque<Event>,
    local_certificates: Vec<CertEntry>,
    trusted_certificates: Vec<CertEntry>,
    psks: Vec<(Vec<u8>, Vec<u8>)>,
    supported_named_groups: Option<Vec<u16>>,
}

impl Session {
    pub fn new(log: Logger, config: Config) -> Self {
        let id = registry::next_id();
        REGISTRY.lock().unwrap().register_session(id);
        let retransmit = RetransmitQueue::new(config.retransmit_config());
        Session {
            id,
            log: log.new(o!("session" => id)),
            config,
            role: Role::Client,
            remote: None,
            epoch_state: EpochState::default(),
            retransmit,
            protection: Box::new(NullRecordProtection),
            driver: None,
            recv_queue: VecDeque::new(),
            waker: None,
            io: VecDeque::new(),
            events: VecDeque::new(),
            local_certificates: Vec::new(),
            trusted_certificates: Vec::new(),
            psks: Vec::new(),
            supported_named_groups: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pops the next pending I/O action (spec 6 `Io` queue).
    pub fn poll_io(&mut self) -> Option<Io> {
        self.io.pop_front()
    }

    /// Pops the next pending application event (spec 6 `Event` queue).
    pub fn poll(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Resets the handshake and record state while keeping the session
    /// registered and its configured certificates/PSKs in place (spec
    /// 4.12, `Session::reset`).
    pub fn reset(&mut self) {
        self.remote = None;
        self.epoch_state = EpochState::default();
        self.retransmit.flush();
        self.protection = Box::new(NullRecordProtection);
        self.driver = None;
        self.recv_queue.clear();
        self.waker = None;
        debug!(self.log, "session reset");
    }

    /// Begins a client handshake: emits the initial ClientHello flight
    /// (spec 4.4/4.12 `start_client`).
    pub fn start_client(&mut self, remote: SocketAddr, mut hello_template: ClientHello) -> Result<(), DtlsError> {
        self.role = Role::Client;
        self.remote = Some(remote);
        if let Some(groups) = &self.supported_named_groups {
            hello_template.named_groups = groups.clone();
            hello_template.ecdhe_offered = !groups.is_empty();
        }
        let mut client = ClientHandshake::new(hello_template);
        let flight = client.start()?;
        self.driver = Some(Driver::Client(client));
        let record = self.frame_handshake_record(&flight);
        self.queue_flight(remote, vec![record]);
        trace!(self.log, "client handshake started"; "remote" => %remote);
        Ok(())
    }

    /// Used by `ServerMux` to stand a fresh session up for a newly-seen
    /// peer (spec 4.12 `start_server`).
    pub fn start_server(&mut self, remote: SocketAddr) {
        self.role = Role::Server;
        self.remote = Some(remote);
        self.driver = Some(Driver::Server(ServerHandshake::new(remote.ip(), remote.port())));
        self.retransmit.start_flight();
    }

    /// Starts a fresh retransmit flight and queues already-encoded records
    /// for transmission. Spec 4.3: a new flight always replaces whatever
    /// was buffered before.
    fn queue_flight(&mut self, remote: SocketAddr, records: Vec<Vec<u8>>) {
        self.retransmit.start_flight();
        for record in records {
            self.retransmit.push(record.clone());
            self.io.push_back(Io::Transmit {
                destination: remote,
                packet: record.into_boxed_slice(),
            });
        }
        self.io.push_back(Io::TimerStart {
            session: self.id,
            timeout_ms: self.retransmit.current_timeout_ms(),
        });
    }

    /// Wraps each already-framed handshake message body (fragment header +
    /// content) into a DTLS record at the current local epoch and queues
    /// them as one flight.
    fn emit_handshake_flight(&mut self, remote: SocketAddr, bodies: Vec<Vec<u8>>) {
        let records: Vec<Vec<u8>> = bodies.iter().map(|b| self.frame_handshake_record(b)).collect();
        self.queue_flight(remote, records);
    }

    fn frame_handshake_record(&mut self, body: &[u8]) -> Vec<u8> {
        let seq = self.epoch_state.next_local_seq();
        record::encode_record(
            self.protection.as_ref(),
            ContentType::Handshake,
            crate::record::DTLS_1_2,
            self.epoch_state.local_epoch,
            seq,
            body,
        )
        .to_vec()
    }

    /// ChangeCipherSpec has a fixed one-byte body (RFC 5246 7.1) and its
    /// own content type; it is never pushed into a handshake transcript.
    fn change_cipher_spec_record(&mut self) -> Vec<u8> {
        let seq = self.epoch_state.next_local_seq();
        record::encode_record(
            self.protection.as_ref(),
            ContentType::ChangeCipherSpec,
            crate::record::DTLS_1_2,
            self.epoch_state.local_epoch,
            seq,
            &[1u8],
        )
        .to_vec()
    }

    /// Called when the caller's wait for a reply times out; replays the
    /// buffered flight with the backed-off timeout, or fails the
    /// handshake once the retry budget is exhausted (spec 4.3).
    pub fn on_retransmit_timeout(&mut self) -> Result<(), DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let packets: Vec<Vec<u8>> = self.retransmit.on_wait_timeout()?.cloned().collect();
        for packet in packets {
            self.io.push_back(Io::Transmit {
                destination: remote,
                packet: packet.into_boxed_slice(),
            });
        }
        self.io.push_back(Io::TimerStart {
            session: self.id,
            timeout_ms: self.retransmit.current_timeout_ms(),
        });
        Ok(())
    }

    /// Entry point for the record path: the caller (direct client read or
    /// `ServerMux` demux) hands in one raw UDP payload.
    pub fn handle_datagram(&mut self, remote: SocketAddr, data: &[u8], cookie_secret: Option<&CookieSecret>) -> Result<(), DtlsError> {
        if self.remote.map_or(false, |r| r != remote) {
            return Err(DtlsError::SendAddressMismatch);
        }
        self.remote = Some(remote);

        let mut offset = 0usize;
        while offset < data.len() {
            let (raw, next) = record::decode_next(data, offset)?;
            offset = next;

            let idle = match &self.driver {
                Some(Driver::Server(s)) => s.state == ServerState::Idle,
                Some(Driver::Client(_)) => false,
                None => true,
            };
            let snap = match self.epoch_state.check(raw.header.epoch, raw.header.seq_hi, raw.header.seq_lo, idle) {
                Ok(snap) => snap,
                Err(DtlsError::InvalidEpoch) | Err(DtlsError::OutOfOrderMessage) => continue,
                Err(e) => return Err(e),
            };

            let seq = crate::coding::seq48_to_u64(raw.header.seq_hi, raw.header.seq_lo);
            let plaintext = match record::unprotect(self.protection.as_ref(), &raw.header, seq, &raw.payload) {
                Ok(p) => p,
                Err(e) => {
                    self.epoch_state.rollback(snap);
                    debug!(self.log, "dropping record"; "reason" => %e);
                    continue;
                }
            };
            self.epoch_state.commit(raw.header.epoch, raw.header.seq_hi, raw.header.seq_lo);

            match raw.header.content_type {
                ContentType::Handshake => self.handle_handshake_payload(remote, &plaintext, cookie_secret)?,
                ContentType::ChangeCipherSpec => {
                    self.epoch_state.advance_remote_epoch();
                    if let Some(Driver::Server(server)) = self.driver.as_mut() {
                        server.on_change_cipher_spec()?;
                    }
                }
                ContentType::Alert => {
                    let alert = Alert::decode(&plaintext)?;
                    if alert.is_close_notify() {
                        return Err(DtlsError::CloseNotifyReceived);
                    }
                    self.events.push_back(Event::from_alert(alert));
                }
                ContentType::ApplicationData => {
                    if !plaintext.is_empty() {
                        self.recv_queue.push_back(plaintext);
                        if let Some(waker) = self.waker.take() {
                            waker.wake();
                        }
                        self.events.push_back(Event::Readable);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_handshake_payload(&mut self, remote: SocketAddr, plaintext: &[u8], cookie_secret: Option<&CookieSecret>) -> Result<(), DtlsError> {
        let header = FragmentHeader::decode(plaintext)?;
        let data = &plaintext[crate::handshake::fragment::HEADER_LEN..];

        let mut outbound = Vec::new();
        match self.driver.as_mut() {
            Some(Driver::Client(client)) => {
                for (seq, msg_type, body) in client.accounting.receive_fragment(header, data)? {
                    outbound.extend(client.on_message(msg_type, seq, body)?);
                }
            }
            Some(Driver::Server(server)) => {
                for (seq, msg_type, body) in server.accounting.receive_fragment(header, data)? {
                    match msg_type {
                        HandshakeType::ClientHello => {
                            let hello = ClientHello::decode(&body)?;
                            let secret = cookie_secret.ok_or(DtlsError::MissingCryptoRoutine)?;
                            let flight = server.on_client_hello(seq, hello, secret)?;
                            if !flight.is_empty() {
                                outbound.push(flight);
                            }
                        }
                        HandshakeType::ClientKeyExchange => server.on_client_key_exchange(seq, body)?,
                        HandshakeType::Finished => server.on_client_finished_received(body)?,
                        _ => return Err(DtlsError::OutOfOrderMessage),
                    }
                }
            }
            None => return Err(DtlsError::SessionUninitialized),
        }

        if !outbound.is_empty() {
            self.emit_handshake_flight(remote, outbound);
        } else {
            self.retransmit.flush();
        }
        Ok(())
    }

    /// Client: called once the host has verified (or the cipher suite
    /// requires no verification of) the server's key-exchange signature
    /// and built the `ClientKeyExchange` body. Emits ClientKeyExchange,
    /// then ChangeCipherSpec, then Finished at the freshly-bumped local
    /// epoch, as one flight (spec 4.4 flight 5).
    pub fn client_send_final_flight(&mut self, client_key_exchange_body: &[u8], verify_data: &[u8]) -> Result<(), DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let client = match self.driver.as_mut() {
            Some(Driver::Client(c)) => c,
            _ => return Err(DtlsError::SessionUninitialized),
        };
        let flight = client.emit_final_flight(client_key_exchange_body, verify_data)?;
        let cke_record = self.frame_handshake_record(&flight[0]);
        let ccs_record = self.change_cipher_spec_record();
        self.epoch_state.advance_local_epoch();
        let finished_record = self.frame_handshake_record(&flight[1]);
        self.queue_flight(remote, vec![cke_record, ccs_record, finished_record]);
        Ok(())
    }

    /// Client: verifies the signature carried by the server's
    /// ServerKeyExchange against the transcript accumulated so far.
    pub fn client_verify_server_key_exchange(&self, cert: &dyn PeerCertificate, version: ProtocolVersion) -> Result<(), DtlsError> {
        match &self.driver {
            Some(Driver::Client(c)) => c.verify_server_key_exchange(cert, version),
            _ => Err(DtlsError::SessionUninitialized),
        }
    }

    /// Client: compares the server's Finished message against the
    /// host-computed `expected` verify_data. Completes the handshake and
    /// queues `Event::Connected` on success (spec 4.4 flight 6).
    pub fn client_verify_peer_finished(&mut self, expected: &[u8]) -> Result<(), DtlsError> {
        match self.driver.as_mut() {
            Some(Driver::Client(c)) => {
                c.verify_peer_finished(expected)?;
                self.events.push_back(Event::Connected);
                Ok(())
            }
            _ => Err(DtlsError::SessionUninitialized),
        }
    }

    /// Server: called once the host has built the ServerHello body and any
    /// Certificate/ServerKeyExchange/CertificateRequest bodies; emits the
    /// server's flight (spec 4.4 flight 4).
    pub fn server_send_flight(&mut self, server_hello_body: &[u8], extra_messages: &[(HandshakeType, Vec<u8>)]) -> Result<(), DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let server = match self.driver.as_mut() {
            Some(Driver::Server(s)) => s,
            _ => return Err(DtlsError::SessionUninitialized),
        };
        let flight = server.emit_server_flight(server_hello_body, extra_messages)?;
        self.emit_handshake_flight(remote, flight);
        Ok(())
    }

    /// Server: compares the client's Finished message against the
    /// host-computed `expected` verify_data, then emits its own
    /// ChangeCipherSpec and Finished (`verify_data_to_send`) at the
    /// freshly-bumped local epoch, completing the handshake (spec 4.4
    /// flight 6).
    pub fn server_verify_client_finished(&mut self, expected: &[u8], verify_data_to_send: &[u8]) -> Result<(), DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let server = match self.driver.as_mut() {
            Some(Driver::Server(s)) => s,
            _ => return Err(DtlsError::SessionUninitialized),
        };
        server.verify_client_finished(expected)?;
        let framed = server.emit_server_finished(verify_data_to_send)?;
        let ccs_record = self.change_cipher_spec_record();
        self.epoch_state.advance_local_epoch();
        let finished_record = self.frame_handshake_record(&framed);
        self.queue_flight(remote, vec![ccs_record, finished_record]);
        self.events.push_back(Event::Connected);
        Ok(())
    }

    /// Sends one application-data record (spec 4.12 `Session::send`).
    pub fn send(&mut self, data: &[u8]) -> Result<Io, DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let seq = self.epoch_state.next_local_seq();
        let record = record::encode_record(
            self.protection.as_ref(),
            ContentType::ApplicationData,
            crate::record::DTLS_1_2,
            self.epoch_state.local_epoch,
            seq,
            data,
        );
        Ok(Io::Transmit {
            destination: remote,
            packet: record.to_vec().into_boxed_slice(),
        })
    }

    /// Pops the next received application-data record, or registers
    /// `waker` to be woken when one arrives (spec 5: "at most one
    /// suspended reader per session").
    pub fn recv_poll(&mut self, waker: Waker) -> Result<Bytes, DtlsError> {
        if let Some(data) = self.recv_queue.pop_front() {
            return Ok(data);
        }
        if self.waker.is_some() {
            return Err(DtlsError::AlreadySuspended);
        }
        self.waker = Some(waker);
        Err(DtlsError::NoPacket)
    }

    pub fn client_info(&self) -> Result<ClientInfo, DtlsError> {
        let remote = self.remote.ok_or(DtlsError::NotConnected)?;
        let handshake_complete = match &self.driver {
            Some(Driver::Client(c)) => c.state == ClientState::HandshakeFinished,
            Some(Driver::Server(s)) => s.state == ServerState::HandshakeFinished,
            None => false,
        };
        Ok(ClientInfo { remote, handshake_complete })
    }

    pub fn add_local_certificate(&mut self, der: Vec<u8>, key_type: CertKeyType) {
        self.local_certificates.push(CertEntry { der, key_type });
    }

    pub fn remove_local_certificate(&mut self, der: &[u8]) {
        self.local_certificates.retain(|c| c.der != der);
    }

    pub fn add_trusted_certificate(&mut self, der: Vec<u8>, key_type: CertKeyType) {
        self.trusted_certificates.push(CertEntry { der, key_type });
    }

    pub fn remove_trusted_certificate(&mut self, der: &[u8]) {
        self.trusted_certificates.retain(|c| c.der != der);
    }

    pub fn add_psk(&mut self, identity: Vec<u8>, key: Vec<u8>) {
        self.psks.push((identity, key));
    }

    pub fn remove_psk(&mut self, identity: &[u8]) {
        self.psks.retain(|(id, _)| id != identity);
    }

    /// Registers the named groups (ECC curves) this session offers in its
    /// ClientHello when it next starts a client handshake (spec 4.12 ECC
    /// management); a thin setter in the same style as
    /// `add_local_certificate`.
    pub fn init_ecc(&mut self, named_groups: Vec<u16>) {
        self.supported_named_groups = Some(named_groups);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for entry in self.psks.iter_mut() {
            for byte in entry.1.iter_mut() {
                *byte = 0;
            }
        }
        REGISTRY.lock().unwrap().unregister_session(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    fn client_hello() -> ClientHello {
        ClientHello {
            version: crate::record::DTLS_1_2,
            random: [1u8; 32],
            session_id: Bytes::new(),
            cookie: Bytes::new(),
            cipher_suites: vec![0xc02b],
            named_groups: vec![0x0017],
            ecdhe_offered: true,
        }
    }

    #[test]
    fn start_client_emits_one_transmit_and_arms_a_timer() {
        let mut session = Session::new(logger(), Config::default());
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 4433);
        session.start_client(remote, client_hello()).unwrap();

        let first = session.poll_io().unwrap();
        assert_matches::assert_matches!(first, Io::Transmit { .. });
        let second = session.poll_io().unwrap();
        assert_matches::assert_matches!(second, Io::TimerStart { .. });
        assert!(session.poll_io().is_none());
    }

    #[test]
    fn init_ecc_splices_named_groups_into_the_client_hello() {
        let mut session = Session::new(logger(), Config::default());
        session.init_ecc(vec![0x0017, 0x0018]);
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 4433);

        let mut template = client_hello();
        template.ecdhe_offered = false;
        template.named_groups = Vec::new();

        let mut expected = template.clone();
        expected.named_groups = vec![0x0017, 0x0018];
        expected.ecdhe_offered = true;
        let expected_body = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 0, &expected.encode());

        session.start_client(remote, template).unwrap();

        let io = session.poll_io().unwrap();
        let packet = match io {
            Io::Transmit { packet, .. } => packet,
            _ => panic!("expected a transmit"),
        };
        let framed = &packet[crate::record::HEADER_LEN..];
        assert_eq!(framed, &expected_body[..]);
    }

    #[test]
    fn send_before_handshake_completes_fails_not_connected() {
        let mut session = Session::new(logger(), Config::default());
        assert_matches::assert_matches!(session.send(b"hi"), Err(DtlsError::NotConnected));
    }

    #[test]
    fn server_session_replies_to_first_client_hello_with_hello_verify_request() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let mut session = Session::new(logger(), Config::default());
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5000);
        session.start_server(remote);

        let hello = client_hello();
        let body = hello.encode();
        let framed = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 0, &body);
        let record = record::encode_record(&NullRecordProtection, ContentType::Handshake, crate::record::DTLS_1_2, 0, 0, &framed);

        session.handle_datagram(remote, &record, Some(&secret)).unwrap();
        let io = session.poll_io().unwrap();
        assert_matches::assert_matches!(io, Io::Transmit { .. });
    }

    fn record_for(epoch: u64, seq: u64, content_type: ContentType, framed: &[u8]) -> Vec<u8> {
        record::encode_record(&NullRecordProtection, content_type, crate::record::DTLS_1_2, epoch, seq, framed).to_vec()
    }

    /// Drives a server session through the full flight sequence (cookie
    /// round trip, flight 4, ClientKeyExchange, Finished) and confirms the
    /// host-facing completion call emits `Event::Connected` (spec 4.4
    /// state list, flight 6).
    #[test]
    fn server_session_completes_handshake_via_host_driven_finished_check() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let mut session = Session::new(logger(), Config::default());
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5000);
        session.start_server(remote);

        let hello = client_hello();
        let first = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 0, &hello.encode());
        session.handle_datagram(remote, &record_for(0, 0, ContentType::Handshake, &first), Some(&secret)).unwrap();
        while session.poll_io().is_some() {}

        let cookie = secret.generate(remote.ip(), remote.port(), &hello.random);
        let mut retry = hello.clone();
        retry.cookie = Bytes::from(cookie);
        let second = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 1, &retry.encode());
        session.handle_datagram(remote, &record_for(0, 1, ContentType::Handshake, &second), Some(&secret)).unwrap();

        session.server_send_flight(b"server-hello-body", &[]).unwrap();
        while session.poll_io().is_some() {}

        let cke = crate::handshake::fragment::encode_whole(HandshakeType::ClientKeyExchange, 3, b"cke-body");
        session.handle_datagram(remote, &record_for(0, 2, ContentType::Handshake, &cke), Some(&secret)).unwrap();

        let ccs = record_for(0, 3, ContentType::ChangeCipherSpec, &[1u8]);
        session.handle_datagram(remote, &ccs, Some(&secret)).unwrap();

        let finished = crate::handshake::fragment::encode_whole(HandshakeType::Finished, 4, b"client-verify-data");
        session.handle_datagram(remote, &record_for(1, 0, ContentType::Handshake, &finished), Some(&secret)).unwrap();

        session.server_verify_client_finished(b"client-verify-data", b"server-verify-data").unwrap();

        let mut saw_connected = false;
        while let Some(event) = session.poll() {
            if let Event::Connected = event {
                saw_connected = true;
            }
        }
        assert!(saw_connected);
    }

    /// spec 4.1/6: the 48-bit record sequence must strictly increase per
    /// record within an epoch. A server flight of ServerHello/
    /// ServerHelloDone is two records; each must carry a distinct,
    /// increasing sequence number rather than the nonce-reusing `0` every
    /// time.
    #[test]
    fn outbound_records_in_a_flight_get_distinct_increasing_sequence_numbers() {
        let mut rng = rand::rngs::OsRng::new().unwrap();
        let secret = CookieSecret::new(&mut rng, 32).unwrap();
        let mut session = Session::new(logger(), Config::default());
        let remote = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 5000);
        session.start_server(remote);

        let hello = client_hello();
        let first = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 0, &hello.encode());
        session.handle_datagram(remote, &record_for(0, 0, ContentType::Handshake, &first), Some(&secret)).unwrap();
        while session.poll_io().is_some() {}

        let cookie = secret.generate(remote.ip(), remote.port(), &hello.random);
        let mut retry = hello.clone();
        retry.cookie = Bytes::from(cookie);
        let second = crate::handshake::fragment::encode_whole(HandshakeType::ClientHello, 1, &retry.encode());
        session.handle_datagram(remote, &record_for(0, 1, ContentType::Handshake, &second), Some(&secret)).unwrap();

        session.server_send_flight(b"server-hello-body", &[]).unwrap();

        let mut seqs = Vec::new();
        while let Some(io) = session.poll_io() {
            if let Io::Transmit { packet, .. } = io {
                let header = record::RecordHeader::decode(&packet, 0).unwrap();
                seqs.push(crate::coding::seq48_to_u64(header.seq_hi, header.seq_lo));
            }
        }
        assert!(seqs.len() >= 2, "expected at least ServerHello and ServerHelloDone records");
        for pair in seqs.windows(2) {
            assert!(pair[1] > pair[0], "sequence numbers must strictly increase: {:?}", seqs);
        }
    }
}
