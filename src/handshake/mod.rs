//! Handshake driver (spec 4.4): client and server state machines sharing
//! flight/retransmit plumbing, HelloVerifyRequest cookie round-trip, and
//! handshake-message fragment reassembly.

pub mod client;
pub mod cookie;
pub mod fragment;
pub mod hello;
pub mod server;

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::DtlsError;
use fragment::{FragmentHeader, HandshakeType, Reassembler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Tracks handshake-message sequencing and fragment reassembly, shared by
/// both state machines (spec 4.4: "Handshake record framing").
#[derive(Default)]
pub struct HandshakeAccounting {
    pub local_handshake_seq: u16,
    /// Sequence the driver is ready to consume next.
    pub expected_handshake_seq: u16,
    in_progress: BTreeMap<u16, Reassembler>,
    /// Fully reassembled messages that arrived out of order, buffered
    /// until their turn (spec 4.4: "Out-of-order handshake messages
    /// ...are buffered; equal sequence is consumed and
    /// `expected_handshake_seq` advances").
    ready: BTreeMap<u16, (HandshakeType, Bytes)>,
}

impl HandshakeAccounting {
    pub fn next_local_seq(&mut self) -> u16 {
        let seq = self.local_handshake_seq;
        self.local_handshake_seq += 1;
        seq
    }

    /// Feeds one fragment in. Returns every message that is now ready to
    /// be consumed, each tagged with the `message_seq` it arrived under, in
    /// strictly increasing order, advancing `expected_handshake_seq` as
    /// they are drained.
    pub fn receive_fragment(&mut self, header: FragmentHeader, data: &[u8]) -> Result<Vec<(u16, HandshakeType, Bytes)>, DtlsError> {
        if header.message_seq < self.expected_handshake_seq {
            // Already consumed; almost certainly a retransmit of a flight
            // we've moved past. Not an error -- the caller treats this as
            // Continue (spec 7).
            return Ok(Vec::new());
        }

        if !self.ready.contains_key(&header.message_seq) {
            let reassembler = self
                .in_progress
                .entry(header.message_seq)
                .or_insert_with(|| Reassembler::new(header.msg_type, header.length));
            if let Some(message) = reassembler.add_fragment(&header, data)? {
                self.in_progress.remove(&header.message_seq);
                self.ready.insert(header.message_seq, (header.msg_type, message));
            }
        }

        let mut drained = Vec::new();
        while let Some((msg_type, body)) = self.ready.remove(&self.expected_handshake_seq) {
            drained.push((self.expected_handshake_seq, msg_type, body));
            self.expected_handshake_seq += 1;
        }
        Ok(drained)
    }
}

/// Protocol-version-scoped constants governing signalling cipher suites
/// (spec 6).
pub const TLS_EMPTY_RENEGOTIATION_INFO_SCSV: u16 = 0x00ff;
