//! Handshake message framing and fragment reassembly (spec 4.4, 6).
//!
//! Wire header: `type(1) | length(3) | message_seq(2) | frag_offset(3) |
//! frag_length(3)`, followed by `frag_length` payload bytes. Outbound
//! messages are always emitted whole; inbound messages may arrive
//! fragmented across multiple records and are reassembled keyed by
//! `message_seq`.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes, BytesMut, IntoBuf};

use crate::coding::{BufDtlsExt, BufMutDtlsExt};
use crate::error::DtlsError;

pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    HelloVerifyRequest = 3,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl HandshakeType {
    fn try_from(v: u8) -> Result<Self, DtlsError> {
        use self::HandshakeType::*;
        Ok(match v {
            0 => HelloRequest,
            1 => ClientHello,
            2 => ServerHello,
            3 => HelloVerifyRequest,
            11 => Certificate,
            12 => ServerKeyExchange,
            13 => CertificateRequest,
            14 => ServerHelloDone,
            15 => CertificateVerify,
            16 => ClientKeyExchange,
            20 => Finished,
            _ => return Err(DtlsError::InvalidPacket),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
    pub frag_offset: u32,
    pub frag_length: u32,
}

impl FragmentHeader {
    pub fn decode(bytes: &[u8]) -> Result<Self, DtlsError> {
        if bytes.len() < HEADER_LEN {
            return Err(DtlsError::IncorrectMessageLength);
        }
        let mut buf = Bytes::from(bytes[..HEADER_LEN].to_vec()).into_buf();
        let msg_type = HandshakeType::try_from(buf.get_u8())?;
        let length = buf.get_u24()?;
        let message_seq = buf.get_u16_be();
        let frag_offset = buf.get_u24()?;
        let frag_length = buf.get_u24()?;
        Ok(FragmentHeader {
            msg_type,
            length,
            message_seq,
            frag_offset,
            frag_length,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.msg_type as u8);
        buf.put_u24(self.length);
        buf.put_u16_be(self.message_seq);
        buf.put_u24(self.frag_offset);
        buf.put_u24(self.frag_length);
    }
}

/// Frames a complete handshake message as a single (unfragmented) wire
/// record body. Outbound messages are always emitted whole (spec 4.4).
pub fn encode_whole(msg_type: HandshakeType, message_seq: u16, body: &[u8]) -> BytesMut {
    let header = FragmentHeader {
        msg_type,
        length: body.len() as u32,
        message_seq,
        frag_offset: 0,
        frag_length: body.len() as u32,
    };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    header.encode(&mut buf);
    buf.put_slice(body);
    buf
}

/// Reassembles fragments of a single handshake message, identified by
/// `message_seq`. Tracks which byte ranges of `[0, length)` have been
/// filled so it can tell the caller once every fragment has arrived,
/// regardless of arrival order (spec 8 property 6).
pub struct Reassembler {
    msg_type: HandshakeType,
    length: u32,
    buffer: Vec<u8>,
    // Sorted, non-overlapping filled ranges.
    filled: BTreeMap<u32, u32>,
    bytes_filled: u32,
}

impl Reassembler {
    pub fn new(msg_type: HandshakeType, length: u32) -> Self {
        Reassembler {
            msg_type,
            length,
            buffer: vec![0u8; length as usize],
            filled: BTreeMap::new(),
            bytes_filled: 0,
        }
    }

    /// Adds one fragment. Returns `Ok(Some(message))` once every byte of
    /// `[0, length)` has been received.
    pub fn add_fragment(&mut self, header: &FragmentHeader, data: &[u8]) -> Result<Option<Bytes>, DtlsError> {
        if header.length != self.length || header.msg_type != self.msg_type {
            return Err(DtlsError::IncorrectMessageLength);
        }
        let start = header.frag_offset;
        let end = start.checked_add(header.frag_length).ok_or(DtlsError::IncorrectMessageLength)?;
        if end > self.length || data.len() != header.frag_length as usize {
            return Err(DtlsError::IncorrectMessageLength);
        }

        if !self.range_is_new(start, end) {
            // Overlapping retransmitted fragment; harmless, just re-copy.
            self.buffer[start as usize..end as usize].copy_from_slice(data);
            return Ok(self.finished());
        }

        self.buffer[start as usize..end as usize].copy_from_slice(data);
        self.filled.insert(start, end);
        self.bytes_filled += end - start;
        self.merge_adjacent();
        Ok(self.finished())
    }

    fn range_is_new(&self, start: u32, end: u32) -> bool {
        !self.filled.iter().any(|(&s, &e)| s < end && start < e)
    }

    fn merge_adjacent(&mut self) {
        let mut merged: BTreeMap<u32, u32> = BTreeMap::new();
        for (&start, &end) in &self.filled {
            if let Some((&last_start, &last_end)) = merged.iter().next_back() {
                if start <= last_end {
                    merged.insert(last_start, last_end.max(end));
                    continue;
                }
            }
            merged.insert(start, end);
        }
        self.filled = merged;
    }

    fn finished(&self) -> Option<Bytes> {
        if self.bytes_filled >= self.length && self.filled.get(&0).map_or(false, |&e| e >= self.length) {
            Some(Bytes::from(self.buffer.clone()))
        } else {
            None
        }
    }
}
