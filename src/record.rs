//! DTLS record header codec and per-record protection pipeline (spec 4.1).
//!
//! The 13-byte header:
//!
//! ```text
//! offset  size  field
//! 0       1     content type
//! 1       2     version (big-endian)
//! 3       2     epoch (big-endian)
//! 5       6     sequence number (big-endian, 48-bit)
//! 11      2     length
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut, IntoBuf};

use crate::coding::{BufDtlsExt, BufMutDtlsExt};
use crate::error::DtlsError;

pub const HEADER_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    fn try_from(v: u8) -> Result<Self, DtlsError> {
        match v {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(DtlsError::InvalidPacket),
        }
    }
}

/// DTLS 1.0 = `0xfeff`, DTLS 1.2 = `0xfefd` (spec 6).
pub const DTLS_1_0: u16 = 0xfeff;
pub const DTLS_1_2: u16 = 0xfefd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub version: u16,
    pub epoch: u16,
    pub seq_hi: u16,
    pub seq_lo: u32,
    pub length: u16,
}

impl RecordHeader {
    /// Decodes the 13-byte header starting at `offset` in `packet`.
    ///
    /// Fails with `InvalidPacket` if fewer than 13 bytes are reachable from
    /// the offset, or the inner `length` plus 13 would overrun `packet`.
    pub fn decode(packet: &[u8], offset: usize) -> Result<Self, DtlsError> {
        let remaining = packet.len().checked_sub(offset).ok_or(DtlsError::InvalidPacket)?;
        if remaining < HEADER_LEN {
            return Err(DtlsError::InvalidPacket);
        }
        let mut buf = Bytes::from(packet[offset..offset + HEADER_LEN].to_vec()).into_buf();
        let content_type = ContentType::try_from(buf.get_u8())?;
        let version = buf.get_u16_be();
        let epoch = buf.get_u16_be();
        let (seq_hi, seq_lo) = buf.get_seq48()?;
        let length = buf.get_u16_be();

        if remaining - HEADER_LEN < length as usize {
            return Err(DtlsError::InvalidPacket);
        }

        Ok(RecordHeader {
            content_type,
            version,
            epoch,
            seq_hi,
            seq_lo,
            length,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.content_type as u8);
        buf.put_u16_be(self.version);
        buf.put_u16_be(self.epoch);
        buf.put_seq48(self.seq_hi, self.seq_lo);
        buf.put_u16_be(self.length);
    }
}

/// A single decoded record: its header plus the (still possibly encrypted)
/// payload bytes that followed it in the datagram.
pub struct RawRecord {
    pub header: RecordHeader,
    pub payload: Bytes,
}

/// Splits the next record off the front of `packet`, starting at `offset`.
///
/// One UDP datagram may carry multiple concatenated records, but (per spec
/// 4.1) no single record may span more than one datagram, so this never
/// reads across a packet boundary -- chained packets are a transport-layer
/// concept the caller (the session) must not construct.
pub fn decode_next(packet: &[u8], offset: usize) -> Result<(RawRecord, usize), DtlsError> {
    let header = RecordHeader::decode(packet, offset)?;
    let payload_start = offset + HEADER_LEN;
    let payload_end = payload_start + header.length as usize;
    let payload = Bytes::from(packet[payload_start..payload_end].to_vec());
    Ok((RawRecord { header, payload }, payload_end))
}

/// Capability that stands in for the host's TLS record encrypt/decrypt
/// engine (spec 1, out of scope; spec 9, "function-pointer table" ->
/// capability trait).
///
/// `decrypt` and `verify_mac` are deliberately two calls rather than one:
/// spec 4.1 mandates that, when the read side is protected, decryption
/// always runs and its failure is captured without an early return, MAC
/// verification always runs next on whatever the decryption produced, and
/// only after the MAC check completes do we propagate the decrypt failure.
/// Collapsing these into a single fallible call would make that ordering
/// invisible (and easy to regress) at the one call site that matters.
pub trait RecordProtection {
    /// Decrypts `ciphertext` addressed to `(content_type, epoch, seq)`.
    ///
    /// Must not panic or short-circuit on bad padding/tag; on failure it
    /// returns its best-effort (possibly garbage) plaintext alongside the
    /// error, so the caller can still run MAC verification over it.
    fn decrypt(
        &self,
        content_type: ContentType,
        epoch: u16,
        seq: u64,
        ciphertext: &[u8],
    ) -> (Vec<u8>, Result<(), DtlsError>);

    /// Verifies a MAC over `data` (the decrypted plaintext, valid or not).
    fn verify_mac(&self, content_type: ContentType, epoch: u16, seq: u64, data: &[u8]) -> Result<(), DtlsError>;

    /// Encrypts and MACs `plaintext` for transmission.
    fn protect(&self, content_type: ContentType, epoch: u16, seq: u64, plaintext: &[u8]) -> Vec<u8>;

    /// `true` once this epoch's keys are in effect; epoch 0 is always
    /// unprotected plaintext.
    fn is_protected(&self, epoch: u16) -> bool {
        epoch > 0
    }
}

/// No-op protection used by tests and by epoch 0 (plaintext) records.
pub struct NullRecordProtection;

impl RecordProtection for NullRecordProtection {
    fn decrypt(
        &self,
        _content_type: ContentType,
        _epoch: u16,
        _seq: u64,
        ciphertext: &[u8],
    ) -> (Vec<u8>, Result<(), DtlsError>) {
        (ciphertext.to_vec(), Ok(()))
    }

    fn verify_mac(&self, _content_type: ContentType, _epoch: u16, _seq: u64, _data: &[u8]) -> Result<(), DtlsError> {
        Ok(())
    }

    fn protect(&self, _content_type: ContentType, _epoch: u16, _seq: u64, plaintext: &[u8]) -> Vec<u8> {
        plaintext.to_vec()
    }

    fn is_protected(&self, _epoch: u16) -> bool {
        false
    }
}

/// Unprotects `record`'s payload using `protection`, following the mandated
/// decrypt-then-MAC ordering. Zero-length plaintext is accepted and the
/// caller is told to treat it as a no-op record (spec 4.1).
pub fn unprotect(
    protection: &dyn RecordProtection,
    header: &RecordHeader,
    seq: u64,
    payload: &[u8],
) -> Result<Bytes, DtlsError> {
    if !protection.is_protected(header.epoch) {
        if payload.is_empty() {
            return Ok(Bytes::new());
        }
        return Ok(Bytes::from(payload.to_vec()));
    }

    let (plaintext, decrypt_status) = protection.decrypt(header.content_type, header.epoch, seq, payload);
    let mac_status = protection.verify_mac(header.content_type, header.epoch, seq, &plaintext);

    // MAC status is consulted first; only once it has run do we propagate
    // the decrypt failure. This ordering is the whole point of the split
    // call above -- do not reorder it.
    mac_status?;
    decrypt_status?;

    if plaintext.is_empty() {
        return Ok(Bytes::new());
    }
    Ok(Bytes::from(plaintext))
}

/// Frames `plaintext` as a record of `content_type` at `(epoch, seq)`,
/// protecting it if the epoch requires it.
pub fn encode_record(
    protection: &dyn RecordProtection,
    content_type: ContentType,
    version: u16,
    epoch: u16,
    seq: u64,
    plaintext: &[u8],
) -> BytesMut {
    let (seq_hi, seq_lo) = crate::coding::u64_to_seq48(seq);
    let body = if protection.is_protected(epoch) {
        protection.protect(content_type, epoch, seq, plaintext)
    } else {
        plaintext.to_vec()
    };
    let header = RecordHeader {
        content_type,
        version,
        epoch,
        seq_hi,
        seq_lo,
        length: body.len() as u16,
    };
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    header.encode(&mut buf);
    buf.put_slice(&body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header_bytes(content_type: u8, length: u16) -> Vec<u8> {
        let mut v = vec![content_type, 0xfe, 0xfd, 0x00, 0x01];
        v.extend_from_slice(&[0, 0, 0, 0, 0, 5]); // seq = 5
        v.extend_from_slice(&length.to_be_bytes());
        v
    }

    #[test]
    fn decodes_well_formed_header() {
        let mut packet = sample_header_bytes(22, 4);
        packet.extend_from_slice(&[1, 2, 3, 4]);
        let header = RecordHeader::decode(&packet, 0).unwrap();
        assert_eq!(header.content_type, ContentType::Handshake);
        assert_eq!(header.version, DTLS_1_2);
        assert_eq!(header.epoch, 1);
        assert_eq!(header.seq_lo, 5);
        assert_eq!(header.length, 4);
    }

    #[test]
    fn rejects_short_header() {
        let packet = vec![0u8; 5];
        assert_matches::assert_matches!(RecordHeader::decode(&packet, 0), Err(DtlsError::InvalidPacket));
    }

    #[test]
    fn rejects_length_overrunning_packet() {
        let packet = sample_header_bytes(22, 100); // claims 100 bytes but none follow
        assert_matches::assert_matches!(RecordHeader::decode(&packet, 0), Err(DtlsError::InvalidPacket));
    }

    #[test]
    fn zero_length_plaintext_is_consumed_silently() {
        let result = unprotect(&NullRecordProtection, &RecordHeader {
            content_type: ContentType::ApplicationData,
            version: DTLS_1_2,
            epoch: 0,
            seq_hi: 0,
            seq_lo: 0,
            length: 0,
        }, 0, &[]).unwrap();
        assert!(result.is_empty());
    }

    struct FailingMac;
    impl RecordProtection for FailingMac {
        fn decrypt(&self, _: ContentType, _: u16, _: u64, ciphertext: &[u8]) -> (Vec<u8>, Result<(), DtlsError>) {
            (ciphertext.to_vec(), Err(DtlsError::PaddingCheckFailed))
        }
        fn verify_mac(&self, _: ContentType, _: u16, _: u64, _: &[u8]) -> Result<(), DtlsError> {
            Err(DtlsError::RecordProtectionFailed)
        }
        fn protect(&self, _: ContentType, _: u16, _: u64, plaintext: &[u8]) -> Vec<u8> {
            plaintext.to_vec()
        }
    }

    #[test]
    fn mac_failure_is_reported_even_when_decrypt_also_failed() {
        // Spec 4.1: the MAC check's own status wins once it has run.
        let header = RecordHeader {
            content_type: ContentType::ApplicationData,
            version: DTLS_1_2,
            epoch: 1,
            seq_hi: 0,
            seq_lo: 1,
            length: 4,
        };
        let err = unprotect(&FailingMac, &header, 1, &[1, 2, 3, 4]).unwrap_err();
        assert_matches::assert_matches!(err, DtlsError::RecordProtectionFailed);
    }
}
