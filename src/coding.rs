//! Byte-level helpers for the handful of odd-width big-endian fields DTLS
//! uses that `bytes::Buf`/`BufMut` don't provide directly (24-bit lengths
//! in the handshake fragment header, 48-bit sequence numbers in the record
//! header).

use bytes::{Buf, BufMut};

use crate::error::DtlsError;

pub trait BufDtlsExt: Buf {
    /// Reads a 24-bit big-endian unsigned integer.
    fn get_u24(&mut self) -> Result<u32, DtlsError> {
        if self.remaining() < 3 {
            return Err(DtlsError::InvalidPacket);
        }
        let hi = u32::from(self.get_u8());
        let mid = u32::from(self.get_u8());
        let lo = u32::from(self.get_u8());
        Ok((hi << 16) | (mid << 8) | lo)
    }

    /// Reads a 48-bit big-endian sequence number, split as the wire does:
    /// a 16-bit high half and a 32-bit low half.
    fn get_seq48(&mut self) -> Result<(u16, u32), DtlsError> {
        if self.remaining() < 6 {
            return Err(DtlsError::InvalidPacket);
        }
        let hi = self.get_u16_be();
        let lo = self.get_u32_be();
        Ok((hi, lo))
    }
}

impl<T: Buf> BufDtlsExt for T {}

pub trait BufMutDtlsExt: BufMut {
    fn put_u24(&mut self, v: u32) {
        debug_assert!(v <= 0x00ff_ffff);
        self.put_u8((v >> 16) as u8);
        self.put_u8((v >> 8) as u8);
        self.put_u8(v as u8);
    }

    fn put_seq48(&mut self, hi: u16, lo: u32) {
        self.put_u16_be(hi);
        self.put_u32_be(lo);
    }
}

impl<T: BufMut> BufMutDtlsExt for T {}

/// Combines a 48-bit sequence number's halves into a single integer for
/// strict ordering comparisons.
pub fn seq48_to_u64(hi: u16, lo: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}

pub fn u64_to_seq48(v: u64) -> (u16, u32) {
    ((v >> 32) as u16, v as u32)
}
