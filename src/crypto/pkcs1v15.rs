//! Byte-exact, constant-time PKCS#1 v1.5 signature padding check (spec
//! 4.4, 8 property 9).
//!
//! This operates on an already RSA-decrypted block (`signature^e mod n`,
//! modulus-width bytes) -- the raw RSA public-key operation itself is the
//! "TLS record encrypt/decrypt primitives" class of external collaborator
//! (spec 1) and is not reimplemented here; `crypto::WebPkiCertificate`
//! covers the production signature-verification path via `ring`. This
//! module exists because the padding-check *contract* is independently
//! load-bearing (spec 4.4: "Every padding byte is checked; any deviation
//! yields `PaddingCheckFailed`") and worth testing in isolation against
//! the literal scenario in spec 8 S6.

use crate::error::DtlsError;

/// DER prefix for a SHA-256 `DigestInfo` (RFC 8017 appendix A.2.4),
/// referred to in spec 4.4 as the "19-byte `_OID_SHA256` prefix".
pub const OID_SHA256: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00, 0x04, 0x20,
];

/// Checks `block` (modulus-width bytes) against
/// `00 01 FF...FF 00 <digest_info_prefix> <hash>`.
///
/// Every byte is inspected regardless of earlier mismatches and the
/// overall result is only examined once the full block has been walked,
/// so there is no early-exit for an attacker to time (spec 4.4: "the
/// decision variable is only examined after the full compare to keep
/// timing uniform").
pub fn check_padding(block: &[u8], digest_info_prefix: &[u8], expected_hash: &[u8]) -> Result<(), DtlsError> {
    let suffix_len = digest_info_prefix.len() + expected_hash.len();
    // A block shorter than the fixed-format minimum can never match; this
    // length check happens before the constant-time body because it does
    // not depend on secret content, only on the (public) modulus size.
    if block.len() < 3 + suffix_len {
        return Err(DtlsError::PaddingCheckFailed);
    }

    let padding_len = block.len() - suffix_len;
    let mut mismatch: u8 = 0;

    mismatch |= block[0] ^ 0x00;
    mismatch |= block[1] ^ 0x01;
    for &b in &block[2..padding_len - 1] {
        mismatch |= b ^ 0xff;
    }
    mismatch |= block[padding_len - 1] ^ 0x00;

    let suffix = &block[padding_len..];
    for (a, b) in suffix[..digest_info_prefix.len()].iter().zip(digest_info_prefix) {
        mismatch |= a ^ b;
    }
    for (a, b) in suffix[digest_info_prefix.len()..].iter().zip(expected_hash) {
        mismatch |= a ^ b;
    }

    if mismatch == 0 {
        Ok(())
    } else {
        Err(DtlsError::PaddingCheckFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_block(hash: &[u8; 32]) -> Vec<u8> {
        let suffix_len = OID_SHA256.len() + hash.len();
        let modulus_len = 256; // 2048-bit key
        let padding_len = modulus_len - suffix_len;
        let mut block = Vec::with_capacity(modulus_len);
        block.push(0x00);
        block.push(0x01);
        block.extend(std::iter::repeat(0xffu8).take(padding_len - 3));
        block.push(0x00);
        block.extend_from_slice(&OID_SHA256);
        block.extend_from_slice(hash);
        block
    }

    #[test]
    fn accepts_well_formed_block() {
        let hash = [0x42u8; 32];
        let block = valid_block(&hash);
        check_padding(&block, &OID_SHA256, &hash).unwrap();
    }

    #[test]
    fn s6_block_type_0x02_is_rejected() {
        let hash = [0x11u8; 32];
        let mut block = valid_block(&hash);
        block[1] = 0x02; // PKCS#1 v1.5 *encryption* block type, not signature
        assert_matches::assert_matches!(check_padding(&block, &OID_SHA256, &hash), Err(DtlsError::PaddingCheckFailed));
    }

    #[test]
    fn property_single_padding_byte_deviation_is_rejected() {
        let hash = [0x77u8; 32];
        let block = valid_block(&hash);
        for i in 2..(block.len() - OID_SHA256.len() - hash.len() - 1) {
            let mut tampered = block.clone();
            tampered[i] ^= 0x01;
            assert_matches::assert_matches!(
                check_padding(&tampered, &OID_SHA256, &hash),
                Err(DtlsError::PaddingCheckFailed),
                "byte {} should have been detected",
                i
            );
        }
    }

    #[test]
    fn property_hash_mismatch_is_rejected() {
        let hash = [0x01u8; 32];
        let block = valid_block(&hash);
        let wrong_hash = [0x02u8; 32];
        assert_matches::assert_matches!(
            check_padding(&block, &OID_SHA256, &wrong_hash),
            Err(DtlsError::PaddingCheckFailed)
        );
    }

    #[test]
    fn truncated_block_is_rejected() {
        assert_matches::assert_matches!(check_padding(&[0x00, 0x01], &OID_SHA256, &[0u8; 32]), Err(DtlsError::PaddingCheckFailed));
    }
}
