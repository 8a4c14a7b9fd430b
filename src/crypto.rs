//! Crypto glue whose exact contract the handshake driver depends on (spec
//! 4.6): key-block expansion (TLS 1.0-1.2 PRF), CertificateVerify /
//! ServerKeyExchange signature verification, and the TLS 1.3 Finished /
//! PSK-binder HMAC construction.
//!
//! Bulk record encryption and X.509 chain validation stay out of scope
//! (spec 1); this module calls into `ring` and `webpki` only for the
//! narrow operations (HMAC, PRF, per-certificate signature verify) that
//! shape the handshake state machine's control flow.

use ring::digest;
use ring::hmac;

use crate::error::DtlsError;

pub mod pkcs1v15;

// ---------------------------------------------------------------------
// TLS 1.0-1.2 PRF and key-block expansion
// ---------------------------------------------------------------------

/// `P_hash` from RFC 5246 5: `HMAC(secret, A(i) || seed)` chained until
/// `out_len` bytes have been produced.
fn p_hash(algorithm: &'static digest::Algorithm, secret: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let key = hmac::SigningKey::new(algorithm, secret);
    let mut result = Vec::with_capacity(out_len + algorithm.output_len);
    let mut a = hmac::sign(&key, seed).as_ref().to_vec(); // A(1)
    while result.len() < out_len {
        let mut input = a.clone();
        input.extend_from_slice(seed);
        result.extend_from_slice(hmac::sign(&key, &input).as_ref());
        a = hmac::sign(&key, &a).as_ref().to_vec();
    }
    result.truncate(out_len);
    result
}

/// The TLS 1.0-1.2 PRF: `PRF(secret, label, seed) = P_hash(secret, label || seed)`.
/// TLS 1.2 fixes the hash to SHA-256 regardless of cipher suite.
pub fn prf(secret: &[u8], label: &[u8], seed: &[u8], out_len: usize) -> Vec<u8> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label);
    full_seed.extend_from_slice(seed);
    p_hash(&digest::SHA256, secret, &full_seed, out_len)
}

/// `master_secret = PRF(pre_master_secret, "master secret", client_random || server_random)`.
/// Randoms are client-first here (contrast key expansion below).
pub fn derive_master_secret(pre_master_secret: &[u8], client_random: &[u8; 32], server_random: &[u8; 32]) -> Vec<u8> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf(pre_master_secret, b"master secret", &seed, 48)
}

/// The sizes carved out of the key block, taken from the selected cipher
/// suite. Any may be zero (e.g. an AEAD suite has no separate MAC key).
#[derive(Debug, Clone, Copy)]
pub struct KeySizes {
    pub mac_key_len: usize,
    pub enc_key_len: usize,
    pub iv_len: usize,
}

/// Session keys expanded from the master secret, partitioned in wire order:
/// `client_MAC || server_MAC || client_key || server_key || client_IV || server_IV`
/// (spec 4.4, 8 property 8).
pub struct EpochKeys {
    pub client_mac: Vec<u8>,
    pub server_mac: Vec<u8>,
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_iv: Vec<u8>,
    pub server_iv: Vec<u8>,
}

impl Drop for EpochKeys {
    fn drop(&mut self) {
        for buf in [
            &mut self.client_mac,
            &mut self.server_mac,
            &mut self.client_key,
            &mut self.server_key,
            &mut self.client_iv,
            &mut self.server_iv,
        ] {
            for b in buf.iter_mut() {
                *b = 0;
            }
        }
    }
}

/// Expands `master_secret` into `EpochKeys`.
///
/// The randoms are concatenated **server-first** for key expansion even
/// though the master secret above uses them client-first -- this is a wire
/// contract (spec 4.4) and must not be "fixed" to match the master-secret
/// ordering.
pub fn expand_keys(
    master_secret: &[u8],
    server_random: &[u8; 32],
    client_random: &[u8; 32],
    sizes: &KeySizes,
) -> EpochKeys {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let total = 2 * (sizes.mac_key_len + sizes.enc_key_len + sizes.iv_len);
    let block = prf(master_secret, b"key expansion", &seed, total);

    let mut offset = 0;
    let mut take = |len: usize| -> Vec<u8> {
        let chunk = block[offset..offset + len].to_vec();
        offset += len;
        chunk
    };

    EpochKeys {
        client_mac: take(sizes.mac_key_len),
        server_mac: take(sizes.mac_key_len),
        client_key: take(sizes.enc_key_len),
        server_key: take(sizes.enc_key_len),
        client_iv: take(sizes.iv_len),
        server_iv: take(sizes.iv_len),
    }
}

// ---------------------------------------------------------------------
// Transcript hashing
// ---------------------------------------------------------------------

/// Running record of every handshake message sent/received, in order.
///
/// Kept as raw bytes rather than an incremental hash-context: this crate's
/// handshakes are bounded in size (spec 6, MTU-constrained flights), so
/// buffering is cheap, and it lets "clone-before-finalize" (spec 4.6,
/// "when the Finished hash must be consulted without terminating the
/// running transcript hash") fall out of a plain `Vec` clone instead of a
/// hand-rolled hash-context clone.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Vec<u8>);

impl Transcript {
    pub fn new() -> Self {
        Transcript(Vec::new())
    }

    pub fn push(&mut self, message: &[u8]) {
        self.0.extend_from_slice(message);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// MD5||SHA-1 concatenation used by TLS 1.0/1.1 RSA CertificateVerify.
    pub fn hash_md5_sha1(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(36);
        out.extend_from_slice(digest::digest(&digest::MD5, &self.0).as_ref());
        out.extend_from_slice(digest::digest(&digest::SHA1, &self.0).as_ref());
        out
    }

    pub fn hash(&self, algorithm: &'static digest::Algorithm) -> Vec<u8> {
        digest::digest(algorithm, &self.0).as_ref().to_vec()
    }
}

/// Builds the TLS 1.3 CertificateVerify signing/verification content (RFC
/// 8446 4.4.3): 64 * 0x20, a context string, a zero separator, then the
/// transcript hash.
pub fn tls13_certificate_verify_content(transcript_hash: &[u8], is_server: bool) -> Vec<u8> {
    let context = if is_server {
        "TLS 1.3, server CertificateVerify"
    } else {
        "TLS 1.3, client CertificateVerify"
    };
    let mut out = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    out.extend(std::iter::repeat(0x20u8).take(64));
    out.extend_from_slice(context.as_bytes());
    out.push(0x00);
    out.extend_from_slice(transcript_hash);
    out
}

// ---------------------------------------------------------------------
// Signature verification (CertificateVerify / ServerKeyExchange)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKeyType {
    Rsa,
    Ecdsa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// TLS 1.0/1.1 implicit RSA (MD5||SHA1) or TLS 1.2 {SHA256, RSA}.
    RsaPkcs1Sha1,
    RsaPkcs1Sha256,
    /// TLS 1.0/1.1 implicit ECDSA (SHA1) or TLS 1.2 {SHA256, ECDSA}.
    EcdsaSha1,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    /// Rejected unconditionally for TLS 1.3 (spec 4.4).
    RsaPss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

/// Validates that `scheme` is an acceptable CertificateVerify signature
/// algorithm for `version`/`key_type` (spec 4.4, "Signature-algorithm
/// enumeration accepted by CertificateVerify").
pub fn validate_signature_scheme(
    version: ProtocolVersion,
    key_type: CertKeyType,
    scheme: SignatureScheme,
) -> Result<(), DtlsError> {
    use CertKeyType::*;
    use ProtocolVersion::*;
    use SignatureScheme::*;

    let ok = match version {
        Tls13 => matches!(scheme, EcdsaSha256 | EcdsaSha384 | EcdsaSha512),
        Tls12 => match key_type {
            Rsa => scheme == RsaPkcs1Sha256,
            Ecdsa => scheme == EcdsaSha256,
        },
        Tls10 | Tls11 => match key_type {
            Rsa => scheme == RsaPkcs1Sha1,
            Ecdsa => scheme == EcdsaSha1,
        },
    };

    if ok {
        Ok(())
    } else if version == Tls13 && scheme == RsaPss {
        Err(DtlsError::UnsupportedCertSignAlg)
    } else {
        Err(DtlsError::UnsupportedSignatureAlgorithm)
    }
}

fn webpki_algorithm(scheme: SignatureScheme) -> Result<&'static webpki::SignatureAlgorithm, DtlsError> {
    use SignatureScheme::*;
    Ok(match scheme {
        RsaPkcs1Sha256 => &webpki::RSA_PKCS1_2048_8192_SHA256,
        EcdsaSha256 => &webpki::ECDSA_P256_SHA256,
        EcdsaSha384 => &webpki::ECDSA_P384_SHA384,
        // MD5||SHA1 and bare-SHA1 legacy schemes and RSA-PSS have no
        // `webpki` constant wired up; DTLS 1.0/1.1 support is rare enough
        // in this crate's deployment target (spec non-goal: full legacy
        // chain support) that they are rejected here rather than carrying
        // extra verification plumbing for them.
        RsaPkcs1Sha1 | EcdsaSha1 | EcdsaSha512 | RsaPss => return Err(DtlsError::UnsupportedSignatureAlgorithm),
    })
}

/// Stands in for the host's already-parsed peer certificate / public key
/// (spec 1, X.509 parsing out of scope; spec 4.10 expansion).
pub trait PeerCertificate {
    fn key_type(&self) -> CertKeyType;
    fn verify_signature(&self, scheme: SignatureScheme, message: &[u8], signature: &[u8]) -> Result<(), DtlsError>;
}

/// `PeerCertificate` backed by a `webpki`-parsed end-entity certificate.
/// Grounded on `quinn-proto`'s existing dependency on `webpki` for its TLS
/// stack (`rustls`'s certificate verifier), reused here for the narrower
/// job of "verify one signature against one already-trusted public key".
pub struct WebPkiCertificate<'a> {
    inner: webpki::EndEntityCert<'a>,
    key_type: CertKeyType,
}

impl<'a> WebPkiCertificate<'a> {
    pub fn new(der: &'a [u8], key_type: CertKeyType) -> Result<Self, DtlsError> {
        let inner = webpki::EndEntityCert::from(untrusted::Input::from(der))?;
        Ok(WebPkiCertificate { inner, key_type })
    }
}

impl<'a> PeerCertificate for WebPkiCertificate<'a> {
    fn key_type(&self) -> CertKeyType {
        self.key_type
    }

    fn verify_signature(&self, scheme: SignatureScheme, message: &[u8], signature: &[u8]) -> Result<(), DtlsError> {
        let algorithm = webpki_algorithm(scheme)?;
        self.inner
            .verify_signature(algorithm, untrusted::Input::from(message), untrusted::Input::from(signature))
            .map_err(|_| match scheme {
                SignatureScheme::RsaPkcs1Sha256 | SignatureScheme::RsaPkcs1Sha1 => DtlsError::PaddingCheckFailed,
                _ => DtlsError::SignatureVerificationError,
            })
    }
}

/// Verifies a CertificateVerify or ServerKeyExchange signature end to end:
/// builds the correct transcript hash for `version`, validates the
/// declared algorithm is acceptable, and calls into `cert`.
///
/// The final comparison is delegated entirely to `cert`/`ring`; this
/// function never compares bytes itself, so there is no decision point
/// here for a timing side-channel to hang off of (spec 4.4, "the decision
/// variable is only examined after the full compare").
pub fn verify_transcript_signature(
    cert: &dyn PeerCertificate,
    version: ProtocolVersion,
    scheme: SignatureScheme,
    transcript: &Transcript,
    is_server: bool,
    signature: &[u8],
) -> Result<(), DtlsError> {
    validate_signature_scheme(version, cert.key_type(), scheme)?;

    match version {
        ProtocolVersion::Tls10 | ProtocolVersion::Tls11 => {
            let hash = transcript.hash_md5_sha1();
            cert.verify_signature(scheme, &hash, signature)
        }
        ProtocolVersion::Tls12 => {
            let hash = transcript.hash(&digest::SHA256);
            cert.verify_signature(scheme, &hash, signature)
        }
        ProtocolVersion::Tls13 => {
            let hash = transcript.hash(&digest::SHA256);
            let content = tls13_certificate_verify_content(&hash, is_server);
            cert.verify_signature(scheme, &content, signature)
        }
    }
}

// ---------------------------------------------------------------------
// TLS 1.3 Finished hash / PSK binder (spec 4.6, 4.11)
// ---------------------------------------------------------------------

/// RFC 5869 HKDF-Extract. `ring` 0.13 does not expose an `hkdf` module, so
/// this builds it directly from `hmac`, same as the PRF above.
pub fn hkdf_extract(algorithm: &'static digest::Algorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    let key = hmac::SigningKey::new(algorithm, salt);
    hmac::sign(&key, ikm).as_ref().to_vec()
}

/// RFC 8446 7.1 `HKDF-Expand-Label`.
pub fn hkdf_expand_label(algorithm: &'static digest::Algorithm, secret: &[u8], label: &[u8], context: &[u8], out_len: usize) -> Vec<u8> {
    let mut hkdf_label = Vec::new();
    hkdf_label.extend_from_slice(&(out_len as u16).to_be_bytes());
    let mut full_label = Vec::with_capacity(6 + label.len());
    full_label.extend_from_slice(b"tls13 ");
    full_label.extend_from_slice(label);
    hkdf_label.push(full_label.len() as u8);
    hkdf_label.extend_from_slice(&full_label);
    hkdf_label.push(context.len() as u8);
    hkdf_label.extend_from_slice(context);

    hkdf_expand(algorithm, secret, &hkdf_label, out_len)
}

fn hkdf_expand(algorithm: &'static digest::Algorithm, prk: &[u8], info: &[u8], out_len: usize) -> Vec<u8> {
    let key = hmac::SigningKey::new(algorithm, prk);
    let mut out = Vec::with_capacity(out_len + algorithm.output_len);
    let mut t = Vec::new();
    let mut counter = 1u8;
    while out.len() < out_len {
        let mut input = t.clone();
        input.extend_from_slice(info);
        input.push(counter);
        t = hmac::sign(&key, &input).as_ref().to_vec();
        out.extend_from_slice(&t);
        counter += 1;
    }
    out.truncate(out_len);
    out
}

/// Derives the `binder_key` for an external PSK: `Derive-Secret(Early
/// Secret, "ext binder", "")` degenerates (no resumption context) to an
/// HKDF-Expand-Label over the all-zero early secret's extract.
pub fn derive_psk_binder_key(algorithm: &'static digest::Algorithm, psk: &[u8]) -> Vec<u8> {
    let early_secret = hkdf_extract(algorithm, &vec![0u8; algorithm.output_len], psk);
    let empty_hash = digest::digest(algorithm, &[]);
    hkdf_expand_label(algorithm, &early_secret, b"ext binder", empty_hash.as_ref(), algorithm.output_len)
}

/// PSK binder = `HMAC(binder_key, transcript_hash_of_truncated_ClientHello)`
/// (spec 4.6, 4.11).
pub fn psk_binder(algorithm: &'static digest::Algorithm, binder_key: &[u8], truncated_client_hello_hash: &[u8]) -> Vec<u8> {
    let key = hmac::SigningKey::new(algorithm, binder_key);
    hmac::sign(&key, truncated_client_hello_hash).as_ref().to_vec()
}
