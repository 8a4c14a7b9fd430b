use failure::Fail;

use crate::alert::{Alert, AlertDescription, AlertLevel};

/// Every error kind the DTLS core can produce.
///
/// Kinds map directly onto spec section 7 ("Error Handling Design"); the
/// `Continue` sentinel from that section is intentionally *not* a variant
/// here -- `Session::handle_datagram` treats `InvalidEpoch` and
/// `OutOfOrderMessage` as "skip this record and keep draining the
/// datagram" rather than propagating them.
#[derive(Debug, Fail)]
pub enum DtlsError {
    // -- parse errors --
    #[fail(display = "malformed DTLS record")]
    InvalidPacket,
    #[fail(display = "handshake message length is inconsistent with its header")]
    IncorrectMessageLength,
    #[fail(display = "unknown protocol version {:#06x}", _0)]
    UnknownTlsVersion(u16),
    #[fail(display = "unsupported protocol version {:#06x}", _0)]
    UnsupportedTlsVersion(u16),
    #[fail(display = "unknown certificate signature algorithm")]
    UnknownCertSigAlgorithm,
    #[fail(display = "unsupported ECC curve")]
    UnsupportedEccCurve,
    #[fail(display = "unsupported ECC point format")]
    UnsupportedEccFormat,
    #[fail(display = "unsupported cipher")]
    UnsupportedPublicCipher,
    #[fail(display = "unsupported signature algorithm")]
    UnsupportedSignatureAlgorithm,
    #[fail(display = "unsupported certificate signature algorithm")]
    UnsupportedCertSignAlg,

    // -- replay / order errors --
    #[fail(display = "handshake message sequence already seen")]
    RepeatMessageReceived,
    #[fail(display = "record epoch does not match session epoch")]
    InvalidEpoch,
    #[fail(display = "record received out of order")]
    OutOfOrderMessage,
    #[fail(display = "peer changed protocol version mid-handshake")]
    ProtocolVersionChanged,

    // -- crypto errors --
    #[fail(display = "no certificate available")]
    CertificateNotFound,
    #[fail(display = "certificate verification failed")]
    CertificateVerifyFailure,
    #[fail(display = "certificate signature check failed")]
    CertificateSigCheckFailed,
    #[fail(display = "PKCS#1 padding check failed")]
    PaddingCheckFailed,
    #[fail(display = "signature verification error")]
    SignatureVerificationError,
    #[fail(display = "required crypto routine is not installed")]
    MissingCryptoRoutine,
    #[fail(display = "failed to allocate an outbound packet")]
    AllocatePacketFailed,
    #[fail(display = "record decryption or MAC verification failed")]
    RecordProtectionFailed,

    // -- resource errors --
    #[fail(display = "caller-provided buffer is too small")]
    PacketBufferTooSmall,
    #[fail(display = "no free entries in pool")]
    NoMoreEntries,
    #[fail(display = "no packet available before timeout")]
    NoPacket,
    #[fail(display = "a reader is already suspended on this session")]
    AlreadySuspended,
    #[fail(display = "already enabled")]
    AlreadyEnabled,
    #[fail(display = "transport driver error")]
    DriverError,

    // -- session errors --
    #[fail(display = "session is not initialized")]
    SessionUninitialized,
    #[fail(display = "session has not received any datagram yet")]
    NotConnected,
    #[fail(display = "destination does not match the session's bound remote address")]
    SendAddressMismatch,
    #[fail(display = "peer sent alert {:?}/{:?}", _0, _1)]
    AlertReceived(AlertLevel, AlertDescription),
    #[fail(display = "peer sent close_notify")]
    CloseNotifyReceived,

    #[fail(display = "handshake failed and the session must be deleted or reset")]
    HandshakeFailed,
}

impl DtlsError {
    /// Maps an internal failure to the alert this endpoint should send the
    /// peer before surfacing the error to the caller (spec section 7).
    ///
    /// Returns `None` for error kinds with no defined TLS alert (purely
    /// local/resource conditions) or for errors that were themselves caused
    /// by an inbound alert.
    pub fn as_alert(&self) -> Option<Alert> {
        use self::DtlsError::*;
        let description = match *self {
            InvalidPacket | IncorrectMessageLength => AlertDescription::DecodeError,
            UnknownTlsVersion(_) | UnsupportedTlsVersion(_) => AlertDescription::ProtocolVersion,
            UnknownCertSigAlgorithm | UnsupportedCertSignAlg | UnsupportedSignatureAlgorithm => {
                AlertDescription::UnsupportedCertificate
            }
            UnsupportedEccCurve | UnsupportedEccFormat | UnsupportedPublicCipher => {
                AlertDescription::HandshakeFailure
            }
            CertificateNotFound => AlertDescription::CertificateUnknown,
            CertificateVerifyFailure | CertificateSigCheckFailed => {
                AlertDescription::BadCertificate
            }
            PaddingCheckFailed | SignatureVerificationError => AlertDescription::DecryptError,
            RecordProtectionFailed => AlertDescription::BadRecordMac,
            ProtocolVersionChanged => AlertDescription::ProtocolVersion,
            HandshakeFailed => AlertDescription::HandshakeFailure,
            // Resource errors, replay/continue-class conditions, and errors
            // triggered by an inbound alert never produce an outbound alert.
            _ => return None,
        };
        Some(Alert {
            level: AlertLevel::Fatal,
            description,
        })
    }
}

impl From<webpki::Error> for DtlsError {
    fn from(_: webpki::Error) -> Self {
        DtlsError::CertificateVerifyFailure
    }
}

impl From<ring::error::Unspecified> for DtlsError {
    fn from(_: ring::error::Unspecified) -> Self {
        DtlsError::SignatureVerificationError
    }
}
