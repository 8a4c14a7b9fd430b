//! TLS/DTLS alert wire type.
//!
//! Two bytes on the wire: level then description. Carried as DTLS content
//! type `Alert` at the record's current epoch.

use crate::error::DtlsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn encode(&self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DtlsError> {
        if bytes.len() < 2 {
            return Err(DtlsError::InvalidPacket);
        }
        Ok(Alert {
            level: AlertLevel::try_from(bytes[0])?,
            description: AlertDescription::try_from(bytes[1])?,
        })
    }

    /// `true` iff this is a warning-level close_notify, which the spec
    /// (section 7) says is converted to `CloseNotifyReceived` rather than
    /// surfaced as `AlertReceived`.
    pub fn is_close_notify(&self) -> bool {
        self.level == AlertLevel::Warning && self.description == AlertDescription::CloseNotify
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    fn try_from(v: u8) -> Result<Self, DtlsError> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Fatal),
            _ => Err(DtlsError::InvalidPacket),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    DecryptionFailed = 21,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    NoCertificate = 41,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
}

impl AlertDescription {
    fn try_from(v: u8) -> Result<Self, DtlsError> {
        use self::AlertDescription::*;
        Ok(match v {
            0 => CloseNotify,
            10 => UnexpectedMessage,
            20 => BadRecordMac,
            21 => DecryptionFailed,
            22 => RecordOverflow,
            30 => DecompressionFailure,
            40 => HandshakeFailure,
            41 => NoCertificate,
            42 => BadCertificate,
            43 => UnsupportedCertificate,
            44 => CertificateRevoked,
            45 => CertificateExpired,
            46 => CertificateUnknown,
            47 => IllegalParameter,
            48 => UnknownCa,
            49 => AccessDenied,
            50 => DecodeError,
            51 => DecryptError,
            70 => ProtocolVersion,
            71 => InsufficientSecurity,
            80 => InternalError,
            90 => UserCanceled,
            100 => NoRenegotiation,
            110 => UnsupportedExtension,
            _ => return Err(DtlsError::InvalidPacket),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_notify_round_trips() {
        let alert = Alert {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        };
        let encoded = alert.encode();
        assert_eq!(encoded, [1, 0]);
        assert_eq!(Alert::decode(&encoded).unwrap(), alert);
        assert!(alert.is_close_notify());
    }

    #[test]
    fn fatal_handshake_failure_is_not_close_notify() {
        let alert = Alert {
            level: AlertLevel::Fatal,
            description: AlertDescription::HandshakeFailure,
        };
        assert!(!alert.is_close_notify());
    }

    #[test]
    fn truncated_alert_is_invalid_packet() {
        assert_matches::assert_matches!(Alert::decode(&[1]), Err(DtlsError::InvalidPacket));
    }
}
