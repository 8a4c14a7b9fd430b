//! Host-tunable parameters (spec 6 "Configuration enumerations"), in the
//! shape of `quinn-proto::endpoint::Config`'s `Default` impl.

use crate::retransmit::RetransmitShift;

/// Parameters governing a `Session`'s or `ServerMux`'s behavior.
#[derive(Clone)]
pub struct Config {
    /// Initial retransmit timeout for a handshake flight (spec 4.3).
    pub initial_retransmit_timeout_ms: u64,
    /// Ceiling the retransmit timeout backs off to (spec 4.3).
    pub maximum_retransmit_timeout_ms: u64,
    /// Number of retransmits attempted before the handshake is abandoned.
    pub retransmit_retries: u32,
    pub retransmit_shift: RetransmitShift,
    /// Length in bytes of the HelloVerifyRequest cookie (spec 4.4).
    pub cookie_length: usize,
    /// Maximum number of concurrently active sessions a `ServerMux` will
    /// hand out of its pool (spec 4.7).
    pub session_pool_size: usize,
    /// Largest plaintext record payload this endpoint will produce; larger
    /// handshake messages are fragmented across multiple records (spec 4.4).
    pub mtu: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_retransmit_timeout_ms: 1_000,
            maximum_retransmit_timeout_ms: 60_000,
            retransmit_retries: 10,
            retransmit_shift: RetransmitShift::Doubling,
            cookie_length: crate::handshake::cookie::DEFAULT_COOKIE_LEN,
            session_pool_size: 64,
            mtu: 1_280,
        }
    }
}

impl Config {
    pub(crate) fn retransmit_config(&self) -> crate::retransmit::RetransmitConfig {
        crate::retransmit::RetransmitConfig {
            initial_timeout_ms: self.initial_retransmit_timeout_ms,
            maximum_timeout_ms: self.maximum_retransmit_timeout_ms,
            max_retries: self.retransmit_retries,
            shift: self.retransmit_shift,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.initial_retransmit_timeout_ms, 1_000);
        assert_eq!(config.maximum_retransmit_timeout_ms, 60_000);
        assert_eq!(config.retransmit_retries, 10);
        assert_eq!(config.cookie_length, 32);
    }
}
