//! A standalone, sans-I/O DTLS 1.0/1.2 endpoint.
//!
//! This crate performs no socket I/O, thread scheduling, or sleeping of its
//! own. Callers push received datagrams and timer ticks in through
//! `Session`/`ServerMux`, and drain a queue of `Io` actions and `Event`s
//! out, the way `quinn-proto::Endpoint` drives a QUIC connection.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate slog;

pub mod alert;
pub mod coding;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod record;
pub mod registry;
pub mod replay;
pub mod retransmit;
pub mod server_mux;
pub mod session;

use std::net::SocketAddr;

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::error::DtlsError;

pub use crate::config::Config;
pub use crate::session::Session;

/// I/O operations the caller must immediately execute (spec 6).
#[derive(Debug)]
pub enum Io {
    Transmit { destination: SocketAddr, packet: Box<[u8]> },
    TimerStart { session: u64, timeout_ms: u64 },
    TimerStop { session: u64 },
}

/// Events of interest to the application (spec 6).
#[derive(Debug)]
pub enum Event {
    Connected,
    Readable,
    ConnectionLost { reason: DtlsError },
    AlertReceived { level: AlertLevel, description: AlertDescription },
}

impl Event {
    pub(crate) fn from_alert(alert: Alert) -> Self {
        Event::AlertReceived {
            level: alert.level,
            description: alert.description,
        }
    }
}
