//! Single-UDP-socket server multiplexer over a bounded session pool (spec
//! 4.7), grounded on `quinn-proto::Endpoint`'s `connection_remotes`
//! `FnvHashMap` + `Slab<Connection>` demux shape.

use std::net::SocketAddr;

use fnv::FnvHashMap;
use slab::Slab;
use slog::Logger;

use crate::config::Config;
use crate::error::DtlsError;
use crate::handshake::cookie::CookieSecret;
use crate::registry::{self, REGISTRY};
use crate::session::Session;
use crate::Event;

type NotifyFn = Box<dyn FnMut(SocketAddr) + Send>;
type ErrorNotifyFn = Box<dyn FnMut(SocketAddr, &DtlsError) + Send>;

/// A process-wide-registered, single-socket server endpoint. Holds a
/// bounded pool of `Session`s in a `Slab`, demultiplexing inbound datagrams
/// by remote address (spec 3: "dispatch to a session slot in a bounded
/// pool"). Exposes the four notifications spec 4.7/6 name:
/// `connect_notify` (new slot allocated), `receive_notify` (application
/// data demuxed to a session), `disconnect_notify` (slot torn down),
/// `error_notify` (a session's record path returned a fatal error).
pub struct ServerMux {
    id: u64,
    log: Logger,
    config: Config,
    cookie_secret: CookieSecret,
    sessions: Slab<Session>,
    by_remote: FnvHashMap<SocketAddr, usize>,
    connect_notify: Option<NotifyFn>,
    receive_notify: Option<NotifyFn>,
    disconnect_notify: Option<NotifyFn>,
    error_notify: Option<ErrorNotifyFn>,
}

impl ServerMux {
    pub fn new(log: Logger, config: Config) -> Result<Self, DtlsError> {
        let id = registry::next_id();
        REGISTRY.lock().unwrap().register_server(id);
        let mut rng = rand::rngs::OsRng::new().map_err(|_| DtlsError::MissingCryptoRoutine)?;
        let cookie_secret = CookieSecret::new(&mut rng, config.cookie_length)?;
        Ok(ServerMux {
            id,
            log: log.new(o!("server" => id)),
            cookie_secret,
            sessions: Slab::with_capacity(config.session_pool_size),
            by_remote: FnvHashMap::default(),
            config,
            connect_notify: None,
            receive_notify: None,
            disconnect_notify: None,
            error_notify: None,
        })
    }

    pub fn set_connect_notify(&mut self, f: impl FnMut(SocketAddr) + Send + 'static) {
        self.connect_notify = Some(Box::new(f));
    }

    pub fn set_receive_notify(&mut self, f: impl FnMut(SocketAddr) + Send + 'static) {
        self.receive_notify = Some(Box::new(f));
    }

    pub fn set_disconnect_notify(&mut self, f: impl FnMut(SocketAddr) + Send + 'static) {
        self.disconnect_notify = Some(Box::new(f));
    }

    pub fn set_error_notify(&mut self, f: impl FnMut(SocketAddr, &DtlsError) + Send + 'static) {
        self.error_notify = Some(Box::new(f));
    }

    /// Demultiplexes one inbound datagram to an existing session, or -- if
    /// the pool has room -- stands a fresh one up (spec 4.7). `connect_notify`
    /// fires right here, the moment a new slot is allocated for a previously
    /// unseen peer, matching `nxe_secure_dtls_server_create`'s "new
    /// connection" callback placement rather than waiting for the handshake
    /// to finish.
    pub fn handle_datagram(&mut self, remote: SocketAddr, data: &[u8]) -> Result<(), DtlsError> {
        let slot = match self.by_remote.get(&remote) {
            Some(&slot) => slot,
            None => {
                if self.sessions.len() >= self.config.session_pool_size {
                    debug!(self.log, "dropping datagram, session pool exhausted"; "remote" => %remote);
                    return Err(DtlsError::NoMoreEntries);
                }
                let mut session = Session::new(self.log.clone(), self.config.clone());
                session.start_server(remote);
                let slot = self.sessions.insert(session);
                self.by_remote.insert(remote, slot);
                if let Some(notify) = self.connect_notify.as_mut() {
                    notify(remote);
                }
                slot
            }
        };

        let session = &mut self.sessions[slot];
        let result = session.handle_datagram(remote, data, Some(&self.cookie_secret));
        match result {
            Ok(()) => {
                while let Some(event) = session.poll() {
                    if let Event::Readable = event {
                        if let Some(notify) = self.receive_notify.as_mut() {
                            notify(remote);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                if let Some(notify) = self.error_notify.as_mut() {
                    notify(remote, &e);
                }
                self.disconnect(remote);
                Err(e)
            }
        }
    }

    /// Removes a session from the pool (peer disconnect or fatal error).
    pub fn disconnect(&mut self, remote: SocketAddr) {
        if let Some(slot) = self.by_remote.remove(&remote) {
            self.sessions.remove(slot);
            if let Some(notify) = self.disconnect_notify.as_mut() {
                notify(remote);
            }
        }
    }

    pub fn session_mut(&mut self, remote: SocketAddr) -> Option<&mut Session> {
        let slot = *self.by_remote.get(&remote)?;
        Some(&mut self.sessions[slot])
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tears the server down: drops every session and unregisters (spec
    /// 4.12 `ServerMux::stop`).
    pub fn stop(mut self) {
        self.sessions.clear();
        self.by_remote.clear();
    }
}

impl Drop for ServerMux {
    fn drop(&mut self) {
        REGISTRY.lock().unwrap().unregister_server(self.id);
    }
}
