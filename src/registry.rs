//! Process-wide session/server bookkeeping behind a single mutex (spec 4.8,
//! 5, 9). Grounded on `quinn-proto::endpoint::ListenKeys`'s
//! lazy-static-backed global state, generalized to a process-wide registry
//! since this crate's registry is explicitly process-wide rather than
//! per-endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use fnv::FnvHashSet;
use lazy_static::lazy_static;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-wide unique id for a new `Session` or `ServerMux`.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
pub struct Registry {
    sessions: FnvHashSet<u64>,
    servers: FnvHashSet<u64>,
}

impl Registry {
    /// Idempotent: registering an id already present is a no-op, matching
    /// the embedded source's "already enabled" tolerance for repeated
    /// lifecycle calls.
    pub fn register_session(&mut self, id: u64) {
        self.sessions.insert(id);
    }

    pub fn unregister_session(&mut self, id: u64) {
        self.sessions.remove(&id);
    }

    pub fn register_server(&mut self, id: u64) {
        self.servers.insert(id);
    }

    pub fn unregister_server(&mut self, id: u64) {
        self.servers.remove(&id);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}

lazy_static! {
    pub static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_is_idempotent() {
        let mut registry = Registry::default();
        registry.register_session(1);
        registry.register_session(1);
        assert_eq!(registry.session_count(), 1);
        registry.unregister_session(1);
        registry.unregister_session(1);
        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn sessions_and_servers_are_tracked_independently() {
        let mut registry = Registry::default();
        registry.register_session(1);
        registry.register_server(1);
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.server_count(), 1);
        registry.unregister_session(1);
        assert_eq!(registry.server_count(), 1);
    }

    #[test]
    fn next_id_is_monotonic_and_unique() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }
}
