//! Session registry
//!
//! Sessions live in an SSRC-keyed map behind one lock. A lookup that finds
//! its session hands back a [`SessionGuard`] that still holds that lock, so
//! the session cannot be removed while the caller uses it; dropping the
//! guard releases the lock on every path. A miss releases it before
//! returning.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use super::{ClientSink, ConnectionId, Session};
use crate::constants::START_SSRC;
use crate::error::SessionError;

#[derive(Default)]
struct RegistryInner {
    sessions: BTreeMap<u32, Arc<Session>>,
}

/// All connected sessions
#[derive(Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
    connections: DashMap<ConnectionId, u32>,
}

/// A session with the registry lock held
pub struct SessionGuard<'a> {
    guard: MutexGuard<'a, RegistryInner>,
    connections: &'a DashMap<ConnectionId, u32>,
    session: Arc<Session>,
}

impl SessionGuard<'_> {
    /// Shared handle usable after the guard is released
    pub fn handle(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Remove the session from the registry, releasing the lock
    pub fn remove(mut self) -> Arc<Session> {
        self.guard.sessions.remove(&self.session.ssrc);
        self.connections.remove(&self.session.connection);
        info!(
            ssrc = self.session.ssrc,
            remaining = self.guard.sessions.len(),
            "session removed"
        );
        self.session
    }
}

impl Deref for SessionGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

/// Lowest even SSRC not in use, probing upward from [`START_SSRC`]
fn allocate_ssrc(sessions: &BTreeMap<u32, Arc<Session>>) -> Result<u32, SessionError> {
    let mut ssrc = START_SSRC;
    while sessions.contains_key(&ssrc) {
        ssrc = ssrc.checked_add(2).ok_or(SessionError::SsrcExhausted)?;
    }
    Ok(ssrc)
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an SSRC and register a new session for `connection`
    pub fn insert(
        &self,
        connection: ConnectionId,
        client: String,
        sink: Box<dyn ClientSink>,
    ) -> Result<Arc<Session>, SessionError> {
        let mut inner = self.inner.lock();
        let ssrc = allocate_ssrc(&inner.sessions)?;
        let session = Arc::new(Session::new(ssrc, connection, client, sink));
        inner.sessions.insert(ssrc, session.clone());
        self.connections.insert(connection, ssrc);
        info!(ssrc, client = %session.client, total = inner.sessions.len(), "session added");
        Ok(session)
    }

    /// Find a session by primary SSRC, keeping the registry locked
    pub fn lookup(&self, ssrc: u32) -> Option<SessionGuard<'_>> {
        let guard = self.inner.lock();
        let session = guard.sessions.get(&ssrc)?.clone();
        Some(SessionGuard {
            guard,
            connections: &self.connections,
            session,
        })
    }

    /// Find the session owned by a transport connection
    pub fn lookup_connection(&self, connection: &ConnectionId) -> Option<SessionGuard<'_>> {
        let ssrc = *self.connections.get(connection)?;
        // the SSRC may have been freed and reissued since the index read
        self.lookup(ssrc).filter(|guard| guard.session.connection == *connection)
    }

    /// Remove the session owned by `connection`. Only one caller gets it.
    pub fn take(&self, connection: &ConnectionId) -> Option<Arc<Session>> {
        self.lookup_connection(connection).map(SessionGuard::remove)
    }

    /// Session handle for a connection without holding the registry lock
    pub fn session_for(&self, connection: &ConnectionId) -> Option<Arc<Session>> {
        self.lookup_connection(connection).map(|guard| guard.handle())
    }

    /// Handles to every session, in SSRC order
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.inner.lock().sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some thread currently holds the registry lock
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sink::MemorySink;

    fn add(registry: &Registry) -> Arc<Session> {
        registry
            .insert(
                ConnectionId::new_v4(),
                "test".to_string(),
                Box::new(MemorySink::new()),
            )
            .unwrap()
    }

    #[test]
    fn test_ssrc_allocation() {
        let registry = Registry::new();
        let first = add(&registry);
        assert_eq!(first.ssrc, 1000);
        let second = add(&registry);
        assert_eq!(second.ssrc, 1002);

        registry.lookup(1000).unwrap().remove();
        let third = add(&registry);
        assert_eq!(third.ssrc, 1000);
        let fourth = add(&registry);
        assert_eq!(fourth.ssrc, 1004);
    }

    #[test]
    fn test_companion_is_not_a_session() {
        let registry = Registry::new();
        add(&registry);
        assert!(registry.lookup(1001).is_none());
    }

    #[test]
    fn test_lookup_holds_lock_only_on_match() {
        let registry = Registry::new();
        add(&registry);

        let guard = registry.lookup(1000).unwrap();
        assert!(registry.is_locked());
        assert_eq!(guard.ssrc, 1000);
        drop(guard);
        assert!(!registry.is_locked());

        assert!(registry.lookup(2000).is_none());
        assert!(!registry.is_locked());
    }

    #[test]
    fn test_remove_releases_lock() {
        let registry = Registry::new();
        let session = add(&registry);
        let removed = registry.lookup_connection(&session.connection).unwrap().remove();
        assert_eq!(removed.ssrc, session.ssrc);
        assert!(!registry.is_locked());
        assert!(registry.is_empty());
        assert!(registry.session_for(&session.connection).is_none());
    }

    #[test]
    fn test_take_once() {
        let registry = Registry::new();
        let session = add(&registry);
        let other = add(&registry);

        assert_eq!(registry.take(&session.connection).unwrap().ssrc, 1000);
        assert!(registry.take(&session.connection).is_none());
        assert!(!registry.is_locked());
        assert_eq!(registry.len(), 1);

        // a reissued SSRC does not belong to the old connection
        let reissued = add(&registry);
        assert_eq!(reissued.ssrc, 1000);
        assert!(registry.take(&session.connection).is_none());
        assert!(registry.session_for(&other.connection).is_some());
    }

    #[test]
    fn test_session_for_connection() {
        let registry = Registry::new();
        let a = add(&registry);
        let b = add(&registry);
        assert_eq!(registry.session_for(&b.connection).unwrap().ssrc, b.ssrc);
        assert_eq!(registry.session_for(&a.connection).unwrap().ssrc, a.ssrc);
        assert!(!registry.is_locked());
        assert_eq!(
            registry.sessions().iter().map(|s| s.ssrc).collect::<Vec<_>>(),
            vec![1000, 1002]
        );
    }
}
