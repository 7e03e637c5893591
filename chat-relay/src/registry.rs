use std::{collections::HashMap, net::SocketAddr};

use thiserror::Error;

use crate::transport::{Connection, ConnectionClosed, ConnectionId};

/// Name reported for a session that has not registered one.
pub const UNKNOWN_GUEST: &str = "unknown-guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingState {
    Unnamed,
    Named,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a session for {0} is already registered")]
    DuplicateSession(SocketAddr),
    #[error("session {peer} is already named {name:?}")]
    AlreadyNamed { peer: SocketAddr, name: String },
    #[error("no session for {0}")]
    UnknownSession(SocketAddr),
}

/// Server-side record of one accepted connection.
#[derive(Debug)]
pub struct Session {
    connection: Connection,
    name: Option<String>,
}

impl Session {
    fn new(connection: Connection) -> Self {
        Self {
            connection,
            name: None,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.connection.peer()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn naming_state(&self) -> NamingState {
        match self.name {
            Some(_) => NamingState::Named,
            None => NamingState::Unnamed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn send(&self, text: &str) -> Result<(), ConnectionClosed> {
        self.connection.send(text)
    }
}

/// Live sessions keyed by remote address, iterated in registration order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SocketAddr, Session>,
    order: Vec<SocketAddr>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a freshly accepted connection as an unnamed session.
    ///
    /// On error the connection is handed back untouched so the caller
    /// decides how to close it.
    pub fn register(
        &mut self,
        connection: Connection,
    ) -> Result<&Session, (RegistryError, Connection)> {
        let peer = connection.peer();
        if self.sessions.contains_key(&peer) {
            return Err((RegistryError::DuplicateSession(peer), connection));
        }

        self.order.push(peer);
        Ok(self.sessions.entry(peer).or_insert(Session::new(connection)))
    }

    /// Names an unnamed session. The first name sticks; later calls fail
    /// with [`RegistryError::AlreadyNamed`].
    pub fn assign_name(&mut self, peer: SocketAddr, name: &str) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&peer)
            .ok_or(RegistryError::UnknownSession(peer))?;

        if let Some(existing) = &session.name {
            return Err(RegistryError::AlreadyNamed {
                peer,
                name: existing.clone(),
            });
        }

        session.name = Some(name.to_string());
        Ok(())
    }

    /// The session's display name, or [`UNKNOWN_GUEST`].
    pub fn lookup_name(&self, peer: SocketAddr) -> &str {
        self.sessions
            .get(&peer)
            .and_then(Session::display_name)
            .unwrap_or(UNKNOWN_GUEST)
    }

    pub fn get(&self, peer: SocketAddr) -> Option<&Session> {
        self.sessions.get(&peer)
    }

    pub fn remove(&mut self, peer: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&peer)?;
        self.order.retain(|addr| *addr != peer);
        Some(session)
    }

    /// Snapshot of the tracked addresses. Sessions removed while the
    /// snapshot is walked simply stop resolving through [`Self::get`].
    pub fn all_sessions(&self) -> Vec<SocketAddr> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn names_joined(&self, separator: &str, empty_text: &str) -> String {
        let names: Vec<&str> = self
            .order
            .iter()
            .filter_map(|peer| self.sessions.get(peer))
            .filter_map(Session::display_name)
            .collect();

        if names.is_empty() {
            empty_text.to_string()
        } else {
            names.join(separator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn connection(port: u16) -> Connection {
        let (connection, _inbox) = Connection::pair(u64::from(port), addr(port));
        connection
    }

    #[test]
    fn register_rejects_a_tracked_address() {
        let mut registry = SessionRegistry::new();
        registry.register(connection(4000)).expect("first registration");

        let (err, returned) = registry
            .register(connection(4000))
            .expect_err("duplicate address");
        assert_eq!(err, RegistryError::DuplicateSession(addr(4000)));
        assert_eq!(returned.peer(), addr(4000));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn new_sessions_start_unnamed() {
        let mut registry = SessionRegistry::new();
        let session = registry.register(connection(4000)).expect("register");

        assert_eq!(session.naming_state(), NamingState::Unnamed);
        assert_eq!(session.display_name(), None);
        assert_eq!(registry.lookup_name(addr(4000)), UNKNOWN_GUEST);
    }

    #[test]
    fn first_name_wins() {
        let mut registry = SessionRegistry::new();
        registry.register(connection(4000)).expect("register");

        registry.assign_name(addr(4000), "Alice").expect("name");
        let err = registry
            .assign_name(addr(4000), "Mallory")
            .expect_err("second name");

        assert_eq!(
            err,
            RegistryError::AlreadyNamed {
                peer: addr(4000),
                name: "Alice".into()
            }
        );
        assert_eq!(registry.lookup_name(addr(4000)), "Alice");
        assert_eq!(
            registry.get(addr(4000)).map(Session::naming_state),
            Some(NamingState::Named)
        );
    }

    #[test]
    fn naming_an_unknown_session_fails() {
        let mut registry = SessionRegistry::new();
        assert_eq!(
            registry.assign_name(addr(4000), "Alice"),
            Err(RegistryError::UnknownSession(addr(4000)))
        );
    }

    #[test]
    fn remove_is_idempotent() {
        let mut registry = SessionRegistry::new();
        registry.register(connection(4000)).expect("register");

        assert!(registry.remove(addr(4000)).is_some());
        assert!(registry.remove(addr(4000)).is_none());
        assert!(registry.is_empty());
        assert!(registry.all_sessions().is_empty());
    }

    #[test]
    fn reconnecting_address_starts_over_unnamed() {
        let mut registry = SessionRegistry::new();
        registry.register(connection(4000)).expect("register");
        registry.assign_name(addr(4000), "Alice").expect("name");
        registry.remove(addr(4000));

        let session = registry.register(connection(4000)).expect("re-register");
        assert_eq!(session.naming_state(), NamingState::Unnamed);
    }

    #[test]
    fn names_joined_skips_unnamed_sessions_and_keeps_order() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.names_joined(", ", "none"), "none");

        for port in [4002, 4000, 4001] {
            registry.register(connection(port)).expect("register");
        }
        assert_eq!(registry.names_joined(", ", "none"), "none");

        registry.assign_name(addr(4002), "Carol").expect("name");
        registry.assign_name(addr(4001), "Bob").expect("name");
        assert_eq!(registry.names_joined(", ", "none"), "Carol, Bob");

        registry.assign_name(addr(4000), "Alice").expect("name");
        let joined = registry.names_joined("|", "none");
        assert_eq!(joined, "Carol|Alice|Bob");
        assert_eq!(joined.matches('|').count(), 2);
    }

    #[test]
    fn snapshot_survives_removal() {
        let mut registry = SessionRegistry::new();
        for port in [4000, 4001, 4002] {
            registry.register(connection(port)).expect("register");
        }

        let snapshot = registry.all_sessions();
        registry.remove(addr(4001));

        let live: Vec<SocketAddr> = snapshot
            .into_iter()
            .filter(|peer| registry.get(*peer).is_some())
            .collect();
        assert_eq!(live, vec![addr(4000), addr(4002)]);
    }
}
