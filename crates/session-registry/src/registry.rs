//! Authoritative store of live sessions

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use relay_protocol::{ConnectionId, Role, SessionId};

use crate::AdmitError;

/// Fixed number of participants per session
pub const SESSION_CAPACITY: usize = 2;

/// Default hard lifetime of a session, measured from creation
pub const DEFAULT_EXPIRY_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hard lifetime of a session. Strictly time-since-creation; activity
    /// never extends it.
    pub expiry_horizon: Duration,
    /// Participant limit per session
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            expiry_horizon: DEFAULT_EXPIRY_HORIZON,
            capacity: SESSION_CAPACITY,
        }
    }
}

/// One live session. Never leaves the registry.
#[derive(Debug)]
struct Session {
    participants: Vec<ConnectionId>,
    created_at: Instant,
    last_activity_at: Instant,
}

impl Session {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            participants: Vec::with_capacity(SESSION_CAPACITY),
            created_at: now,
            last_activity_at: now,
        }
    }

    fn is_expired(&self, horizon: Duration) -> bool {
        self.created_at.elapsed() >= horizon
    }
}

/// Process-wide session store.
///
/// All mutations on one session happen under that session's map entry
/// guard, so admission's size-check-plus-insert is a single atomic step
/// even with connections racing to join. State is in-memory only and is
/// rebuilt empty on restart.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    /// Insert a fresh session with zero participants and return its token.
    pub fn create(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            match self.sessions.entry(id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Session::new());
                    debug!(session = %id, "session created");
                    return id;
                }
                // 256-bit collision with a live session; draw again
                Entry::Occupied(_) => continue,
            }
        }
    }

    /// Add a connection to a session.
    ///
    /// The returned role is decided by the participant count the insertion
    /// produced: exactly one means `Initiator`, two means `Joiner`. An
    /// expired session is evicted as a side effect of the failed attempt.
    pub fn admit(&self, id: &SessionId, conn: ConnectionId) -> Result<Role, AdmitError> {
        {
            let mut entry = self.sessions.get_mut(id).ok_or(AdmitError::NotFound)?;
            let session = entry.value_mut();
            if !session.is_expired(self.config.expiry_horizon) {
                if session.participants.len() >= self.config.capacity {
                    return Err(AdmitError::Full);
                }
                session.participants.push(conn);
                session.last_activity_at = Instant::now();
                let role = if session.participants.len() == 1 {
                    Role::Initiator
                } else {
                    Role::Joiner
                };
                debug!(session = %id, connection = %conn, ?role, "admitted");
                return Ok(role);
            }
        }

        // Lazy eviction; the condition is re-checked under the entry lock.
        let horizon = self.config.expiry_horizon;
        self.sessions.remove_if(id, |_, s| s.is_expired(horizon));
        Err(AdmitError::Expired)
    }

    /// Refresh `last_activity_at`. Called on every relayed event; does not
    /// move the expiry horizon.
    pub fn touch(&self, id: &SessionId) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_activity_at = Instant::now();
        }
    }

    /// Whether traffic may still be relayed through this session.
    ///
    /// Deliberately not gated on participant count: a full session must
    /// keep relaying between its two members.
    pub fn can_relay(&self, id: &SessionId) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|s| !s.is_expired(self.config.expiry_horizon))
    }

    /// Whether `conn` is currently a participant.
    pub fn is_member(&self, id: &SessionId, conn: &ConnectionId) -> bool {
        self.sessions
            .get(id)
            .is_some_and(|s| s.participants.contains(conn))
    }

    /// The participants other than `conn`; forwarding targets for relays.
    pub fn others(&self, id: &SessionId, conn: &ConnectionId) -> Vec<ConnectionId> {
        self.sessions
            .get(id)
            .map(|s| {
                s.participants
                    .iter()
                    .filter(|c| *c != conn)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a participant. An emptied session is deleted immediately; it
    /// can never become useful again.
    pub fn remove(&self, id: &SessionId, conn: &ConnectionId) {
        let emptied = match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.participants.retain(|c| c != conn);
                session.participants.is_empty()
            }
            None => return,
        };
        if emptied {
            self.sessions.remove_if(id, |_, s| s.participants.is_empty());
            debug!(session = %id, "empty session removed");
        }
    }

    /// Evict every session past the expiry horizon; the periodic sweep body.
    /// Returns the number of sessions dropped.
    pub fn evict_expired(&self) -> usize {
        let horizon = self.config.expiry_horizon;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired(horizon));
        before.saturating_sub(self.sessions.len())
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn registry_with_horizon(horizon: Duration) -> SessionRegistry {
        SessionRegistry::new(RegistryConfig {
            expiry_horizon: horizon,
            ..RegistryConfig::default()
        })
    }

    #[test]
    fn admission_assigns_roles_in_order_and_enforces_capacity() {
        let registry = SessionRegistry::default();
        let id = registry.create();

        let first = ConnectionId::new();
        let second = ConnectionId::new();
        let third = ConnectionId::new();

        assert_eq!(registry.admit(&id, first), Ok(Role::Initiator));
        assert_eq!(registry.admit(&id, second), Ok(Role::Joiner));
        assert_eq!(registry.admit(&id, third), Err(AdmitError::Full));

        assert!(registry.is_member(&id, &first));
        assert!(registry.is_member(&id, &second));
        assert!(!registry.is_member(&id, &third));
        assert_eq!(registry.others(&id, &first), vec![second]);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let registry = SessionRegistry::default();
        let id = SessionId::generate();
        assert_eq!(
            registry.admit(&id, ConnectionId::new()),
            Err(AdmitError::NotFound)
        );
        assert!(!registry.can_relay(&id));
    }

    #[test]
    fn full_session_still_relays() {
        let registry = SessionRegistry::default();
        let id = registry.create();
        registry.admit(&id, ConnectionId::new()).unwrap();
        registry.admit(&id, ConnectionId::new()).unwrap();
        assert!(registry.can_relay(&id));
    }

    #[test]
    fn expired_session_rejects_admission_and_is_evicted() {
        let registry = registry_with_horizon(Duration::from_millis(40));
        let id = registry.create();
        assert_eq!(
            registry.admit(&id, ConnectionId::new()),
            Ok(Role::Initiator)
        );

        sleep(Duration::from_millis(60));
        assert!(!registry.can_relay(&id));
        assert_eq!(
            registry.admit(&id, ConnectionId::new()),
            Err(AdmitError::Expired)
        );
        // the failed attempt evicted the entry
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn touch_never_extends_the_horizon() {
        let registry = registry_with_horizon(Duration::from_millis(80));
        let id = registry.create();
        registry.admit(&id, ConnectionId::new()).unwrap();

        for _ in 0..5 {
            sleep(Duration::from_millis(25));
            registry.touch(&id);
        }
        assert!(!registry.can_relay(&id));
    }

    #[test]
    fn removing_the_last_participant_deletes_the_session() {
        let registry = SessionRegistry::default();
        let id = registry.create();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.admit(&id, a).unwrap();
        registry.admit(&id, b).unwrap();

        registry.remove(&id, &b);
        assert!(registry.can_relay(&id));
        assert!(registry.is_member(&id, &a));
        assert!(registry.others(&id, &a).is_empty());

        registry.remove(&id, &a);
        assert_eq!(registry.len(), 0);
        assert!(!registry.can_relay(&id));
    }

    #[test]
    fn sweep_evicts_expired_sessions() {
        let registry = registry_with_horizon(Duration::from_millis(30));
        for _ in 0..3 {
            registry.create();
        }
        assert_eq!(registry.len(), 3);

        sleep(Duration::from_millis(50));
        assert_eq!(registry.evict_expired(), 3);
        assert!(registry.is_empty());
    }
}
