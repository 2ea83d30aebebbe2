//! Boundaries to the systems the engine talks to but does not own:
//! face matching, attendance persistence, the roster, the operator, and
//! the speech/UI backend.

use crate::types::{Detection, Identity, Observation, PresenceEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use thiserror::Error;

/// The face matcher failed on a frame. The frame is skipped.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

/// The attendance store rejected a write. The event is dropped.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("store write failed: {0}")]
    WriteFailed(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A notification could not be delivered. Always swallowed.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("backend failed: {0}")]
    Backend(String),
    #[error("backend timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster backend error: {0}")]
    Backend(String),
    #[error("identity {0} already registered under another name")]
    Conflict(i64),
}

/// Turns a captured frame into per-face identity readings.
///
/// Must be deterministic for the same frame and roster. Unresolved faces are
/// reported as [`FaceIdentity::Unknown`](crate::FaceIdentity::Unknown).
pub trait IdentityResolver {
    type Frame;

    fn resolve(&mut self, frame: &Self::Frame) -> Result<Vec<Detection>, ResolutionError>;
}

/// Durable sink for accepted events. Called at most once per event, never retried.
pub trait AttendanceStore {
    fn insert(&mut self, event: &PresenceEvent) -> Result<(), PersistenceError>;
}

/// The set of people with registered biometric templates.
pub trait RosterProvider {
    fn list_registered_identities(&self) -> Result<Vec<Identity>, RosterError>;
    fn find(&self, external_id: i64) -> Result<Option<Identity>, RosterError>;
    /// Add a manually authorized person. Registering an identical entry twice is a no-op.
    fn register(&self, identity: &Identity) -> Result<(), RosterError>;
}

/// Outcome of a manual verification prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    Authorized { identity: Identity, roll_number: i64 },
    Failed,
}

/// Human-in-the-loop verification for faces the resolver keeps missing.
///
/// Blocks the calling thread for as long as the operator takes.
pub trait AuthorizationGate {
    fn authorize(&mut self, observation: &Observation) -> AuthorizationOutcome;
}

/// Speech or on-screen output. Invoked by the dispatcher worker, one message at a time.
///
/// A call that outlives the dispatcher's timeout is cancelled by dropping
/// its future; anything it started (a child process, a device handle) must
/// stop on drop.
pub trait NotificationBackend: Send + Sync + 'static {
    fn speak(&self, text: &str) -> impl Future<Output = Result<(), NotificationError>> + Send;
}

/// Producer side of notifications. Must never block the caller.
pub trait Notifier {
    fn notify(&self, text: &str);
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, text: &str) {
        (**self).notify(text)
    }
}

/// Process-local roster keyed by external id.
///
/// Loaded from the durable roster at startup and shared with the resolver
/// and gate so runtime registrations are visible immediately.
#[derive(Debug, Default)]
pub struct InMemoryRoster {
    identities: RwLock<HashMap<i64, Identity>>,
}

impl InMemoryRoster {
    pub fn new(identities: impl IntoIterator<Item = Identity>) -> Self {
        let map = identities
            .into_iter()
            .map(|identity| (identity.external_id, identity))
            .collect();
        Self {
            identities: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.identities.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> RosterError {
    RosterError::Backend("roster lock poisoned".into())
}

impl RosterProvider for InMemoryRoster {
    fn list_registered_identities(&self) -> Result<Vec<Identity>, RosterError> {
        let map = self.identities.read().map_err(poisoned)?;
        let mut all: Vec<Identity> = map.values().cloned().collect();
        all.sort_by_key(|identity| identity.external_id);
        Ok(all)
    }

    fn find(&self, external_id: i64) -> Result<Option<Identity>, RosterError> {
        let map = self.identities.read().map_err(poisoned)?;
        Ok(map.get(&external_id).cloned())
    }

    fn register(&self, identity: &Identity) -> Result<(), RosterError> {
        let mut map = self.identities.write().map_err(poisoned)?;
        match map.get(&identity.external_id) {
            Some(existing) if existing.name != identity.name => {
                Err(RosterError::Conflict(identity.external_id))
            }
            Some(_) => Ok(()),
            None => {
                map.insert(identity.external_id, identity.clone());
                Ok(())
            }
        }
    }
}
