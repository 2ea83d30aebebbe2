//! presence-core — Presence event engine.
//!
//! Turns per-frame face observations into entry/exit attendance events with
//! per-identity cooldown, unknown-face escalation to manual authorization,
//! and non-blocking spoken notifications.

pub mod association;
pub mod collaborators;
pub mod cooldown;
pub mod dispatcher;
pub mod engine;
pub mod escalation;
pub mod pipeline;
pub mod types;

pub use association::{AssociationConfig, IouTrackAssociator, TrackAssociator};
pub use collaborators::{
    AttendanceStore, AuthorizationGate, AuthorizationOutcome, IdentityResolver, InMemoryRoster,
    NotificationBackend, NotificationError, Notifier, PersistenceError, ResolutionError,
    RosterError, RosterProvider,
};
pub use dispatcher::{DispatcherConfig, NotificationDispatcher, OverflowPolicy};
pub use engine::{EngineConfig, EngineError, Evaluation, PresenceEngine};
pub use pipeline::{FrameOutcome, FramePipeline};
pub use types::{
    BoundingBox, Detection, EventType, FaceIdentity, Identity, Method, Observation, PresenceEvent,
    PresenceState, TrackId,
};
