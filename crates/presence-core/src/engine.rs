use crate::collaborators::{
    AttendanceStore, AuthorizationGate, AuthorizationOutcome, Notifier, PersistenceError,
};
use crate::cooldown::{CooldownTracker, PresenceLedger};
use crate::escalation::{EscalationTracker, DEFAULT_MAX_UNKNOWN_ATTEMPTS};
use crate::types::{
    EventType, FaceIdentity, Identity, Method, Observation, PresenceEvent, PresenceState, TrackId,
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

const DEFAULT_MIN_ENTRY_GAP_MS: u64 = 60_000;
const DEFAULT_SWEEP_INTERVAL_FRAMES: u64 = 150;
const EVENT_STREAM_CAPACITY: usize = 256;

pub const AUTHENTICATION_FAILED: &str = "Authentication failed";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("attendance not recorded: {0}")]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum gap between two accepted events of one identity.
    pub min_entry_gap_ms: u64,
    /// Consecutive unknown sightings of one track before manual authorization.
    pub max_unknown_attempts: u32,
    /// Escalation counters are cleared every this many processed frames (0 disables).
    pub sweep_interval_frames: u64,
}

impl EngineConfig {
    pub fn min_entry_gap(&self) -> Duration {
        Duration::from_millis(self.min_entry_gap_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_entry_gap_ms: DEFAULT_MIN_ENTRY_GAP_MS,
            max_unknown_attempts: DEFAULT_MAX_UNKNOWN_ATTEMPTS,
            sweep_interval_frames: DEFAULT_SWEEP_INTERVAL_FRAMES,
        }
    }
}

/// What the engine decided for one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Stored, applied to the toggle state, announced.
    Accepted(PresenceEvent),
    /// Too soon after the identity's last event. UI advisory only.
    CoolingDown { identity: Identity, remaining: Duration },
    /// Unknown face below the escalation threshold.
    Unresolved { track_id: TrackId, attempts: u32 },
    /// Escalated, and the operator could not verify the person.
    AuthorizationFailed { track_id: TrackId },
}

impl Evaluation {
    pub fn accepted(&self) -> Option<&PresenceEvent> {
        match self {
            Evaluation::Accepted(event) => Some(event),
            _ => None,
        }
    }

    /// "Please wait" text for on-screen display while an identity cools down.
    pub fn advisory(&self) -> Option<String> {
        match self {
            Evaluation::CoolingDown { identity, remaining } => Some(format!(
                "{}: please wait {}s",
                identity.name,
                remaining.as_secs_f32().ceil() as u64
            )),
            _ => None,
        }
    }
}

/// The presence state machine.
///
/// Owns every piece of mutable presence state. All mutation goes through
/// `&mut self`, so one owner (the engine thread) serializes evaluations,
/// including the blocking manual-authorization prompt.
pub struct PresenceEngine<S, G, N> {
    config: EngineConfig,
    store: S,
    gate: G,
    notifier: N,
    ledger: PresenceLedger,
    cooldown: CooldownTracker,
    escalation: EscalationTracker,
    events: broadcast::Sender<PresenceEvent>,
    frames_completed: u64,
    accepted: u64,
}

impl<S, G, N> PresenceEngine<S, G, N>
where
    S: AttendanceStore,
    G: AuthorizationGate,
    N: Notifier,
{
    pub fn new(config: EngineConfig, store: S, gate: G, notifier: N) -> Self {
        let (events, _) = broadcast::channel(EVENT_STREAM_CAPACITY);
        Self {
            cooldown: CooldownTracker::new(config.min_entry_gap()),
            escalation: EscalationTracker::new(config.max_unknown_attempts),
            config,
            store,
            gate,
            notifier,
            ledger: PresenceLedger::new(),
            events,
            frames_completed: 0,
            accepted: 0,
        }
    }

    /// Stream of accepted events, in acceptance order.
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.events.subscribe()
    }

    pub fn evaluate(&mut self, observation: &Observation) -> Result<Evaluation, EngineError> {
        match &observation.identity {
            FaceIdentity::Known(identity) => {
                // Only an unbroken run of unknown sightings escalates.
                self.escalation.reset(&observation.track_id);
                self.admit(
                    identity.clone(),
                    identity.external_id,
                    Method::Recognition,
                    observation.timestamp_ms,
                )
            }
            FaceIdentity::Unknown => self.escalate(observation),
        }
    }

    /// Mark the end of a processed frame; sweeps escalation counters every
    /// `sweep_interval_frames` frames.
    pub fn frame_completed(&mut self) {
        self.frames_completed += 1;
        let interval = self.config.sweep_interval_frames;
        if interval > 0 && self.frames_completed % interval == 0 {
            let dropped = self.escalation.sweep();
            tracing::debug!(frames = self.frames_completed, dropped, "swept escalation counters");
        }
    }

    fn escalate(&mut self, observation: &Observation) -> Result<Evaluation, EngineError> {
        let track_id = observation.track_id.clone();
        let attempts = self.escalation.record_attempt(&track_id);
        if !self.escalation.should_escalate(attempts) {
            tracing::debug!(track = %track_id, attempts, "unknown face");
            return Ok(Evaluation::Unresolved { track_id, attempts });
        }

        tracing::info!(track = %track_id, attempts, "unknown face escalated to manual authorization");
        let outcome = self.gate.authorize(observation);
        // The window restarts whatever the outcome, store failures included.
        self.escalation.reset(&track_id);

        match outcome {
            AuthorizationOutcome::Authorized {
                identity,
                roll_number,
            } => {
                tracing::info!(track = %track_id, name = %identity.name, roll_number, "manually authorized");
                self.admit(identity, roll_number, Method::ManualId, observation.timestamp_ms)
            }
            AuthorizationOutcome::Failed => {
                tracing::info!(track = %track_id, "manual authorization failed");
                self.notifier.notify(AUTHENTICATION_FAILED);
                Ok(Evaluation::AuthorizationFailed { track_id })
            }
        }
    }

    fn admit(
        &mut self,
        identity: Identity,
        roll_number: i64,
        method: Method,
        now_ms: i64,
    ) -> Result<Evaluation, EngineError> {
        if let Some(remaining) = self.cooldown.remaining(&self.ledger, &identity, now_ms) {
            tracing::debug!(
                name = %identity.name,
                remaining_ms = remaining.as_millis() as u64,
                "cooldown active; no event"
            );
            return Ok(Evaluation::CoolingDown { identity, remaining });
        }

        let event_type = self
            .ledger
            .get(&identity.external_id)
            .map(|state| state.last_event_type.toggled())
            .unwrap_or(EventType::Entry);
        let event = PresenceEvent::new(identity, roll_number, event_type, method, now_ms);

        if let Err(e) = self.store.insert(&event) {
            tracing::warn!(
                error = %e,
                name = %event.identity.name,
                event_type = %event.event_type,
                "attendance store write failed; event dropped"
            );
            return Err(e.into());
        }

        self.cooldown
            .mark_event(&mut self.ledger, &event.identity, now_ms, event_type);
        self.accepted += 1;

        tracing::info!(
            name = %event.identity.name,
            roll_number = event.roll_number,
            event_type = %event.event_type,
            method = %event.method,
            "attendance recorded"
        );

        // No subscribers is not an error.
        let _ = self.events.send(event.clone());
        self.notifier.notify(&event.announcement());

        Ok(Evaluation::Accepted(event))
    }

    pub fn presence_state(&self, identity: &Identity) -> Option<PresenceState> {
        self.ledger.get(&identity.external_id).copied()
    }

    pub fn escalation_attempts(&self, track_id: &TrackId) -> u32 {
        self.escalation.attempts(track_id)
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted
    }

    pub fn frames_completed(&self) -> u64 {
        self.frames_completed
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
