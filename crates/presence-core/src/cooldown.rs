//! Minimum-gap enforcement between accepted events of one identity.
//!
//! Keeps no storage of its own: every answer is derived from the
//! identity's [`PresenceState`] in the engine's ledger.

use crate::types::{EventType, Identity, PresenceState};
use std::collections::HashMap;
use std::time::Duration;

/// Per-identity presence state, keyed by external id.
pub type PresenceLedger = HashMap<i64, PresenceState>;

#[derive(Debug, Clone, Copy)]
pub struct CooldownTracker {
    min_entry_gap_ms: i64,
}

impl CooldownTracker {
    pub fn new(min_entry_gap: Duration) -> Self {
        Self {
            min_entry_gap_ms: i64::try_from(min_entry_gap.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// True iff `now - last_event_time < min_entry_gap`.
    ///
    /// A timestamp earlier than the last accepted event is treated as on cooldown.
    pub fn is_on_cooldown(&self, ledger: &PresenceLedger, identity: &Identity, now_ms: i64) -> bool {
        self.remaining(ledger, identity, now_ms).is_some()
    }

    /// Time left before the identity may produce another event, if any.
    pub fn remaining(
        &self,
        ledger: &PresenceLedger,
        identity: &Identity,
        now_ms: i64,
    ) -> Option<Duration> {
        let state = ledger.get(&identity.external_id)?;
        let elapsed = now_ms.saturating_sub(state.last_event_time_ms);
        if elapsed < self.min_entry_gap_ms {
            let left = self.min_entry_gap_ms - elapsed.max(0);
            Some(Duration::from_millis(left as u64))
        } else {
            None
        }
    }

    /// Record an accepted event as the new cooldown baseline.
    pub fn mark_event(
        &self,
        ledger: &mut PresenceLedger,
        identity: &Identity,
        now_ms: i64,
        event_type: EventType,
    ) {
        ledger.insert(
            identity.external_id,
            PresenceState {
                last_event_time_ms: now_ms,
                last_event_type: event_type,
            },
        );
    }
}
