//! Unknown-face attempt counting per track.
//!
//! A track that stays unresolved for `max_attempts` consecutive evaluations
//! is escalated to manual authorization, after which its counter restarts
//! from zero so the same stuck track does not prompt on every frame.

use crate::types::TrackId;
use std::collections::HashMap;

pub const DEFAULT_MAX_UNKNOWN_ATTEMPTS: u32 = 5;

#[derive(Debug)]
pub struct EscalationTracker {
    max_attempts: u32,
    attempts: HashMap<TrackId, u32>,
}

impl EscalationTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempts: HashMap::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count one more unresolved sighting of `track`, returning the new total.
    pub fn record_attempt(&mut self, track: &TrackId) -> u32 {
        let count = self.attempts.entry(track.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Whether `attempts` is the count that triggers manual authorization.
    pub fn should_escalate(&self, attempts: u32) -> bool {
        attempts == self.max_attempts
    }

    /// Restart the attempt window for `track` after an escalation resolves.
    pub fn reset(&mut self, track: &TrackId) {
        if let Some(count) = self.attempts.get_mut(track) {
            *count = 0;
        }
    }

    pub fn attempts(&self, track: &TrackId) -> u32 {
        self.attempts.get(track).copied().unwrap_or(0)
    }

    /// Drop all counters. Track ids are short-lived, so this bounds memory
    /// for faces that have left the frame.
    pub fn sweep(&mut self) -> usize {
        let dropped = self.attempts.len();
        self.attempts.clear();
        dropped
    }

    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}

impl Default for EscalationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNKNOWN_ATTEMPTS)
    }
}
