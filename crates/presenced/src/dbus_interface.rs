use presence_core::{InMemoryRoster, PresenceEvent, RosterProvider};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use zbus::interface;

const RECENT_CAPACITY: usize = 100;

pub const BUS_NAME: &str = "org.freedesktop.Presence1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Presence1";

/// Most recent accepted events, newest last.
pub type RecentEvents = Arc<Mutex<VecDeque<PresenceEvent>>>;

/// D-Bus interface for the presence daemon.
///
/// Bus name: org.freedesktop.Presence1
/// Object path: /org/freedesktop/Presence1
pub struct PresenceService {
    recent: RecentEvents,
    roster: Arc<InMemoryRoster>,
}

impl PresenceService {
    pub fn new(recent: RecentEvents, roster: Arc<InMemoryRoster>) -> Self {
        Self { recent, roster }
    }
}

#[interface(name = "org.freedesktop.Presence1")]
impl PresenceService {
    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let recent = self.recent.lock().map(|r| r.len()).unwrap_or(0);
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "roster_size": self.roster.len(),
            "recent_events": recent,
        })
        .to_string())
    }

    /// Return up to `limit` of the most recent accepted events as a JSON array, oldest first.
    async fn recent_events(&self, limit: u32) -> zbus::fdo::Result<String> {
        tracing::debug!(limit, "recent_events requested");
        let recent = self
            .recent
            .lock()
            .map_err(|_| zbus::fdo::Error::Failed("event buffer poisoned".into()))?;
        let skip = recent.len().saturating_sub(limit as usize);
        let events: Vec<&PresenceEvent> = recent.iter().skip(skip).collect();
        serde_json::to_string(&events).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// List registered identities as a JSON array.
    async fn list_roster(&self) -> zbus::fdo::Result<String> {
        let identities = self
            .roster
            .list_registered_identities()
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&identities).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}

/// Copy accepted events from the engine stream into the recent-events buffer.
pub async fn record_events(mut events: broadcast::Receiver<PresenceEvent>, recent: RecentEvents) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Ok(mut buffer) = recent.lock() else {
                    break;
                };
                if buffer.len() == RECENT_CAPACITY {
                    buffer.pop_front();
                }
                buffer.push_back(event);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event recorder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Claim the bus name and serve the interface on the session bus.
pub async fn serve(service: PresenceService) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
}
