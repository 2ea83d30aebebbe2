use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// A registered person. Unique by `external_id` (the roll number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub external_id: i64,
}

impl Identity {
    pub fn new(name: impl Into<String>, external_id: i64) -> Self {
        Self {
            name: name.into(),
            external_id,
        }
    }
}

/// Resolver verdict for one detected face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceIdentity {
    Known(Identity),
    Unknown,
}

/// Stable key for a face track across consecutive frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One face as reported by the identity resolver, before track association.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub identity: FaceIdentity,
    pub confidence: f32,
}

/// One identity-or-unknown reading for one detected face in one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub track_id: TrackId,
    pub identity: FaceIdentity,
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    /// Frame timestamp in milliseconds; the engine's notion of "now".
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Entry,
    Exit,
}

impl EventType {
    /// The type that follows this one in the entry/exit alternation.
    pub fn toggled(self) -> Self {
        match self {
            EventType::Entry => EventType::Exit,
            EventType::Exit => EventType::Entry,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Entry => "Entry",
            EventType::Exit => "Exit",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entry" => Ok(EventType::Entry),
            "Exit" => Ok(EventType::Exit),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// How the identity behind an event was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Recognition,
    ManualId,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Recognition => "Recognition",
            Method::ManualId => "ManualId",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Recognition" => Ok(Method::Recognition),
            "ManualId" => Ok(Method::ManualId),
            other => Err(format!("unknown method: {other}")),
        }
    }
}

/// Per-identity toggle state. Created on the first accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceState {
    pub last_event_time_ms: i64,
    pub last_event_type: EventType,
}

/// An accepted attendance event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub id: Uuid,
    pub identity: Identity,
    pub roll_number: i64,
    pub event_type: EventType,
    pub method: Method,
    pub timestamp_ms: i64,
}

impl PresenceEvent {
    pub fn new(
        identity: Identity,
        roll_number: i64,
        event_type: EventType,
        method: Method,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            roll_number,
            event_type,
            method,
            timestamp_ms,
        }
    }

    /// Event time in the local timezone, used for the date/time record columns.
    pub fn local_time(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_else(Local::now)
    }

    /// Notification text announced for this event.
    pub fn announcement(&self) -> String {
        format!("{} successful: {}", self.event_type, self.identity.name)
    }
}
