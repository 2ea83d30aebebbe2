//! JSON-lines frame feed and the roster-backed identity resolver.
//!
//! Each line is one processed frame as emitted by the face matcher:
//!
//! ```json
//! {"timestamp_ms": 1700000000000, "faces": [
//!   {"bbox": {"x": 120, "y": 80, "width": 96, "height": 96}, "external_id": 22052509, "confidence": 0.93},
//!   {"bbox": {"x": 400, "y": 90, "width": 90, "height": 90}, "external_id": null, "confidence": 0.41}
//! ]}
//! ```

use presence_core::{
    BoundingBox, Detection, FaceIdentity, IdentityResolver, ResolutionError, RosterProvider,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedFrame {
    /// Capture time; frames without one are stamped on arrival.
    pub timestamp_ms: Option<i64>,
    #[serde(default)]
    pub faces: Vec<FeedFace>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedFace {
    pub bbox: BoundingBox,
    /// Matched roll number, or null when the matcher found no one.
    pub external_id: Option<i64>,
    #[serde(default)]
    pub confidence: f32,
}

impl FeedFrame {
    pub fn parse(line: &str) -> Result<Self, ResolutionError> {
        serde_json::from_str(line).map_err(|e| ResolutionError::MalformedFrame(e.to_string()))
    }
}

/// Resolves matcher ids against the roster; ids not on the roster are unknown.
pub struct RosterResolver<R> {
    roster: Arc<R>,
}

impl<R: RosterProvider> RosterResolver<R> {
    pub fn new(roster: Arc<R>) -> Self {
        Self { roster }
    }
}

impl<R: RosterProvider> IdentityResolver for RosterResolver<R> {
    type Frame = FeedFrame;

    fn resolve(&mut self, frame: &FeedFrame) -> Result<Vec<Detection>, ResolutionError> {
        frame
            .faces
            .iter()
            .map(|face| -> Result<Detection, ResolutionError> {
                let identity = match face.external_id {
                    Some(id) => match self
                        .roster
                        .find(id)
                        .map_err(|e| ResolutionError::Unavailable(e.to_string()))?
                    {
                        Some(identity) => FaceIdentity::Known(identity),
                        None => {
                            tracing::debug!(external_id = id, "matched id not on roster");
                            FaceIdentity::Unknown
                        }
                    },
                    None => FaceIdentity::Unknown,
                };
                Ok(Detection {
                    bounding_box: face.bbox,
                    identity,
                    confidence: face.confidence,
                })
            })
            .collect()
    }
}
