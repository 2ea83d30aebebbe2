//! Per-frame control flow: resolve, associate tracks, evaluate each face.

use crate::association::TrackAssociator;
use crate::collaborators::{
    AttendanceStore, AuthorizationGate, IdentityResolver, Notifier, ResolutionError,
};
use crate::engine::{EngineError, Evaluation, PresenceEngine};
use crate::types::{BoundingBox, Observation};

/// Result of offering one frame to the pipeline.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Not selected by the frame stride.
    Skipped,
    /// The resolver failed; nothing was evaluated.
    ResolutionFailed(ResolutionError),
    /// One entry per detected face, in resolver order.
    Evaluated(Vec<Result<Evaluation, EngineError>>),
}

impl FrameOutcome {
    pub fn evaluations(&self) -> impl Iterator<Item = &Evaluation> {
        let outcomes: &[Result<Evaluation, EngineError>] = match self {
            FrameOutcome::Evaluated(outcomes) => outcomes.as_slice(),
            _ => &[],
        };
        outcomes.iter().filter_map(|o| o.as_ref().ok())
    }
}

pub struct FramePipeline<R, A> {
    resolver: R,
    associator: A,
    /// Only every `stride`-th frame is processed.
    stride: u64,
    frames_seen: u64,
}

impl<R, A> FramePipeline<R, A>
where
    R: IdentityResolver,
    A: TrackAssociator,
{
    pub fn new(resolver: R, associator: A, stride: u64) -> Self {
        Self {
            resolver,
            associator,
            stride: stride.max(1),
            frames_seen: 0,
        }
    }

    /// Run one frame through the resolver and the engine.
    ///
    /// Faces are evaluated sequentially, so an escalation prompt holds back
    /// the remaining faces of the same frame.
    pub fn process<S, G, N>(
        &mut self,
        engine: &mut PresenceEngine<S, G, N>,
        frame: &R::Frame,
        timestamp_ms: i64,
    ) -> FrameOutcome
    where
        S: AttendanceStore,
        G: AuthorizationGate,
        N: Notifier,
    {
        self.frames_seen += 1;
        if self.frames_seen % self.stride != 0 {
            return FrameOutcome::Skipped;
        }

        let detections = match self.resolver.resolve(frame) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, frame = self.frames_seen, "resolver failed; frame skipped");
                // Still a processed frame for the sweep cadence.
                engine.frame_completed();
                return FrameOutcome::ResolutionFailed(e);
            }
        };

        let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bounding_box).collect();
        let track_ids = self.associator.associate(&boxes, timestamp_ms);

        let outcomes = detections
            .into_iter()
            .zip(track_ids)
            .map(|(detection, track_id)| {
                let observation = Observation {
                    track_id,
                    identity: detection.identity,
                    bounding_box: detection.bounding_box,
                    confidence: detection.confidence,
                    timestamp_ms,
                };
                engine.evaluate(&observation)
            })
            .collect();

        engine.frame_completed();
        FrameOutcome::Evaluated(outcomes)
    }
}
