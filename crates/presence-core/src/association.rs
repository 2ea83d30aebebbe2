//! Track association — stable track ids for faces across consecutive frames.
//!
//! Boxes are matched greedily to the live track with the highest IoU above
//! a threshold. Tracks not seen within `max_track_age_ms` expire.

use crate::types::{BoundingBox, TrackId};
use serde::Deserialize;

const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
const DEFAULT_MAX_TRACK_AGE_MS: i64 = 1_500;

/// Assigns a track id to every box of one frame.
pub trait TrackAssociator {
    /// Returns one id per input box, in input order. Ids are unique within a frame.
    fn associate(&mut self, boxes: &[BoundingBox], timestamp_ms: i64) -> Vec<TrackId>;
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    pub iou_threshold: f32,
    pub max_track_age_ms: i64,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_track_age_ms: DEFAULT_MAX_TRACK_AGE_MS,
        }
    }
}

#[derive(Debug, Clone)]
struct LiveTrack {
    id: TrackId,
    bbox: BoundingBox,
    last_seen_ms: i64,
}

#[derive(Debug, Default)]
pub struct IouTrackAssociator {
    config: AssociationConfig,
    tracks: Vec<LiveTrack>,
    next_id: u64,
}

impl IouTrackAssociator {
    pub fn new(config: AssociationConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn mint(&mut self) -> TrackId {
        self.next_id += 1;
        TrackId(format!("t{}", self.next_id))
    }
}

impl TrackAssociator for IouTrackAssociator {
    fn associate(&mut self, boxes: &[BoundingBox], timestamp_ms: i64) -> Vec<TrackId> {
        let max_age = self.config.max_track_age_ms;
        self.tracks
            .retain(|t| timestamp_ms.saturating_sub(t.last_seen_ms) <= max_age);

        // All (track, box) pairs above threshold, best overlap first.
        let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (bi, bbox) in boxes.iter().enumerate() {
                let iou = track.bbox.iou(bbox);
                if iou >= self.config.iou_threshold {
                    candidates.push((ti, bi, iou));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut assigned: Vec<Option<usize>> = vec![None; boxes.len()];
        let mut track_taken = vec![false; self.tracks.len()];
        for (ti, bi, _) in candidates {
            if track_taken[ti] || assigned[bi].is_some() {
                continue;
            }
            track_taken[ti] = true;
            assigned[bi] = Some(ti);
        }

        let mut ids = Vec::with_capacity(boxes.len());
        for (bi, bbox) in boxes.iter().enumerate() {
            match assigned[bi] {
                Some(ti) => {
                    let track = &mut self.tracks[ti];
                    track.bbox = *bbox;
                    track.last_seen_ms = timestamp_ms;
                    ids.push(track.id.clone());
                }
                None => {
                    let id = self.mint();
                    self.tracks.push(LiveTrack {
                        id: id.clone(),
                        bbox: *bbox,
                        last_seen_ms: timestamp_ms,
                    });
                    ids.push(id);
                }
            }
        }

        tracing::trace!(boxes = boxes.len(), live = self.tracks.len(), "associated frame");
        ids
    }
}
