//! # Tracks
//!
//! A [`Track`] is a validated combination of tracklets — exactly one
//! first-endpoint, exactly one last-endpoint and zero or more support
//! tracklets — whose union of detections is consistent with one per-axis
//! constant-acceleration motion model. Tracks are immutable once emitted.

pub(crate) mod distributed;
pub mod linking;
pub mod quadratic;

use crate::constants::DetectionId;

/// A validated candidate trajectory.
#[derive(Debug, Clone)]
pub struct Track {
    /// Index of the first-endpoint tracklet in the input tracklet list.
    pub first_endpoint: usize,
    /// Index of the last-endpoint tracklet.
    pub last_endpoint: usize,
    /// Indices of the accepted support tracklets.
    pub support: Vec<usize>,
    detection_ids: Vec<DetectionId>,
}

impl Track {
    pub(crate) fn new(
        first_endpoint: usize,
        last_endpoint: usize,
        support: Vec<usize>,
        mut detection_ids: Vec<DetectionId>,
    ) -> Self {
        detection_ids.sort_unstable();
        detection_ids.dedup();
        Track {
            first_endpoint,
            last_endpoint,
            support,
            detection_ids,
        }
    }

    /// Union of member detection identities, sorted ascending.
    pub fn detection_ids(&self) -> &[DetectionId] {
        &self.detection_ids
    }

    /// Support tracklet count (endpoints excluded).
    pub fn support_count(&self) -> usize {
        self.support.len()
    }
}
