//! Robot pose, map points, and the last-known pose shown on dashboards.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Robot position and heading in the global map frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading in radians.
    pub yaw: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }
}

/// A transformed range sample, rounded to map units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapPoint {
    pub x: i64,
    pub y: i64,
}

/// The pose carried by the most recent range sample.
///
/// Display only. Transforms always use the pose attached to their own
/// sample, never this value.
#[derive(Debug, Default)]
pub struct PoseTracker {
    last: RwLock<Option<Pose>>,
}

impl PoseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, pose: Pose) {
        *self.last.write() = Some(pose);
    }

    pub fn last(&self) -> Option<Pose> {
        *self.last.read()
    }
}
