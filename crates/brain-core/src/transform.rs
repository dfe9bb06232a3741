//! Polar-to-global coordinate transform for range samples.

use std::sync::Arc;

use crate::messages::RangeSample;
use crate::pose::{MapPoint, Pose, PoseTracker};

/// Project a range–bearing sample taken at `pose` into the global map frame.
///
/// `angle_deg` is the bearing in degrees relative to the robot heading,
/// `pose.yaw` is in radians. Distances of zero or below go through the same
/// formula; a zero distance yields the robot's own position.
pub fn transform(angle_deg: f64, distance: f64, pose: &Pose) -> MapPoint {
    let angle = angle_deg.to_radians();
    let x_local = distance * angle.cos();
    let y_local = distance * angle.sin();

    let (sin_yaw, cos_yaw) = pose.yaw.sin_cos();
    let x_global = x_local * cos_yaw - y_local * sin_yaw + pose.x;
    let y_global = x_local * sin_yaw + y_local * cos_yaw + pose.y;

    MapPoint {
        x: to_map_units(x_global),
        y: to_map_units(y_global),
    }
}

// Half-way values round to even.
#[allow(clippy::cast_possible_truncation)]
fn to_map_units(v: f64) -> i64 {
    v.round_ties_even() as i64
}

/// Applies [`transform`] to decoded samples and records each sample's pose
/// as the last-known pose.
#[derive(Clone, Debug)]
pub struct CoordinateTransformer {
    tracker: Arc<PoseTracker>,
}

impl CoordinateTransformer {
    pub fn new(tracker: Arc<PoseTracker>) -> Self {
        Self { tracker }
    }

    pub fn apply(&self, sample: &RangeSample) -> MapPoint {
        let point = transform(sample.angle_deg, sample.distance, &sample.pose);
        self.tracker.update(sample.pose);
        point
    }

    pub fn tracker(&self) -> &Arc<PoseTracker> {
        &self.tracker
    }
}
