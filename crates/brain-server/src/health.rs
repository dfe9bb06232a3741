//! `/health` endpoint.

use std::collections::BTreeMap;
use std::time::Instant;

use brain_core::Pose;
use brain_telemetry::metrics::MetricSample;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::hub::Hub;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// RFC 3339, UTC.
    pub started_at: String,
    pub robot_connected: bool,
    pub frontends: usize,
    /// Pose from the most recent range sample, for display.
    pub last_pose: Option<Pose>,
    /// Every metric series keyed as `name` or `name{label=value,...}`.
    pub metrics: BTreeMap<String, f64>,
}

/// Build a health response from the hub's live state.
pub fn health_check(hub: &Hub, start_time: Instant, started_at: DateTime<Utc>) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        robot_connected: hub.registry().robot_connected(),
        frontends: hub.registry().frontend_count(),
        last_pose: hub.last_pose(),
        metrics: flatten(hub.metrics().snapshot()),
    }
}

fn flatten(samples: Vec<MetricSample>) -> BTreeMap<String, f64> {
    samples
        .into_iter()
        .map(|sample| {
            let key = if sample.labels.is_empty() {
                sample.name
            } else {
                let labels: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                format!("{}{{{}}}", sample.name, labels.join(","))
            };
            (key, sample.value)
        })
        .collect()
}
