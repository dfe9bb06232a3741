//! Fan-out of robot traffic to every connected frontend.

use std::sync::Arc;

use brain_core::OutboundMessage;
use brain_telemetry::metrics::MetricsRecorder;
use tracing::{debug, warn};

use crate::registry::SessionRegistry;

/// How one broadcast went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn recipients(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Sends a frame to a snapshot of the frontend set.
///
/// A frontend whose queue is full or already closed is skipped; the others
/// still get the frame.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    metrics: Arc<MetricsRecorder>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { registry, metrics }
    }

    /// Relay frame text verbatim.
    pub fn broadcast_text(&self, frame: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for frontend in self.registry.frontend_snapshot() {
            match frontend.send(frame.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(
                        client_id = %frontend.id(),
                        reason = e.as_str(),
                        "frontend send failed"
                    );
                    self.metrics
                        .counter_inc("broadcast.send_failures", &[("reason", e.as_str())], 1);
                }
            }
        }
        self.metrics
            .histogram_observe("broadcast.recipients", &[], report.recipients() as f64);
        report
    }

    /// Serialize and broadcast a hub-generated message.
    pub fn broadcast(&self, message: &OutboundMessage) -> BroadcastReport {
        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                warn!(event_type = message.event_type(), error = %e, "failed to serialize event");
                return BroadcastReport::default();
            }
        };
        let report = self.broadcast_text(&json);
        debug!(
            event_type = message.event_type(),
            delivered = report.delivered,
            failed = report.failed,
            "broadcast event"
        );
        report
    }
}
