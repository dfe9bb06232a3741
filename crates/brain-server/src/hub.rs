use std::sync::Arc;

use brain_core::{ClientId, CoordinateTransformer, OutboundMessage, Pose, PoseTracker, RobotId};
use brain_telemetry::metrics::MetricsRecorder;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::connection::DisconnectReason;
use crate::registry::{FrontendHandle, RobotHandle, SessionRegistry};
use crate::router::MessageRouter;

/// Shared state behind every connection: who is connected, how frames are
/// routed, and where metrics go. Built once per server.
pub struct Hub {
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    router: MessageRouter,
    poses: Arc<PoseTracker>,
    metrics: Arc<MetricsRecorder>,
}

impl Hub {
    pub fn new(send_queue: usize, metrics: Arc<MetricsRecorder>) -> Self {
        let registry = Arc::new(SessionRegistry::new(send_queue));
        let poses = Arc::new(PoseTracker::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&metrics));
        let router = MessageRouter::new(
            Arc::clone(&registry),
            broadcaster.clone(),
            CoordinateTransformer::new(Arc::clone(&poses)),
            Arc::clone(&metrics),
        );
        Self {
            registry,
            broadcaster,
            router,
            poses,
            metrics,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn last_pose(&self) -> Option<Pose> {
        self.poses.last()
    }

    /// Take the robot slot. Any session already holding it is evicted.
    pub fn attach_robot(&self) -> (RobotHandle, mpsc::Receiver<String>) {
        let (robot, rx, previous) = self.registry.register_robot();
        if let Some(previous) = previous {
            warn!(
                robot_id = %robot.id(),
                evicted = %previous.id(),
                "new robot connection replaces existing session"
            );
            previous.evict();
        }
        info!(robot_id = %robot.id(), "robot connected");
        (robot, rx)
    }

    /// End a robot session. Frontends hear `robot_disconnected` only when
    /// this session still owned the slot; an evicted session leaves quietly.
    pub fn detach_robot(&self, id: &RobotId, reason: &DisconnectReason) -> bool {
        self.metrics
            .counter_inc("robot.disconnects", &[("reason", reason.as_str())], 1);

        if self.registry.unregister_robot(id).is_none() {
            info!(robot_id = %id, reason = reason.as_str(), "displaced robot session ended");
            return false;
        }

        match reason {
            DisconnectReason::TimedOut => {
                warn!(robot_id = %id, reason = reason.as_str(), "robot timed out");
            }
            DisconnectReason::TransportError(error) => {
                warn!(
                    robot_id = %id,
                    reason = reason.as_str(),
                    error = %error,
                    "robot connection failed"
                );
            }
            _ => info!(robot_id = %id, reason = reason.as_str(), "robot disconnected"),
        }

        let report = self
            .broadcaster
            .broadcast(&OutboundMessage::robot_disconnected());
        info!(recipients = report.delivered, "notified frontends of robot loss");
        true
    }

    pub fn attach_frontend(&self) -> (FrontendHandle, mpsc::Receiver<String>) {
        let (frontend, rx) = self.registry.register_frontend();
        self.metrics.gauge_inc("frontends.connected", &[], 1.0);
        info!(client_id = %frontend.id(), "frontend connected");
        (frontend, rx)
    }

    pub fn detach_frontend(&self, id: &ClientId, reason: &DisconnectReason) {
        if self.registry.unregister_frontend(id) {
            self.metrics.gauge_inc("frontends.connected", &[], -1.0);
            info!(client_id = %id, reason = reason.as_str(), "frontend disconnected");
        }
    }
}
