//! Per-frame routing: robot traffic fans out, frontend traffic goes to the robot.

use std::sync::Arc;

use brain_core::{CoordinateTransformer, InboundMessage, MapPoint, OutboundMessage, Role};
use brain_telemetry::metrics::MetricsRecorder;
use tracing::{debug, warn};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::errors::SendError;
use crate::registry::SessionRegistry;

/// What happened to one inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteOutcome {
    /// Empty or whitespace-only frame.
    Skipped,
    /// Could not be decoded; nothing was sent anywhere.
    Rejected { error_kind: &'static str },
    /// Robot message relayed verbatim to frontends.
    Relayed { kind: String, report: BroadcastReport },
    /// Range sample converted and broadcast as a map update.
    Mapped { point: MapPoint, report: BroadcastReport },
    /// Frontend command queued for the robot.
    Forwarded,
    /// Frontend command discarded.
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    NoRobot,
    RobotUnavailable(SendError),
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoRobot => "no_robot",
            Self::RobotUnavailable(SendError::Full) => "robot_queue_full",
            Self::RobotUnavailable(SendError::Closed) => "robot_closed",
        }
    }
}

pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
    transformer: CoordinateTransformer,
    metrics: Arc<MetricsRecorder>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Broadcaster,
        transformer: CoordinateTransformer,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            transformer,
            metrics,
        }
    }

    /// Decode and dispatch one text frame received from `role`.
    ///
    /// Never fails: malformed input is logged and counted, and the caller's
    /// connection stays open.
    pub fn route(&self, role: Role, frame: &str) -> RouteOutcome {
        if frame.trim().is_empty() {
            return RouteOutcome::Skipped;
        }
        match role {
            Role::Robot => self.metrics.counter_inc("robot.frames", &[], 1),
            Role::Frontend => self.metrics.counter_inc("frontend.commands", &[], 1),
        }

        let message = match InboundMessage::decode(frame, role) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    role = %role,
                    error_kind = e.error_kind(),
                    error = %e,
                    "dropping undecodable frame"
                );
                self.metrics.counter_inc(
                    "frames.decode_errors",
                    &[("role", role.as_str()), ("kind", e.error_kind())],
                    1,
                );
                return RouteOutcome::Rejected {
                    error_kind: e.error_kind(),
                };
            }
        };

        match message {
            InboundMessage::Command(_) => self.forward_to_robot(frame),
            InboundMessage::RangeSample(sample) => {
                let point = self.transformer.apply(&sample);
                self.metrics.counter_inc("map.points", &[], 1);
                let report = self
                    .broadcaster
                    .broadcast(&OutboundMessage::map_update(point, sample.pose));
                RouteOutcome::Mapped { point, report }
            }
            other => {
                let kind = other.kind().to_owned();
                let report = self.broadcaster.broadcast_text(frame);
                debug!(kind = %kind, recipients = report.recipients(), "relayed robot message");
                RouteOutcome::Relayed { kind, report }
            }
        }
    }

    fn forward_to_robot(&self, frame: &str) -> RouteOutcome {
        let Some(robot) = self.registry.current_robot() else {
            return self.dropped(DropReason::NoRobot);
        };
        match robot.send(frame.to_owned()) {
            Ok(()) => {
                self.metrics.counter_inc("commands.forwarded", &[], 1);
                RouteOutcome::Forwarded
            }
            Err(e) => self.dropped(DropReason::RobotUnavailable(e)),
        }
    }

    fn dropped(&self, reason: DropReason) -> RouteOutcome {
        debug!(reason = reason.as_str(), "command dropped");
        self.metrics
            .counter_inc("commands.dropped", &[("reason", reason.as_str())], 1);
        RouteOutcome::Dropped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::{Pose, PoseTracker};
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<SessionRegistry>,
        router: MessageRouter,
        metrics: Arc<MetricsRecorder>,
        tracker: Arc<PoseTracker>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(SessionRegistry::new(8));
        let metrics = Arc::new(MetricsRecorder::new());
        let tracker = Arc::new(PoseTracker::new());
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Broadcaster::new(Arc::clone(&registry), Arc::clone(&metrics)),
            CoordinateTransformer::new(Arc::clone(&tracker)),
            Arc::clone(&metrics),
        );
        Fixture {
            registry,
            router,
            metrics,
            tracker,
        }
    }

    fn frontend(f: &Fixture) -> mpsc::Receiver<String> {
        f.registry.register_frontend().1
    }

    #[test]
    fn status_is_relayed_verbatim() {
        let f = fixture();
        let mut rx = frontend(&f);
        let frame = r#"{"type":"status","bat":11.9,"mode":"AUTO"}"#;

        let outcome = f.router.route(Role::Robot, frame);

        assert!(matches!(outcome, RouteOutcome::Relayed { ref kind, .. } if kind == "status"));
        assert_eq!(rx.try_recv().unwrap(), frame);
    }

    #[test]
    fn unknown_robot_message_keeps_extra_fields() {
        let f = fixture();
        let mut rx = frontend(&f);
        let frame = r#"{"type":"status","mL":120,"mR":-80}"#;

        f.router.route(Role::Robot, frame);
        assert_eq!(rx.try_recv().unwrap(), frame);
    }

    #[test]
    fn config_is_relayed() {
        let f = fixture();
        let mut rx = frontend(&f);
        let frame = r#"{"type":"config","max_speed":0.5}"#;

        let outcome = f.router.route(Role::Robot, frame);
        assert!(matches!(outcome, RouteOutcome::Relayed { ref kind, .. } if kind == "config"));
        assert_eq!(rx.try_recv().unwrap(), frame);
    }

    #[test]
    fn range_sample_becomes_map_update() {
        let f = fixture();
        let mut rx = frontend(&f);

        let outcome = f.router.route(
            Role::Robot,
            r#"{"type":"lidar","angle":0,"dist":100,"robot_x":50,"robot_y":50,"robot_yaw":1.5707963267948966}"#,
        );

        match outcome {
            RouteOutcome::Mapped { point, report } => {
                assert_eq!(point, MapPoint { x: 50, y: 150 });
                assert_eq!(report.delivered, 1);
            }
            other => panic!("expected Mapped, got {other:?}"),
        }

        let sent: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(sent["type"], "map_update");
        assert_eq!(sent["point"], serde_json::json!({"x": 50, "y": 150}));
        assert_eq!(sent["robot_pose"]["x"], 50.0);
        assert_eq!(f.tracker.last(), Some(Pose::new(50.0, 50.0, std::f64::consts::FRAC_PI_2)));
        assert_eq!(f.metrics.counter_get("map.points", &[]), 1);
    }

    #[test]
    fn lidar_without_pose_is_rejected() {
        let f = fixture();
        let mut rx = frontend(&f);

        let outcome = f.router.route(Role::Robot, r#"{"type":"lidar","angle":0,"dist":100}"#);

        assert_eq!(
            outcome,
            RouteOutcome::Rejected {
                error_kind: "missing_pose"
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(f.tracker.last().is_none());
    }

    #[test]
    fn non_json_from_either_side_is_rejected() {
        let f = fixture();
        let mut rx = frontend(&f);
        let (_robot, mut robot_rx, _) = f.registry.register_robot();

        for role in [Role::Robot, Role::Frontend] {
            let outcome = f.router.route(role, "not json");
            assert_eq!(
                outcome,
                RouteOutcome::Rejected {
                    error_kind: "invalid_json"
                }
            );
        }
        assert!(rx.try_recv().is_err());
        assert!(robot_rx.try_recv().is_err());
        assert_eq!(
            f.metrics.counter_get(
                "frames.decode_errors",
                &[("role", "robot"), ("kind", "invalid_json")]
            ),
            1
        );
    }

    #[test]
    fn json_array_is_rejected() {
        let f = fixture();
        let outcome = f.router.route(Role::Frontend, "[1,2]");
        assert_eq!(
            outcome,
            RouteOutcome::Rejected {
                error_kind: "not_an_object"
            }
        );
    }

    #[test]
    fn empty_frame_is_skipped() {
        let f = fixture();
        assert_eq!(f.router.route(Role::Robot, ""), RouteOutcome::Skipped);
        assert_eq!(f.router.route(Role::Frontend, "  \n"), RouteOutcome::Skipped);
        assert_eq!(f.metrics.counter_get("robot.frames", &[]), 0);
    }

    #[test]
    fn command_is_forwarded_verbatim() {
        let f = fixture();
        let (_robot, mut robot_rx, _) = f.registry.register_robot();
        let frame = r#"{"cmd":"drive","mL":100,"mR":100}"#;

        assert_eq!(f.router.route(Role::Frontend, frame), RouteOutcome::Forwarded);
        assert_eq!(robot_rx.try_recv().unwrap(), frame);
        assert_eq!(f.metrics.counter_get("commands.forwarded", &[]), 1);
    }

    #[test]
    fn command_without_robot_is_dropped() {
        let f = fixture();
        let mut rx = frontend(&f);

        let outcome = f.router.route(Role::Frontend, r#"{"cmd":"stop"}"#);

        assert_eq!(outcome, RouteOutcome::Dropped(DropReason::NoRobot));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            f.metrics
                .counter_get("commands.dropped", &[("reason", "no_robot")]),
            1
        );
    }

    #[test]
    fn command_goes_to_newest_robot() {
        let f = fixture();
        let (_old, mut old_rx, _) = f.registry.register_robot();
        let (_new, mut new_rx, _) = f.registry.register_robot();

        f.router.route(Role::Frontend, r#"{"cmd":"go"}"#);

        assert!(old_rx.try_recv().is_err());
        assert_eq!(new_rx.try_recv().unwrap(), r#"{"cmd":"go"}"#);
    }

    #[test]
    fn command_to_closed_robot_is_dropped() {
        let f = fixture();
        let (_robot, robot_rx, _) = f.registry.register_robot();
        drop(robot_rx);

        assert_eq!(
            f.router.route(Role::Frontend, r#"{"cmd":"go"}"#),
            RouteOutcome::Dropped(DropReason::RobotUnavailable(SendError::Closed))
        );
    }

    #[test]
    fn frontend_typed_message_is_still_a_command() {
        let f = fixture();
        let (_robot, mut robot_rx, _) = f.registry.register_robot();
        let mut rx = frontend(&f);
        let frame = r#"{"type":"status","bat":1,"mode":"x"}"#;

        assert_eq!(f.router.route(Role::Frontend, frame), RouteOutcome::Forwarded);
        assert_eq!(robot_rx.try_recv().unwrap(), frame);
        assert!(rx.try_recv().is_err());
    }
}
