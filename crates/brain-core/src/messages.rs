//! Frames exchanged with the robot and the frontends.
//!
//! Inbound frames are JSON objects dispatched on their `type` string. The
//! robot endpoint recognises `status`, `lidar` and `config`; anything else is
//! kept as an opaque [`InboundMessage::Unknown`] and relayed untouched.
//! Frontend frames are always opaque commands for the robot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;
use crate::pose::{MapPoint, Pose};

/// Which endpoint a frame arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Robot,
    Frontend,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Robot => "robot",
            Self::Frontend => "frontend",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Periodic robot status report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(rename = "bat")]
    pub battery: f64,
    pub mode: String,
}

/// One range–bearing reading plus the pose the robot held when it was taken.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangeSample {
    /// Bearing in degrees, relative to the robot heading.
    pub angle_deg: f64,
    pub distance: f64,
    pub pose: Pose,
}

/// Wire shape of a `lidar` frame.
#[derive(Deserialize)]
struct LidarFrame {
    angle: f64,
    dist: f64,
    robot_x: Option<f64>,
    robot_y: Option<f64>,
    robot_yaw: Option<f64>,
}

impl TryFrom<LidarFrame> for RangeSample {
    type Error = DecodeError;

    fn try_from(frame: LidarFrame) -> Result<Self, Self::Error> {
        let x = frame.robot_x.ok_or(DecodeError::MissingPose("robot_x"))?;
        let y = frame.robot_y.ok_or(DecodeError::MissingPose("robot_y"))?;
        let yaw = frame.robot_yaw.ok_or(DecodeError::MissingPose("robot_yaw"))?;
        Ok(Self {
            angle_deg: frame.angle,
            distance: frame.dist,
            pose: Pose::new(x, y, yaw),
        })
    }
}

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    Status(StatusReport),
    RangeSample(RangeSample),
    Config(Map<String, Value>),
    /// Frontend frame destined for the robot.
    Command(Map<String, Value>),
    /// Robot frame with an unrecognised or missing tag, or a recognised tag
    /// whose body does not match its known shape (except `lidar`).
    Unknown {
        kind: Option<String>,
        fields: Map<String, Value>,
    },
}

impl InboundMessage {
    /// Decode one text frame received on the `role` endpoint.
    ///
    /// Non-JSON text, JSON that is not an object, and `lidar` frames without
    /// a complete pose are errors. A `status` frame with an unexpected body
    /// decodes as [`InboundMessage::Unknown`] so it is still relayed.
    pub fn decode(text: &str, role: Role) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject(json_type_name(&value)));
        }
        if role == Role::Frontend {
            return Ok(Self::Command(into_map(value)));
        }

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("lidar") => {
                let frame = LidarFrame::deserialize(&value).map_err(|source| {
                    DecodeError::Malformed {
                        kind: "lidar",
                        source,
                    }
                })?;
                return Ok(Self::RangeSample(frame.try_into()?));
            }
            Some("status") => {
                if let Ok(status) = StatusReport::deserialize(&value) {
                    return Ok(Self::Status(status));
                }
            }
            Some("config") => return Ok(Self::Config(into_map(value))),
            _ => {}
        }
        Ok(Self::Unknown {
            kind,
            fields: into_map(value),
        })
    }

    /// The message tag, for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Status(_) => "status",
            Self::RangeSample(_) => "lidar",
            Self::Config(_) => "config",
            Self::Command(_) => "command",
            Self::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Frames the hub itself originates for the frontends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    MapUpdate {
        point: MapPoint,
        robot_pose: Pose,
    },
    /// The robot session ended. `bat` is always `null`.
    RobotDisconnected {
        bat: Option<f64>,
    },
}

impl OutboundMessage {
    pub fn map_update(point: MapPoint, robot_pose: Pose) -> Self {
        Self::MapUpdate { point, robot_pose }
    }

    pub fn robot_disconnected() -> Self {
        Self::RobotDisconnected { bat: None }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MapUpdate { .. } => "map_update",
            Self::RobotDisconnected { .. } => "robot_disconnected",
        }
    }
}
