//! # brain-core
//!
//! Message model and geometry for the brain relay hub.
//!
//! - [`messages`]: typed decoding of robot/frontend frames, outbound frames
//! - [`transform`]: range–bearing sample to global map point
//! - [`pose`]: robot pose, map points and the last-known pose tracker
//! - [`ids`]: branded connection identifiers
//!
//! Nothing in this crate performs I/O.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod messages;
pub mod pose;
pub mod transform;

pub use errors::DecodeError;
pub use ids::{ClientId, RobotId};
pub use messages::{InboundMessage, OutboundMessage, RangeSample, Role, StatusReport};
pub use pose::{MapPoint, Pose, PoseTracker};
pub use transform::{transform, CoordinateTransformer};
