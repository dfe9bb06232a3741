//! # brain-server
//!
//! Relay hub between one robot and any number of frontends.
//!
//! - `/ws/robot`: the single robot session, bounded by a receive timeout
//! - `/ws/client`: frontend sessions; their commands are forwarded to the robot
//! - `/health`: liveness, session counts, last-known pose, metrics
//!
//! Robot telemetry fans out to every frontend; range samples are converted to
//! map points on the way through.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod connection;
pub mod errors;
pub mod health;
pub mod hub;
pub mod liveness;
pub mod registry;
pub mod router;
pub mod server;
pub mod shutdown;

pub use errors::{SendError, ServerError};
pub use hub::Hub;
pub use server::{
    build_router, start, AppState, ServerConfig, ServerHandle, CLIENT_PATH, ROBOT_PATH,
};
