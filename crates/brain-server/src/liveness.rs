//! Frame reception with an optional inactivity deadline.
//!
//! The robot link is bounded: if nothing at all arrives within the timeout the
//! session is considered dead. Frontend links are unbounded and only end when
//! the peer goes away. Control frames (ping, pong) and binary payloads are not
//! surfaced to callers but still count as activity.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};

/// Result of waiting for the next text frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Frame(String),
    /// Peer sent a close frame or the stream ended.
    Closed,
    /// No traffic of any kind within the deadline.
    TimedOut,
    Error(String),
}

/// Pulls text frames out of a WebSocket stream.
pub struct FrameReceiver<S> {
    stream: S,
    timeout: Option<Duration>,
}

impl<S, E> FrameReceiver<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    /// No deadline: waits as long as the peer stays connected.
    pub fn unbounded(stream: S) -> Self {
        Self {
            stream,
            timeout: None,
        }
    }

    /// Each receive fails with [`ReceiveOutcome::TimedOut`] after `timeout`
    /// of silence. The deadline restarts on every frame, text or not.
    pub fn with_timeout(stream: S, timeout: Duration) -> Self {
        Self {
            stream,
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn recv(&mut self) -> ReceiveOutcome {
        loop {
            let next = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, self.stream.next()).await {
                    Ok(next) => next,
                    Err(_) => return ReceiveOutcome::TimedOut,
                },
                None => self.stream.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    return ReceiveOutcome::Frame(text.as_str().to_owned())
                }
                Some(Ok(Message::Close(_))) | None => return ReceiveOutcome::Closed,
                Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_))) => {
                    tracing::trace!("non-text frame");
                }
                Some(Err(e)) => return ReceiveOutcome::Error(e.to_string()),
            }
        }
    }
}
