//! Per-socket pumps.
//!
//! Each WebSocket is split into a writer task that drains the connection's
//! outbound queue and a reader loop that feeds the router. The reader decides
//! when the session ends; the writer then sends a Close frame and stops.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use brain_core::Role;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::hub::Hub;
use crate::liveness::{FrameReceiver, ReceiveOutcome};
use crate::registry::RobotHandle;

/// Upper bound on how long a writer may take to flush its Close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    TimedOut,
    TransportError(String),
    /// Another robot took the slot.
    Evicted,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::TimedOut => "timed_out",
            Self::TransportError(_) => "transport_error",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Timing shared by all sessions.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub robot_timeout: Duration,
    pub heartbeat_interval: Duration,
}

/// Drain `rx` into `sink` until `close` fires, the queue closes, or a send
/// fails. Sends a ping every `heartbeat` if given. Cancels `link_lost` on
/// exit so the reader can stop waiting on a dead socket.
pub async fn write_frames<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<String>,
    heartbeat: Option<Duration>,
    close: CancellationToken,
    link_lost: CancellationToken,
) where
    W: Sink<Message> + Unpin,
{
    let mut ping = heartbeat.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            () = close.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = rx.recv() => {
                match msg {
                    Some(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            () = next_tick(&mut ping) => {
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                trace!("sent ping");
            }
        }
    }

    link_lost.cancel();
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Reader loop for the robot. Returns once the session is over; the caller
/// is responsible for detaching it from the hub.
pub async fn run_robot_session<S, E>(
    stream: S,
    robot: &RobotHandle,
    hub: &Hub,
    timeout: Duration,
    shutdown: &CancellationToken,
    link_lost: &CancellationToken,
) -> DisconnectReason
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut receiver = FrameReceiver::with_timeout(stream, timeout);
    loop {
        let outcome = tokio::select! {
            () = robot.evicted() => return DisconnectReason::Evicted,
            () = shutdown.cancelled() => return DisconnectReason::Shutdown,
            () = link_lost.cancelled() => {
                return DisconnectReason::TransportError("outbound link lost".into())
            }
            outcome = receiver.recv() => outcome,
        };
        match outcome {
            ReceiveOutcome::Frame(text) => {
                let outcome = hub.router().route(Role::Robot, &text);
                trace!(robot_id = %robot.id(), ?outcome, "robot frame routed");
            }
            ReceiveOutcome::Closed => return DisconnectReason::Closed,
            ReceiveOutcome::TimedOut => return DisconnectReason::TimedOut,
            ReceiveOutcome::Error(e) => return DisconnectReason::TransportError(e),
        }
    }
}

/// Reader loop for one frontend.
pub async fn run_frontend_session<S, E>(
    stream: S,
    hub: &Hub,
    shutdown: &CancellationToken,
    link_lost: &CancellationToken,
) -> DisconnectReason
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut receiver = FrameReceiver::unbounded(stream);
    loop {
        let outcome = tokio::select! {
            () = shutdown.cancelled() => return DisconnectReason::Shutdown,
            () = link_lost.cancelled() => {
                return DisconnectReason::TransportError("outbound link lost".into())
            }
            outcome = receiver.recv() => outcome,
        };
        match outcome {
            ReceiveOutcome::Frame(text) => {
                let outcome = hub.router().route(Role::Frontend, &text);
                trace!(?outcome, "frontend frame routed");
            }
            ReceiveOutcome::Closed => return DisconnectReason::Closed,
            ReceiveOutcome::TimedOut => return DisconnectReason::TimedOut,
            ReceiveOutcome::Error(e) => return DisconnectReason::TransportError(e),
        }
    }
}

/// Full lifecycle of a robot socket.
pub async fn serve_robot(
    socket: WebSocket,
    hub: Arc<Hub>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (sink, stream) = socket.split();
    let (robot, rx) = hub.attach_robot();
    let close = CancellationToken::new();
    let link_lost = CancellationToken::new();
    let writer = tokio::spawn(write_frames(
        sink,
        rx,
        None,
        close.clone(),
        link_lost.clone(),
    ));

    let reason = run_robot_session(
        stream,
        &robot,
        &hub,
        config.robot_timeout,
        &shutdown,
        &link_lost,
    )
    .await;
    hub.detach_robot(robot.id(), &reason);

    close.cancel();
    drain_writer(writer).await;
}

/// Full lifecycle of a frontend socket.
pub async fn serve_frontend(
    socket: WebSocket,
    hub: Arc<Hub>,
    config: SessionConfig,
    shutdown: CancellationToken,
) {
    let (sink, stream) = socket.split();
    let (frontend, rx) = hub.attach_frontend();
    let close = CancellationToken::new();
    let link_lost = CancellationToken::new();
    let writer = tokio::spawn(write_frames(
        sink,
        rx,
        Some(config.heartbeat_interval),
        close.clone(),
        link_lost.clone(),
    ));

    let reason = run_frontend_session(stream, &hub, &shutdown, &link_lost).await;
    hub.detach_frontend(frontend.id(), &reason);

    close.cancel();
    drain_writer(writer).await;
}

async fn drain_writer(mut writer: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_telemetry::metrics::MetricsRecorder;
    use futures::channel::mpsc as fmpsc;
    use tokio_stream::wrappers::ReceiverStream;

    type Item = Result<Message, std::io::Error>;

    fn inbound() -> (mpsc::Sender<Item>, ReceiverStream<Item>) {
        let (tx, rx) = mpsc::channel(16);
        (tx, ReceiverStream::new(rx))
    }

    fn text(s: &str) -> Item {
        Ok(Message::Text(s.into()))
    }

    fn hub() -> Arc<Hub> {
        Arc::new(Hub::new(16, Arc::new(MetricsRecorder::new())))
    }

    #[test]
    fn reason_labels() {
        assert_eq!(DisconnectReason::Closed.as_str(), "closed");
        assert_eq!(DisconnectReason::TimedOut.as_str(), "timed_out");
        assert_eq!(
            DisconnectReason::TransportError("x".into()).as_str(),
            "transport_error"
        );
        assert_eq!(DisconnectReason::Evicted.as_str(), "evicted");
        assert_eq!(DisconnectReason::Shutdown.as_str(), "shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn silent_robot_times_out_and_frontends_hear_once() {
        let hub = hub();
        let (_frontend, mut frontend_rx) = hub.attach_frontend();
        let (robot, _robot_rx) = hub.attach_robot();
        let (_tx, stream) = inbound();

        let reason = run_robot_session(
            stream,
            &robot,
            &hub,
            Duration::from_secs(2),
            &CancellationToken::new(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(reason, DisconnectReason::TimedOut);
        hub.detach_robot(robot.id(), &reason);

        let frame = frontend_rx.try_recv().unwrap();
        assert!(frame.contains("robot_disconnected"));
        assert!(frontend_rx.try_recv().is_err());
        assert!(hub.registry().current_robot().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn robot_frames_reach_frontends_before_timeout() {
        let hub = hub();
        let (_frontend, mut frontend_rx) = hub.attach_frontend();
        let (robot, _robot_rx) = hub.attach_robot();
        let (tx, stream) = inbound();

        tx.send(text(r#"{"type":"status","bat":12.0,"mode":"IDLE"}"#))
            .await
            .unwrap();
        tx.send(text("garbage")).await.unwrap();
        tx.send(text(r#"{"type":"config","rate":5}"#)).await.unwrap();

        let reason = run_robot_session(
            stream,
            &robot,
            &hub,
            Duration::from_secs(2),
            &CancellationToken::new(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(reason, DisconnectReason::TimedOut);
        assert_eq!(
            frontend_rx.try_recv().unwrap(),
            r#"{"type":"status","bat":12.0,"mode":"IDLE"}"#
        );
        assert_eq!(frontend_rx.try_recv().unwrap(), r#"{"type":"config","rate":5}"#);
    }

    #[tokio::test]
    async fn robot_close_ends_session() {
        let hub = hub();
        let (robot, _robot_rx) = hub.attach_robot();
        let (tx, stream) = inbound();
        tx.send(Ok(Message::Close(None))).await.unwrap();

        let reason = run_robot_session(
            stream,
            &robot,
            &hub,
            Duration::from_secs(2),
            &CancellationToken::new(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(reason, DisconnectReason::Closed);
    }

    #[tokio::test]
    async fn eviction_ends_old_robot_session() {
        let hub = hub();
        let (old, _old_rx) = hub.attach_robot();
        let (_tx, stream) = inbound();

        let session_hub = Arc::clone(&hub);
        let session_robot = old.clone();
        let session = tokio::spawn(async move {
            run_robot_session(
                stream,
                &session_robot,
                &session_hub,
                Duration::from_secs(60),
                &CancellationToken::new(),
                &CancellationToken::new(),
            )
            .await
        });

        let (_new, _new_rx) = hub.attach_robot();
        assert_eq!(session.await.unwrap(), DisconnectReason::Evicted);
    }

    #[tokio::test]
    async fn shutdown_ends_sessions() {
        let hub = hub();
        let (robot, _robot_rx) = hub.attach_robot();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let (_tx, stream) = inbound();
        let reason = run_robot_session(
            stream,
            &robot,
            &hub,
            Duration::from_secs(60),
            &shutdown,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(reason, DisconnectReason::Shutdown);

        let (_tx, stream) = inbound();
        let reason =
            run_frontend_session(stream, &hub, &shutdown, &CancellationToken::new()).await;
        assert_eq!(reason, DisconnectReason::Shutdown);
    }

    #[tokio::test]
    async fn frontend_commands_reach_robot() {
        let hub = hub();
        let (_robot, mut robot_rx) = hub.attach_robot();
        let (tx, stream) = inbound();
        tx.send(text(r#"{"cmd":"forward","speed":0.4}"#)).await.unwrap();
        tx.send(text("{oops")).await.unwrap();
        tx.send(text(r#"{"cmd":"stop"}"#)).await.unwrap();
        drop(tx);

        let reason = run_frontend_session(
            stream,
            &hub,
            &CancellationToken::new(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(reason, DisconnectReason::Closed);
        assert_eq!(robot_rx.try_recv().unwrap(), r#"{"cmd":"forward","speed":0.4}"#);
        assert_eq!(robot_rx.try_recv().unwrap(), r#"{"cmd":"stop"}"#);
        assert!(robot_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn writer_forwards_queue_then_closes() {
        let (sink, mut sent) = fmpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(4);
        let close = CancellationToken::new();
        let link_lost = CancellationToken::new();

        tx.send("one".to_owned()).await.unwrap();
        let writer = tokio::spawn(write_frames(
            sink,
            rx,
            None,
            close.clone(),
            link_lost.clone(),
        ));

        assert_eq!(sent.next().await, Some(Message::Text("one".into())));
        close.cancel();
        writer.await.unwrap();

        assert_eq!(sent.next().await, Some(Message::Close(None)));
        assert!(link_lost.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn writer_pings_on_heartbeat() {
        let (sink, mut sent) = fmpsc::unbounded::<Message>();
        let (_tx, rx) = mpsc::channel::<String>(4);
        let close = CancellationToken::new();

        let writer = tokio::spawn(write_frames(
            sink,
            rx,
            Some(Duration::from_secs(30)),
            close.clone(),
            CancellationToken::new(),
        ));

        assert!(matches!(sent.next().await, Some(Message::Ping(_))));
        assert!(matches!(sent.next().await, Some(Message::Ping(_))));
        close.cancel();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn writer_stops_when_sink_fails() {
        let (sink, sent) = fmpsc::unbounded::<Message>();
        drop(sent);
        let (tx, rx) = mpsc::channel(4);
        let link_lost = CancellationToken::new();

        tx.send("lost".to_owned()).await.unwrap();
        write_frames(sink, rx, None, CancellationToken::new(), link_lost.clone()).await;
        assert!(link_lost.is_cancelled());
    }

    #[tokio::test]
    async fn lost_link_ends_reader() {
        let hub = hub();
        let link_lost = CancellationToken::new();
        link_lost.cancel();
        let (_tx, stream) = inbound();

        let reason =
            run_frontend_session(stream, &hub, &CancellationToken::new(), &link_lost).await;
        assert!(matches!(reason, DisconnectReason::TransportError(_)));
    }
}
