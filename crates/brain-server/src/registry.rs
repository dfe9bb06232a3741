use brain_core::{ClientId, RobotId};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::errors::SendError;

/// Outbound side of one frontend connection.
#[derive(Clone, Debug)]
pub struct FrontendHandle {
    id: ClientId,
    tx: mpsc::Sender<String>,
}

impl FrontendHandle {
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Queue a frame for this frontend without waiting.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(SendError::from)
    }
}

/// Outbound side of the robot connection, plus its eviction signal.
#[derive(Clone, Debug)]
pub struct RobotHandle {
    id: RobotId,
    tx: mpsc::Sender<String>,
    evicted: CancellationToken,
}

impl RobotHandle {
    pub fn id(&self) -> &RobotId {
        &self.id
    }

    /// Queue a frame for the robot without waiting.
    pub fn send(&self, frame: String) -> Result<(), SendError> {
        self.tx.try_send(frame).map_err(SendError::from)
    }

    /// Ask this session to end because another robot took the slot.
    pub fn evict(&self) {
        self.evicted.cancel();
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }

    /// Resolves once [`evict`](Self::evict) has been called.
    pub fn evicted(&self) -> WaitForCancellationFuture<'_> {
        self.evicted.cancelled()
    }
}

/// Who is connected right now: at most one robot, any number of frontends.
pub struct SessionRegistry {
    robot: RwLock<Option<RobotHandle>>,
    frontends: DashMap<ClientId, FrontendHandle>,
    max_send_queue: usize,
}

impl SessionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            robot: RwLock::new(None),
            frontends: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Install a new robot session. Returns the handle it replaced, if any;
    /// the caller decides what to do with the displaced session.
    pub fn register_robot(&self) -> (RobotHandle, mpsc::Receiver<String>, Option<RobotHandle>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let handle = RobotHandle {
            id: RobotId::new(),
            tx,
            evicted: CancellationToken::new(),
        };
        let previous = self.robot.write().replace(handle.clone());
        (handle, rx, previous)
    }

    /// Clear the robot slot, but only if `id` still owns it.
    pub fn unregister_robot(&self, id: &RobotId) -> Option<RobotHandle> {
        let mut slot = self.robot.write();
        if slot.as_ref().is_some_and(|current| current.id() == id) {
            slot.take()
        } else {
            None
        }
    }

    pub fn current_robot(&self) -> Option<RobotHandle> {
        self.robot.read().clone()
    }

    pub fn robot_connected(&self) -> bool {
        self.robot.read().is_some()
    }

    pub fn register_frontend(&self) -> (FrontendHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let handle = FrontendHandle {
            id: ClientId::new(),
            tx,
        };
        self.frontends.insert(handle.id.clone(), handle.clone());
        (handle, rx)
    }

    /// Remove a frontend. Removing an unknown id is a no-op.
    pub fn unregister_frontend(&self, id: &ClientId) -> bool {
        self.frontends.remove(id).is_some()
    }

    /// Point-in-time copy of the frontend set, safe to iterate while
    /// connections come and go.
    pub fn frontend_snapshot(&self) -> Vec<FrontendHandle> {
        self.frontends
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn frontend_count(&self) -> usize {
        self.frontends.len()
    }
}
