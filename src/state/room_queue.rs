use dashmap::DashMap;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, error::SendError},
    oneshot,
};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::room_engine::{CommandOutcome, RoomCommand},
};

/// Command waiting in a room queue together with the channel its result goes back on.
pub struct QueuedCommand {
    pub command: RoomCommand,
    pub reply: oneshot::Sender<Result<CommandOutcome, ServiceError>>,
}

/// Sending side of a room's queue, tagged with the worker that drains it.
pub struct QueueHandle {
    pub worker: Uuid,
    pub tx: mpsc::UnboundedSender<QueuedCommand>,
    /// Set once the room is deleted; the worker releases the queue as soon as it is drained.
    retired: bool,
}

impl QueueHandle {
    pub fn new(worker: Uuid, tx: mpsc::UnboundedSender<QueuedCommand>) -> Self {
        Self {
            worker,
            tx,
            retired: false,
        }
    }
}

/// One single-consumer command queue per room.
///
/// Sends and releases both run under the map entry lock, so a queue is never released while
/// a command is in flight towards it.
#[derive(Default)]
pub struct RoomQueues {
    queues: DashMap<String, QueueHandle>,
}

impl RoomQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `queued` on the queue of `code`, installing the handle built by `spawn` first when
    /// the room has no worker.
    pub fn send(
        &self,
        code: &str,
        queued: QueuedCommand,
        spawn: impl FnOnce() -> QueueHandle,
    ) -> Result<(), SendError<QueuedCommand>> {
        let handle = self.queues.entry(code.to_owned()).or_insert_with(spawn);
        handle.tx.send(queued)
    }

    /// Forget the queue of `code` if its worker is gone.
    pub fn discard_closed(&self, code: &str) {
        self.queues.remove_if(code, |_, handle| handle.tx.is_closed());
    }

    /// Mark the queue of a deleted room. Commands already queued still run in order.
    pub fn retire(&self, code: &str) {
        if let Some(mut handle) = self.queues.get_mut(code) {
            handle.retired = true;
        }
    }

    pub fn is_retired(&self, code: &str, worker: Uuid) -> bool {
        self.queues
            .get(code)
            .is_some_and(|handle| handle.worker == worker && handle.retired)
    }

    /// Detach the queue of `code` when `worker` owns it and `rx` holds nothing more.
    pub fn release(
        &self,
        code: &str,
        worker: Uuid,
        rx: &UnboundedReceiver<QueuedCommand>,
    ) -> bool {
        self.queues
            .remove_if(code, |_, handle| handle.worker == worker && rx.is_empty())
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
