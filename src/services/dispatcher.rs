//! Per-room command queues: commands for one room run one at a time, in arrival order.

use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, error::SendError},
        oneshot,
    },
    time::{sleep, timeout},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::room_engine::{self, CommandOutcome, RoomCommand},
    state::{
        SharedState,
        room_queue::{QueueHandle, QueuedCommand},
    },
};

/// Queue `command` on the room `code` and wait for its result.
///
/// The wait is bounded by the configured command timeout. A timed out command is not
/// cancelled and still runs when its turn comes.
pub async fn dispatch(
    state: &SharedState,
    code: &str,
    command: RoomCommand,
) -> Result<CommandOutcome, ServiceError> {
    let command_name = command.name();
    let (reply, response) = oneshot::channel();
    enqueue(state, code, QueuedCommand { command, reply });

    match timeout(state.config().command_timeout(), response).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(ServiceError::Internal(format!(
            "room worker for {code} dropped the command"
        ))),
        Err(_) => {
            warn!(code, command = command_name, "room command timed out");
            Err(ServiceError::Timeout)
        }
    }
}

/// Delete the finished room `code` once the grace period is over.
pub fn schedule_expiry(state: &SharedState, code: &str) {
    let state = state.clone();
    let code = code.to_owned();
    let grace = state.config().finish_grace();

    tokio::spawn(async move {
        sleep(grace).await;
        if let Err(err) = dispatch(&state, &code, RoomCommand::Expire).await {
            warn!(code = %code, error = %err, "failed to expire finished room");
        }
    });
}

fn enqueue(state: &SharedState, code: &str, mut queued: QueuedCommand) {
    loop {
        let sent = state
            .queues()
            .send(code, queued, || spawn_worker(state.clone(), code.to_owned()));

        match sent {
            Ok(()) => return,
            Err(SendError(returned)) => {
                debug!(code, "room queue closed; starting a fresh worker");
                state.queues().discard_closed(code);
                queued = returned;
            }
        }
    }
}

fn spawn_worker(state: SharedState, code: String) -> QueueHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = Uuid::new_v4();
    tokio::spawn(run_worker(state, code, worker, rx));
    QueueHandle::new(worker, tx)
}

async fn run_worker(
    state: SharedState,
    code: String,
    worker: Uuid,
    mut rx: UnboundedReceiver<QueuedCommand>,
) {
    debug!(code = %code, %worker, "room worker started");
    let idle = state.config().room_idle_timeout();

    loop {
        match timeout(idle, rx.recv()).await {
            Ok(Some(queued)) => {
                process(&state, &code, queued).await;
                if state.queues().is_retired(&code, worker)
                    && state.queues().release(&code, worker, &rx)
                {
                    debug!(code = %code, %worker, "room deleted; worker released");
                    break;
                }
            }
            Ok(None) => break,
            Err(_) => {
                if state.queues().release(&code, worker, &rx) {
                    debug!(code = %code, %worker, "room worker idle");
                    break;
                }
            }
        }
    }

    debug!(code = %code, %worker, "room worker stopped");
}

async fn process(state: &SharedState, code: &str, queued: QueuedCommand) {
    let QueuedCommand { command, reply } = queued;
    let command_name = command.name();
    let result = room_engine::execute(state, code, command).await;
    if let Err(err) = &result {
        debug!(code, command = command_name, error = %err, "room command rejected");
    }
    let _ = reply.send(result);
}
