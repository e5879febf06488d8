use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::MemberEntity,
    dto::{
        messages::{ServerEvent, ServerMessage},
        ws::{ClientMessage, IdentifyAck, PlayerIdentity},
    },
    error::ServiceError,
    services::{
        dispatcher::dispatch,
        room_engine::{self, RoomCommand, normalize_room_code},
        room_events::send_to,
    },
    state::{ConnectionHandle, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reasons a socket is dropped before it identified itself.
#[derive(Debug, Error)]
enum SocketError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("identification timed out")]
    IdentificationTimeout,
    #[error("first message was not an identification")]
    NotIdentified,
    #[error("malformed identification: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid player id or username: {0}")]
    InvalidIdentity(#[from] ValidationErrors),
    #[error("websocket error: {0}")]
    Transport(#[from] axum::Error),
}

/// Identified player behind a socket.
struct Session {
    player: MemberEntity,
    connection: ConnectionHandle,
}

/// Handle the full lifecycle of a player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Message>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Writer task keeps room broadcasts flowing while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(message) = control_rx.recv() => message,
                Some(event) = event_rx.recv() => Message::Text(event.data.into()),
                else => break,
            };
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    let player = match identify(&mut receiver).await {
        Ok(player) => player,
        Err(err) => {
            warn!(error = %err, "closing unidentified websocket");
            finalize(writer_task, control_tx).await;
            return;
        }
    };

    let session = Session {
        connection: ConnectionHandle::new(event_tx),
        player,
    };
    state
        .presence()
        .register(&session.player.player_id, session.connection.clone());
    if let Ok(ack) = ServerEvent::json(None::<String>, &IdentifyAck::new(&session.player.player_id)) {
        session.connection.send(ack);
    }
    info!(
        player_id = %session.player.player_id,
        connection = %session.connection.id,
        "player connected"
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(player_id = %session.player.player_id, payload = %text, "received client message");
                let result = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => handle_client_message(&state, &session, message).await,
                    Err(err) => Err(ServiceError::InvalidInput(format!(
                        "malformed message: {err}"
                    ))),
                };
                if let Err(err) = result {
                    report_error(&session, &err);
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = control_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(player_id = %session.player.player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Membership survives the disconnect so the player can rejoin the running game.
    let room = state.channels().unsubscribe(session.connection.id);
    state.presence().unregister(session.connection.id);
    info!(
        player_id = %session.player.player_id,
        room = room.as_deref().unwrap_or("-"),
        "player disconnected"
    );

    drop(session);
    finalize(writer_task, control_tx).await;
}

/// Wait for the `identify` frame that must open every connection.
async fn identify<S>(receiver: &mut S) -> Result<MemberEntity, SocketError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let text = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return Err(SocketError::ConnectionClosed),
        Ok(Some(Ok(_))) => return Err(SocketError::NotIdentified),
        Ok(Some(Err(err))) => return Err(err.into()),
        Err(_) => return Err(SocketError::IdentificationTimeout),
    };

    parse_identity(&text)
}

fn parse_identity(text: &str) -> Result<MemberEntity, SocketError> {
    let message: ClientMessage = serde_json::from_str(text)?;
    let (player_id, username) = message.identity().ok_or(SocketError::NotIdentified)?;
    let identity = PlayerIdentity::new(player_id, username);
    identity.validate()?;
    Ok(MemberEntity::new(identity.player_id, identity.username))
}

/// Route one client command to the room engine.
async fn handle_client_message(
    state: &SharedState,
    session: &Session,
    message: ClientMessage,
) -> Result<(), ServiceError> {
    let player_id = session.player.player_id.clone();

    let (room_code, command) = match message {
        ClientMessage::CreateRoom => {
            room_engine::create_room(
                state,
                session.player.clone(),
                Some(session.connection.clone()),
            )
            .await?;
            return Ok(());
        }
        ClientMessage::Identify { .. } => {
            warn!(player_id = %player_id, "ignoring duplicate identification message");
            return Ok(());
        }
        ClientMessage::Unknown => {
            return Err(ServiceError::InvalidInput("unknown message type".into()));
        }
        ClientMessage::JoinRoom { room_code } => (
            room_code,
            RoomCommand::Join {
                player: session.player.clone(),
                connection: Some(session.connection.clone()),
            },
        ),
        ClientMessage::LeaveRoom { room_code } => (
            room_code,
            RoomCommand::Leave {
                player_id,
                connection_id: Some(session.connection.id),
            },
        ),
        ClientMessage::AddIdea { room_code, text } => {
            (room_code, RoomCommand::SubmitIdea { player_id, text })
        }
        ClientMessage::StartGame { room_code } => (room_code, RoomCommand::StartGame { player_id }),
        ClientMessage::MarkEvent {
            room_code,
            event_id,
        } => (
            room_code,
            RoomCommand::MarkEvent {
                player_id,
                event_id,
            },
        ),
        ClientMessage::UpdateCheckedCount { room_code, count } => (
            room_code,
            RoomCommand::UpdateProgress {
                player_id,
                checked_count: count,
            },
        ),
        ClientMessage::ClaimLine { room_code } => (room_code, RoomCommand::ClaimLine { player_id }),
        ClientMessage::ClaimBingo { room_code } => {
            (room_code, RoomCommand::ClaimBingo { player_id })
        }
        ClientMessage::Chat { room_code, text } => {
            (room_code, RoomCommand::Chat { player_id, text })
        }
        ClientMessage::DeleteRoom { room_code } => (room_code, RoomCommand::Delete { player_id }),
    };

    let code = normalize_room_code(&room_code)?;
    dispatch(state, &code, command).await?;
    Ok(())
}

/// Send `err` to the originating connection only.
fn report_error(session: &Session, err: &ServiceError) {
    match err {
        ServiceError::Unavailable(_) | ServiceError::Internal(_) | ServiceError::Timeout => {
            warn!(player_id = %session.player.player_id, error = %err, "room command failed")
        }
        _ => debug!(player_id = %session.player.player_id, error = %err, "room command rejected"),
    }

    send_to(
        &session.connection,
        &ServerMessage::Error {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        },
    );
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, control_tx: mpsc::UnboundedSender<Message>) {
    let _ = control_tx.send(Message::Close(None));
    drop(control_tx);
    let _ = writer_task.await;
}
