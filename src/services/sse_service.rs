use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::{
    dao::room_store::RoomStore,
    dto::messages::{Handshake, ServerEvent, SystemStatus},
    error::ServiceError,
    services::room_engine::normalize_room_code,
    state::{ConnectionHandle, SharedState},
};

/// Read-only subscription of a spectator to one room's broadcasts.
pub struct RoomSubscription {
    pub code: String,
    connection: ConnectionHandle,
    receiver: UnboundedReceiver<ServerEvent>,
}

/// Subscribe a spectator to the room `raw_code`. The handshake is queued as first event.
pub async fn subscribe_room(
    state: &SharedState,
    raw_code: &str,
) -> Result<RoomSubscription, ServiceError> {
    let code = normalize_room_code(raw_code)?;
    let storage = state.require_storage().await?;
    if storage.find_room(code.clone()).await?.is_none() {
        return Err(ServiceError::NotFound(format!("room {code}")));
    }

    let (tx, receiver) = mpsc::unbounded_channel();
    let connection = ConnectionHandle::new(tx);
    let handshake = Handshake {
        room_code: code.clone(),
        message: format!("watching room {code}"),
        degraded: state.is_degraded().await,
    };
    if let Ok(event) = ServerEvent::json("handshake".to_owned(), &handshake) {
        connection.send(event);
    }
    state.channels().subscribe(&code, connection.clone());
    info!(code = %code, connection = %connection.id, "spectator subscribed");

    Ok(RoomSubscription {
        code,
        connection,
        receiver,
    })
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

fn system_status_event(degraded: bool) -> Option<Event> {
    ServerEvent::json("system_status".to_owned(), &SystemStatus { degraded })
        .ok()
        .map(to_event)
}

/// Convert a room subscription into an SSE response, forwarding room events and degraded
/// mode changes, and unsubscribing once the client disconnects or the room is deleted.
pub fn to_sse_stream(
    state: SharedState,
    subscription: RoomSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let RoomSubscription {
        code,
        connection,
        mut receiver,
    } = subscription;
    let connection_id = connection.id;
    // the channel table holds the only sender, so closing the room ends the stream
    drop(connection);
    let mut degraded = state.degraded_watcher();
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                payload = receiver.recv() => {
                    let Some(payload) = payload else { break };
                    if tx.send(Ok(to_event(payload))).await.is_err() {
                        break;
                    }
                }
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *degraded.borrow_and_update();
                    let Some(event) = system_status_event(value) else { continue };
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        state.channels().unsubscribe(connection_id);
        info!(code = %code, connection = %connection_id, "spectator stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::{
            room_engine::create_room,
            room_events::broadcast_notice,
            test_support::{host, state_with_config},
        },
    };

    #[tokio::test]
    async fn spectators_get_a_handshake_then_room_broadcasts() {
        let (state, _store) = state_with_config(AppConfig::default()).await;
        let room = create_room(&state, host(), None).await.unwrap();

        let mut subscription = subscribe_room(&state, &room.code.to_lowercase())
            .await
            .unwrap();
        assert_eq!(subscription.code, room.code);

        broadcast_notice(&state, &room.code, "hello spectators");

        let handshake = subscription.receiver.try_recv().unwrap();
        assert_eq!(handshake.event.as_deref(), Some("handshake"));
        let notice = subscription.receiver.try_recv().unwrap();
        assert_eq!(notice.event.as_deref(), Some("notice"));
        assert!(notice.data.contains("hello spectators"));
    }

    #[tokio::test]
    async fn unknown_rooms_cannot_be_watched() {
        let (state, _store) = state_with_config(AppConfig::default()).await;
        let result = subscribe_room(&state, "NOPE42").await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn degraded_mode_refuses_new_spectators() {
        let (state, _store) = state_with_config(AppConfig::default()).await;
        state.clear_storage().await;
        let result = subscribe_room(&state, "ABCDEF").await;
        assert!(matches!(result, Err(ServiceError::Degraded)));
    }
}
