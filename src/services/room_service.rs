//! REST facing room operations. Mutations go through the room queues like WebSocket commands.

use crate::{
    dao::{models::MemberEntity, room_store::RoomStore},
    dto::room::{CreateRoomRequest, JoinRoomRequest, PlayerRequest, RoomListItem, RoomSummary},
    error::ServiceError,
    services::{
        dispatcher::dispatch,
        room_engine::{self, CommandOutcome, RoomCommand, normalize_room_code},
    },
    state::SharedState,
};

pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomSummary, ServiceError> {
    let actor = MemberEntity::new(request.player_id.trim(), request.username.trim());
    let room = room_engine::create_room(state, actor, None).await?;
    Ok(RoomSummary::from(&room))
}

/// Join without a live connection; the player attaches one later over the WebSocket.
pub async fn join_room(
    state: &SharedState,
    request: JoinRoomRequest,
) -> Result<RoomSummary, ServiceError> {
    let code = normalize_room_code(&request.code)?;
    let player = MemberEntity::new(request.player_id.trim(), request.username.trim());

    match dispatch(
        state,
        &code,
        RoomCommand::Join {
            player,
            connection: None,
        },
    )
    .await?
    {
        CommandOutcome::Room(room) => Ok(RoomSummary::from(&room)),
        CommandOutcome::Done => room_details(state, &code).await,
    }
}

pub async fn room_details(state: &SharedState, raw_code: &str) -> Result<RoomSummary, ServiceError> {
    let code = normalize_room_code(raw_code)?;
    let storage = state.require_storage().await?;
    let room = storage
        .find_room(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {code}")))?;
    Ok(RoomSummary::from(&room))
}

pub async fn leave_room(
    state: &SharedState,
    raw_code: &str,
    request: PlayerRequest,
) -> Result<(), ServiceError> {
    let code = normalize_room_code(raw_code)?;
    dispatch(
        state,
        &code,
        RoomCommand::Leave {
            player_id: request.player_id.trim().to_owned(),
            connection_id: None,
        },
    )
    .await?;
    Ok(())
}

pub async fn delete_room(
    state: &SharedState,
    raw_code: &str,
    request: PlayerRequest,
) -> Result<(), ServiceError> {
    let code = normalize_room_code(raw_code)?;
    dispatch(
        state,
        &code,
        RoomCommand::Delete {
            player_id: request.player_id.trim().to_owned(),
        },
    )
    .await?;
    Ok(())
}

/// Rooms `player_id` belongs to, most recently updated first.
pub async fn list_rooms_for_player(
    state: &SharedState,
    player_id: &str,
) -> Result<Vec<RoomListItem>, ServiceError> {
    let storage = state.require_storage().await?;
    let rooms = storage.list_rooms_for_member(player_id.to_owned()).await?;
    Ok(rooms.into_iter().map(RoomListItem::from).collect())
}
