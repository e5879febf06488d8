use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::room::{CreateRoomRequest, JoinRoomRequest, PlayerRequest, RoomListItem, RoomSummary},
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Room management endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{code}", get(room_details).delete(delete_room))
        .route("/rooms/{code}/leave", post(leave_room))
        .route("/players/{player_id}/rooms", get(player_rooms))
}

/// Create a room hosted by the caller.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomSummary),
        (status = 400, description = "Invalid payload"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::create_room(&state, payload).await?))
}

/// Join a room by code. Joining twice is harmless.
#[utoipa::path(
    post,
    path = "/rooms/join",
    tag = "rooms",
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Room joined", body = RoomSummary),
        (status = 404, description = "Unknown room code")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::join_room(&state, payload).await?))
}

#[utoipa::path(
    get,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    responses(
        (status = 200, description = "Room", body = RoomSummary),
        (status = 404, description = "Unknown room code")
    )
)]
/// Retrieve a room by code.
pub async fn room_details(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomSummary>, AppError> {
    Ok(Json(room_service::room_details(&state, &code).await?))
}

/// Leave a room. The host role moves on and an emptied room is deleted.
#[utoipa::path(
    post,
    path = "/rooms/{code}/leave",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    request_body = PlayerRequest,
    responses(
        (status = 204, description = "Left the room"),
        (status = 403, description = "Caller is not a member")
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<StatusCode, AppError> {
    room_service::leave_room(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a room. Host only.
#[utoipa::path(
    delete,
    path = "/rooms/{code}",
    tag = "rooms",
    params(("code" = String, Path, description = "Room code, case-insensitive")),
    request_body = PlayerRequest,
    responses(
        (status = 204, description = "Room deleted"),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn delete_room(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<PlayerRequest>>,
) -> Result<StatusCode, AppError> {
    room_service::delete_room(&state, &code, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/players/{player_id}/rooms",
    tag = "rooms",
    params(("player_id" = String, Path, description = "Player identifier")),
    responses((status = 200, description = "Rooms of the player, most recent first", body = [RoomListItem]))
)]
/// List the rooms a player belongs to.
pub async fn player_rooms(
    State(state): State<SharedState>,
    Path(player_id): Path<String>,
) -> Result<Json<Vec<RoomListItem>>, AppError> {
    Ok(Json(
        room_service::list_rooms_for_player(&state, &player_id).await?,
    ))
}
