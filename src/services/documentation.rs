use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Bingo Caos Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::create_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::room_details,
        crate::routes::rooms::leave_room,
        crate::routes::rooms::delete_room,
        crate::routes::rooms::player_rooms,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::room::CreateRoomRequest,
            crate::dto::room::JoinRoomRequest,
            crate::dto::room::PlayerRequest,
            crate::dto::room::RoomSummary,
            crate::dto::room::RoomListItem,
            crate::dto::room::LiveStateSnapshot,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::IdentifyAck,
            crate::dto::messages::ServerMessage,
            crate::dto::messages::Handshake,
            crate::dto::messages::SystemStatus,
            crate::state::status::RoomStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Room management"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "players", description = "WebSocket operations for players"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_public_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/rooms",
            "/rooms/join",
            "/rooms/{code}",
            "/rooms/{code}/leave",
            "/rooms/{code}/stream",
            "/players/{player_id}/rooms",
            "/ws",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
