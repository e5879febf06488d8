use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: &'static str,
    /// Players with a live WebSocket connection.
    pub connected_players: usize,
    /// Rooms with a running command worker.
    pub active_rooms: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, connected_players: usize, active_rooms: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            connected_players,
            active_rooms,
        }
    }
}
