use tracing::warn;

use crate::{dao::room_store::RoomStore, dto::health::HealthResponse, state::SharedState};

/// Report whether a storage backend is installed, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_storage().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(
        state.is_degraded().await,
        state.presence().len(),
        state.queues().len(),
    )
}
