use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::validate_not_blank;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from player WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame of every connection.
    Identify { player_id: String, username: String },
    CreateRoom,
    JoinRoom { room_code: String },
    LeaveRoom { room_code: String },
    AddIdea { room_code: String, text: String },
    StartGame { room_code: String },
    MarkEvent { room_code: String, event_id: Uuid },
    /// Checked cells reported by the client, free centre included.
    UpdateCheckedCount { room_code: String, count: i64 },
    ClaimLine { room_code: String },
    ClaimBingo { room_code: String },
    Chat { room_code: String, text: String },
    DeleteRoom { room_code: String },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Identity carried by an `identify` frame.
    pub fn identity(&self) -> Option<(&str, &str)> {
        match self {
            Self::Identify {
                player_id,
                username,
            } => Some((player_id.as_str(), username.as_str())),
            _ => None,
        }
    }
}

/// Identity announced by an `identify` frame, trimmed and held to the REST payload limits.
#[derive(Debug, Validate)]
pub struct PlayerIdentity {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub player_id: String,
    #[validate(length(min = 1, max = 32), custom(function = "validate_not_blank"))]
    pub username: String,
}

impl PlayerIdentity {
    pub fn new(player_id: &str, username: &str) -> Self {
        Self {
            player_id: player_id.trim().to_owned(),
            username: username.trim().to_owned(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Acknowledgement sent after a successful identification.
pub struct IdentifyAck {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub player_id: String,
}

impl IdentifyAck {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            kind: "identified",
            player_id: player_id.into(),
        }
    }
}
