use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity, RoomListItemEntity,
    },
    dto::{
        format_system_time,
        validation::{validate_not_blank, validate_room_code},
    },
    state::{
        live::{EventLogEntry, LiveGameState, PlayerStat},
        status::RoomStatus,
    },
};

/// Payload used to create a room; the caller becomes its host.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub player_id: String,
    #[validate(length(min = 1, max = 32), custom(function = "validate_not_blank"))]
    pub username: String,
}

/// Payload used to join an existing room by code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Room code, case-insensitive.
    #[validate(custom(function = "validate_room_code"))]
    pub code: String,
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub player_id: String,
    #[validate(length(min = 1, max = 32), custom(function = "validate_not_blank"))]
    pub username: String,
}

/// Identifies the acting player on leave and delete requests.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PlayerRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Public identity of a room member.
pub struct PlayerSummary {
    pub player_id: String,
    pub username: String,
}

impl From<&MemberEntity> for PlayerSummary {
    fn from(value: &MemberEntity) -> Self {
        Self {
            player_id: value.player_id.clone(),
            username: value.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Idea of the event pool; `id` is the key used to mark it.
pub struct PoolEventDto {
    pub id: Uuid,
    pub text: String,
    pub author: String,
}

impl From<&PoolEventEntity> for PoolEventDto {
    fn from(value: &PoolEventEntity) -> Self {
        Self {
            id: value.id,
            text: value.text.clone(),
            author: value.author.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Event marked during the game, attributed to its first marker.
pub struct MarkedEventDto {
    pub event_id: Uuid,
    pub text: String,
    pub author: String,
}

impl From<&MarkedEventEntity> for MarkedEventDto {
    fn from(value: &MarkedEventEntity) -> Self {
        Self {
            event_id: value.event_id,
            text: value.text.clone(),
            author: value.author.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Full view of a room record.
pub struct RoomSummary {
    pub code: String,
    pub host: String,
    pub status: RoomStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub members: Vec<PlayerSummary>,
    pub event_pool: Vec<PoolEventDto>,
    pub marked_events: Vec<MarkedEventDto>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last change.
    pub updated_at: String,
}

impl From<&RoomEntity> for RoomSummary {
    fn from(value: &RoomEntity) -> Self {
        Self {
            code: value.code.clone(),
            host: value.host.clone(),
            status: value.status,
            winner: value.winner.clone(),
            members: value.members.iter().map(PlayerSummary::from).collect(),
            event_pool: value.event_pool.iter().map(PoolEventDto::from).collect(),
            marked_events: value
                .marked_events
                .iter()
                .map(MarkedEventDto::from)
                .collect(),
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Row of the "my rooms" listing.
pub struct RoomListItem {
    pub code: String,
    pub host: String,
    pub status: RoomStatus,
    pub member_count: usize,
    pub updated_at: String,
}

impl From<RoomListItemEntity> for RoomListItem {
    fn from(value: RoomListItemEntity) -> Self {
        Self {
            code: value.code,
            host: value.host,
            status: value.status,
            member_count: value.member_count,
            updated_at: format_system_time(value.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct EventLogEntryDto {
    pub actor: String,
    pub event_id: Uuid,
    pub event_text: String,
    pub timestamp: String,
}

impl From<&EventLogEntry> for EventLogEntryDto {
    fn from(value: &EventLogEntry) -> Self {
        Self {
            actor: value.actor.clone(),
            event_id: value.event_id,
            event_text: value.event_text.clone(),
            timestamp: format_system_time(value.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PlayerStatDto {
    pub player_id: String,
    pub username: String,
    pub checked_count: u8,
    pub has_line: bool,
    pub has_bingo: bool,
}

impl From<&PlayerStat> for PlayerStatDto {
    fn from(value: &PlayerStat) -> Self {
        Self {
            player_id: value.player_id.clone(),
            username: value.username.clone(),
            checked_count: value.checked_count,
            has_line: value.has_line,
            has_bingo: value.has_bingo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
/// Live progress of a running game.
pub struct LiveStateSnapshot {
    /// Most recent first.
    pub event_log: Vec<EventLogEntryDto>,
    pub player_stats: Vec<PlayerStatDto>,
}

impl From<&LiveGameState> for LiveStateSnapshot {
    fn from(value: &LiveGameState) -> Self {
        Self {
            event_log: value.event_log().map(EventLogEntryDto::from).collect(),
            player_stats: value.player_stats().map(PlayerStatDto::from).collect(),
        }
    }
}

/// Stats in member order, as broadcast by `stats-updated`.
pub fn stats_of(state: &LiveGameState) -> Vec<PlayerStatDto> {
    state.player_stats().map(PlayerStatDto::from).collect()
}

/// Resolve a stored card against the pool; unknown ids are skipped.
pub fn card_cells(room: &RoomEntity, cells: &[Uuid]) -> Vec<PoolEventDto> {
    cells
        .iter()
        .filter_map(|id| room.pool_event(*id))
        .map(PoolEventDto::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[test]
    fn join_request_rejects_malformed_codes() {
        let request = JoinRoomRequest {
            code: "abc-def".into(),
            player_id: "p1".into(),
            username: "Alice".into(),
        };
        assert!(request.validate().is_err());

        let request = JoinRoomRequest {
            code: "abcdef".into(),
            player_id: "p1".into(),
            username: "Alice".into(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn player_request_rejects_blank_ids() {
        let blank = PlayerRequest {
            player_id: "   ".into(),
        };
        assert!(blank.validate().is_err());

        let padded = PlayerRequest {
            player_id: " p1 ".into(),
        };
        assert!(padded.validate().is_ok());
    }

    #[test]
    fn room_summary_serializes_lowercase_status() {
        let room = RoomEntity::new("ABCDEF".into(), MemberEntity::new("p1", "Alice"));
        let json = serde_json::to_value(RoomSummary::from(&room)).unwrap();

        assert_eq!(json["status"], "waiting");
        assert_eq!(json["members"][0]["username"], "Alice");
        assert!(json.get("winner").is_none());
    }
}
