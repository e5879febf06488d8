use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::status::RoomStatus;

/// Identity of a player taking part in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberEntity {
    /// Stable account identifier supplied by the client.
    pub player_id: String,
    /// Display name shown to the other members.
    pub username: String,
}

impl MemberEntity {
    /// Build a member from its identifier and display name.
    pub fn new(player_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            username: username.into(),
        }
    }
}

/// Idea contributed to the room's event pool while it is waiting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolEventEntity {
    /// Identifier generated at submission time, used as the marking key.
    pub id: Uuid,
    /// Text displayed on cards and control panels.
    pub text: String,
    /// Username of the member who submitted the idea.
    pub author: String,
}

/// Card dealt to a single player when the game starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardAssignmentEntity {
    /// Owner of the card.
    pub player_id: String,
    /// Ordered pool event identifiers (24 entries, centre cell excluded).
    pub cells: Vec<Uuid>,
}

/// Pool event that has been triggered by a member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkedEventEntity {
    /// Pool event identifier.
    pub event_id: Uuid,
    /// Pool event text at the time it was marked.
    pub text: String,
    /// Username of the first member who marked it.
    pub author: String,
}

/// Durable room record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Uppercase room code, primary key of the room.
    pub code: String,
    /// Player identifier of the current host.
    pub host: String,
    /// Members in join order.
    pub members: Vec<MemberEntity>,
    /// Ideas contributed while waiting, in submission order.
    pub event_pool: Vec<PoolEventEntity>,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Winning player identifier once the room is finished.
    pub winner: Option<String>,
    /// Cards dealt at game start.
    pub card_assignments: Vec<CardAssignmentEntity>,
    /// Events marked during the game (set semantics on `event_id`).
    pub marked_events: Vec<MarkedEventEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the room record changed.
    pub updated_at: SystemTime,
}

impl RoomEntity {
    /// Fresh waiting room whose creator is both host and sole member.
    pub fn new(code: String, host: MemberEntity) -> Self {
        let now = SystemTime::now();
        Self {
            code,
            host: host.player_id.clone(),
            members: vec![host],
            event_pool: Vec::new(),
            status: RoomStatus::Waiting,
            winner: None,
            card_assignments: Vec::new(),
            marked_events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a member by player identifier.
    pub fn member(&self, player_id: &str) -> Option<&MemberEntity> {
        self.members
            .iter()
            .find(|member| member.player_id == player_id)
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.member(player_id).is_some()
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host == player_id
    }

    /// Card dealt to `player_id`, if the game started while they were a member.
    pub fn card_for(&self, player_id: &str) -> Option<&CardAssignmentEntity> {
        self.card_assignments
            .iter()
            .find(|card| card.player_id == player_id)
    }

    pub fn pool_event(&self, id: Uuid) -> Option<&PoolEventEntity> {
        self.event_pool.iter().find(|event| event.id == id)
    }

    pub fn is_marked(&self, event_id: Uuid) -> bool {
        self.marked_events
            .iter()
            .any(|marked| marked.event_id == event_id)
    }
}

/// Room projection used when listing the rooms a player belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomListItemEntity {
    pub code: String,
    pub host: String,
    pub status: RoomStatus,
    pub member_count: usize,
    pub updated_at: SystemTime,
}

impl From<&RoomEntity> for RoomListItemEntity {
    fn from(room: &RoomEntity) -> Self {
        Self {
            code: room.code.clone(),
            host: room.host.clone(),
            status: room.status,
            member_count: room.members.len(),
            updated_at: room.updated_at,
        }
    }
}

/// Win and participation counters kept for every player.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatsEntity {
    pub wins: u32,
    pub games_played: u32,
}
