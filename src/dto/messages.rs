use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::room::{
        LiveStateSnapshot, MarkedEventDto, PlayerStatDto, PlayerSummary, PoolEventDto, RoomSummary,
    },
    state::status::RoomStatus,
};

#[derive(Clone, Debug)]
/// Serialized payload fanned out to WebSocket and SSE sinks.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages pushed by the server, tagged by `type`.
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Reply to the creator of a room.
    RoomCreated { room: RoomSummary },
    /// Reply to a member who joined.
    RoomJoined { room: RoomSummary },
    PlayerListUpdated {
        code: String,
        host: String,
        players: Vec<PlayerSummary>,
    },
    /// Pool, host and status of the room.
    RoomStateUpdated {
        code: String,
        host: String,
        status: RoomStatus,
        event_pool: Vec<PoolEventDto>,
    },
    IdeaAdded { idea: PoolEventDto },
    /// Full pool (control-panel reference) and the fresh stats.
    GameStarted {
        pool: Vec<PoolEventDto>,
        initial_stats: Vec<PlayerStatDto>,
    },
    /// Private delivery of a dealt card.
    YourCard { cells: Vec<PoolEventDto> },
    EventMarked {
        event_id: Uuid,
        text: String,
        author: String,
    },
    StatsUpdated { stats: Vec<PlayerStatDto> },
    LineClaimed { player: PlayerSummary },
    BingoWon { winner: PlayerSummary },
    ChatMessage { author: PlayerSummary, text: String },
    /// Private snapshot for a member rejoining a running game.
    RejoinState {
        card: Vec<PoolEventDto>,
        pool: Vec<PoolEventDto>,
        marked: Vec<MarkedEventDto>,
        live_state: LiveStateSnapshot,
    },
    /// Log-style line for the room feed.
    Notice { text: String },
    RoomDeleted { code: String },
    /// Failure of a command, sent to its originator only.
    Error { kind: String, message: String },
}

impl ServerMessage {
    /// Name of the message as it appears in the `type` tag and on SSE `event:` lines.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::RoomCreated { .. } => "room-created",
            ServerMessage::RoomJoined { .. } => "room-joined",
            ServerMessage::PlayerListUpdated { .. } => "player-list-updated",
            ServerMessage::RoomStateUpdated { .. } => "room-state-updated",
            ServerMessage::IdeaAdded { .. } => "idea-added",
            ServerMessage::GameStarted { .. } => "game-started",
            ServerMessage::YourCard { .. } => "your-card",
            ServerMessage::EventMarked { .. } => "event-marked",
            ServerMessage::StatsUpdated { .. } => "stats-updated",
            ServerMessage::LineClaimed { .. } => "line-claimed",
            ServerMessage::BingoWon { .. } => "bingo-won",
            ServerMessage::ChatMessage { .. } => "chat-message",
            ServerMessage::RejoinState { .. } => "rejoin-state",
            ServerMessage::Notice { .. } => "notice",
            ServerMessage::RoomDeleted { .. } => "room-deleted",
            ServerMessage::Error { .. } => "error",
        }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        ServerMessage::Notice { text: text.into() }
    }

    /// Serialize once into a [`ServerEvent`] ready for fan-out.
    pub fn to_event(&self) -> serde_json::Result<ServerEvent> {
        ServerEvent::json(self.event_name().to_owned(), self)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE spectator when it connects.
pub struct Handshake {
    pub room_code: String,
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}
