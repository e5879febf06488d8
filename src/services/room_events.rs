use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::models::{MemberEntity, PoolEventEntity, RoomEntity},
    dto::{
        messages::ServerMessage,
        room::{
            LiveStateSnapshot, MarkedEventDto, PlayerSummary, PoolEventDto, card_cells, stats_of,
        },
    },
    state::{ConnectionHandle, SharedState, live::LiveGameState},
};

/// Broadcast the member list and current host.
pub fn broadcast_player_list(state: &SharedState, room: &RoomEntity) {
    let message = ServerMessage::PlayerListUpdated {
        code: room.code.clone(),
        host: room.host.clone(),
        players: room.members.iter().map(PlayerSummary::from).collect(),
    };
    send_room_event(state, &room.code, &message);
}

/// Broadcast pool, host and status of the room.
pub fn broadcast_room_state(state: &SharedState, room: &RoomEntity) {
    let message = ServerMessage::RoomStateUpdated {
        code: room.code.clone(),
        host: room.host.clone(),
        status: room.status,
        event_pool: pool_of(room),
    };
    send_room_event(state, &room.code, &message);
}

pub fn broadcast_idea_added(state: &SharedState, code: &str, idea: &PoolEventEntity) {
    let message = ServerMessage::IdeaAdded {
        idea: PoolEventDto::from(idea),
    };
    send_room_event(state, code, &message);
}

/// Broadcast the full pool as control-panel reference together with the fresh stats.
pub fn broadcast_game_started(state: &SharedState, room: &RoomEntity, live: &LiveGameState) {
    let message = ServerMessage::GameStarted {
        pool: pool_of(room),
        initial_stats: stats_of(live),
    };
    send_room_event(state, &room.code, &message);
}

pub fn broadcast_event_marked(state: &SharedState, code: &str, event: &PoolEventEntity, author: &str) {
    let message = ServerMessage::EventMarked {
        event_id: event.id,
        text: event.text.clone(),
        author: author.to_owned(),
    };
    send_room_event(state, code, &message);
}

pub fn broadcast_stats(state: &SharedState, code: &str, live: &LiveGameState) {
    let message = ServerMessage::StatsUpdated {
        stats: stats_of(live),
    };
    send_room_event(state, code, &message);
}

pub fn broadcast_line_claimed(state: &SharedState, code: &str, player: &MemberEntity) {
    let message = ServerMessage::LineClaimed {
        player: PlayerSummary::from(player),
    };
    send_room_event(state, code, &message);
}

pub fn broadcast_bingo_won(state: &SharedState, code: &str, winner: &MemberEntity) {
    let message = ServerMessage::BingoWon {
        winner: PlayerSummary::from(winner),
    };
    send_room_event(state, code, &message);
}

pub fn broadcast_chat(state: &SharedState, code: &str, author: &MemberEntity, text: &str) {
    let message = ServerMessage::ChatMessage {
        author: PlayerSummary::from(author),
        text: text.to_owned(),
    };
    send_room_event(state, code, &message);
}

/// Broadcast a log-style line to the room feed.
pub fn broadcast_notice(state: &SharedState, code: &str, text: impl Into<String>) {
    send_room_event(state, code, &ServerMessage::notice(text));
}

pub fn broadcast_room_deleted(state: &SharedState, code: &str) {
    let message = ServerMessage::RoomDeleted {
        code: code.to_owned(),
    };
    send_room_event(state, code, &message);
}

/// Deliver a freshly dealt card to its owner through the presence directory.
pub fn send_card(state: &SharedState, room: &RoomEntity, player_id: &str, cells: &[Uuid]) -> bool {
    let message = ServerMessage::YourCard {
        cells: card_cells(room, cells),
    };
    send_private(state, player_id, &message)
}

/// Send the rejoin snapshot to `player_id` when both their card and the live state exist.
pub fn send_rejoin_state(state: &SharedState, room: &RoomEntity, player_id: &str) -> bool {
    let Some(card) = room.card_for(player_id) else {
        return false;
    };
    let Some(live) = state.live().get(&room.code) else {
        return false;
    };

    let message = ServerMessage::RejoinState {
        card: card_cells(room, &card.cells),
        pool: pool_of(room),
        marked: room.marked_events.iter().map(MarkedEventDto::from).collect(),
        live_state: LiveStateSnapshot::from(&live),
    };
    send_private(state, player_id, &message)
}

/// Send `message` to whatever connection currently speaks for `player_id`.
pub fn send_private(state: &SharedState, player_id: &str, message: &ServerMessage) -> bool {
    let Some(connection) = state.presence().resolve(player_id) else {
        debug!(
            player_id,
            event = message.event_name(),
            "no active connection; skipping private delivery"
        );
        return false;
    };
    send_to(&connection, message)
}

/// Send `message` to a single connection.
pub fn send_to(connection: &ConnectionHandle, message: &ServerMessage) -> bool {
    match message.to_event() {
        Ok(event) => connection.send(event),
        Err(err) => {
            warn!(event = message.event_name(), error = %err, "failed to serialize private payload");
            false
        }
    }
}

fn pool_of(room: &RoomEntity) -> Vec<PoolEventDto> {
    room.event_pool.iter().map(PoolEventDto::from).collect()
}

fn send_room_event(state: &SharedState, code: &str, message: &ServerMessage) {
    match message.to_event() {
        Ok(event) => {
            state.channels().broadcast(code, &event);
        }
        Err(err) => warn!(
            code,
            event = message.event_name(),
            error = %err,
            "failed to serialize room payload"
        ),
    }
}
