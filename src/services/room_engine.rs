//! Room session engine. Every mutation persists first, then updates the live state, then
//! broadcasts. A storage failure stops the command before the live state is touched.

use std::{sync::Arc, time::SystemTime};

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{CardAssignmentEntity, MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity},
        room_store::{MemberRemoval, RoomStore, Storage, UserStatsStore},
    },
    dto::{messages::ServerMessage, room::RoomSummary, validation::validate_room_code},
    error::ServiceError,
    services::{
        claims::{ClaimContext, ClaimKind, verify_claim},
        dispatcher,
        room_events::{
            broadcast_bingo_won, broadcast_chat, broadcast_event_marked, broadcast_game_started,
            broadcast_idea_added, broadcast_line_claimed, broadcast_notice, broadcast_player_list,
            broadcast_room_deleted, broadcast_room_state, broadcast_stats, send_card,
            send_rejoin_state, send_to,
        },
    },
    state::{
        ConnectionHandle, SharedState,
        card::{CARD_CELLS, deal_card},
        live::{EventLogEntry, LiveGameState},
        status::{RoomEvent, RoomStatus},
    },
};

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ATTEMPTS: u32 = 5;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MAX_IDEA_CHARS: usize = 120;
pub const MAX_CHAT_CHARS: usize = 500;
/// Upper bound of a reported checked count: every cell plus the free centre.
pub const MAX_CHECKED_COUNT: u8 = 25;

/// Commands executed by a room's worker, strictly one at a time.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a member; attach `connection` to the room when present.
    Join {
        player: MemberEntity,
        connection: Option<ConnectionHandle>,
    },
    Leave {
        player_id: String,
        connection_id: Option<Uuid>,
    },
    /// Host-only deletion.
    Delete { player_id: String },
    SubmitIdea { player_id: String, text: String },
    StartGame { player_id: String },
    MarkEvent { player_id: String, event_id: Uuid },
    UpdateProgress { player_id: String, checked_count: i64 },
    ClaimLine { player_id: String },
    ClaimBingo { player_id: String },
    Chat { player_id: String, text: String },
    /// Delete the room if it is still finished. Scheduled after a win.
    Expire,
}

impl RoomCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RoomCommand::Join { .. } => "join",
            RoomCommand::Leave { .. } => "leave",
            RoomCommand::Delete { .. } => "delete",
            RoomCommand::SubmitIdea { .. } => "submit_idea",
            RoomCommand::StartGame { .. } => "start_game",
            RoomCommand::MarkEvent { .. } => "mark_event",
            RoomCommand::UpdateProgress { .. } => "update_progress",
            RoomCommand::ClaimLine { .. } => "claim_line",
            RoomCommand::ClaimBingo { .. } => "claim_bingo",
            RoomCommand::Chat { .. } => "chat",
            RoomCommand::Expire => "expire",
        }
    }
}

#[derive(Debug)]
pub enum CommandOutcome {
    Done,
    /// Room as it stands after the command.
    Room(RoomEntity),
}

/// Uppercase `raw` after checking it is a well-formed room code.
pub fn normalize_room_code(raw: &str) -> Result<String, ServiceError> {
    let trimmed = raw.trim();
    validate_room_code(trimmed).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid room code".into()),
        )
    })?;
    Ok(trimmed.to_ascii_uppercase())
}

/// Create a room hosted by `actor`. The room does not exist before this call, so it does not
/// go through a room queue.
pub async fn create_room(
    state: &SharedState,
    actor: MemberEntity,
    connection: Option<ConnectionHandle>,
) -> Result<RoomEntity, ServiceError> {
    let storage = state.require_storage().await?;

    for attempt in 1..=ROOM_CODE_ATTEMPTS {
        let code = generate_room_code();
        let room = RoomEntity::new(code.clone(), actor.clone());
        if !storage.create_room(room.clone()).await? {
            debug!(code = %code, attempt, "room code already taken");
            continue;
        }

        info!(code = %code, host = %actor.player_id, "room created");
        if let Some(connection) = connection {
            attach(state, &code, &actor.player_id, connection.clone());
            send_to(
                &connection,
                &ServerMessage::RoomCreated {
                    room: RoomSummary::from(&room),
                },
            );
        }
        return Ok(room);
    }

    Err(ServiceError::Internal(format!(
        "no free room code after {ROOM_CODE_ATTEMPTS} attempts"
    )))
}

/// Run `command` against the room `code`. Called by the room's worker only.
pub async fn execute(
    state: &SharedState,
    code: &str,
    command: RoomCommand,
) -> Result<CommandOutcome, ServiceError> {
    match command {
        RoomCommand::Join { player, connection } => join(state, code, player, connection)
            .await
            .map(CommandOutcome::Room),
        RoomCommand::Leave {
            player_id,
            connection_id,
        } => leave(state, code, &player_id, connection_id).await,
        RoomCommand::Delete { player_id } => delete(state, code, &player_id).await,
        RoomCommand::SubmitIdea { player_id, text } => {
            submit_idea(state, code, &player_id, &text).await
        }
        RoomCommand::StartGame { player_id } => start_game(state, code, &player_id).await,
        RoomCommand::MarkEvent {
            player_id,
            event_id,
        } => mark_event(state, code, &player_id, event_id).await,
        RoomCommand::UpdateProgress {
            player_id,
            checked_count,
        } => update_progress(state, code, &player_id, checked_count).await,
        RoomCommand::ClaimLine { player_id } => claim_line(state, code, &player_id).await,
        RoomCommand::ClaimBingo { player_id } => claim_bingo(state, code, &player_id).await,
        RoomCommand::Chat { player_id, text } => chat(state, code, &player_id, &text).await,
        RoomCommand::Expire => expire(state, code).await,
    }
}

async fn join(
    state: &SharedState,
    code: &str,
    player: MemberEntity,
    connection: Option<ConnectionHandle>,
) -> Result<RoomEntity, ServiceError> {
    let storage = state.require_storage().await?;
    let room = storage
        .add_member(code.to_owned(), player.clone())
        .await?
        .ok_or_else(|| not_found(code))?;

    if let Some(connection) = connection {
        attach(state, code, &player.player_id, connection.clone());
        send_to(
            &connection,
            &ServerMessage::RoomJoined {
                room: RoomSummary::from(&room),
            },
        );
    }

    broadcast_player_list(state, &room);
    broadcast_room_state(state, &room);

    if room.status == RoomStatus::Active && send_rejoin_state(state, &room, &player.player_id) {
        info!(code, player_id = %player.player_id, "replayed running game to rejoining member");
    }

    Ok(room)
}

async fn leave(
    state: &SharedState,
    code: &str,
    player_id: &str,
    connection_id: Option<Uuid>,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let before = load_room(&storage, code).await?;
    require_member(&before, player_id)?;

    let removal = storage
        .remove_member(code.to_owned(), player_id.to_owned())
        .await?
        .ok_or_else(|| not_found(code))?;
    let room = match removal {
        MemberRemoval::Removed(room) => room,
        MemberRemoval::RoomDeleted => {
            teardown(state, code);
            info!(code, "last member left; room deleted");
            return Ok(CommandOutcome::Done);
        }
    };

    if before.is_host(player_id) {
        info!(code, host = %room.host, "host left; role reassigned");
    }

    let connection_id =
        connection_id.or_else(|| state.presence().resolve(player_id).map(|conn| conn.id));
    if let Some(connection_id) = connection_id {
        state.channels().unsubscribe_from(code, connection_id);
    }

    broadcast_player_list(state, &room);
    broadcast_room_state(state, &room);
    Ok(CommandOutcome::Done)
}

async fn delete(
    state: &SharedState,
    code: &str,
    player_id: &str,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    if !room.is_host(player_id) {
        return Err(ServiceError::Unauthorized(
            "only the host can delete the room".into(),
        ));
    }

    storage.delete_room(code.to_owned()).await?;
    broadcast_room_deleted(state, code);
    teardown(state, code);
    info!(code, "room deleted by host");
    Ok(CommandOutcome::Done)
}

async fn submit_idea(
    state: &SharedState,
    code: &str,
    player_id: &str,
    text: &str,
) -> Result<CommandOutcome, ServiceError> {
    let text = text.trim();
    let length = text.chars().count();
    if length == 0 || length > MAX_IDEA_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "ideas must be 1 to {MAX_IDEA_CHARS} characters"
        )));
    }

    let storage = state.require_storage().await?;
    let mut room = load_room(&storage, code).await?;
    let author = require_member(&room, player_id)?.clone();
    if room.status != RoomStatus::Waiting {
        return Err(ServiceError::InvalidState(
            "ideas can only be added before the game starts".into(),
        ));
    }

    let idea = PoolEventEntity {
        id: Uuid::new_v4(),
        text: text.to_owned(),
        author: author.username.clone(),
    };
    if !storage
        .push_pool_event(code.to_owned(), idea.clone())
        .await?
    {
        return Err(ServiceError::InvalidState("the game already started".into()));
    }
    room.event_pool.push(idea.clone());

    broadcast_idea_added(state, code, &idea);
    broadcast_room_state(state, &room);
    broadcast_notice(state, code, format!("{} added an idea", author.username));
    Ok(CommandOutcome::Done)
}

async fn start_game(
    state: &SharedState,
    code: &str,
    player_id: &str,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let mut room = load_room(&storage, code).await?;
    if !room.is_host(player_id) {
        return Err(ServiceError::Unauthorized(
            "only the host can start the game".into(),
        ));
    }
    let next = room.status.transition(RoomEvent::StartGame)?;
    if room.event_pool.len() < CARD_CELLS {
        return Err(ServiceError::InvalidInput(format!(
            "the event pool needs at least {CARD_CELLS} ideas (has {})",
            room.event_pool.len()
        )));
    }

    let cards = deal_cards(&room);
    if !storage.start_game(code.to_owned(), cards.clone()).await? {
        return Err(ServiceError::InvalidState("the game already started".into()));
    }
    room.status = next;
    room.card_assignments = cards;

    let live = LiveGameState::new(&room.members);
    state.live().insert(code, live.clone());

    for card in &room.card_assignments {
        if !send_card(state, &room, &card.player_id, &card.cells) {
            debug!(code, player_id = %card.player_id, "card kept for rejoin replay");
        }
    }
    broadcast_game_started(state, &room, &live);
    broadcast_room_state(state, &room);

    info!(
        code,
        players = room.members.len(),
        pool = room.event_pool.len(),
        "game started"
    );
    Ok(CommandOutcome::Done)
}

async fn mark_event(
    state: &SharedState,
    code: &str,
    player_id: &str,
    event_id: Uuid,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    let marker = require_member(&room, player_id)?.clone();
    require_active(&room)?;
    let event = room
        .pool_event(event_id)
        .cloned()
        .ok_or_else(|| ServiceError::InvalidInput(format!("event {event_id} is not in the pool")))?;

    let marked = MarkedEventEntity {
        event_id,
        text: event.text.clone(),
        author: marker.username.clone(),
    };
    if !storage.add_marked_event(code.to_owned(), marked).await? {
        debug!(code, %event_id, "event already marked; rebroadcasting");
    }

    let cap = state.config().event_log_cap();
    state.live().with_mut(code, |live| {
        live.record_event(
            EventLogEntry {
                actor: marker.username.clone(),
                event_id,
                event_text: event.text.clone(),
                timestamp: SystemTime::now(),
            },
            cap,
        )
    });

    broadcast_event_marked(state, code, &event, &marker.username);
    Ok(CommandOutcome::Done)
}

async fn update_progress(
    state: &SharedState,
    code: &str,
    player_id: &str,
    checked_count: i64,
) -> Result<CommandOutcome, ServiceError> {
    let checked_count = u8::try_from(checked_count)
        .ok()
        .filter(|count| (1..=MAX_CHECKED_COUNT).contains(count))
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "checked count must be between 1 and {MAX_CHECKED_COUNT}"
            ))
        })?;

    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    require_member(&room, player_id)?;
    require_active(&room)?;

    let updated = state
        .live()
        .with_mut(code, |live| {
            let stat = live.stat_mut(player_id)?;
            stat.checked_count = checked_count;
            Some(live.clone())
        })
        .flatten();

    match updated {
        Some(live) => broadcast_stats(state, code, &live),
        None => debug!(code, player_id, "no stat entry for player; progress ignored"),
    }
    Ok(CommandOutcome::Done)
}

async fn claim_line(
    state: &SharedState,
    code: &str,
    player_id: &str,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    let claimant = require_member(&room, player_id)?.clone();
    require_active(&room)?;
    verify_claim(
        state.claims(),
        ClaimKind::Line,
        &ClaimContext {
            room: &room,
            player_id,
        },
    )?;

    let updated = state.live().with_mut(code, |live| {
        if let Some(stat) = live.stat_mut(player_id) {
            stat.has_line = true;
        }
        live.clone()
    });

    if let Some(live) = updated {
        broadcast_stats(state, code, &live);
    }
    broadcast_line_claimed(state, code, &claimant);
    broadcast_notice(state, code, format!("{} called LINE!", claimant.username));
    Ok(CommandOutcome::Done)
}

async fn claim_bingo(
    state: &SharedState,
    code: &str,
    player_id: &str,
) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    let winner = require_member(&room, player_id)?.clone();
    if room.status == RoomStatus::Finished {
        debug!(code, player_id, "room already finished; bingo claim ignored");
        return Ok(CommandOutcome::Done);
    }
    room.status.transition(RoomEvent::DeclareWinner)?;
    verify_claim(
        state.claims(),
        ClaimKind::Bingo,
        &ClaimContext {
            room: &room,
            player_id,
        },
    )?;

    if !storage
        .finish_room(code.to_owned(), player_id.to_owned())
        .await?
    {
        debug!(code, player_id, "another claim finished the room first");
        return Ok(CommandOutcome::Done);
    }

    let updated = state.live().with_mut(code, |live| {
        if let Some(stat) = live.stat_mut(player_id) {
            stat.has_bingo = true;
        }
        live.clone()
    });

    if let Err(err) = storage.increment_wins(player_id.to_owned()).await {
        warn!(code, player_id, error = %err, "failed to record win");
    }
    let members = room
        .members
        .iter()
        .map(|member| member.player_id.clone())
        .collect();
    if let Err(err) = storage.increment_games_played(members).await {
        warn!(code, error = %err, "failed to record games played");
    }

    broadcast_notice(
        state,
        code,
        format!("BINGO! {} won the game", winner.username),
    );
    broadcast_bingo_won(state, code, &winner);
    if let Some(live) = updated {
        broadcast_stats(state, code, &live);
    }

    dispatcher::schedule_expiry(state, code);
    info!(code, winner = %player_id, "bingo claimed; room finished");
    Ok(CommandOutcome::Done)
}

async fn chat(
    state: &SharedState,
    code: &str,
    player_id: &str,
    text: &str,
) -> Result<CommandOutcome, ServiceError> {
    if text.trim().is_empty() || text.chars().count() > MAX_CHAT_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "chat messages must be 1 to {MAX_CHAT_CHARS} characters"
        )));
    }

    let storage = state.require_storage().await?;
    let room = load_room(&storage, code).await?;
    let author = require_member(&room, player_id)?;

    broadcast_chat(state, code, author, text);
    Ok(CommandOutcome::Done)
}

async fn expire(state: &SharedState, code: &str) -> Result<CommandOutcome, ServiceError> {
    let storage = state.require_storage().await?;
    let Some(room) = storage.find_room(code.to_owned()).await? else {
        teardown(state, code);
        return Ok(CommandOutcome::Done);
    };
    if room.status != RoomStatus::Finished {
        debug!(code, status = room.status.as_str(), "room not finished; expiry skipped");
        return Ok(CommandOutcome::Done);
    }

    storage.delete_room(code.to_owned()).await?;
    broadcast_room_deleted(state, code);
    teardown(state, code);
    info!(code, "finished room expired");
    Ok(CommandOutcome::Done)
}

fn attach(state: &SharedState, code: &str, player_id: &str, connection: ConnectionHandle) {
    state.presence().register(player_id, connection.clone());
    state.channels().subscribe(code, connection);
}

/// Drop everything the process holds for a deleted room.
fn teardown(state: &SharedState, code: &str) {
    state.live().remove(code);
    state.channels().close(code);
    state.queues().retire(code);
}

fn deal_cards(room: &RoomEntity) -> Vec<CardAssignmentEntity> {
    let pool: Vec<Uuid> = room.event_pool.iter().map(|event| event.id).collect();
    let mut rng = rand::rng();
    room.members
        .iter()
        .filter_map(|member| {
            deal_card(&pool, &mut rng).map(|cells| CardAssignmentEntity {
                player_id: member.player_id.clone(),
                cells,
            })
        })
        .collect()
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

async fn load_room(storage: &Arc<dyn Storage>, code: &str) -> Result<RoomEntity, ServiceError> {
    storage
        .find_room(code.to_owned())
        .await?
        .ok_or_else(|| not_found(code))
}

fn require_member<'a>(room: &'a RoomEntity, player_id: &str) -> Result<&'a MemberEntity, ServiceError> {
    room.member(player_id).ok_or_else(|| {
        ServiceError::Unauthorized(format!("not a member of room {}", room.code))
    })
}

fn require_active(room: &RoomEntity) -> Result<(), ServiceError> {
    match room.status {
        RoomStatus::Active => Ok(()),
        other => Err(ServiceError::InvalidState(format!(
            "room {} is {}",
            room.code,
            other.as_str()
        ))),
    }
}

fn not_found(code: &str) -> ServiceError {
    ServiceError::NotFound(format!("room {code}"))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use serde_json::Value;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::{
        config::{AppConfig, ClaimPolicy},
        dao::room_store::{MemoryStore, RoomStore},
        dto::messages::ServerEvent,
        services::test_support::{connect, drain, host, of_type, state_with_config},
    };

    struct Player {
        member: MemberEntity,
        connection: ConnectionHandle,
        rx: UnboundedReceiver<ServerEvent>,
    }

    impl Player {
        fn new(player_id: &str, username: &str) -> Self {
            let (connection, rx) = connect();
            Self {
                member: MemberEntity::new(player_id, username),
                connection,
                rx,
            }
        }

        fn id(&self) -> String {
            self.member.player_id.clone()
        }

        fn messages(&mut self) -> Vec<Value> {
            drain(&mut self.rx)
        }
    }

    async fn run(state: &SharedState, code: &str, command: RoomCommand) -> Result<(), ServiceError> {
        dispatcher::dispatch(state, code, command).await.map(|_| ())
    }

    async fn join(state: &SharedState, code: &str, player: &Player) {
        run(
            state,
            code,
            RoomCommand::Join {
                player: player.member.clone(),
                connection: Some(player.connection.clone()),
            },
        )
        .await
        .unwrap();
    }

    async fn add_ideas(state: &SharedState, code: &str, player_id: &str, count: usize) {
        for index in 1..=count {
            run(
                state,
                code,
                RoomCommand::SubmitIdea {
                    player_id: player_id.into(),
                    text: format!("idea #{index}"),
                },
            )
            .await
            .unwrap();
        }
    }

    /// Host plus two guests in a room with `ideas` ideas, nothing started yet.
    async fn lobby(
        config: AppConfig,
        ideas: usize,
    ) -> (SharedState, MemoryStore, String, Vec<Player>) {
        let (state, store) = state_with_config(config).await;
        let host = Player::new("host", "Hosty");
        let room = create_room(&state, host.member.clone(), Some(host.connection.clone()))
            .await
            .unwrap();
        let code = room.code.clone();

        let players = vec![host, Player::new("bob", "Bob"), Player::new("carol", "Carol")];
        for player in &players[1..] {
            join(&state, &code, player).await;
        }
        add_ideas(&state, &code, "host", ideas).await;
        (state, store, code, players)
    }

    async fn started(config: AppConfig) -> (SharedState, MemoryStore, String, Vec<Player>) {
        let (state, store, code, mut players) = lobby(config, CARD_CELLS).await;
        run(
            &state,
            &code,
            RoomCommand::StartGame {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap();
        for player in players.iter_mut() {
            player.messages();
        }
        (state, store, code, players)
    }

    async fn stored(store: &MemoryStore, code: &str) -> Option<RoomEntity> {
        store.find_room(code.to_owned()).await.unwrap()
    }

    async fn wait_until_deleted(store: &MemoryStore, code: &str) -> bool {
        for _ in 0..100 {
            if stored(store, code).await.is_none() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn room_codes_are_normalized() {
        assert_eq!(normalize_room_code(" abc12f ").unwrap(), "ABC12F");
        assert!(matches!(
            normalize_room_code("abc-12"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(normalize_room_code("ABCDEFGHI").is_err());
    }

    #[test]
    fn generated_codes_are_six_uppercase_alphanumerics() {
        let code = generate_room_code();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[tokio::test]
    async fn create_makes_the_actor_host_and_sole_member() {
        let (state, store) = state_with_config(AppConfig::default()).await;
        let (connection, mut rx) = connect();

        let room = create_room(&state, host(), Some(connection.clone()))
            .await
            .unwrap();

        let persisted = stored(&store, &room.code).await.unwrap();
        assert_eq!(persisted.host, "host");
        assert_eq!(persisted.members, vec![host()]);
        assert_eq!(persisted.status, RoomStatus::Waiting);

        assert_eq!(state.presence().resolve("host").unwrap().id, connection.id);
        assert!(state.channels().is_subscribed(&room.code, connection.id));
        let messages = drain(&mut rx);
        assert_eq!(of_type(&messages, "room-created").len(), 1);
    }

    #[tokio::test]
    async fn join_broadcasts_player_list_to_the_room() {
        let (state, _store, code, mut players) = lobby(AppConfig::default(), 0).await;

        let host_messages = players[0].messages();
        let lists = of_type(&host_messages, "player-list-updated");
        let last = lists.last().unwrap();
        assert_eq!(last["players"].as_array().unwrap().len(), 3);

        let bob_messages = players[1].messages();
        assert_eq!(of_type(&bob_messages, "room-joined").len(), 1);

        // joining twice does not duplicate the member
        join(&state, &code, &players[1]).await;
        let storage = state.require_storage().await.unwrap();
        let room = storage.find_room(code.clone()).await.unwrap().unwrap();
        assert_eq!(room.members.len(), 3);
    }

    #[tokio::test]
    async fn ideas_are_validated_and_broadcast() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), 1).await;

        let messages = players[1].messages();
        let added = of_type(&messages, "idea-added");
        assert_eq!(added.last().unwrap()["idea"]["author"], "Hosty");
        assert!(!of_type(&messages, "notice").is_empty());

        for text in ["   ", &"x".repeat(MAX_IDEA_CHARS + 1)] {
            let err = run(
                &state,
                &code,
                RoomCommand::SubmitIdea {
                    player_id: "bob".into(),
                    text: text.to_owned(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }

        let err = run(
            &state,
            &code,
            RoomCommand::SubmitIdea {
                player_id: "stranger".into(),
                text: "rain".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        assert_eq!(stored(&store, &code).await.unwrap().event_pool.len(), 1);
    }

    #[tokio::test]
    async fn start_rejects_a_pool_of_23() {
        let (state, store, code, _players) = lobby(AppConfig::default(), CARD_CELLS - 1).await;

        let err = run(
            &state,
            &code,
            RoomCommand::StartGame {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(
            stored(&store, &code).await.unwrap().status,
            RoomStatus::Waiting
        );
        assert!(!state.live().contains(&code));
    }

    #[tokio::test]
    async fn only_the_host_starts_the_game() {
        let (state, _store, code, _players) = lobby(AppConfig::default(), CARD_CELLS).await;

        let err = run(
            &state,
            &code,
            RoomCommand::StartGame {
                player_id: "bob".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn start_deals_pool_identical_cards_and_marks_reach_everyone() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), CARD_CELLS).await;
        for player in players.iter_mut() {
            player.messages();
        }

        run(
            &state,
            &code,
            RoomCommand::StartGame {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap();

        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Active);
        let pool: HashSet<Uuid> = room.event_pool.iter().map(|event| event.id).collect();

        for player in players.iter_mut() {
            let messages = player.messages();
            let cards = of_type(&messages, "your-card");
            assert_eq!(cards.len(), 1);
            let cells: HashSet<Uuid> = cards[0]["cells"]
                .as_array()
                .unwrap()
                .iter()
                .map(|cell| cell["id"].as_str().unwrap().parse().unwrap())
                .collect();
            assert_eq!(cells, pool);

            let started = of_type(&messages, "game-started");
            assert_eq!(started[0]["pool"].as_array().unwrap().len(), CARD_CELLS);
            assert_eq!(started[0]["initial_stats"].as_array().unwrap().len(), 3);

            let stored_card = room.card_for(&player.id()).unwrap();
            assert_eq!(stored_card.cells.len(), CARD_CELLS);
        }

        let idea_five = room
            .event_pool
            .iter()
            .find(|event| event.text == "idea #5")
            .unwrap()
            .id;
        run(
            &state,
            &code,
            RoomCommand::MarkEvent {
                player_id: "host".into(),
                event_id: idea_five,
            },
        )
        .await
        .unwrap();

        for player in players.iter_mut() {
            let messages = player.messages();
            let marked = of_type(&messages, "event-marked");
            assert_eq!(marked.len(), 1);
            assert_eq!(marked[0]["event_id"], idea_five.to_string());
            assert_eq!(marked[0]["author"], "Hosty");
        }

        let live = state.live().get(&code).unwrap();
        let log: Vec<_> = live.event_log().collect();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].actor, "Hosty");
    }

    #[tokio::test]
    async fn ideas_are_closed_once_the_game_started() {
        let (state, store, code, _players) = started(AppConfig::default()).await;

        let err = run(
            &state,
            &code,
            RoomCommand::SubmitIdea {
                player_id: "bob".into(),
                text: "late idea".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(stored(&store, &code).await.unwrap().event_pool.len(), CARD_CELLS);
    }

    #[tokio::test]
    async fn a_second_start_keeps_the_dealt_cards() {
        let (state, store, code, mut players) = started(AppConfig::default()).await;
        let cards = stored(&store, &code).await.unwrap().card_assignments;

        let err = run(
            &state,
            &code,
            RoomCommand::StartGame {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.card_assignments, cards);
        assert_eq!(room.status, RoomStatus::Active);
        assert!(of_type(&players[1].messages(), "your-card").is_empty());
    }

    #[tokio::test]
    async fn marking_needs_a_running_game() {
        let (state, store, code, _players) = lobby(AppConfig::default(), CARD_CELLS).await;
        let event_id = stored(&store, &code).await.unwrap().event_pool[0].id;

        let err = run(
            &state,
            &code,
            RoomCommand::MarkEvent {
                player_id: "host".into(),
                event_id,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(stored(&store, &code).await.unwrap().marked_events.is_empty());
        assert!(!state.live().contains(&code));
    }

    #[tokio::test]
    async fn marking_twice_keeps_one_entry_and_the_first_author() {
        let (state, store, code, mut players) = started(AppConfig::default()).await;
        let event_id = stored(&store, &code).await.unwrap().event_pool[0].id;

        for player_id in ["host", "bob"] {
            run(
                &state,
                &code,
                RoomCommand::MarkEvent {
                    player_id: player_id.into(),
                    event_id,
                },
            )
            .await
            .unwrap();
        }

        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.marked_events.len(), 1);
        assert_eq!(room.marked_events[0].author, "Hosty");

        let messages = players[2].messages();
        assert_eq!(of_type(&messages, "event-marked").len(), 2);
    }

    #[tokio::test]
    async fn unknown_events_cannot_be_marked() {
        let (state, _store, code, _players) = started(AppConfig::default()).await;
        let err = run(
            &state,
            &code,
            RoomCommand::MarkEvent {
                player_id: "host".into(),
                event_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn progress_updates_only_the_reporter() {
        let (state, _store, code, mut players) = started(AppConfig::default()).await;

        run(
            &state,
            &code,
            RoomCommand::UpdateProgress {
                player_id: "bob".into(),
                checked_count: 6,
            },
        )
        .await
        .unwrap();

        let live = state.live().get(&code).unwrap();
        let counts: Vec<_> = live
            .player_stats()
            .map(|stat| (stat.player_id.as_str(), stat.checked_count))
            .collect();
        assert_eq!(counts, vec![("host", 1), ("bob", 6), ("carol", 1)]);
        assert_eq!(of_type(&players[0].messages(), "stats-updated").len(), 1);

        for count in [0, 26, -3] {
            let err = run(
                &state,
                &code,
                RoomCommand::UpdateProgress {
                    player_id: "bob".into(),
                    checked_count: count,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn line_claims_are_idempotent() {
        let (state, _store, code, mut players) = started(AppConfig::default()).await;

        for _ in 0..2 {
            run(
                &state,
                &code,
                RoomCommand::ClaimLine {
                    player_id: "carol".into(),
                },
            )
            .await
            .unwrap();
        }

        let live = state.live().get(&code).unwrap();
        let carol = live
            .player_stats()
            .find(|stat| stat.player_id == "carol")
            .unwrap();
        assert!(carol.has_line);

        let messages = players[0].messages();
        let claims = of_type(&messages, "line-claimed");
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0]["player"]["username"], "Carol");
    }

    #[tokio::test]
    async fn second_bingo_does_not_change_the_winner() {
        let config = AppConfig::default().with_finish_grace(Duration::from_secs(60));
        let (state, store, code, mut players) = started(config).await;

        for player_id in ["bob", "carol"] {
            run(
                &state,
                &code,
                RoomCommand::ClaimBingo {
                    player_id: player_id.into(),
                },
            )
            .await
            .unwrap();
        }

        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.status, RoomStatus::Finished);
        assert_eq!(room.winner.as_deref(), Some("bob"));

        assert_eq!(store.user_stats("bob").await.unwrap().wins, 1);
        let carol = store.user_stats("carol").await.unwrap();
        assert_eq!(carol.wins, 0);
        assert_eq!(carol.games_played, 1);

        let messages = players[0].messages();
        let won = of_type(&messages, "bingo-won");
        assert_eq!(won.len(), 1);
        assert_eq!(won[0]["winner"]["player_id"], "bob");

        let live = state.live().get(&code).unwrap();
        assert!(
            live.player_stats()
                .any(|stat| stat.player_id == "bob" && stat.has_bingo)
        );
    }

    #[tokio::test]
    async fn bingo_before_start_is_rejected() {
        let (state, _store, code, _players) = lobby(AppConfig::default(), 0).await;
        let err = run(
            &state,
            &code,
            RoomCommand::ClaimBingo {
                player_id: "bob".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn verified_claims_need_matching_marks() {
        let config = AppConfig::default().with_claim_policy(ClaimPolicy::Verify);
        let (state, store, code, _players) = started(config).await;

        let err = run(
            &state,
            &code,
            RoomCommand::ClaimBingo {
                player_id: "bob".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let pool: Vec<Uuid> = stored(&store, &code)
            .await
            .unwrap()
            .event_pool
            .iter()
            .map(|event| event.id)
            .collect();
        for event_id in pool {
            run(
                &state,
                &code,
                RoomCommand::MarkEvent {
                    player_id: "host".into(),
                    event_id,
                },
            )
            .await
            .unwrap();
        }

        run(
            &state,
            &code,
            RoomCommand::ClaimBingo {
                player_id: "bob".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            stored(&store, &code).await.unwrap().winner.as_deref(),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn finished_rooms_expire_after_the_grace_period() {
        let config = AppConfig::default().with_finish_grace(Duration::from_millis(20));
        let (state, store, code, mut players) = started(config).await;

        run(
            &state,
            &code,
            RoomCommand::ClaimBingo {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap();

        assert!(wait_until_deleted(&store, &code).await);
        assert!(!state.live().contains(&code));
        assert_eq!(state.channels().subscriber_count(&code), 0);

        let messages = players[1].messages();
        assert_eq!(of_type(&messages, "room-deleted").len(), 1);
    }

    #[tokio::test]
    async fn rejoin_replays_the_same_card() {
        let (state, store, code, mut players) = started(AppConfig::default()).await;
        let event_id = stored(&store, &code).await.unwrap().event_pool[3].id;
        run(
            &state,
            &code,
            RoomCommand::MarkEvent {
                player_id: "host".into(),
                event_id,
            },
        )
        .await
        .unwrap();

        // bob reconnects from a new connection
        let mut bob = Player::new("bob", "Bob");
        players[1].messages();
        join(&state, &code, &bob).await;

        let messages = bob.messages();
        let replay = of_type(&messages, "rejoin-state");
        assert_eq!(replay.len(), 1);

        let room = stored(&store, &code).await.unwrap();
        let expected: Vec<String> = room
            .card_for("bob")
            .unwrap()
            .cells
            .iter()
            .map(Uuid::to_string)
            .collect();
        let replayed: Vec<String> = replay[0]["card"]
            .as_array()
            .unwrap()
            .iter()
            .map(|cell| cell["id"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(replayed, expected);
        assert_eq!(replay[0]["marked"].as_array().unwrap().len(), 1);
        assert_eq!(
            replay[0]["live_state"]["player_stats"]
                .as_array()
                .unwrap()
                .len(),
            3
        );

        // the old connection no longer speaks for bob
        assert_eq!(
            state.presence().resolve("bob").unwrap().id,
            bob.connection.id
        );
    }

    #[tokio::test]
    async fn host_leaving_hands_the_role_to_the_first_remaining_member() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), 0).await;

        run(
            &state,
            &code,
            RoomCommand::Leave {
                player_id: "host".into(),
                connection_id: Some(players[0].connection.id),
            },
        )
        .await
        .unwrap();

        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.host, "bob");
        assert_eq!(room.members.len(), 2);
        assert!(
            !state
                .channels()
                .is_subscribed(&code, players[0].connection.id)
        );

        let messages = players[2].messages();
        let lists = of_type(&messages, "player-list-updated");
        assert_eq!(lists.last().unwrap()["host"], "bob");
    }

    #[tokio::test]
    async fn last_member_leaving_deletes_the_room() {
        let (state, store, code, _players) = lobby(AppConfig::default(), 0).await;

        for player_id in ["host", "bob", "carol"] {
            run(
                &state,
                &code,
                RoomCommand::Leave {
                    player_id: player_id.into(),
                    connection_id: None,
                },
            )
            .await
            .unwrap();
        }

        assert!(stored(&store, &code).await.is_none());
        assert_eq!(state.channels().subscriber_count(&code), 0);
    }

    #[tokio::test]
    async fn host_handoff_is_a_single_store_write() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), 0).await;
        store.fail_writes_after(1);

        run(
            &state,
            &code,
            RoomCommand::Leave {
                player_id: "host".into(),
                connection_id: None,
            },
        )
        .await
        .unwrap();

        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.host, "bob");
        assert!(room.is_member("bob"));
        assert!(!room.is_member("host"));
        let messages = players[1].messages();
        assert_eq!(
            of_type(&messages, "player-list-updated").last().unwrap()["host"],
            "bob"
        );
    }

    #[tokio::test]
    async fn failed_leave_keeps_host_and_members() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), 0).await;
        players[1].messages();
        store.fail_writes_after(0);

        let err = run(
            &state,
            &code,
            RoomCommand::Leave {
                player_id: "host".into(),
                connection_id: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        let room = stored(&store, &code).await.unwrap();
        assert_eq!(room.host, "host");
        assert_eq!(room.members.len(), 3);
        assert!(players[1].messages().is_empty());
    }

    #[tokio::test]
    async fn sole_member_leaving_deletes_with_one_write() {
        let (state, store) = state_with_config(AppConfig::default()).await;
        let room = create_room(&state, host(), None).await.unwrap();
        store.fail_writes_after(1);

        run(
            &state,
            &room.code,
            RoomCommand::Leave {
                player_id: "host".into(),
                connection_id: None,
            },
        )
        .await
        .unwrap();

        assert!(stored(&store, &room.code).await.is_none());
    }

    #[tokio::test]
    async fn only_the_host_deletes_the_room() {
        let (state, store, code, mut players) = lobby(AppConfig::default(), 0).await;

        let err = run(
            &state,
            &code,
            RoomCommand::Delete {
                player_id: "bob".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        players[1].messages();
        run(
            &state,
            &code,
            RoomCommand::Delete {
                player_id: "host".into(),
            },
        )
        .await
        .unwrap();

        assert!(stored(&store, &code).await.is_none());
        assert_eq!(of_type(&players[1].messages(), "room-deleted").len(), 1);
    }

    #[tokio::test]
    async fn chat_is_relayed_to_members_only() {
        let (state, _store, code, mut players) = lobby(AppConfig::default(), 0).await;
        players[2].messages();

        run(
            &state,
            &code,
            RoomCommand::Chat {
                player_id: "bob".into(),
                text: "  hola!  ".into(),
            },
        )
        .await
        .unwrap();

        let messages = players[2].messages();
        let chat = of_type(&messages, "chat-message");
        assert_eq!(chat[0]["text"], "  hola!  ");
        assert_eq!(chat[0]["author"]["username"], "Bob");

        let err = run(
            &state,
            &code,
            RoomCommand::Chat {
                player_id: "stranger".into(),
                text: "hi".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn degraded_storage_leaves_live_state_untouched() {
        let (state, _store, code, mut players) = started(AppConfig::default()).await;
        let before = state.live().get(&code).unwrap();

        state.clear_storage().await;
        let err = run(
            &state,
            &code,
            RoomCommand::UpdateProgress {
                player_id: "bob".into(),
                checked_count: 9,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::Degraded));
        assert_eq!(state.live().get(&code).unwrap(), before);
        assert!(players[0].messages().is_empty());
    }
}
