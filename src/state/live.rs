use std::{collections::VecDeque, time::SystemTime};

use dashmap::DashMap;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::models::MemberEntity;

/// One line of the in-game activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogEntry {
    /// Username of the member who marked the event.
    pub actor: String,
    pub event_id: Uuid,
    pub event_text: String,
    pub timestamp: SystemTime,
}

/// Progress of a single player as reported by their client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStat {
    pub player_id: String,
    pub username: String,
    /// Checked cells including the free centre.
    pub checked_count: u8,
    pub has_line: bool,
    pub has_bingo: bool,
}

impl PlayerStat {
    fn new(member: &MemberEntity) -> Self {
        Self {
            player_id: member.player_id.clone(),
            username: member.username.clone(),
            checked_count: 1,
            has_line: false,
            has_bingo: false,
        }
    }
}

/// Ephemeral per-room game progress. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveGameState {
    event_log: VecDeque<EventLogEntry>,
    player_stats: IndexMap<String, PlayerStat>,
}

impl LiveGameState {
    /// Fresh state with one stat entry per member, in member order.
    pub fn new(members: &[MemberEntity]) -> Self {
        let player_stats = members
            .iter()
            .map(|member| (member.player_id.clone(), PlayerStat::new(member)))
            .collect();

        Self {
            event_log: VecDeque::new(),
            player_stats,
        }
    }

    /// Most recent entry first.
    pub fn event_log(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.event_log.iter()
    }

    pub fn player_stats(&self) -> impl Iterator<Item = &PlayerStat> {
        self.player_stats.values()
    }

    pub fn stat_mut(&mut self, player_id: &str) -> Option<&mut PlayerStat> {
        self.player_stats.get_mut(player_id)
    }

    /// Prepend `entry`, dropping the oldest entries beyond `cap`.
    pub fn record_event(&mut self, entry: EventLogEntry, cap: usize) {
        self.event_log.push_front(entry);
        self.event_log.truncate(cap);
    }
}

/// Room code to live state for every room that is (or just was) active.
#[derive(Default)]
pub struct LiveStateTable {
    rooms: DashMap<String, LiveGameState>,
}

impl LiveStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, code: &str, state: LiveGameState) {
        self.rooms.insert(code.to_owned(), state);
    }

    /// Snapshot of the live state of `code`.
    pub fn get(&self, code: &str) -> Option<LiveGameState> {
        self.rooms.get(code).map(|entry| entry.value().clone())
    }

    /// Mutate the live state of `code` in place and return what `update` produced.
    pub fn with_mut<T>(&self, code: &str, update: impl FnOnce(&mut LiveGameState) -> T) -> Option<T> {
        self.rooms.get_mut(code).map(|mut entry| update(entry.value_mut()))
    }

    pub fn remove(&self, code: &str) -> Option<LiveGameState> {
        self.rooms.remove(code).map(|(_, state)| state)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(actor: &str, index: usize) -> EventLogEntry {
        EventLogEntry {
            actor: actor.into(),
            event_id: Uuid::new_v4(),
            event_text: format!("idea #{index}"),
            timestamp: SystemTime::now(),
        }
    }

    fn members() -> Vec<MemberEntity> {
        vec![
            MemberEntity::new("a", "Alice"),
            MemberEntity::new("b", "Bob"),
            MemberEntity::new("c", "Carol"),
        ]
    }

    #[test]
    fn stats_follow_member_order_and_start_at_one() {
        let state = LiveGameState::new(&members());
        let stats: Vec<_> = state.player_stats().collect();

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].username, "Alice");
        assert_eq!(stats[2].username, "Carol");
        assert!(stats.iter().all(|stat| stat.checked_count == 1));
        assert!(stats.iter().all(|stat| !stat.has_line && !stat.has_bingo));
    }

    #[test]
    fn event_log_is_capped_newest_first() {
        let mut state = LiveGameState::new(&members());
        for index in 0..25 {
            state.record_event(entry("Alice", index), 20);
        }

        let log: Vec<_> = state.event_log().collect();
        assert_eq!(log.len(), 20);
        assert_eq!(log[0].event_text, "idea #24");
        assert_eq!(log[19].event_text, "idea #5");
    }

    #[test]
    fn table_mutations_are_visible_in_snapshots() {
        let table = LiveStateTable::new();
        table.insert("ABCDEF", LiveGameState::new(&members()));

        let updated = table.with_mut("ABCDEF", |state| {
            let stat = state.stat_mut("b").unwrap();
            stat.checked_count = 7;
            stat.checked_count
        });
        assert_eq!(updated, Some(7));
        assert!(table.with_mut("NOPE", |_| ()).is_none());

        let snapshot = table.get("ABCDEF").unwrap();
        let bob = snapshot.player_stats().find(|stat| stat.player_id == "b").unwrap();
        assert_eq!(bob.checked_count, 7);

        assert!(table.remove("ABCDEF").is_some());
        assert!(!table.contains("ABCDEF"));
    }
}
