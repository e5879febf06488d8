use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::{
    dao::{
        models::{
            CardAssignmentEntity, MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity,
            RoomListItemEntity, UserStatsEntity,
        },
        room_store::{MemberRemoval, RoomStore, UserStatsStore},
        storage::StorageResult,
    },
    state::status::RoomStatus,
};

/// Process-local storage backend. Backs the test suite and `STORAGE_BACKEND=memory` runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rooms: Arc<RwLock<HashMap<String, RoomEntity>>>,
    users: Arc<RwLock<HashMap<String, UserStatsEntity>>>,
    #[cfg(test)]
    write_budget: Arc<std::sync::Mutex<Option<usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters recorded for `player_id`, if any game result touched them.
    pub async fn user_stats(&self, player_id: &str) -> Option<UserStatsEntity> {
        self.users.read().await.get(player_id).cloned()
    }

    /// Let the next `writes` room writes through, then fail every following one.
    #[cfg(test)]
    pub fn fail_writes_after(&self, writes: usize) {
        if let Ok(mut budget) = self.write_budget.lock() {
            *budget = Some(writes);
        }
    }

    #[cfg(test)]
    fn take_write(&self) -> StorageResult<()> {
        let Ok(mut budget) = self.write_budget.lock() else {
            return Ok(());
        };
        match budget.as_mut() {
            Some(0) => Err(crate::dao::storage::StorageError::unavailable(
                "injected write failure".into(),
                std::io::Error::other("write budget exhausted"),
            )),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn take_write(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Apply `update` to the room stored under `code` and return what it produced.
    async fn update_room<T>(
        &self,
        code: &str,
        update: impl FnOnce(&mut RoomEntity) -> T,
    ) -> StorageResult<Option<T>> {
        self.take_write()?;
        let mut rooms = self.rooms.write().await;
        Ok(rooms.get_mut(code).map(update))
    }
}

fn touch(room: &mut RoomEntity) {
    room.updated_at = SystemTime::now();
}

impl RoomStore for MemoryStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.take_write()?;
            let mut rooms = store.rooms.write().await;
            if rooms.contains_key(&room.code) {
                return Ok(false);
            }
            rooms.insert(room.code.clone(), room);
            Ok(true)
        })
    }

    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.rooms.read().await.get(&code).cloned()) })
    }

    fn list_rooms_for_member(
        &self,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store.rooms.read().await;
            let mut items: Vec<RoomListItemEntity> = rooms
                .values()
                .filter(|room| room.is_member(&player_id))
                .map(RoomListItemEntity::from)
                .collect();
            items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(items)
        })
    }

    fn add_member(
        &self,
        code: String,
        member: MemberEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_room(&code, |room| {
                    if !room.is_member(&member.player_id) {
                        room.members.push(member);
                        touch(room);
                    }
                    room.clone()
                })
                .await
        })
    }

    fn remove_member(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<MemberRemoval>>> {
        let store = self.clone();
        Box::pin(async move {
            store.take_write()?;
            let mut rooms = store.rooms.write().await;
            let Some(room) = rooms.get_mut(&code) else {
                return Ok(None);
            };

            room.members.retain(|member| member.player_id != player_id);
            let Some(first) = room.members.first().map(|member| member.player_id.clone()) else {
                rooms.remove(&code);
                return Ok(Some(MemberRemoval::RoomDeleted));
            };
            if room.is_host(&player_id) {
                room.host = first;
            }
            touch(room);
            Ok(Some(MemberRemoval::Removed(room.clone())))
        })
    }

    fn push_pool_event(
        &self,
        code: String,
        event: PoolEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .update_room(&code, |room| {
                    if room.status != RoomStatus::Waiting {
                        return false;
                    }
                    room.event_pool.push(event);
                    touch(room);
                    true
                })
                .await?
                .unwrap_or(false))
        })
    }

    fn start_game(
        &self,
        code: String,
        cards: Vec<CardAssignmentEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .update_room(&code, |room| {
                    if room.status != RoomStatus::Waiting {
                        return false;
                    }
                    room.status = RoomStatus::Active;
                    room.card_assignments = cards;
                    touch(room);
                    true
                })
                .await?
                .unwrap_or(false))
        })
    }

    fn add_marked_event(
        &self,
        code: String,
        marked: MarkedEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .update_room(&code, |room| {
                    if room.is_marked(marked.event_id) {
                        return false;
                    }
                    room.marked_events.push(marked);
                    touch(room);
                    true
                })
                .await?
                .unwrap_or(false))
        })
    }

    fn finish_room(
        &self,
        code: String,
        winner: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .update_room(&code, |room| {
                    if room.status != RoomStatus::Active {
                        return false;
                    }
                    room.status = RoomStatus::Finished;
                    room.winner = Some(winner);
                    touch(room);
                    true
                })
                .await?
                .unwrap_or(false))
        })
    }

    fn delete_room(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.take_write()?;
            Ok(store.rooms.write().await.remove(&code).is_some())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

impl UserStatsStore for MemoryStore {
    fn increment_wins(&self, player_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.users.write().await.entry(player_id).or_default().wins += 1;
            Ok(())
        })
    }

    fn increment_games_played(
        &self,
        player_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut users = store.users.write().await;
            for player_id in player_ids {
                users.entry(player_id).or_default().games_played += 1;
            }
            Ok(())
        })
    }
}
