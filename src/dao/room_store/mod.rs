pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    CardAssignmentEntity, MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity,
    RoomListItemEntity,
};
use crate::dao::storage::StorageResult;

pub use memory::MemoryStore;

/// Outcome of [`RoomStore::remove_member`].
#[derive(Debug, Clone)]
pub enum MemberRemoval {
    /// The room lives on in the returned state.
    Removed(RoomEntity),
    /// The member was the last one and the room is gone.
    RoomDeleted,
}

/// Durable room records. Every mutation is a single atomic update on one room.
pub trait RoomStore: Send + Sync {
    /// Insert a new room. Resolves to `false` when the code is already taken.
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Rooms `player_id` is a member of, most recently updated first.
    fn list_rooms_for_member(
        &self,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomListItemEntity>>>;
    /// Add `member` unless already present and return the resulting room.
    fn add_member(
        &self,
        code: String,
        member: MemberEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Pull `player_id` from the members in one update. A leaving host hands the role to the
    /// first remaining member; the last member leaving deletes the room instead.
    fn remove_member(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<MemberRemoval>>>;
    /// Append an idea; only applies while the room is waiting.
    fn push_pool_event(
        &self,
        code: String,
        event: PoolEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Move a waiting room to active and store the dealt cards in the same update.
    fn start_game(
        &self,
        code: String,
        cards: Vec<CardAssignmentEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Record a marked event. Resolves to `false` when that event was already marked.
    fn add_marked_event(
        &self,
        code: String,
        marked: MarkedEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Move an active room to finished with `winner`. Resolves to `false` if the room was
    /// not active anymore.
    fn finish_room(&self, code: String, winner: String)
    -> BoxFuture<'static, StorageResult<bool>>;
    fn delete_room(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Win and participation counters owned by the account collaborator.
pub trait UserStatsStore: Send + Sync {
    fn increment_wins(&self, player_id: String) -> BoxFuture<'static, StorageResult<()>>;
    fn increment_games_played(
        &self,
        player_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>>;
}

/// Everything the room engine needs from a storage backend.
pub trait Storage: RoomStore + UserStatsStore {}

impl<T> Storage for T where T: RoomStore + UserStatsStore {}
