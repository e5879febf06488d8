use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument, UpdateModifications},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::{establish_connection, ping},
    error::{MongoDaoError, MongoResult},
    models::{
        MongoRoomDocument, card_document, marked_event_document, member_document,
        pool_event_document, room_id,
    },
};
use crate::{
    dao::{
        models::{
            CardAssignmentEntity, MarkedEventEntity, MemberEntity, PoolEventEntity, RoomEntity,
            RoomListItemEntity,
        },
        room_store::{MemberRemoval, RoomStore, UserStatsStore},
        storage::StorageResult,
    },
    state::status::RoomStatus,
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const USER_COLLECTION_NAME: &str = "users";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`RoomStore`] and [`UserStatsStore`] implementation.
#[derive(Clone)]
pub struct MongoStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

/// `$set` stage shared by every room mutation so `updated_at` always moves.
fn touched(mut set: Document) -> Document {
    set.insert("updated_at", DateTime::now());
    set
}

impl MongoStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.rooms().await;
        let index = IndexModel::builder()
            .keys(doc! {"members.player_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_members_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "members.player_id",
                source,
            })?;

        Ok(())
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn users(&self) -> Collection<Document> {
        let guard = self.inner.state.read().await;
        guard.database.collection::<Document>(USER_COLLECTION_NAME)
    }

    async fn insert_room(&self, room: RoomEntity) -> MongoResult<bool> {
        let code = room.code.clone();
        let document: MongoRoomDocument = room.into();
        match self.rooms().await.insert_one(&document).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::UpdateRoom {
                code,
                operation: "insert",
                source,
            }),
        }
    }

    async fn find_room(&self, code: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(room_id(&code))
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                code: code.clone(),
                source,
            })?;

        document.map(RoomEntity::try_from).transpose()
    }

    async fn list_rooms_for_member(&self, player_id: String) -> MongoResult<Vec<RoomListItemEntity>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(doc! {"members.player_id": &player_id})
            .sort(doc! {"updated_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListRooms {
                player_id: player_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRooms {
                player_id: player_id.clone(),
                source,
            })?;

        Ok(documents.iter().map(RoomListItemEntity::from).collect())
    }

    /// Apply `update` to the room matching `filter` and return the resulting room.
    /// Falls back to a plain read when the filter excluded the room, so callers can tell an
    /// unchanged room apart from a missing one.
    async fn update_and_fetch(
        &self,
        code: String,
        filter: Document,
        update: impl Into<UpdateModifications>,
        operation: &'static str,
    ) -> MongoResult<Option<RoomEntity>> {
        let updated = self
            .rooms()
            .await
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                operation,
                source,
            })?;

        match updated {
            Some(document) => RoomEntity::try_from(document).map(Some),
            None => self.find_room(code).await,
        }
    }

    /// Apply `update` to the room matching `filter`; `true` when a document changed.
    async fn conditional_update(
        &self,
        code: &str,
        filter: Document,
        update: Document,
        operation: &'static str,
    ) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.to_owned(),
                operation,
                source,
            })?;

        Ok(result.modified_count > 0)
    }

    async fn add_member(&self, code: String, member: MemberEntity) -> MongoResult<Option<RoomEntity>> {
        let filter = doc! {"_id": &code, "members.player_id": {"$ne": &member.player_id}};
        let update = doc! {
            "$push": {"members": member_document(&member)},
            "$set": touched(Document::new()),
        };
        self.update_and_fetch(code, filter, update, "add member").await
    }

    /// Delete the room when `player_id` is its only member, otherwise pull them and move the
    /// host role in a single pipeline update.
    async fn remove_member(
        &self,
        code: String,
        player_id: String,
    ) -> MongoResult<Option<MemberRemoval>> {
        let sole_member = doc! {
            "_id": &code,
            "members": {"$size": 1},
            "members.player_id": &player_id,
        };
        let deleted = self
            .rooms()
            .await
            .delete_one(sole_member)
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                operation: "remove last member",
                source,
            })?;
        if deleted.deleted_count > 0 {
            return Ok(Some(MemberRemoval::RoomDeleted));
        }

        let filter = doc! {"_id": &code, "members.player_id": &player_id};
        let pipeline = vec![
            doc! {"$set": {"members": {"$filter": {
                "input": "$members",
                "cond": {"$ne": ["$$this.player_id", &player_id]},
            }}}},
            doc! {"$set": touched(doc! {"host": {"$cond": [
                {"$eq": ["$host", &player_id]},
                {"$arrayElemAt": ["$members.player_id", 0]},
                "$host",
            ]}})},
        ];
        let room = self
            .update_and_fetch(code, filter, pipeline, "remove member")
            .await?;
        Ok(room.map(MemberRemoval::Removed))
    }

    async fn push_pool_event(&self, code: String, event: PoolEventEntity) -> MongoResult<bool> {
        let filter = doc! {"_id": &code, "status": RoomStatus::Waiting.as_str()};
        let update = doc! {
            "$push": {"event_pool": pool_event_document(&event)},
            "$set": touched(Document::new()),
        };
        self.conditional_update(&code, filter, update, "add idea")
            .await
    }

    async fn start_game(&self, code: String, cards: Vec<CardAssignmentEntity>) -> MongoResult<bool> {
        let filter = doc! {"_id": &code, "status": RoomStatus::Waiting.as_str()};
        let cards: Vec<Document> = cards.iter().map(card_document).collect();
        let update = doc! {
            "$set": touched(doc! {
                "status": RoomStatus::Active.as_str(),
                "card_assignments": cards,
            }),
        };
        self.conditional_update(&code, filter, update, "start game")
            .await
    }

    async fn add_marked_event(&self, code: String, marked: MarkedEventEntity) -> MongoResult<bool> {
        let filter = doc! {
            "_id": &code,
            "marked_events.event_id": {"$ne": marked.event_id.to_string()},
        };
        let update = doc! {
            "$push": {"marked_events": marked_event_document(&marked)},
            "$set": touched(Document::new()),
        };
        self.conditional_update(&code, filter, update, "mark event")
            .await
    }

    async fn finish_room(&self, code: String, winner: String) -> MongoResult<bool> {
        let filter = doc! {"_id": &code, "status": RoomStatus::Active.as_str()};
        let update = doc! {
            "$set": touched(doc! {
                "status": RoomStatus::Finished.as_str(),
                "winner": &winner,
            }),
        };
        self.conditional_update(&code, filter, update, "finish game")
            .await
    }

    async fn delete_room(&self, code: String) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .delete_one(room_id(&code))
            .await
            .map_err(|source| MongoDaoError::UpdateRoom {
                code: code.clone(),
                operation: "delete",
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn increment_user_field(&self, player_id: String, field: &str) -> MongoResult<()> {
        self.users()
            .await
            .update_one(doc! {"_id": &player_id}, doc! {"$inc": {field: 1}})
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::UpdateUser { player_id, source })?;
        Ok(())
    }
}

impl RoomStore for MongoStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, code: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { MongoStore::find_room(&store, code).await.map_err(Into::into) })
    }

    fn list_rooms_for_member(
        &self,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomListItemEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::list_rooms_for_member(&store, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn add_member(
        &self,
        code: String,
        member: MemberEntity,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::add_member(&store, code, member)
                .await
                .map_err(Into::into)
        })
    }

    fn remove_member(
        &self,
        code: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<MemberRemoval>>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::remove_member(&store, code, player_id)
                .await
                .map_err(Into::into)
        })
    }

    fn push_pool_event(
        &self,
        code: String,
        event: PoolEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::push_pool_event(&store, code, event)
                .await
                .map_err(Into::into)
        })
    }

    fn start_game(
        &self,
        code: String,
        cards: Vec<CardAssignmentEntity>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::start_game(&store, code, cards)
                .await
                .map_err(Into::into)
        })
    }

    fn add_marked_event(
        &self,
        code: String,
        marked: MarkedEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::add_marked_event(&store, code, marked)
                .await
                .map_err(Into::into)
        })
    }

    fn finish_room(
        &self,
        code: String,
        winner: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            MongoStore::finish_room(&store, code, winner)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_room(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { MongoStore::delete_room(&store, code).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl UserStatsStore for MongoStore {
    fn increment_wins(&self, player_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .increment_user_field(player_id, "wins")
                .await
                .map_err(Into::into)
        })
    }

    fn increment_games_played(
        &self,
        player_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for player_id in player_ids {
                store
                    .increment_user_field(player_id, "games_played")
                    .await?;
            }
            Ok(())
        })
    }
}
