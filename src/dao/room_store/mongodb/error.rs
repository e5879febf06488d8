use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{code}`")]
    LoadRoom {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update room `{code}` ({operation})")]
    UpdateRoom {
        code: String,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("stored room `{code}` is malformed: {reason}")]
    MalformedRoom { code: String, reason: String },
    #[error("failed to list rooms for player `{player_id}`")]
    ListRooms {
        player_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update stats of player `{player_id}`")]
    UpdateUser {
        player_id: String,
        #[source]
        source: MongoError,
    },
}
