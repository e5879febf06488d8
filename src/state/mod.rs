pub mod card;
pub mod channels;
pub mod live;
pub mod presence;
pub mod room_queue;
pub mod status;

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::room_store::Storage,
    dto::messages::ServerEvent,
    error::ServiceError,
    services::claims::{self, ClaimVerifier},
};

use self::{
    channels::RoomChannels, live::LiveStateTable, presence::PresenceDirectory,
    room_queue::RoomQueues,
};

pub type SharedState = Arc<AppState>;

#[derive(Clone, Debug)]
/// Handle used to push messages to one connected client (WebSocket or SSE spectator).
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Wrap the sink of a freshly accepted connection.
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Queue `event` for delivery. `false` once the connection is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Central application state: storage handle, room tables and connection registries.
pub struct AppState {
    storage: RwLock<Option<Arc<dyn Storage>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    claims: Arc<dyn ClaimVerifier>,
    live: LiveStateTable,
    presence: PresenceDirectory,
    channels: RoomChannels,
    queues: RoomQueues,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let claims = claims::verifier_for(config.claim_policy());
        Arc::new(Self {
            storage: RwLock::new(None),
            degraded: degraded_tx,
            config,
            claims,
            live: LiveStateTable::new(),
            presence: PresenceDirectory::new(),
            channels: RoomChannels::new(),
            queues: RoomQueues::new(),
        })
    }

    /// Obtain a handle to the current storage backend, if one is installed.
    pub async fn storage(&self) -> Option<Arc<dyn Storage>> {
        let guard = self.storage.read().await;
        guard.as_ref().cloned()
    }

    /// Storage backend, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_storage(&self) -> Result<Arc<dyn Storage>, ServiceError> {
        self.storage().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new storage backend and leave degraded mode.
    pub async fn install_storage(&self, storage: Arc<dyn Storage>) {
        {
            let mut guard = self.storage.write().await;
            *guard = Some(storage);
        }
        self.update_degraded(false);
    }

    /// Remove the current storage backend and enter degraded mode.
    pub async fn clear_storage(&self) {
        {
            let mut guard = self.storage.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.storage.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Policy applied to line and bingo claims.
    pub fn claims(&self) -> &dyn ClaimVerifier {
        self.claims.as_ref()
    }

    pub fn live(&self) -> &LiveStateTable {
        &self.live
    }

    pub fn presence(&self) -> &PresenceDirectory {
        &self.presence
    }

    pub fn channels(&self) -> &RoomChannels {
        &self.channels
    }

    pub fn queues(&self) -> &RoomQueues {
        &self.queues
    }

    /// Update and broadcast the degraded flag when the value changes.
    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}
