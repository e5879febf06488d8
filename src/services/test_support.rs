//! Fixtures shared by the service tests.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::{
    config::AppConfig,
    dao::{models::MemberEntity, room_store::MemoryStore},
    dto::messages::ServerEvent,
    state::{AppState, ConnectionHandle, SharedState},
};

/// Application state backed by a fresh in-memory store.
pub async fn state_with_config(config: AppConfig) -> (SharedState, MemoryStore) {
    let state = AppState::new(config);
    let store = MemoryStore::new();
    state.install_storage(Arc::new(store.clone())).await;
    (state, store)
}

/// Fake client connection and the receiving end of its sink.
pub fn connect() -> (ConnectionHandle, UnboundedReceiver<ServerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(tx), rx)
}

pub fn host() -> MemberEntity {
    MemberEntity::new("host", "Hosty")
}

/// Every message delivered so far, decoded.
pub fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<Value> {
    let mut messages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Ok(value) = serde_json::from_str(&event.data) {
            messages.push(value);
        }
    }
    messages
}

/// Messages of the given `type`.
pub fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
    messages
        .iter()
        .filter(|message| message["type"] == kind)
        .collect()
}
