use dashmap::DashMap;
use uuid::Uuid;

use super::ConnectionHandle;

/// Player id to the connection currently speaking for that player.
#[derive(Default)]
pub struct PresenceDirectory {
    players: DashMap<String, ConnectionHandle>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `player_id` to `connection`, orphaning any previous connection.
    pub fn register(&self, player_id: &str, connection: ConnectionHandle) {
        self.players.insert(player_id.to_owned(), connection);
    }

    pub fn resolve(&self, player_id: &str) -> Option<ConnectionHandle> {
        self.players
            .get(player_id)
            .map(|entry| entry.value().clone())
    }

    /// Remove the player whose registered connection is `connection_id`.
    ///
    /// A player that re-registered from a newer connection keeps that mapping.
    pub fn unregister(&self, connection_id: Uuid) -> Option<String> {
        let player_id = self
            .players
            .iter()
            .find(|entry| entry.value().id == connection_id)
            .map(|entry| entry.key().clone())?;

        self.players
            .remove_if(&player_id, |_, connection| connection.id == connection_id)
            .map(|(player_id, _)| player_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn connection() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new(tx)
    }

    #[test]
    fn register_overwrites_previous_connection() {
        let presence = PresenceDirectory::new();
        let first = connection();
        let second = connection();

        presence.register("alice", first.clone());
        presence.register("alice", second.clone());

        assert_eq!(presence.resolve("alice").unwrap().id, second.id);
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn unregister_only_removes_matching_connection() {
        let presence = PresenceDirectory::new();
        let stale = connection();
        let fresh = connection();

        presence.register("alice", stale.clone());
        presence.register("alice", fresh.clone());

        assert_eq!(presence.unregister(stale.id), None);
        assert!(presence.resolve("alice").is_some());

        assert_eq!(presence.unregister(fresh.id).as_deref(), Some("alice"));
        assert!(presence.is_empty());
    }
}
