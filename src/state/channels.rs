use std::collections::HashMap;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::ConnectionHandle;
use crate::dto::messages::ServerEvent;

/// Broadcast layer: room code to the connections subscribed to that room.
///
/// A connection follows at most one room at a time.
#[derive(Default)]
pub struct RoomChannels {
    rooms: DashMap<String, HashMap<Uuid, ConnectionHandle>>,
    memberships: DashMap<Uuid, String>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `connection` to `code`, leaving whatever room it followed before.
    pub fn subscribe(&self, code: &str, connection: ConnectionHandle) {
        let connection_id = connection.id;
        let previous = self.memberships.insert(connection_id, code.to_owned());
        if let Some(previous) = previous.filter(|previous| previous != code) {
            self.remove_from_room(&previous, connection_id);
        }

        self.rooms
            .entry(code.to_owned())
            .or_default()
            .insert(connection_id, connection);
    }

    /// Drop `connection_id` from whatever room it follows.
    pub fn unsubscribe(&self, connection_id: Uuid) -> Option<String> {
        let (_, code) = self.memberships.remove(&connection_id)?;
        self.remove_from_room(&code, connection_id);
        Some(code)
    }

    /// Drop `connection_id` from `code` only if that is the room it follows.
    pub fn unsubscribe_from(&self, code: &str, connection_id: Uuid) {
        if self
            .memberships
            .remove_if(&connection_id, |_, current| current == code)
            .is_some()
        {
            self.remove_from_room(code, connection_id);
        }
    }

    /// Serialize once and fan out to every subscriber of `code`. Closed sinks are pruned.
    pub fn broadcast(&self, code: &str, event: &ServerEvent) -> usize {
        let mut dead = Vec::new();
        let delivered = match self.rooms.get(code) {
            Some(subscribers) => subscribers
                .values()
                .filter(|connection| {
                    let sent = connection.send(event.clone());
                    if !sent {
                        dead.push(connection.id);
                    }
                    sent
                })
                .count(),
            None => 0,
        };

        for connection_id in dead {
            debug!(code, %connection_id, "pruning closed room subscriber");
            self.unsubscribe_from(code, connection_id);
        }

        delivered
    }

    /// Forget the channel of `code` and every subscription to it.
    pub fn close(&self, code: &str) {
        if let Some((_, subscribers)) = self.rooms.remove(code) {
            for connection_id in subscribers.keys() {
                self.memberships
                    .remove_if(connection_id, |_, current| current == code);
            }
        }
    }

    pub fn is_subscribed(&self, code: &str, connection_id: Uuid) -> bool {
        self.memberships
            .get(&connection_id)
            .is_some_and(|current| current.value() == code)
    }

    pub fn subscriber_count(&self, code: &str) -> usize {
        self.rooms.get(code).map_or(0, |subscribers| subscribers.len())
    }

    fn remove_from_room(&self, code: &str, connection_id: Uuid) {
        if let Some(mut subscribers) = self.rooms.get_mut(code) {
            subscribers.remove(&connection_id);
        }
        self.rooms
            .remove_if(code, |_, subscribers| subscribers.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn event(text: &str) -> ServerEvent {
        ServerEvent {
            event: Some("notice".into()),
            data: text.into(),
        }
    }

    #[test]
    fn broadcast_reaches_every_subscriber_of_the_room() {
        let channels = RoomChannels::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_other, mut rx_other) = mpsc::unbounded_channel();

        channels.subscribe("ABCDEF", ConnectionHandle::new(tx_a));
        channels.subscribe("ABCDEF", ConnectionHandle::new(tx_b));
        channels.subscribe("ZZZZZZ", ConnectionHandle::new(tx_other));

        assert_eq!(channels.broadcast("ABCDEF", &event("hello")), 2);
        assert_eq!(rx_a.try_recv().unwrap().data, "hello");
        assert_eq!(rx_b.try_recv().unwrap().data, "hello");
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn subscribing_elsewhere_moves_the_connection() {
        let channels = RoomChannels::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(tx);

        channels.subscribe("AAAAAA", connection.clone());
        channels.subscribe("BBBBBB", connection.clone());

        assert_eq!(channels.subscriber_count("AAAAAA"), 0);
        assert!(channels.is_subscribed("BBBBBB", connection.id));

        channels.unsubscribe_from("AAAAAA", connection.id);
        assert!(channels.is_subscribed("BBBBBB", connection.id));
    }

    #[test]
    fn closed_sinks_are_pruned() {
        let channels = RoomChannels::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(tx);
        channels.subscribe("ABCDEF", connection.clone());
        drop(rx);

        assert_eq!(channels.broadcast("ABCDEF", &event("gone")), 0);
        assert!(!channels.is_subscribed("ABCDEF", connection.id));
    }

    #[test]
    fn close_forgets_all_subscriptions() {
        let channels = RoomChannels::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = ConnectionHandle::new(tx);
        channels.subscribe("ABCDEF", connection.clone());

        channels.close("ABCDEF");
        assert_eq!(channels.subscriber_count("ABCDEF"), 0);
        assert_eq!(channels.unsubscribe(connection.id), None);
    }
}
