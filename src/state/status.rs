use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle of a room. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Members gather and contribute ideas.
    Waiting,
    /// Cards are dealt and events are being marked.
    Active,
    /// A winner was declared; the room is about to be deleted.
    Finished,
}

impl RoomStatus {
    /// Wire and storage representation of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Active => "active",
            RoomStatus::Finished => "finished",
        }
    }

    /// Compute the status reached by applying `event`, rejecting any backward or skipped edge.
    pub fn transition(self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        match (self, event) {
            (RoomStatus::Waiting, RoomEvent::StartGame) => Ok(RoomStatus::Active),
            (RoomStatus::Active, RoomEvent::DeclareWinner) => Ok(RoomStatus::Finished),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

/// Events that move a room through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host deals the cards.
    StartGame,
    /// A bingo claim was accepted.
    DeclareWinner,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while the room is {}", from.as_str())]
pub struct InvalidTransition {
    /// Status the room was in when the event was received.
    pub from: RoomStatus,
    /// The event that cannot be applied from this status.
    pub event: RoomEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_moves_forward() {
        let active = RoomStatus::Waiting.transition(RoomEvent::StartGame).unwrap();
        assert_eq!(active, RoomStatus::Active);
        assert_eq!(
            active.transition(RoomEvent::DeclareWinner).unwrap(),
            RoomStatus::Finished
        );
    }

    #[test]
    fn every_other_edge_is_rejected() {
        let rejected = [
            (RoomStatus::Waiting, RoomEvent::DeclareWinner),
            (RoomStatus::Active, RoomEvent::StartGame),
            (RoomStatus::Finished, RoomEvent::StartGame),
            (RoomStatus::Finished, RoomEvent::DeclareWinner),
        ];

        for (from, event) in rejected {
            let err = from.transition(event).unwrap_err();
            assert_eq!(err, InvalidTransition { from, event });
        }
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RoomStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: RoomStatus = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(parsed, RoomStatus::Finished);
    }
}
