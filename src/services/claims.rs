//! Single seam through which line and bingo claims pass before they are applied.
//!
//! Clients detect wins against their own card and report them. [`TrustClient`] keeps that
//! trust boundary as is: a claim is accepted without looking at the marks, so a client could
//! claim bingo without a single marked event. [`CardAgainstMarks`] closes the gap by replaying
//! the claim against the claimant's stored card and the room's marked events.

use std::{collections::HashSet, sync::Arc};

use uuid::Uuid;

use crate::{
    config::ClaimPolicy,
    dao::models::RoomEntity,
    error::ServiceError,
    state::card::{has_line, is_full, marked_grid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    Line,
    Bingo,
}

impl ClaimKind {
    fn label(self) -> &'static str {
        match self {
            ClaimKind::Line => "line",
            ClaimKind::Bingo => "bingo",
        }
    }
}

/// What a verifier gets to look at.
pub struct ClaimContext<'a> {
    pub room: &'a RoomEntity,
    pub player_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimVerdict {
    Accepted,
    Rejected(String),
}

pub trait ClaimVerifier: Send + Sync {
    fn verify(&self, claim: ClaimKind, context: &ClaimContext<'_>) -> ClaimVerdict;
}

/// Accept every claim as reported.
pub struct TrustClient;

impl ClaimVerifier for TrustClient {
    fn verify(&self, _claim: ClaimKind, _context: &ClaimContext<'_>) -> ClaimVerdict {
        ClaimVerdict::Accepted
    }
}

/// Recompute the claim from the claimant's card and the room's marked events.
pub struct CardAgainstMarks;

impl ClaimVerifier for CardAgainstMarks {
    fn verify(&self, claim: ClaimKind, context: &ClaimContext<'_>) -> ClaimVerdict {
        let Some(card) = context.room.card_for(context.player_id) else {
            return ClaimVerdict::Rejected("no card was dealt to this player".into());
        };

        let marked: HashSet<Uuid> = context
            .room
            .marked_events
            .iter()
            .map(|marked| marked.event_id)
            .collect();
        let grid = marked_grid(&card.cells, |cell| marked.contains(&cell));

        let complete = match claim {
            ClaimKind::Line => has_line(&grid),
            ClaimKind::Bingo => is_full(&grid),
        };

        if complete {
            ClaimVerdict::Accepted
        } else {
            ClaimVerdict::Rejected(format!(
                "{} claim does not match the marked events",
                claim.label()
            ))
        }
    }
}

/// Verifier implementing `policy`.
pub fn verifier_for(policy: ClaimPolicy) -> Arc<dyn ClaimVerifier> {
    match policy {
        ClaimPolicy::Trust => Arc::new(TrustClient),
        ClaimPolicy::Verify => Arc::new(CardAgainstMarks),
    }
}

/// Run `claim` through `verifier`, turning a rejection into [`ServiceError::InvalidState`].
pub fn verify_claim(
    verifier: &dyn ClaimVerifier,
    claim: ClaimKind,
    context: &ClaimContext<'_>,
) -> Result<(), ServiceError> {
    match verifier.verify(claim, context) {
        ClaimVerdict::Accepted => Ok(()),
        ClaimVerdict::Rejected(reason) => Err(ServiceError::InvalidState(reason)),
    }
}
