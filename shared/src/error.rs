//! Error taxonomy: client-side validation failures and store-side
//! write rejections.

use crate::record::Phase;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures detected by the session controller before any write is
/// issued. None of these mutate the record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("display name must not be empty")]
    EmptyName,
    #[error("room code must be 4-8 uppercase letters or digits")]
    BadRoomCode,
    #[error("no identity available for this client yet")]
    IdentityUnavailable,
    #[error("room already has four players")]
    RoomFull,
    #[error("only the host can do that")]
    NotHost,
    #[error("need exactly four players, have {0}")]
    WrongPlayerCount(usize),
    #[error("not allowed while the room is in the {0:?} phase")]
    WrongPhase(Phase),
    #[error("you are not in this room")]
    NotAMember,
    #[error("only the Raja and the Sipahi reveal their roles")]
    CannotReveal,
    #[error("only the Sipahi may guess")]
    NotSipahi,
    #[error("no player named {0} in this room")]
    UnknownTarget(String),
    #[error("{0} cannot be accused")]
    InvalidTarget(String),
    #[error("the guess deadline has not passed yet")]
    DeadlineNotReached,
}

/// Rejections produced by the document store. Serializable so they ride
/// back to the writer inside `Packet::Rejected`.
///
/// `InvalidTransition` is the expected outcome of a lost transition race
/// and is absorbed silently by clients; the next snapshot carries the
/// truth.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(String),
    #[error("room {0} already exists")]
    AlreadyExists(String),
    #[error("write rejected: room is in the {found:?} phase, expected {expected:?}")]
    InvalidTransition { expected: Phase, found: Phase },
    #[error("room already has four players")]
    RoomFull,
    #[error("room {0} is completed")]
    RoomClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_errors_render_user_facing_messages() {
        assert_eq!(ActionError::EmptyName.to_string(), "display name must not be empty");
        assert_eq!(
            ActionError::WrongPlayerCount(2).to_string(),
            "need exactly four players, have 2"
        );
        assert_eq!(
            ActionError::WrongPhase(Phase::Guess).to_string(),
            "not allowed while the room is in the Guess phase"
        );
    }

    #[test]
    fn store_errors_name_the_room() {
        assert_eq!(
            StoreError::NotFound("ABCD".into()).to_string(),
            "room ABCD not found"
        );
        assert_eq!(
            StoreError::AlreadyExists("ABCD".into()).to_string(),
            "room ABCD already exists"
        );
    }

    #[test]
    fn invalid_transition_reports_both_phases() {
        let err = StoreError::InvalidTransition {
            expected: Phase::Reveal,
            found: Phase::Guess,
        };
        assert_eq!(
            err.to_string(),
            "write rejected: room is in the Guess phase, expected Reveal"
        );
    }
}
