//! Move request state machine
//!
//! Every crowd agent carries one [`MoveRequestState`]. The crowd never
//! assigns a state directly: it feeds a [`MoveRequestEvent`] through
//! [`MoveRequestState::transition`], which returns the next state or `None`
//! when the event is not legal in the current state.

use serde::{Deserialize, Serialize};

/// Progress of an agent's move request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveRequestState {
    /// No target, the agent stands still
    #[default]
    None,
    /// The target could not be reached
    Failed,
    /// The corridor leads to the target
    Valid,
    /// A target was set and needs a path
    Requesting,
    /// Waiting for a free path queue slot
    WaitingForQueue,
    /// A queued path search is running
    WaitingForPath,
    /// The agent follows a caller supplied velocity
    Velocity,
}

/// Events driving [`MoveRequestState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveRequestEvent {
    /// The caller requested a new target
    RequestTarget,
    /// The corridor or target became invalid and needs a new path
    Replan,
    /// A path to the target was found
    PathFound,
    /// The quick search fell short, a full search is needed
    NeedsQueue,
    /// The path queue accepted the request
    Queued,
    /// The target cannot be reached
    PathFailed,
    /// The caller requested a raw velocity
    RequestVelocity,
    /// The request was cleared
    Reset,
}

impl MoveRequestState {
    /// Next state after `event`, `None` when the edge does not exist
    pub fn transition(self, event: MoveRequestEvent) -> Option<MoveRequestState> {
        use MoveRequestEvent as E;
        use MoveRequestState as S;

        match (self, event) {
            (_, E::Reset) => Some(S::None),
            (_, E::RequestTarget) => Some(S::Requesting),

            (S::Valid | S::Failed | S::Requesting | S::WaitingForQueue | S::WaitingForPath, E::Replan) => {
                Some(S::Requesting)
            }

            (S::Requesting | S::WaitingForPath, E::PathFound) => Some(S::Valid),
            (S::Requesting, E::NeedsQueue) => Some(S::WaitingForQueue),
            (S::WaitingForQueue, E::Queued) => Some(S::WaitingForPath),
            (S::Requesting | S::WaitingForPath, E::PathFailed) => Some(S::Failed),

            (S::None | S::Valid | S::Velocity, E::RequestVelocity) => Some(S::Velocity),

            _ => None,
        }
    }

    /// Whether the agent follows a corridor toward a target
    pub fn has_target(self) -> bool {
        !matches!(self, MoveRequestState::None | MoveRequestState::Velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MoveRequestEvent as E;
    use MoveRequestState as S;

    const ALL_STATES: [S; 7] = [
        S::None,
        S::Failed,
        S::Valid,
        S::Requesting,
        S::WaitingForQueue,
        S::WaitingForPath,
        S::Velocity,
    ];

    const ALL_EVENTS: [E; 8] = [
        E::RequestTarget,
        E::Replan,
        E::PathFound,
        E::NeedsQueue,
        E::Queued,
        E::PathFailed,
        E::RequestVelocity,
        E::Reset,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = S::None;
        for event in [E::RequestTarget, E::NeedsQueue, E::Queued, E::PathFound] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, S::Valid);
    }

    #[test]
    fn test_reset_reaches_none_from_anywhere() {
        for state in ALL_STATES {
            assert_eq!(state.transition(E::Reset), Some(S::None));
        }
    }

    #[test]
    fn test_velocity_only_from_idle_or_valid() {
        assert_eq!(S::None.transition(E::RequestVelocity), Some(S::Velocity));
        assert_eq!(S::Valid.transition(E::RequestVelocity), Some(S::Velocity));
        assert_eq!(S::Velocity.transition(E::RequestVelocity), Some(S::Velocity));
        assert_eq!(S::WaitingForPath.transition(E::RequestVelocity), None);
        assert_eq!(S::Failed.transition(E::RequestVelocity), None);
    }

    #[test]
    fn test_illegal_edges() {
        assert_eq!(S::None.transition(E::PathFound), None);
        assert_eq!(S::None.transition(E::Replan), None);
        assert_eq!(S::Velocity.transition(E::Replan), None);
        assert_eq!(S::Valid.transition(E::Queued), None);
        assert_eq!(S::WaitingForQueue.transition(E::PathFound), None);
        assert_eq!(S::WaitingForQueue.transition(E::PathFailed), None);
    }

    #[test]
    fn test_failure_edges() {
        assert_eq!(S::Requesting.transition(E::PathFailed), Some(S::Failed));
        assert_eq!(S::WaitingForPath.transition(E::PathFailed), Some(S::Failed));
        assert_eq!(S::Failed.transition(E::Replan), Some(S::Requesting));
    }

    #[test]
    fn test_every_result_has_a_way_back_to_none() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                if let Some(next) = state.transition(event) {
                    assert_eq!(next.transition(E::Reset), Some(S::None));
                }
            }
        }
    }

    #[test]
    fn test_has_target() {
        assert!(!S::None.has_target());
        assert!(!S::Velocity.has_target());
        assert!(S::Failed.has_target());
        assert!(S::WaitingForQueue.has_target());
    }
}
