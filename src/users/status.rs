use serde::{Deserialize, Serialize};

/// Invite lifecycle state of a user account.
///
/// Stored as an explicit status column with a validated transition table;
/// transitions only ever move forward and `Accepted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invite_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Requested,
    Invited,
    Accepted,
}

impl InviteStatus {
    /// Whether `self -> next` is a legal transition. Re-issuing an invite to
    /// an already-invited user is allowed (idempotent); everything else must
    /// move strictly forward, one step at a time.
    pub fn can_transition_to(self, next: InviteStatus) -> bool {
        matches!(
            (self, next),
            (InviteStatus::Requested, InviteStatus::Invited)
                | (InviteStatus::Invited, InviteStatus::Invited)
                | (InviteStatus::Invited, InviteStatus::Accepted)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == InviteStatus::Accepted
    }
}

#[cfg(test)]
mod status_tests {
    use super::InviteStatus::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(Requested.can_transition_to(Invited));
        assert!(Invited.can_transition_to(Accepted));
    }

    #[test]
    fn reinvite_is_idempotent() {
        assert!(Invited.can_transition_to(Invited));
    }

    #[test]
    fn backward_and_skip_transitions_are_rejected() {
        assert!(!Invited.can_transition_to(Requested));
        assert!(!Accepted.can_transition_to(Invited));
        assert!(!Accepted.can_transition_to(Requested));
        assert!(!Requested.can_transition_to(Accepted));
        assert!(!Requested.can_transition_to(Requested));
    }

    #[test]
    fn accepted_is_terminal() {
        assert!(Accepted.is_terminal());
        assert!(!Accepted.can_transition_to(Accepted));
        assert!(!Requested.is_terminal());
        assert!(!Invited.is_terminal());
    }
}
