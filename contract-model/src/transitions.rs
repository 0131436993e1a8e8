//! Contract state machine, centralized so every lifecycle operation
//! consults the same table instead of re-deriving legality inline.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractState {
    Draft,
    Proposed,
    Signed,
    Revoked,
    Expired,
}

impl ContractState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ContractState::Revoked | ContractState::Expired)
    }

    /// True if `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: ContractState) -> bool {
        use ContractState::*;
        matches!(
            (self, to),
            (Draft, Proposed)
                | (Draft, Revoked)
                | (Proposed, Signed)
                | (Proposed, Revoked)
                | (Proposed, Draft)
                | (Signed, Revoked)
        )
    }
}

impl std::fmt::Display for ContractState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContractState::Draft => "DRAFT",
            ContractState::Proposed => "PROPOSED",
            ContractState::Signed => "SIGNED",
            ContractState::Revoked => "REVOKED",
            ContractState::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::ContractState::*;

    #[test]
    fn legal_transitions() {
        assert!(Draft.can_transition_to(Proposed));
        assert!(Draft.can_transition_to(Revoked));
        assert!(Proposed.can_transition_to(Signed));
        assert!(Proposed.can_transition_to(Revoked));
        assert!(Proposed.can_transition_to(Draft));
        assert!(Signed.can_transition_to(Revoked));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Draft.can_transition_to(Signed));
        assert!(!Signed.can_transition_to(Proposed));
        assert!(!Revoked.can_transition_to(Draft));
        assert!(!Expired.can_transition_to(Draft));
        assert!(Revoked.is_terminal());
        assert!(Expired.is_terminal());
    }
}
