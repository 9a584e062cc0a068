//! Token state: the `{INACTIVE, ACTIVE, MERGED, REJECTED}` domain spec §3
//! assigns every token, and the transition/undo rules spec §4.8 and
//! §4.11 impose on it.
//!
//! The teacher crate models aggregate lifecycles with generic Moore/Mealy
//! state-machine traits parameterized over an aggregate id and an
//! arbitrary output type. A token's state transitions here are few,
//! fixed, and each carries transition-specific data (a merge names its
//! target, a reject needs nothing) that does not fit a single `Output`
//! associated type cleanly, so this module keeps the teacher's shape —
//! an explicit state enum with `can_transition_to`/`valid_transitions`
//! inherent methods plus a recorded transition history — without the
//! generic trait scaffolding, which would add a type parameter for no
//! client of this crate.

use crate::plan::TokenId;
use serde::{Deserialize, Serialize};

/// A token's current or candidate state (spec §3 `Token`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenState {
    Inactive,
    Active,
    /// Merged onto a compatible active token; never a committed *target*
    /// state without a target token, so `commit_merge` carries the target
    /// separately rather than embedding it in this variant.
    Merged,
    Rejected,
}

impl TokenState {
    pub fn name(&self) -> &'static str {
        match self {
            TokenState::Inactive => "INACTIVE",
            TokenState::Active => "ACTIVE",
            TokenState::Merged => "MERGED",
            TokenState::Rejected => "REJECTED",
        }
    }

    /// Whether a transition from `self` to `target` is permitted at all
    /// (ignoring the additional preconditions `cancel`/`merge` impose,
    /// e.g. merge target compatibility, which the plan database checks
    /// separately since they need access to other tokens' domains).
    pub fn can_transition_to(&self, target: TokenState) -> bool {
        use TokenState::*;
        matches!(
            (self, target),
            (Inactive, Active | Merged | Rejected)
                // `cancel` is the only way back to Inactive, modeled as the
                // reverse of whichever transition was committed.
                | (Active, Inactive)
                | (Merged, Inactive)
                | (Rejected, Inactive)
        )
    }

    pub fn valid_transitions(&self) -> Vec<TokenState> {
        use TokenState::*;
        match self {
            Inactive => vec![Active, Merged, Rejected],
            Active | Merged | Rejected => vec![Inactive],
        }
    }
}

/// The domain of states still open to a token: which of
/// `{ACTIVE, MERGED, REJECTED}` remain candidates, and (once committed)
/// which one was chosen. Mirrors `ConstrainedVariable`'s base/derived
/// split at the granularity spec §4.9 needs for `DecisionPoint::Token`:
/// "unit" when exactly one candidate remains uncommitted, "non-unit"
/// while more than one remains.
#[derive(Debug, Clone)]
pub struct TokenStateDomain {
    candidates: Vec<TokenState>,
    committed: Option<TokenState>,
}

impl TokenStateDomain {
    /// A freshly created token's domain (spec §3 `Token`): always
    /// `{INACTIVE, ACTIVE}`, plus `REJECTED` iff rejectable, plus
    /// `MERGED` iff at least one compatible active token exists. The
    /// plan database recomputes the `MERGED` member as active tokens
    /// come and go; `INACTIVE` itself is never a committed target of a
    /// fresh decision (spec §4.9: "INACTIVE and INCOMPLETE skipped"), so
    /// it is tracked implicitly rather than listed as a candidate.
    pub fn new(rejectable: bool, mergeable: bool) -> Self {
        let mut candidates = vec![TokenState::Active];
        if mergeable {
            candidates.push(TokenState::Merged);
        }
        if rejectable {
            candidates.push(TokenState::Rejected);
        }
        Self {
            candidates,
            committed: None,
        }
    }

    pub fn candidates(&self) -> &[TokenState] {
        &self.candidates
    }

    pub fn committed(&self) -> Option<TokenState> {
        self.committed
    }

    pub fn is_singleton(&self) -> bool {
        self.committed.is_some() || self.candidates.len() == 1
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_none() && self.candidates.is_empty()
    }

    /// Whether `MERGED` is still a live candidate (recomputed by the
    /// plan database as the set of compatible active tokens changes).
    pub fn set_mergeable(&mut self, mergeable: bool) {
        if self.committed.is_some() {
            return;
        }
        let has = self.candidates.contains(&TokenState::Merged);
        if mergeable && !has {
            self.candidates.push(TokenState::Merged);
        } else if !mergeable && has {
            self.candidates.retain(|s| *s != TokenState::Merged);
        }
    }

    /// Commit to `target`. Caller (plan database) has already validated
    /// `target` is a live candidate and any target-specific precondition.
    pub fn commit(&mut self, target: TokenState) {
        self.committed = Some(target);
    }

    /// Undo a commitment, restoring the candidate list as it was at
    /// commit time (spec §4.11 "Undo": "restore token state to
    /// pre-transition").
    pub fn retract(&mut self) {
        self.committed = None;
    }
}

/// One committed or retracted transition, kept for the (out-of-scope)
/// partial-plan writer the way the teacher's `StateTransition` history
/// serves its own aggregates (SPEC_FULL.md §4 "lastExecutedDecision").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransition {
    pub token: TokenId,
    pub from: TokenState,
    pub to: TokenState,
    /// Set only for a `Merged` transition: the active token merged onto.
    pub merge_target: Option<TokenId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_rejectable_mergeable_domain_has_three_candidates() {
        let d = TokenStateDomain::new(true, true);
        assert_eq!(d.candidates().len(), 3);
        assert!(!d.is_singleton());
    }

    #[test]
    fn non_rejectable_non_mergeable_domain_is_singleton_active() {
        let d = TokenStateDomain::new(false, false);
        assert_eq!(d.candidates(), &[TokenState::Active]);
        assert!(d.is_singleton());
    }

    #[test]
    fn commit_then_retract_restores_candidates() {
        let mut d = TokenStateDomain::new(true, false);
        d.commit(TokenState::Active);
        assert!(d.is_singleton());
        d.retract();
        assert_eq!(d.committed(), None);
        assert_eq!(d.candidates().len(), 2);
    }

    #[test]
    fn set_mergeable_toggles_candidate_without_committing() {
        let mut d = TokenStateDomain::new(false, false);
        d.set_mergeable(true);
        assert!(d.candidates().contains(&TokenState::Merged));
        d.set_mergeable(false);
        assert!(!d.candidates().contains(&TokenState::Merged));
    }

    #[test]
    fn inactive_can_reach_every_committable_state() {
        let s = TokenState::Inactive;
        for target in [TokenState::Active, TokenState::Merged, TokenState::Rejected] {
            assert!(s.can_transition_to(target));
        }
    }
}
