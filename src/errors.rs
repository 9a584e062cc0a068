// Copyright 2025 Cowboy AI, LLC.

//! Error types for the constraint engine and search driver.

use thiserror::Error;

/// Errors that can occur anywhere in the engine, plan database, or search
/// driver (spec §7).
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A constraint was constructed with an illegal scope (wrong arity, a
    /// variable whose data type the constraint's argument position
    /// rejects, or an unknown constraint/propagator name). Construction
    /// errors are immediate, no-partial-registration failures.
    #[error("construction error: {reason}")]
    Construction {
        /// Why the construction request was rejected.
        reason: String,
    },

    /// Propagation emptied a variable's derived domain. Recoverable by
    /// search (retract and try another choice) or reported to the caller
    /// if no search is active.
    #[error("consistency failure: domain of variable {var:?} emptied by constraint {constraint:?}")]
    Consistency {
        /// Index of the variable whose derived domain became empty.
        var: u64,
        /// Index of the constraint execution that emptied it, if known.
        constraint: Option<u64>,
    },

    /// The decision stack was exhausted without finding a consistent
    /// assignment.
    #[error("search exhausted after {steps} steps")]
    SearchExhausted {
        /// Number of committed-and-retracted steps taken before giving up.
        steps: u64,
    },

    /// The step budget set by `initRun` was exhausted before a solution or
    /// exhaustion was reached.
    #[error("timeout reached after {steps} steps")]
    Timeout {
        /// Number of steps executed before the budget ran out.
        steps: u64,
    },

    /// A configuration property map was unparseable or internally
    /// contradictory.
    #[error("configuration error: {reason}")]
    Configuration {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// Lookup by key of an entity that has been destroyed (or never
    /// existed under that generation). Per spec §7 this is a sentinel
    /// "no-entity" result at the API boundary, not a panic; this variant
    /// exists for call sites that need to surface it as an `Err` rather
    /// than an `Option`.
    #[error("stale reference: {entity_type} {key}")]
    StaleReference {
        /// Kind of entity the caller expected to find.
        entity_type: String,
        /// String form of the key that no longer resolves.
        key: String,
    },

    /// Attempted a state transition the token/object state machine does
    /// not allow.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Attempted to merge, reject, or place a token in a way that violates
    /// §4.8's merge/compatibility contract.
    #[error("invalid token operation: {reason}")]
    InvalidTokenOperation {
        /// Why the operation is invalid.
        reason: String,
    },

    /// Generic internal error for conditions the engine asserts can never
    /// occur by construction (e.g. the `∞ + (−∞)` combination in the
    /// infinity arithmetic of spec §4.1).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Build a construction error from any displayable reason.
    pub fn construction(reason: impl Into<String>) -> Self {
        EngineError::Construction {
            reason: reason.into(),
        }
    }

    /// Build a configuration error from any displayable reason.
    pub fn configuration(reason: impl Into<String>) -> Self {
        EngineError::Configuration {
            reason: reason.into(),
        }
    }

    /// True for [`EngineError::Consistency`] failures.
    pub fn is_consistency_failure(&self) -> bool {
        matches!(self, EngineError::Consistency { .. })
    }

    /// True for [`EngineError::StaleReference`].
    pub fn is_stale_reference(&self) -> bool {
        matches!(self, EngineError::StaleReference { .. })
    }

    /// True for [`EngineError::SearchExhausted`] or [`EngineError::Timeout`].
    pub fn is_search_terminal(&self) -> bool {
        matches!(
            self,
            EngineError::SearchExhausted { .. } | EngineError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_match_shape() {
        let e = EngineError::Consistency {
            var: 3,
            constraint: Some(7),
        };
        assert_eq!(
            e.to_string(),
            "consistency failure: domain of variable 3 emptied by constraint 7"
        );
    }

    #[test]
    fn helper_predicates_are_exclusive() {
        let e = EngineError::StaleReference {
            entity_type: "Token".into(),
            key: "4#2".into(),
        };
        assert!(e.is_stale_reference());
        assert!(!e.is_consistency_failure());
        assert!(!e.is_search_terminal());
    }

    #[test]
    fn constructors_roundtrip_message() {
        let e = EngineError::construction("unknown constraint 'foo'");
        assert_eq!(e.to_string(), "construction error: unknown constraint 'foo'");
    }
}
