//! Engine configuration: a property map consumed at [`crate::Engine::new`]
//! (spec §6).

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Preference direction used by the decision manager to rank candidate
/// decisions by heuristic priority (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityPreference {
    /// Prefer the decision with the largest priority value.
    High,
    /// Prefer the decision with the smallest priority value.
    Low,
}

/// Parsed engine configuration.
///
/// Constructed from a `&str` key/value property map the way the teacher's
/// `DomainError`-returning constructors validate eagerly at the boundary:
/// an unparseable or contradictory entry fails [`Config::from_properties`]
/// immediately rather than being discovered lazily mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `ConstraintEngine.allowViolations`: keep propagating past an emptied
    /// domain instead of halting the cycle immediately.
    pub allow_violations: bool,
    /// `TemporalNetwork.useTemporalPropagator`: when false, temporal
    /// constraints fall back to default bound propagation.
    pub use_temporal_propagator: bool,
    /// `PriorityPreference`: `HIGH` or `LOW`.
    pub priority_preference: PriorityPreference,
    /// `MaxChoices`: cap on choices enumerated per decision. `None` means
    /// unbounded.
    pub max_choices: Option<usize>,
    /// Whether the resource-flaw decision offers a "push beyond horizon"
    /// choice (spec §9 Open Question 2, resolved in SPEC_FULL.md §4 to a
    /// real, non-asserting choice gated by this flag rather than a
    /// compile-time feature).
    pub push_horizon: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            allow_violations: false,
            use_temporal_propagator: true,
            priority_preference: PriorityPreference::High,
            max_choices: None,
            push_horizon: true,
        }
    }
}

impl Config {
    /// Parse a property map of the form documented in spec §6.
    pub fn from_properties(props: &HashMap<String, String>) -> EngineResult<Self> {
        let mut config = Config::default();

        if let Some(v) = props.get("ConstraintEngine.allowViolations") {
            config.allow_violations = parse_bool(v)?;
        }
        if let Some(v) = props.get("TemporalNetwork.useTemporalPropagator") {
            // "N" disables; anything else (notably "Y") enables, matching
            // the single-letter convention documented in spec §6.
            config.use_temporal_propagator = v != "N";
        }
        if let Some(v) = props.get("PriorityPreference") {
            config.priority_preference = match v.as_str() {
                "HIGH" => PriorityPreference::High,
                "LOW" => PriorityPreference::Low,
                other => {
                    return Err(EngineError::configuration(format!(
                        "PriorityPreference must be HIGH or LOW, got '{other}'"
                    )))
                }
            };
        }
        if let Some(v) = props.get("MaxChoices") {
            let n: usize = v.parse().map_err(|_| {
                EngineError::configuration(format!("MaxChoices must be a non-negative integer, got '{v}'"))
            })?;
            config.max_choices = Some(n);
        }
        if let Some(v) = props.get("PushHorizon") {
            config.push_horizon = parse_bool(v)?;
        }

        Ok(config)
    }
}

fn parse_bool(v: &str) -> EngineResult<bool> {
    match v {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(EngineError::configuration(format!(
            "expected 'true' or 'false', got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert!(!c.allow_violations);
        assert!(c.use_temporal_propagator);
        assert_eq!(c.priority_preference, PriorityPreference::High);
        assert_eq!(c.max_choices, None);
    }

    #[test]
    fn parses_recognised_keys() {
        let mut props = HashMap::new();
        props.insert("ConstraintEngine.allowViolations".into(), "true".into());
        props.insert("TemporalNetwork.useTemporalPropagator".into(), "N".into());
        props.insert("PriorityPreference".into(), "LOW".into());
        props.insert("MaxChoices".into(), "5".into());

        let c = Config::from_properties(&props).unwrap();
        assert!(c.allow_violations);
        assert!(!c.use_temporal_propagator);
        assert_eq!(c.priority_preference, PriorityPreference::Low);
        assert_eq!(c.max_choices, Some(5));
    }

    #[test]
    fn rejects_contradictory_priority_preference() {
        let mut props = HashMap::new();
        props.insert("PriorityPreference".into(), "MEDIUM".into());
        let err = Config::from_properties(&props).unwrap_err();
        assert!(matches!(err, EngineError::Configuration { .. }));
    }

    #[test]
    fn rejects_unparseable_max_choices() {
        let mut props = HashMap::new();
        props.insert("MaxChoices".into(), "not-a-number".into());
        assert!(Config::from_properties(&props).is_err());
    }
}
