//! Heuristic priorities and candidate-ordering tags for decision points
//! (spec §4.9, §9).
//!
//! A heuristic entry is looked up by a decision's *identity* — the
//! variable's name, the token's predicate, the object's or resource's
//! type name — rather than by its (unstable, search-step-local)
//! [`crate::decision::DecisionId`], so a heuristic configured once
//! applies uniformly to every decision of that shape the search driver
//! ever opens.

use crate::config::PriorityPreference;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Lower/upper bound every stored priority is clamped to (spec §9: a
/// heuristic's `priority` ranges over `[0, 1e9]`).
pub const MIN_PRIORITY: f64 = 0.0;
pub const MAX_PRIORITY: f64 = 1_000_000_000.0;

/// A candidate-ordering strategy a heuristic entry requests for the
/// choices of a decision (spec §9's comparator tags).
#[derive(Debug, Clone, PartialEq)]
pub enum OrderingTag {
    /// Ascending by numeric distance from a reference point.
    Near(f64),
    /// Descending by numeric distance from a reference point.
    Far(f64),
    /// Ascending numeric value (earliest first).
    Early,
    /// Descending numeric value (latest first).
    Late,
    /// Widest remaining domain first.
    MaxFlexible,
    /// Narrowest remaining domain first.
    MinFlexible,
    /// Largest remaining candidate count first.
    LeastSpecified,
    /// Smallest remaining candidate count first.
    MostSpecified,
    /// Delegate to a named, externally supplied comparator. This crate
    /// has no plugin loader (out of scope), so a `Generator` entry keeps
    /// candidates in enumeration order — the neutral default every other
    /// tag is defined relative to — while still recording the name a
    /// caller-supplied sort could be wired in under.
    Generator(String),
    /// Whatever order the candidates were enumerated in.
    Enumeration,
}

/// One candidate value paired with the numeric facts ([`OrderingTag`]s
/// need to rank it against its siblings: its own value (for
/// near/far/early/late) and the width of the domain/candidate set it
/// was drawn from (for the flexibility/specificity tags).
#[derive(Debug, Clone, Copy)]
pub struct RankedCandidate<T> {
    pub key: T,
    pub value: f64,
    pub width: f64,
}

impl OrderingTag {
    /// Sort `candidates` in place according to this tag. Stable: ties
    /// keep their relative enumeration order.
    pub fn order<T: Copy>(&self, candidates: &mut [RankedCandidate<T>]) {
        let cmp = |a: f64, b: f64| a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self {
            OrderingTag::Near(r) => candidates.sort_by(|a, b| cmp((a.value - r).abs(), (b.value - r).abs())),
            OrderingTag::Far(r) => candidates.sort_by(|a, b| cmp((b.value - r).abs(), (a.value - r).abs())),
            OrderingTag::Early => candidates.sort_by(|a, b| cmp(a.value, b.value)),
            OrderingTag::Late => candidates.sort_by(|a, b| cmp(b.value, a.value)),
            OrderingTag::MaxFlexible | OrderingTag::LeastSpecified => {
                candidates.sort_by(|a, b| cmp(b.width, a.width))
            }
            OrderingTag::MinFlexible | OrderingTag::MostSpecified => {
                candidates.sort_by(|a, b| cmp(a.width, b.width))
            }
            OrderingTag::Generator(_) | OrderingTag::Enumeration => {}
        }
    }
}

/// One heuristic table entry: a priority plus a candidate-ordering
/// strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicEntry {
    pub priority: f64,
    pub ordering: OrderingTag,
}

impl Default for HeuristicEntry {
    /// Default priority `0`, enumeration-order candidates (spec §9: a
    /// decision with no configured entry still needs a well-defined,
    /// lowest-priority place in the ordering).
    fn default() -> Self {
        Self {
            priority: MIN_PRIORITY,
            ordering: OrderingTag::Enumeration,
        }
    }
}

/// Keyed lookup from decision identity to heuristic entry (spec §4.9,
/// §6 "heuristics configuration").
#[derive(Debug, Default)]
pub struct HeuristicTable {
    entries: HashMap<String, HeuristicEntry>,
}

impl HeuristicTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the heuristic entry for `identity`.
    /// `priority` is clamped into `[0, 1e9]`.
    pub fn set(&mut self, identity: impl Into<String>, priority: f64, ordering: OrderingTag) {
        self.entries.insert(
            identity.into(),
            HeuristicEntry {
                priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
                ordering,
            },
        );
    }

    /// The entry for `identity`, or the default if none was configured.
    pub fn lookup(&self, identity: &str) -> HeuristicEntry {
        self.entries.get(identity).cloned().unwrap_or_default()
    }

    /// Compare two decision identities by configured priority, honoring
    /// `preference` (spec §4.9 "PriorityPreference"). Ties are `Equal`;
    /// the caller's own tie-break (enumeration order) decides those.
    pub fn compare(&self, a_identity: &str, b_identity: &str, preference: PriorityPreference) -> Ordering {
        let pa = self.lookup(a_identity).priority;
        let pb = self.lookup(b_identity).priority;
        match preference {
            PriorityPreference::High => pb.partial_cmp(&pa).unwrap_or(Ordering::Equal),
            PriorityPreference::Low => pa.partial_cmp(&pb).unwrap_or(Ordering::Equal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_identity_gets_default_entry() {
        let table = HeuristicTable::new();
        assert_eq!(table.lookup("whatever"), HeuristicEntry::default());
    }

    #[test]
    fn priority_is_clamped_into_range() {
        let mut table = HeuristicTable::new();
        table.set("x", -5.0, OrderingTag::Enumeration);
        assert_eq!(table.lookup("x").priority, MIN_PRIORITY);
        table.set("y", 1e12, OrderingTag::Enumeration);
        assert_eq!(table.lookup("y").priority, MAX_PRIORITY);
    }

    #[test]
    fn high_preference_orders_descending() {
        let mut table = HeuristicTable::new();
        table.set("a", 10.0, OrderingTag::Enumeration);
        table.set("b", 20.0, OrderingTag::Enumeration);
        assert_eq!(table.compare("a", "b", PriorityPreference::High), Ordering::Greater);
        assert_eq!(table.compare("a", "b", PriorityPreference::Low), Ordering::Less);
    }

    #[test]
    fn near_orders_by_distance_to_reference() {
        let mut candidates = vec![
            RankedCandidate { key: "far", value: 100.0, width: 0.0 },
            RankedCandidate { key: "near", value: 1.0, width: 0.0 },
        ];
        OrderingTag::Near(0.0).order(&mut candidates);
        assert_eq!(candidates[0].key, "near");
    }

    #[test]
    fn max_flexible_orders_by_widest_domain_first() {
        let mut candidates = vec![
            RankedCandidate { key: "narrow", value: 0.0, width: 1.0 },
            RankedCandidate { key: "wide", value: 0.0, width: 100.0 },
        ];
        OrderingTag::MaxFlexible.order(&mut candidates);
        assert_eq!(candidates[0].key, "wide");
    }
}
