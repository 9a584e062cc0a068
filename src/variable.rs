//! Constrained variables: the base/specified/derived domain triple every
//! constraint reads and writes (spec §3, §4.2).

use crate::domain::{Domain, DomainEvent};
use crate::entity::Key;
use crate::types::DataType;

/// Marker type for [`Key<Variable>`].
pub struct Variable;

/// A stable handle to a [`ConstrainedVariable`] owned by the engine.
pub type VarId = Key<Variable>;

/// The entity (token or object) that owns a variable, if any (spec §3:
/// "A variable has an optional parent entity... and an index within that
/// parent"). Stored as a raw index rather than a generational
/// [`Key`] to avoid a dependency from this module onto the plan-database
/// module; the plan database is responsible for validating liveness of
/// the parent it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Token(u64),
    Object(u64),
}

/// A typed variable with a base/specified/derived domain triple.
///
/// Invariant, maintained by every method on this type: `derived ⊆
/// specified ⊆ base` (spec §4.2).
#[derive(Debug, Clone)]
pub struct ConstrainedVariable {
    pub data_type: DataType,
    base: Domain,
    specified: Domain,
    derived: Domain,
    /// Engine-generated auxiliary variable (e.g. the sum/product
    /// decomposition auxiliaries of `eqSum`/`eqProduct`), invisible to the
    /// decision manager's variable-decision caches.
    pub internal: bool,
    /// Whether a client may call [`ConstrainedVariable::specify`] on this
    /// variable at all (some engine-internal variables are not).
    pub specifiable: bool,
    pub name: String,
    pub parent: Option<Parent>,
    pub index: Option<usize>,
}

impl ConstrainedVariable {
    /// Construct a variable. Returns the variable together with the
    /// events a freshly attached engine listener would observe
    /// immediately (spec §4.1's "Listener contract"), since the engine
    /// always takes ownership of a variable the instant it is created.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_type: DataType,
        base: Domain,
        name: impl Into<String>,
        internal: bool,
        specifiable: bool,
        parent: Option<Parent>,
        index: Option<usize>,
    ) -> (Self, Vec<DomainEvent>) {
        let derived = base.clone();
        let specified = base.clone();
        let events = derived.attach_events();
        (
            Self {
                data_type,
                base,
                specified,
                derived,
                internal,
                specifiable,
                name: name.into(),
                parent,
                index,
            },
            events,
        )
    }

    pub fn base(&self) -> &Domain {
        &self.base
    }

    pub fn specified(&self) -> &Domain {
        &self.specified
    }

    pub fn derived(&self) -> &Domain {
        &self.derived
    }

    pub fn derived_mut(&mut self) -> &mut Domain {
        &mut self.derived
    }

    /// Impose a client restriction: intersect both `specified` and
    /// `derived` with `restriction`. Returns the events fired on the
    /// derived domain (what the engine routes to listening constraints).
    pub fn specify(&mut self, restriction: &Domain) -> Vec<DomainEvent> {
        self.specified.intersect(restriction);
        self.derived.intersect(restriction)
    }

    /// Relax `specified` back to `base`, and `derived` back to `base` as
    /// well (spec §8 invariant 3: after `reset`, derived is a superset of
    /// what it was before the containing `specify`). The domain algebra
    /// itself never emits RESET (see [`crate::domain`] module docs); this
    /// method appends it explicitly after whatever the relaxation itself
    /// fires.
    pub fn reset(&mut self) -> Vec<DomainEvent> {
        self.specified = self.base.clone();
        let mut events = self.derived.relax_to(self.base.clone());
        events.push(DomainEvent::Reset);
        events
    }

    /// True iff `specified` is a singleton but `derived` is not yet —
    /// the "unit variable decision" condition of spec §4.9.
    pub fn is_unit_decision(&self) -> bool {
        self.specified.is_singleton() && !self.derived.is_singleton() && !self.derived.is_empty()
    }

    /// True iff `derived` is not a singleton (any non-unit open decision,
    /// spec §3 `DecisionPoint::Variable`).
    pub fn is_open_decision(&self) -> bool {
        !self.derived.is_singleton() && !self.derived.is_empty() && self.specifiable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn new_variable_has_equal_base_specified_derived() {
        let (v, _events) = ConstrainedVariable::new(
            DataType::Int,
            Domain::int_interval(0, 10),
            "x",
            false,
            true,
            None,
            None,
        );
        assert_eq!(v.base(), v.specified());
        assert_eq!(v.specified(), v.derived());
    }

    #[test]
    fn specify_narrows_both_specified_and_derived() {
        let (mut v, _) = ConstrainedVariable::new(
            DataType::Int,
            Domain::int_interval(0, 10),
            "x",
            false,
            true,
            None,
            None,
        );
        v.specify(&Domain::int_interval(3, 3));
        assert!(v.specified().is_singleton());
        assert!(v.derived().is_singleton());
    }

    #[test]
    fn reset_relaxes_derived_back_to_base_and_emits_reset() {
        let (mut v, _) = ConstrainedVariable::new(
            DataType::Int,
            Domain::int_interval(0, 10),
            "x",
            false,
            true,
            None,
            None,
        );
        v.specify(&Domain::int_interval(3, 3));
        let events = v.reset();
        assert!(events.contains(&DomainEvent::Reset));
        assert_eq!(v.derived(), v.base());
    }

    #[test]
    fn subset_chain_holds_after_specify() {
        let (mut v, _) = ConstrainedVariable::new(
            DataType::Int,
            Domain::int_interval(0, 10),
            "x",
            false,
            true,
            None,
            None,
        );
        v.specify(&Domain::int_interval(2, 7));
        assert!(v.derived().is_subset_of(v.specified()));
        assert!(v.specified().is_subset_of(v.base()));
    }
}
