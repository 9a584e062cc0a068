//! The equality-class propagator: every `eq` constraint merges its two
//! variables' connected components rather than running as an independent
//! binary propagator (spec §4.5). A single dirty pass over a whole class
//! intersects every member's derived domain down to the class's common
//! members in one step, instead of needing `O(members²)` pairwise `eq`
//! re-checks to reach the same fixed point.
//!
//! Class membership is tracked with a union-find over variable keys.
//! Adding an `eq` constraint merges the two sides' classes in place
//! ("merge-on-add"). Removing one cannot be undone by un-merging a
//! union-find cheaply, so a discarded `eq` constraint instead triggers
//! [`EqualityClassPropagator::rebuild`], which reconstructs the whole
//! structure from the remaining live `eq` edges ("full reprop on
//! remove") — correct, and cheap enough since `eq` constraints are a
//! small minority of any real constraint network.
//!
//! While a class's propagation step is executing, further notifications
//! (including ones caused by that very step mutating a class member's
//! domain) are buffered in `pending` rather than applied to the agenda
//! directly, so the agenda is never mutated out from under the iteration
//! driving the current step.

use crate::constraints::VarChange;
use crate::variable::{ConstrainedVariable, Variable, VarId};
use crate::entity::Registry;
use indexmap::IndexSet;
use std::collections::HashMap;

type Vars = Registry<Variable, ConstrainedVariable>;

#[derive(Debug, Default)]
pub struct EqualityClassPropagator {
    parent: HashMap<VarId, VarId>,
    agenda: IndexSet<VarId>,
    executing: bool,
    pending: Vec<VarId>,
}

impl EqualityClassPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&mut self, v: VarId) -> VarId {
        let parent = *self.parent.entry(v).or_insert(v);
        if parent == v {
            return v;
        }
        let root = self.find(parent);
        self.parent.insert(v, root);
        root
    }

    /// Merge `a` and `b`'s classes (spec §4.5 "merge-on-add"), called
    /// when an `eq` constraint between them is created. Marks the merged
    /// class dirty.
    pub fn union(&mut self, a: VarId, b: VarId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
        self.mark_dirty(rb);
    }

    /// Whether `v` participates in any tracked equality class (i.e. is
    /// the endpoint of at least one live `eq` constraint).
    pub fn has_class(&self, v: VarId) -> bool {
        self.parent.contains_key(&v)
    }

    /// Mark the class containing `v` dirty because one of its members'
    /// domain changed via some other propagator.
    pub fn notify(&mut self, v: VarId) {
        if !self.parent.contains_key(&v) {
            return;
        }
        let root = self.find(v);
        self.mark_dirty(root);
    }

    fn mark_dirty(&mut self, root: VarId) {
        if self.executing {
            self.pending.push(root);
        } else {
            self.agenda.insert(root);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agenda.is_empty()
    }

    /// Rebuild the whole union-find from scratch over the currently live
    /// `eq` constraint scopes (spec §4.5 "full reprop on remove").
    pub fn rebuild(&mut self, live_eq_pairs: &[(VarId, VarId)]) {
        self.parent.clear();
        self.agenda.clear();
        self.pending.clear();
        self.executing = false;
        for &(a, b) in live_eq_pairs {
            self.union(a, b);
        }
    }

    fn members_of(&mut self, root: VarId) -> Vec<VarId> {
        let keys: Vec<VarId> = self.parent.keys().copied().collect();
        keys.into_iter().filter(|&k| self.find(k) == root).collect()
    }

    /// Run one class's dirty pass: intersect every member's derived
    /// domain down to their common members. Returns `None` once the
    /// agenda is empty.
    pub fn step(&mut self, vars: &mut Vars) -> Option<Vec<VarChange>> {
        let dequeued = *self.agenda.first()?;
        self.agenda.shift_remove(&dequeued);
        let root = self.find(dequeued);

        self.executing = true;
        let members = self.members_of(root);
        let mut changes = Vec::new();

        if members.len() >= 2 {
            let mut common = vars
                .lookup(members[0])
                .expect("equality class member is live")
                .derived()
                .clone();
            for &m in &members[1..] {
                let d = vars.lookup(m).expect("equality class member is live").derived();
                common.intersect(d);
            }
            for &m in &members {
                let events = vars
                    .lookup_mut(m)
                    .expect("equality class member is live")
                    .derived_mut()
                    .intersect(&common);
                if !events.is_empty() {
                    changes.push(VarChange { var: m, events });
                }
            }
        }
        self.executing = false;

        let buffered: Vec<VarId> = self.pending.drain(..).collect();
        for v in buffered {
            let root = self.find(v);
            self.mark_dirty(root);
        }

        Some(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::types::DataType;

    fn var(vars: &mut Vars, lb: i64, ub: i64) -> VarId {
        let (v, _) = ConstrainedVariable::new(
            DataType::Int,
            Domain::int_interval(lb, ub),
            "x",
            false,
            true,
            None,
            None,
        );
        vars.insert(v)
    }

    #[test]
    fn union_merges_classes_and_marks_dirty() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 0, 10);
        let b = var(&mut vars, 5, 15);
        let mut prop = EqualityClassPropagator::new();
        prop.union(a, b);
        assert!(!prop.is_empty());
        assert!(prop.has_class(a));
        assert!(prop.has_class(b));
    }

    #[test]
    fn step_intersects_whole_class_to_common_members() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 0, 10);
        let b = var(&mut vars, 5, 15);
        let c = var(&mut vars, 3, 8);
        let mut prop = EqualityClassPropagator::new();
        prop.union(a, b);
        prop.union(b, c);

        let changes = prop.step(&mut vars).unwrap();
        assert!(!changes.is_empty());
        assert_eq!(vars.lookup(a).unwrap().derived().bounds(), Some((5.0, 8.0)));
        assert_eq!(vars.lookup(b).unwrap().derived().bounds(), Some((5.0, 8.0)));
        assert_eq!(vars.lookup(c).unwrap().derived().bounds(), Some((5.0, 8.0)));
    }

    #[test]
    fn transitive_notify_requeues_class_after_external_change() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 0, 10);
        let b = var(&mut vars, 0, 10);
        let mut prop = EqualityClassPropagator::new();
        prop.union(a, b);
        prop.step(&mut vars);
        assert!(prop.is_empty());

        // Some other propagator narrows `a`; the engine routes that back
        // in as a notify() on behalf of the equality propagator.
        vars.lookup_mut(a).unwrap().derived_mut().intersect_bounds(2.0, 2.0);
        prop.notify(a);
        assert!(!prop.is_empty());
    }

    #[test]
    fn rebuild_drops_classes_whose_eq_constraint_was_discarded() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 0, 10);
        let b = var(&mut vars, 0, 10);
        let c = var(&mut vars, 0, 10);
        let mut prop = EqualityClassPropagator::new();
        prop.union(a, b);
        prop.union(b, c);
        prop.step(&mut vars);

        // The a=b eq constraint is discarded; only b=c remains live.
        prop.rebuild(&[(b, c)]);
        assert!(!prop.has_class(a));
        assert!(prop.has_class(b));
        assert!(prop.has_class(c));
    }
}
