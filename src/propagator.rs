//! The default propagator: an insertion-ordered agenda of dirty
//! constraints, executed one at a time until quiescent (spec §4.3 "fixed
//! point", §4.4).
//!
//! Unlike the equality-class propagator (`crate::equality`), this one
//! does not merge or batch anything — every notification enqueues the
//! constraint (if it is not already pending), and `step` dequeues and
//! executes exactly one. The re-entry guard exists because a
//! constraint's own `execute` can indirectly touch its own scope (e.g.
//! `allDiff` removing a value from a variable also in its own scope):
//! without the guard that would re-enqueue the constraint while it is
//! still on the call stack, which does not corrupt anything here (there
//! is no recursion into `execute` itself) but would waste a redundant
//! pass before the agenda drains.

use crate::constraint::{Constraint, ConstraintId, ConstraintMarker};
use crate::constraints::{self, VarChange, Vars};
use crate::entity::Registry;
use indexmap::IndexSet;

/// The outcome of running one constraint's propagation body.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub constraint: ConstraintId,
    pub changes: Vec<VarChange>,
}

/// Insertion-ordered dirty-constraint queue with an active-constraint
/// re-entry guard.
#[derive(Debug, Default)]
pub struct DefaultPropagator {
    agenda: IndexSet<ConstraintId>,
    active: Option<ConstraintId>,
}

impl DefaultPropagator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `constraint` dirty. A no-op if it is the constraint currently
    /// executing (re-entry guard) or already pending.
    pub fn notify(&mut self, constraint: ConstraintId) {
        if self.active == Some(constraint) {
            return;
        }
        self.agenda.insert(constraint);
    }

    pub fn is_empty(&self) -> bool {
        self.agenda.is_empty()
    }

    pub fn len(&self) -> usize {
        self.agenda.len()
    }

    /// Remove a constraint from the agenda without executing it (used
    /// when a constraint is discarded mid-cycle, spec §4.4: a discarded
    /// constraint must not run again).
    pub fn forget(&mut self, constraint: ConstraintId) {
        self.agenda.shift_remove(&constraint);
        if self.active == Some(constraint) {
            self.active = None;
        }
    }

    /// Dequeue the oldest-enqueued constraint and run its propagation
    /// body. Returns `None` once the agenda is empty.
    pub fn step(
        &mut self,
        constraints: &Registry<ConstraintMarker, Constraint>,
        vars: &mut Vars,
    ) -> Option<StepOutcome> {
        let id = *self.agenda.first()?;
        self.agenda.shift_remove(&id);

        let Some(c) = constraints.lookup(id) else {
            return Some(StepOutcome {
                constraint: id,
                changes: Vec::new(),
            });
        };
        if c.discarded || !c.active {
            return Some(StepOutcome {
                constraint: id,
                changes: Vec::new(),
            });
        }

        self.active = Some(id);
        let changes = constraints::execute(c.kind, &c.scope, vars);
        self.active = None;

        Some(StepOutcome {
            constraint: id,
            changes,
        })
    }
}
