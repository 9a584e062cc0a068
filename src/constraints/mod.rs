//! Propagation bodies for the fixed- and variadic-arity constraints of
//! spec §4.6, dispatched by kind from the default propagator (spec §4.4).
//!
//! `eq` is excluded here: it is routed to the equality-class propagator
//! (see [`crate::equality`]) and never reaches [`execute`]. The four
//! temporal relations are excluded too: they are routed to the STN
//! propagator (see [`crate::temporal`]) at constraint-construction time
//! and never scheduled on the default agenda.
//!
//! `eqSum`/`eqProduct` are decomposed into a binary tree of `addEq`/
//! `multEq` constraints over auxiliary variables at construction time
//! (spec §4.6 "Variadic via binary-tree decomposition into auxiliaries"),
//! which is engine-level bookkeeping rather than a propagation body, so
//! their `execute` arms here are no-ops: the real work happens in the
//! decomposed children, already registered on the same agenda.

mod arithmetic;
mod boolean;
mod misc;
mod relational;
mod variadic;

use crate::constraint::ConstraintKind;
use crate::domain::{Domain, DomainEvent, EnumDomain, Value};
use crate::entity::Registry;
use crate::variable::{ConstrainedVariable, VarId, Variable};

/// The variable registry a constraint body reads and writes through.
pub type Vars = Registry<Variable, ConstrainedVariable>;

/// One variable's domain having changed as a side effect of an `execute`
/// call, together with the events that fired.
#[derive(Debug, Clone)]
pub struct VarChange {
    pub var: VarId,
    pub events: Vec<DomainEvent>,
}

/// Run one pass of `kind`'s propagation body over `scope`.
///
/// Returns every variable that changed, in the order the body touched
/// them. An empty scope entry (stale key) is a caller bug; this function
/// does not validate liveness, it only propagates.
pub fn execute(kind: ConstraintKind, scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    use ConstraintKind::*;
    match kind {
        Eq => Vec::new(),
        Neq => relational::neq(scope, vars),
        Leq => relational::leq(scope, vars),
        Lt => relational::lt(scope, vars),
        AddEq => arithmetic::add_eq(scope, vars),
        MultEq => arithmetic::mult_eq(scope, vars),
        DivEq => arithmetic::div_eq(scope, vars),
        AbsVal => arithmetic::abs_val(scope, vars),
        EqSum | EqProduct => Vec::new(),
        EqMin => variadic::eq_min(scope, vars),
        EqMax => variadic::eq_max(scope, vars),
        AllDiff => variadic::all_diff(scope, vars),
        TestEq => boolean::test_eq(scope, vars),
        TestLeq => boolean::test_leq(scope, vars),
        TestLt => boolean::test_lt(scope, vars),
        TestNeq => boolean::test_neq(scope, vars),
        TestAnd => boolean::test_and(scope, vars),
        TestOr => boolean::test_or(scope, vars),
        SubsetOf => misc::subset_of(scope, vars),
        Lock => misc::lock(scope, vars),
        Concurrent | Precedes | StrictlyPrecedes | TemporalDistance => Vec::new(),
    }
}

fn domain_of(vars: &Vars, id: VarId) -> Domain {
    vars.lookup(id)
        .expect("constraint scope holds a live variable")
        .derived()
        .clone()
}

fn data_type_of(vars: &Vars, id: VarId) -> crate::types::DataType {
    vars.lookup(id)
        .expect("constraint scope holds a live variable")
        .data_type
}

fn tighten(vars: &mut Vars, id: VarId, new_lb: f64, new_ub: f64) -> Option<VarChange> {
    let events = vars
        .lookup_mut(id)
        .expect("constraint scope holds a live variable")
        .derived_mut()
        .intersect_bounds(new_lb, new_ub);
    (!events.is_empty()).then_some(VarChange { var: id, events })
}

fn intersect_domain(vars: &mut Vars, id: VarId, other: &Domain) -> Option<VarChange> {
    let events = vars
        .lookup_mut(id)
        .expect("constraint scope holds a live variable")
        .derived_mut()
        .intersect(other);
    (!events.is_empty()).then_some(VarChange { var: id, events })
}

fn remove_value(vars: &mut Vars, id: VarId, v: &Value) -> Option<VarChange> {
    let events = vars
        .lookup_mut(id)
        .expect("constraint scope holds a live variable")
        .derived_mut()
        .remove(v);
    (!events.is_empty()).then_some(VarChange { var: id, events })
}

/// Force a domain empty regardless of its current bounds/members, used by
/// `allDiff`'s singleton-collision case and `lock`'s incompatible-domain
/// case. There is no single-variant "become empty" constructor on
/// [`Domain`] itself since ordinary propagation only ever empties as a
/// side effect of a real restriction; those two callers need it directly.
fn force_empty(domain: &mut Domain) -> Vec<DomainEvent> {
    match domain {
        Domain::Interval(_) => domain.intersect_bounds(f64::INFINITY, f64::NEG_INFINITY),
        Domain::Enumerated(e) => {
            let empty = Domain::Enumerated(EnumDomain {
                kind: e.kind,
                values: Vec::new(),
                closed: e.closed,
            });
            domain.intersect(&empty)
        }
    }
}

fn force_empty_var(vars: &mut Vars, id: VarId) -> Option<VarChange> {
    let events = force_empty(
        vars.lookup_mut(id)
            .expect("constraint scope holds a live variable")
            .derived_mut(),
    );
    (!events.is_empty()).then_some(VarChange { var: id, events })
}

/// Numeric bounds of a variable's derived domain, or the widest possible
/// range for a non-numeric enumerated domain (which no numeric body in
/// this module should ever actually be scheduled against, since
/// `arg_requirements` rejects it at construction).
fn numeric_bounds(vars: &Vars, id: VarId) -> (f64, f64) {
    domain_of(vars, id)
        .bounds()
        .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
}

/// `a + b`, treating any NaN fallout from mixing infinities as "no usable
/// bound" rather than propagating it.
fn safe_add(a: f64, b: f64) -> Option<f64> {
    crate::domain::add_with_infinity(a, b).ok()
}

/// `a / b`, `None` on division by (near-)zero or a NaN result.
fn safe_div(a: f64, b: f64) -> Option<f64> {
    if b.abs() < crate::types::FLOAT_EPSILON {
        return None;
    }
    let r = a / b;
    if r.is_nan() {
        None
    } else {
        Some(r)
    }
}

/// `a * b`, `None` only on the `0 * infinity` indeterminate form.
fn safe_mul(a: f64, b: f64) -> Option<f64> {
    let r = a * b;
    if r.is_nan() {
        None
    } else {
        Some(r)
    }
}

/// min/max of whichever of four corner products are defined, used by
/// `multEq`'s forward pass and (via reciprocals) its backward passes.
fn corner_bounds(candidates: [Option<f64>; 4]) -> Option<(f64, f64)> {
    let defined: Vec<f64> = candidates.into_iter().flatten().collect();
    if defined.is_empty() {
        return None;
    }
    let lo = defined.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = defined.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Some((lo, hi))
}
