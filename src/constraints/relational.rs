//! `neq`, `leq`, `lt` (spec §4.6).

use super::{data_type_of, domain_of, numeric_bounds, remove_value, tighten, Vars, VarChange};
use crate::variable::VarId;

/// `a != b`: when either side is a singleton, remove that value from the
/// other. Two non-singleton sides leave each other untouched (the default
/// propagator has no hole-punching bound consistency for the general
/// case).
pub fn neq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [a, b] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    if let Some(v) = domain_of(vars, b).singleton_value() {
        changes.extend(remove_value(vars, a, &v));
    }
    if let Some(v) = domain_of(vars, a).singleton_value() {
        changes.extend(remove_value(vars, b, &v));
    }
    changes
}

/// `a <= b`: caps `a`'s upper bound at `b`'s, raises `b`'s lower bound to
/// `a`'s.
pub fn leq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [a, b] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (a_lb, _) = numeric_bounds(vars, a);
    let (_, b_ub) = numeric_bounds(vars, b);

    changes.extend(tighten(vars, a, f64::NEG_INFINITY, b_ub));
    changes.extend(tighten(vars, b, a_lb, f64::INFINITY));
    changes
}

/// `a < b`: like [`leq`] but each bound is pushed in by the narrower
/// side's minimum representable delta, so `a == b` can never survive.
pub fn lt(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [a, b] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let delta = data_type_of(vars, a).min_delta().max(data_type_of(vars, b).min_delta());
    let (a_lb, _) = numeric_bounds(vars, a);
    let (_, b_ub) = numeric_bounds(vars, b);

    changes.extend(tighten(vars, a, f64::NEG_INFINITY, b_ub - delta));
    changes.extend(tighten(vars, b, a_lb + delta, f64::INFINITY));
    changes
}
