//! `subsetOf`, `lock` (spec §4.6).

use super::{domain_of, force_empty_var, intersect_domain, Vars, VarChange};
use crate::variable::VarId;

/// `x ⊆ y`: one-directional — `x` is narrowed to `x ∩ y`, `y` is left
/// untouched.
pub fn subset_of(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y] = *scope else { return Vec::new() };
    let y_dom = domain_of(vars, y);
    intersect_domain(vars, x, &y_dom).into_iter().collect()
}

/// `x` is locked to exactly `y`. Since a derived domain only ever
/// shrinks, this can only succeed by intersection when `y` is already a
/// subset of `x`; otherwise `x` is forced empty (spec §4.6: "emptying if
/// `y` is not a subset").
pub fn lock(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y] = *scope else { return Vec::new() };
    let x_dom = domain_of(vars, x);
    let y_dom = domain_of(vars, y);

    if y_dom.is_subset_of(&x_dom) {
        intersect_domain(vars, x, &y_dom).into_iter().collect()
    } else {
        force_empty_var(vars, x).into_iter().collect()
    }
}
