//! `addEq`, `multEq`, `divEq`, `absVal` (spec §4.6). Scope convention
//! throughout this crate: the result variable is always the last scope
//! position, matching how the teacher spec orders `addEq(x, y, z)` as
//! `z = x + y`.

use super::{corner_bounds, numeric_bounds, safe_add, safe_div, safe_mul, tighten, Vars, VarChange};
use crate::variable::VarId;

/// `z = x + y`.
pub fn add_eq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y, z] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (xl, xu) = numeric_bounds(vars, x);
    let (yl, yu) = numeric_bounds(vars, y);
    let (zl, zu) = numeric_bounds(vars, z);

    if let (Some(nl), Some(nu)) = (safe_add(xl, yl), safe_add(xu, yu)) {
        changes.extend(tighten(vars, z, nl, nu));
    }
    if let (Some(nl), Some(nu)) = (safe_add(zl, -yu), safe_add(zu, -yl)) {
        changes.extend(tighten(vars, x, nl, nu));
    }
    if let (Some(nl), Some(nu)) = (safe_add(zl, -xu), safe_add(zu, -xl)) {
        changes.extend(tighten(vars, y, nl, nu));
    }
    changes
}

/// `z = x * y`, via interval corner-product forward propagation and
/// reciprocal back-propagation. Back-propagation into `x` (respectively
/// `y`) is skipped when `y` (respectively `x`)'s interval straddles zero,
/// since dividing by a range that spans zero has no sound finite bound.
pub fn mult_eq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y, z] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (xl, xu) = numeric_bounds(vars, x);
    let (yl, yu) = numeric_bounds(vars, y);

    if let Some((nl, nu)) = corner_bounds([
        safe_mul(xl, yl),
        safe_mul(xl, yu),
        safe_mul(xu, yl),
        safe_mul(xu, yu),
    ]) {
        changes.extend(tighten(vars, z, nl, nu));
    }

    let (zl, zu) = numeric_bounds(vars, z);

    if !straddles_zero(yl, yu) {
        if let Some((nl, nu)) = corner_bounds([
            safe_div(zl, yl),
            safe_div(zl, yu),
            safe_div(zu, yl),
            safe_div(zu, yu),
        ]) {
            changes.extend(tighten(vars, x, nl, nu));
        }
    }
    if !straddles_zero(xl, xu) {
        if let Some((nl, nu)) = corner_bounds([
            safe_div(zl, xl),
            safe_div(zl, xu),
            safe_div(zu, xl),
            safe_div(zu, xu),
        ]) {
            changes.extend(tighten(vars, y, nl, nu));
        }
    }
    changes
}

/// `x / y = z`, reduced to the `multEq` algorithm over `(y, z, x)`: `x =
/// y * z`.
pub fn div_eq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y, z] = *scope else { return Vec::new() };
    mult_eq(&[y, z, x], vars)
}

/// `x = |y|`.
pub fn abs_val(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [x, y] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (yl, yu) = numeric_bounds(vars, y);
    let (new_xl, new_xu) = if yl >= 0.0 {
        (yl, yu)
    } else if yu <= 0.0 {
        (-yu, -yl)
    } else {
        (0.0, yl.abs().max(yu.abs()))
    };
    changes.extend(tighten(vars, x, new_xl, new_xu));

    let (_, xu) = numeric_bounds(vars, x);
    changes.extend(tighten(vars, y, -xu, xu));
    changes
}

fn straddles_zero(lb: f64, ub: f64) -> bool {
    lb <= 0.0 && ub >= 0.0
}
