//! `testEq`, `testLEQ`, `testLT`, `testNEQ`, `testAnd`, `testOr` (spec
//! §4.6): reified relations between a boolean result variable and either
//! two numeric operands or two boolean operands.

use super::relational::{leq, lt, neq};
use super::{domain_of, intersect_domain, numeric_bounds, Vars, VarChange};
use crate::domain::Domain;
use crate::types::FLOAT_EPSILON;
use crate::variable::VarId;

fn bool_value(vars: &Vars, id: VarId) -> Option<bool> {
    domain_of(vars, id)
        .singleton_value()
        .and_then(|v| v.as_numeric())
        .map(|n| n >= 0.5)
}

fn set_bool(vars: &mut Vars, id: VarId, value: bool) -> Option<VarChange> {
    intersect_domain(vars, id, &Domain::singleton_int(value as i64))
}

/// `bv <=> (b <= c)`.
pub fn test_leq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [bv, b, c] = *scope else { return Vec::new() };
    reify_numeric(bv, b, c, vars, |vs| leq(&[b, c], vs), |vs| lt(&[c, b], vs), |bl, bu, cl, cu| {
        if bu <= cl + FLOAT_EPSILON {
            Some(true)
        } else if bl > cu + FLOAT_EPSILON {
            Some(false)
        } else {
            None
        }
    })
}

/// `bv <=> (b < c)`.
pub fn test_lt(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [bv, b, c] = *scope else { return Vec::new() };
    reify_numeric(bv, b, c, vars, |vs| lt(&[b, c], vs), |vs| leq(&[c, b], vs), |bl, bu, cl, cu| {
        if bu <= cl - FLOAT_EPSILON {
            Some(true)
        } else if bl >= cu - FLOAT_EPSILON {
            Some(false)
        } else {
            None
        }
    })
}

/// `bv <=> (b == c)`.
pub fn test_eq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [bv, b, c] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    match bool_value(vars, bv) {
        Some(true) => {
            changes.extend(leq(&[b, c], vars));
            changes.extend(leq(&[c, b], vars));
        }
        Some(false) => {
            changes.extend(neq(&[b, c], vars));
        }
        None => {
            let b_dom = domain_of(vars, b);
            let c_dom = domain_of(vars, c);
            if !b_dom.intersects(&c_dom) {
                changes.extend(set_bool(vars, bv, false));
            } else if let (Some(bval), Some(cval)) =
                (b_dom.singleton_value(), c_dom.singleton_value())
            {
                if bval == cval {
                    changes.extend(set_bool(vars, bv, true));
                } else {
                    changes.extend(set_bool(vars, bv, false));
                }
            }
        }
    }
    changes
}

/// `bv <=> (b != c)`.
pub fn test_neq(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [bv, b, c] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    match bool_value(vars, bv) {
        Some(true) => changes.extend(neq(&[b, c], vars)),
        Some(false) => {
            changes.extend(leq(&[b, c], vars));
            changes.extend(leq(&[c, b], vars));
        }
        None => {
            let b_dom = domain_of(vars, b);
            let c_dom = domain_of(vars, c);
            if !b_dom.intersects(&c_dom) {
                changes.extend(set_bool(vars, bv, true));
            } else if let (Some(bval), Some(cval)) =
                (b_dom.singleton_value(), c_dom.singleton_value())
            {
                changes.extend(set_bool(vars, bv, bval != cval));
            }
        }
    }
    changes
}

/// `r <=> (b AND c)`.
pub fn test_and(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [r, b, c] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (bv, cv, rv) = (bool_value(vars, b), bool_value(vars, c), bool_value(vars, r));

    if bv == Some(false) || cv == Some(false) {
        changes.extend(set_bool(vars, r, false));
    } else if bv == Some(true) && cv == Some(true) {
        changes.extend(set_bool(vars, r, true));
    }

    if rv == Some(true) {
        changes.extend(set_bool(vars, b, true));
        changes.extend(set_bool(vars, c, true));
    } else if rv == Some(false) {
        if bv == Some(true) {
            changes.extend(set_bool(vars, c, false));
        }
        if cv == Some(true) {
            changes.extend(set_bool(vars, b, false));
        }
    }
    changes
}

/// `r <=> (b OR c)`.
pub fn test_or(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let [r, b, c] = *scope else { return Vec::new() };
    let mut changes = Vec::new();

    let (bv, cv, rv) = (bool_value(vars, b), bool_value(vars, c), bool_value(vars, r));

    if bv == Some(true) || cv == Some(true) {
        changes.extend(set_bool(vars, r, true));
    } else if bv == Some(false) && cv == Some(false) {
        changes.extend(set_bool(vars, r, false));
    }

    if rv == Some(false) {
        changes.extend(set_bool(vars, b, false));
        changes.extend(set_bool(vars, c, false));
    } else if rv == Some(true) {
        if bv == Some(false) {
            changes.extend(set_bool(vars, c, true));
        }
        if cv == Some(false) {
            changes.extend(set_bool(vars, b, true));
        }
    }
    changes
}

#[allow(clippy::too_many_arguments)]
fn reify_numeric(
    bv: VarId,
    b: VarId,
    c: VarId,
    vars: &mut Vars,
    apply_true: impl FnOnce(&mut Vars) -> Vec<VarChange>,
    apply_false: impl FnOnce(&mut Vars) -> Vec<VarChange>,
    resolve: impl FnOnce(f64, f64, f64, f64) -> Option<bool>,
) -> Vec<VarChange> {
    let mut changes = Vec::new();
    match bool_value(vars, bv) {
        Some(true) => changes.extend(apply_true(vars)),
        Some(false) => changes.extend(apply_false(vars)),
        None => {
            let (bl, bu) = numeric_bounds(vars, b);
            let (cl, cu) = numeric_bounds(vars, c);
            if let Some(resolved) = resolve(bl, bu, cl, cu) {
                changes.extend(set_bool(vars, bv, resolved));
            }
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::entity::Registry;
    use crate::types::DataType;
    use crate::variable::ConstrainedVariable;

    fn int_var(vars: &mut Vars, lb: i64, ub: i64) -> VarId {
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

    fn bool_var(vars: &mut Vars) -> VarId {
        let (v, _) = ConstrainedVariable::new(
            DataType::Bool,
            Domain::int_interval(0, 1),
            "flag",
            false,
            true,
            None,
            None,
        );
        vars.insert(v)
    }

    #[test]
    fn test_leq_resolves_bool_from_disjoint_bounds() {
        let mut vars: Vars = Registry::new();
        let bv = bool_var(&mut vars);
        let b = int_var(&mut vars, 0, 2);
        let c = int_var(&mut vars, 5, 9);
        test_leq(&[bv, b, c], &mut vars);
        assert_eq!(bool_value(&vars, bv), Some(true));
    }

    #[test]
    fn test_leq_propagates_bound_when_bool_is_true() {
        let mut vars: Vars = Registry::new();
        let bv = bool_var(&mut vars);
        vars.lookup_mut(bv).unwrap().specify(&Domain::singleton_int(1));
        let b = int_var(&mut vars, 0, 10);
        let c = int_var(&mut vars, 0, 4);
        test_leq(&[bv, b, c], &mut vars);
        assert_eq!(vars.lookup(b).unwrap().derived().bounds(), Some((0.0, 4.0)));
    }

    #[test]
    fn test_and_forces_result_false_on_false_operand() {
        let mut vars: Vars = Registry::new();
        let r = bool_var(&mut vars);
        let b = bool_var(&mut vars);
        let c = bool_var(&mut vars);
        vars.lookup_mut(b).unwrap().specify(&Domain::singleton_int(0));
        test_and(&[r, b, c], &mut vars);
        assert_eq!(bool_value(&vars, r), Some(false));
    }

    #[test]
    fn test_or_forces_operands_false_when_result_false() {
        let mut vars: Vars = Registry::new();
        let r = bool_var(&mut vars);
        let b = bool_var(&mut vars);
        let c = bool_var(&mut vars);
        vars.lookup_mut(r).unwrap().specify(&Domain::singleton_int(0));
        test_or(&[r, b, c], &mut vars);
        assert_eq!(bool_value(&vars, b), Some(false));
        assert_eq!(bool_value(&vars, c), Some(false));
    }
}
