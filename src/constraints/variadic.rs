//! `eqMin`, `eqMax`, `allDiff` (spec §4.6). `eqSum`/`eqProduct` are
//! decomposed at construction time rather than executed here; see the
//! [`super`] module docs.

use super::{
    domain_of, force_empty_var, numeric_bounds, remove_value, tighten, Vars, VarChange,
};
use crate::variable::VarId;

/// `result = max(operands...)`, with `result` the last scope position.
pub fn eq_max(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let (operands, result) = split_result(scope);
    let mut changes = Vec::new();

    let mut max_lb = f64::NEG_INFINITY;
    let mut max_ub = f64::NEG_INFINITY;
    for &op in operands {
        let (lb, ub) = numeric_bounds(vars, op);
        max_lb = max_lb.max(lb);
        max_ub = max_ub.max(ub);
    }
    changes.extend(tighten(vars, result, max_lb, max_ub));

    let (_, result_ub) = numeric_bounds(vars, result);
    for &op in operands {
        changes.extend(tighten(vars, op, f64::NEG_INFINITY, result_ub));
    }
    changes
}

/// `result = min(operands...)`, with `result` the last scope position.
pub fn eq_min(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let (operands, result) = split_result(scope);
    let mut changes = Vec::new();

    let mut min_lb = f64::INFINITY;
    let mut min_ub = f64::INFINITY;
    for &op in operands {
        let (lb, ub) = numeric_bounds(vars, op);
        min_lb = min_lb.min(lb);
        min_ub = min_ub.min(ub);
    }
    changes.extend(tighten(vars, result, min_lb, min_ub));

    let (result_lb, _) = numeric_bounds(vars, result);
    for &op in operands {
        changes.extend(tighten(vars, op, result_lb, f64::INFINITY));
    }
    changes
}

fn split_result(scope: &[VarId]) -> (&[VarId], VarId) {
    let (result, operands) = scope.split_last().expect("eqMin/eqMax scope is non-empty");
    (operands, *result)
}

/// Pairwise distinctness via cardinality counting rather than a full
/// Hall-interval bound consistency pass: singleton collisions empty the
/// later variable outright, and every singleton value still present is
/// removed from the rest of the scope.
pub fn all_diff(scope: &[VarId], vars: &mut Vars) -> Vec<VarChange> {
    let mut changes = Vec::new();
    let mut seen = Vec::new();

    for &v in scope {
        let Some(value) = domain_of(vars, v).singleton_value() else {
            continue;
        };
        if seen.iter().any(|(_, existing)| existing == &value) {
            changes.extend(force_empty_var(vars, v));
        } else {
            seen.push((v, value));
        }
    }

    for (singleton_var, value) in &seen {
        for &other in scope {
            if other == *singleton_var {
                continue;
            }
            changes.extend(remove_value(vars, other, value));
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
    fn eq_max_forward_and_backward() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 1, 5);
        let b = var(&mut vars, 2, 9);
        let r = var(&mut vars, 0, 6);
        eq_max(&[a, b, r], &mut vars);
        assert_eq!(vars.lookup(r).unwrap().derived().bounds(), Some((2.0, 6.0)));
        assert_eq!(vars.lookup(b).unwrap().derived().bounds(), Some((2.0, 6.0)));
    }

    #[test]
    fn eq_min_forward_and_backward() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 1, 5);
        let b = var(&mut vars, 2, 9);
        let r = var(&mut vars, 0, 6);
        eq_min(&[a, b, r], &mut vars);
        assert_eq!(vars.lookup(r).unwrap().derived().bounds(), Some((1.0, 5.0)));
        assert_eq!(vars.lookup(a).unwrap().derived().bounds(), Some((1.0, 5.0)));
    }

    #[test]
    fn all_diff_empties_duplicate_singleton() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 3, 3);
        let b = var(&mut vars, 3, 3);
        all_diff(&[a, b], &mut vars);
        assert!(vars.lookup(b).unwrap().derived().is_empty());
    }

    #[test]
    fn all_diff_removes_singleton_from_remaining_scope() {
        let mut vars: Vars = Registry::new();
        let a = var(&mut vars, 5, 5);
        let b = var(&mut vars, 5, 8);
        all_diff(&[a, b], &mut vars);
        assert_eq!(vars.lookup(b).unwrap().derived().bounds(), Some((6.0, 8.0)));
    }
}
