//! Property tests for the testable invariants of spec §8, run against the
//! crate's public API (SPEC_FULL.md §2 "Test tooling": `proptest`-based
//! generators over small variable/domain/constraint configurations).

use proptest::prelude::*;
use tnet_planner::config::Config;
use tnet_planner::constraint::ConstraintKind;
use tnet_planner::domain::Domain;
use tnet_planner::engine::{Engine, PropagationOutcome};
use tnet_planner::types::DataType;

fn bounded_int(lb: i64, ub: i64) -> impl Strategy<Value = (i64, i64)> {
    (lb..=ub, lb..=ub).prop_map(|(a, b)| if a <= b { (a, b) } else { (b, a) })
}

proptest! {
    /// Invariant 1 — subset chain: after any `specify`, `derived ⊆
    /// specified ⊆ base`.
    #[test]
    fn subset_chain_holds_after_specify(
        base in bounded_int(-20, 20),
        restriction in bounded_int(-20, 20),
    ) {
        let mut engine = Engine::new(Config::default());
        let x = engine.create_variable(
            DataType::Int,
            Domain::int_interval(base.0, base.1),
            "x",
            false,
            true,
            None,
            None,
        );
        let _ = engine.specify(x, &Domain::int_interval(restriction.0, restriction.1));

        let v = engine.vars().lookup(x).unwrap();
        prop_assert!(v.derived().is_subset_of(v.specified()));
        prop_assert!(v.specified().is_subset_of(v.base()));
    }

    /// Invariant 2 — monotone restriction: propagation never grows a
    /// variable's derived domain. Checked across an `addEq` triangle,
    /// which can only ever tighten all three legs.
    #[test]
    fn propagation_never_grows_a_domain(
        x0 in bounded_int(0, 50),
        y0 in bounded_int(0, 50),
    ) {
        let mut engine = Engine::new(Config::default());
        let x = engine.create_variable(DataType::Int, Domain::int_interval(x0.0, x0.1), "x", false, true, None, None);
        let y = engine.create_variable(DataType::Int, Domain::int_interval(y0.0, y0.1), "y", false, true, None, None);
        let z = engine.create_variable(DataType::Int, Domain::int_interval(0, 200), "z", false, true, None, None);
        engine.create_constraint(ConstraintKind::AddEq, vec![x, y, z]).unwrap();

        let before = engine.vars().lookup(z).unwrap().derived().clone();
        engine.propagate();
        let after = engine.vars().lookup(z).unwrap().derived().clone();
        prop_assert!(after.is_subset_of(&before));
    }

    /// Invariant 3 — relaxation monotonicity: after `reset`, the derived
    /// domain is a superset of whatever the prior `specify` left behind.
    #[test]
    fn reset_relaxes_back_to_at_least_the_pre_specify_domain(
        base in bounded_int(-20, 20),
        restriction in bounded_int(-20, 20),
    ) {
        let mut engine = Engine::new(Config::default());
        let x = engine.create_variable(
            DataType::Int,
            Domain::int_interval(base.0, base.1),
            "x",
            false,
            true,
            None,
            None,
        );
        engine.specify(x, &Domain::int_interval(restriction.0, restriction.1)).unwrap();
        let narrowed = engine.vars().lookup(x).unwrap().derived().clone();

        engine.reset_variable(x).unwrap();
        let relaxed = engine.vars().lookup(x).unwrap().derived().clone();
        prop_assert!(narrowed.is_subset_of(&relaxed));
    }

    /// Invariant 4 — confluence: adding the same two `leq` constraints in
    /// either order over the same initial domains yields the same final
    /// derived-domain tuple.
    #[test]
    fn constraint_addition_order_does_not_affect_the_fixed_point(
        x0 in bounded_int(0, 30),
        y0 in bounded_int(0, 30),
        z0 in bounded_int(0, 30),
    ) {
        fn build(order_swapped: bool, x0: (i64, i64), y0: (i64, i64), z0: (i64, i64)) -> (Option<(f64, f64)>, Option<(f64, f64)>, Option<(f64, f64)>) {
            let mut engine = Engine::new(Config::default());
            let x = engine.create_variable(DataType::Int, Domain::int_interval(x0.0, x0.1), "x", false, true, None, None);
            let y = engine.create_variable(DataType::Int, Domain::int_interval(y0.0, y0.1), "y", false, true, None, None);
            let z = engine.create_variable(DataType::Int, Domain::int_interval(z0.0, z0.1), "z", false, true, None, None);
            if !order_swapped {
                engine.create_constraint(ConstraintKind::Leq, vec![x, y]).unwrap();
                engine.create_constraint(ConstraintKind::Leq, vec![y, z]).unwrap();
            } else {
                engine.create_constraint(ConstraintKind::Leq, vec![y, z]).unwrap();
                engine.create_constraint(ConstraintKind::Leq, vec![x, y]).unwrap();
            }
            engine.propagate();
            (
                engine.vars().lookup(x).unwrap().derived().bounds(),
                engine.vars().lookup(y).unwrap().derived().bounds(),
                engine.vars().lookup(z).unwrap().derived().bounds(),
            )
        }

        let forward = build(false, x0, y0, z0);
        let swapped = build(true, x0, y0, z0);
        prop_assert_eq!(forward, swapped);
    }

    /// Invariant 5 — equality-class correctness: after quiescence, every
    /// member of an `eq` class has an identical derived domain.
    #[test]
    fn equality_class_members_converge_to_the_same_domain(
        a0 in bounded_int(-10, 10),
        b0 in bounded_int(-10, 10),
        c0 in bounded_int(-10, 10),
        restriction in bounded_int(-10, 10),
    ) {
        let mut engine = Engine::new(Config::default());
        let a = engine.create_variable(DataType::Int, Domain::int_interval(a0.0, a0.1), "a", false, true, None, None);
        let b = engine.create_variable(DataType::Int, Domain::int_interval(b0.0, b0.1), "b", false, true, None, None);
        let c = engine.create_variable(DataType::Int, Domain::int_interval(c0.0, c0.1), "c", false, true, None, None);
        engine.create_constraint(ConstraintKind::Eq, vec![a, b]).unwrap();
        engine.create_constraint(ConstraintKind::Eq, vec![c, b]).unwrap();
        engine.specify(a, &Domain::int_interval(restriction.0, restriction.1)).unwrap();

        if engine.propagate() == PropagationOutcome::Consistent {
            let da = engine.vars().lookup(a).unwrap().derived().clone();
            let db = engine.vars().lookup(b).unwrap().derived().clone();
            let dc = engine.vars().lookup(c).unwrap().derived().clone();
            prop_assert_eq!(da.bounds(), db.bounds());
            prop_assert_eq!(db.bounds(), dc.bounds());
        }
    }
}

/// Invariant 6 — STN tightness: after temporal propagation, the derived
/// bounds on both ends of a `temporalDistance` edge are exactly what
/// shortest paths on the distance graph would produce (not just *some*
/// tightening — spec §8 demands the tight bound).
#[test]
fn stn_bounds_are_shortest_path_tight() {
    let mut engine = Engine::new(Config::default());
    let t0 = engine.create_variable(DataType::Int, Domain::int_interval(0, 0), "t0", false, true, None, None);
    let t1 = engine.create_variable(DataType::Float, Domain::float_interval(0.0, f64::INFINITY), "t1", false, true, None, None);
    let t2 = engine.create_variable(DataType::Float, Domain::float_interval(0.0, f64::INFINITY), "t2", false, true, None, None);
    let d1 = engine.create_variable(DataType::Float, Domain::float_interval(5.0, 10.0), "d1", false, true, None, None);
    let d2 = engine.create_variable(DataType::Float, Domain::float_interval(3.0, 3.0), "d2", false, true, None, None);
    engine.create_constraint(ConstraintKind::TemporalDistance, vec![t0, t1, d1]).unwrap();
    engine.create_constraint(ConstraintKind::TemporalDistance, vec![t1, t2, d2]).unwrap();

    assert_eq!(engine.propagate(), PropagationOutcome::Consistent);
    // Shortest path t0 -> t1 is exactly [5, 10]; t0 -> t2 via t1 is
    // exactly [8, 13] (5+3, 10+3) — nothing looser, nothing tighter.
    assert_eq!(engine.vars().lookup(t1).unwrap().derived().bounds(), Some((5.0, 10.0)));
    assert_eq!(engine.vars().lookup(t2).unwrap().derived().bounds(), Some((8.0, 13.0)));
}

/// Invariant 9 — undo fidelity: commit followed by undo yields an
/// observably identical state (same derived domain) to the pre-commit
/// state.
#[test]
fn undo_restores_the_pre_commit_derived_domain() {
    let mut engine = Engine::new(Config::default());
    let x = engine.create_variable(DataType::Int, Domain::int_interval(0, 10), "x", false, true, None, None);
    let before = engine.vars().lookup(x).unwrap().derived().clone();

    engine.specify(x, &Domain::int_interval(3, 3)).unwrap();
    assert_ne!(engine.vars().lookup(x).unwrap().derived().bounds(), before.bounds());

    engine.reset_variable(x).unwrap();
    let after = engine.vars().lookup(x).unwrap().derived().clone();
    assert_eq!(after.bounds(), before.bounds());
}
