//! The constraint engine: owns every variable and constraint, routes
//! domain-change notifications to the propagator each constraint is
//! assigned to, and runs the propagation fixed point (spec §4.3).
//!
//! This is the seam the teacher crate would call an aggregate root: a
//! single owning value (no process-wide singletons, spec §9 design note)
//! that holds the variable/constraint registries plus one instance of
//! each propagator kind. `eqSum`/`eqProduct` decomposition into auxiliary
//! `addEq`/`multEq` trees happens here, at construction time, since it is
//! engine-level bookkeeping rather than a per-kind propagation body.

use crate::config::Config;
use crate::constraint::{Constraint, ConstraintId, ConstraintKind, ConstraintMarker, PropagatorAssignment};
use crate::constraints::Vars;
use crate::domain::Domain;
use crate::entity::Registry;
use crate::equality::EqualityClassPropagator;
use crate::errors::{EngineError, EngineResult};
use crate::propagator::DefaultPropagator;
use crate::temporal::{Advisor, TemporalNetwork};
use crate::transaction_log::{TransactionKind, TransactionRecord, TransactionSink};
use crate::types::DataType;
use crate::variable::{ConstrainedVariable, Parent, VarId, Variable};
use std::collections::HashMap;

/// Outcome of a [`Engine::propagate`] call (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationOutcome {
    Consistent,
    Inconsistent,
}

/// The constraint engine: variable/constraint stores, the three
/// propagators, and the violation ledger (spec §4.3 "Violation
/// tolerance", SPEC_FULL.md §3).
pub struct Engine {
    config: Config,
    vars: Vars,
    constraints: Registry<ConstraintMarker, Constraint>,
    default_prop: DefaultPropagator,
    equality_prop: EqualityClassPropagator,
    temporal: TemporalNetwork,
    /// Live `eq` constraint endpoint pairs, kept so the equality
    /// propagator can be rebuilt from scratch when one is discarded
    /// (spec §4.5 "full reprop on remove").
    eq_pairs: Vec<(VarId, ConstraintId, VarId, VarId)>,
    inconsistent: bool,
    violations: HashMap<VarId, Vec<ConstraintId>>,
    temporal_origin: Option<VarId>,
    /// The transaction-log sink a client may install to observe every
    /// mutating API call in commit order (spec §6 "Persisted state",
    /// SPEC_FULL.md §6). `None` (the default) costs nothing: no record is
    /// ever built if nothing is installed to receive it.
    sink: Option<Box<dyn TransactionSink>>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let mut temporal = TemporalNetwork::new();
        let mut vars: Vars = Registry::new();
        let (origin_var, _) = ConstrainedVariable::new(
            DataType::Float,
            Domain::singleton_float(0.0),
            "__origin",
            true,
            false,
            None,
            None,
        );
        let origin = vars.insert(origin_var);
        temporal.set_origin(origin);

        Self {
            config,
            vars,
            constraints: Registry::new(),
            default_prop: DefaultPropagator::new(),
            equality_prop: EqualityClassPropagator::new(),
            temporal,
            eq_pairs: Vec::new(),
            inconsistent: false,
            violations: HashMap::new(),
            temporal_origin: Some(origin),
            sink: None,
        }
    }

    /// Install a transaction-log sink; every subsequent mutating call
    /// appends a [`TransactionRecord`] to it in commit order.
    pub fn set_sink(&mut self, sink: Box<dyn TransactionSink>) {
        self.sink = Some(sink);
    }

    /// Remove any installed transaction-log sink.
    pub fn clear_sink(&mut self) {
        self.sink = None;
    }

    /// Append a record to the installed sink, if any. `pub(crate)` so
    /// `plan.rs` can log object/token/precedence-level events through the
    /// same sink without duplicating the "is one installed" check.
    pub(crate) fn log(&mut self, kind: TransactionKind, target_key: impl Into<String>, payload: serde_json::Value) {
        if let Some(sink) = self.sink.as_mut() {
            sink.record(TransactionRecord::new(kind, target_key, payload));
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    pub fn constraints(&self) -> &Registry<ConstraintMarker, Constraint> {
        &self.constraints
    }

    /// The reference origin timepoint every temporal distance is
    /// ultimately measured from.
    pub fn temporal_origin(&self) -> VarId {
        self.temporal_origin.expect("origin set at construction")
    }

    pub fn advisor(&self) -> Advisor<'_> {
        Advisor::new(&self.vars)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_variable(
        &mut self,
        data_type: DataType,
        base: Domain,
        name: impl Into<String>,
        internal: bool,
        specifiable: bool,
        parent: Option<Parent>,
        index: Option<usize>,
    ) -> VarId {
        let (var, _events) =
            ConstrainedVariable::new(data_type, base, name, internal, specifiable, parent, index);
        let id = self.vars.insert(var);
        self.temporal.ensure_node(id);
        id
    }

    /// Create a constraint over `scope`, validating arity and per-argument
    /// types (spec §4.6). Construction errors are immediate, no-partial-
    /// registration failures (spec §7).
    pub fn create_constraint(
        &mut self,
        kind: ConstraintKind,
        scope: Vec<VarId>,
    ) -> EngineResult<ConstraintId> {
        let data_types: Vec<DataType> = scope
            .iter()
            .map(|&v| {
                self.vars
                    .lookup(v)
                    .map(|cv| cv.data_type)
                    .ok_or_else(|| EngineError::construction(format!("unknown variable {v}")))
            })
            .collect::<EngineResult<_>>()?;

        Constraint::validate_scope(kind, &data_types).map_err(EngineError::construction)?;

        let id = self.constraints.insert(Constraint::new(kind, scope.clone()));
        self.log(
            TransactionKind::ConstraintCreated,
            id.to_string(),
            serde_json::json!({
                "kind": format!("{kind:?}"),
                "scope": scope.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
            }),
        );

        match kind.propagator() {
            PropagatorAssignment::Default => {
                self.default_prop.notify(id);
            }
            PropagatorAssignment::Equality => {
                // `eq` is variadic (spec §4.6: "all variables equal");
                // an n-ary scope is folded into its n-1 adjacent pairs,
                // each unioned into the equality propagator and recorded
                // under this same constraint id so `discard_constraint`
                // retracts all of them together.
                for pair in scope.windows(2) {
                    let &[a, b] = pair else { unreachable!("windows(2) yields pairs") };
                    self.equality_prop.union(a, b);
                    self.eq_pairs.push((a, id, a, b));
                }
            }
            PropagatorAssignment::Temporal => {
                self.register_temporal(kind, &scope)?;
            }
        }

        Ok(id)
    }

    fn register_temporal(&mut self, kind: ConstraintKind, scope: &[VarId]) -> EngineResult<()> {
        if !self.config.use_temporal_propagator {
            // Fallback mode (spec §4.7 "Fallback"): the constraint stays
            // registered in `self.constraints` (so `route_change_generic`
            // and the decision manager can still see it) but is never
            // handed to the STN; `propagate` runs a dedicated fallback
            // pass over every temporal-kind constraint instead of
            // scheduling it on the default agenda.
            return Ok(());
        }
        match kind {
            ConstraintKind::Concurrent => {
                let [a, b] = scope else {
                    return Err(EngineError::construction("concurrent requires 2 variables"));
                };
                self.temporal.concurrent(*a, *b);
            }
            ConstraintKind::Precedes => {
                let [a, b] = scope else {
                    return Err(EngineError::construction("precedes requires 2 variables"));
                };
                self.temporal.precedes(*a, *b, false, 0.0);
            }
            ConstraintKind::StrictlyPrecedes => {
                let [a, b] = scope else {
                    return Err(EngineError::construction("strictlyPrecedes requires 2 variables"));
                };
                let delta = self
                    .vars
                    .lookup(*a)
                    .map(|cv| cv.data_type.min_delta())
                    .unwrap_or(1.0);
                self.temporal.strictly_precedes(*a, *b, delta);
            }
            ConstraintKind::TemporalDistance => {
                let [a, b, d] = scope else {
                    return Err(EngineError::construction("temporalDistance requires 3 variables"));
                };
                let (lb, ub) = self
                    .vars
                    .lookup(*d)
                    .and_then(|cv| cv.derived().bounds())
                    .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));
                self.temporal.temporal_distance(*a, *b, lb, ub);
            }
            _ => unreachable!("non-temporal kind routed to register_temporal"),
        }
        Ok(())
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    /// Re-enable propagation after an external relax operation restores a
    /// superset on the variable(s) that caused inconsistency (spec §7:
    /// "the next `propagate` call after a restoring relaxation must
    /// succeed").
    pub fn relax(&mut self) {
        self.inconsistent = false;
    }

    /// Run propagators round-robin by priority (default, then equality,
    /// then temporal) until every agenda is empty or a variable empties
    /// (spec §4.3 "Propagation loop").
    pub fn propagate(&mut self) -> PropagationOutcome {
        if self.inconsistent && !self.config.allow_violations {
            return PropagationOutcome::Inconsistent;
        }

        loop {
            let mut made_progress = false;

            while !self.default_prop.is_empty() {
                let Some(outcome) = self.default_prop.step(&self.constraints, &mut self.vars)
                else {
                    break;
                };
                made_progress = true;
                for change in &outcome.changes {
                    self.route_change(change.var, outcome.constraint);
                }
                if self.any_emptied(&outcome.changes) && !self.record_or_halt(&outcome) {
                    return PropagationOutcome::Inconsistent;
                }
            }

            if !self.equality_prop.is_empty() {
                if let Some(changes) = self.equality_prop.step(&mut self.vars) {
                    made_progress = true;
                    for change in &changes {
                        self.route_change_generic(change.var);
                    }
                    let emptied: Vec<VarId> = changes
                        .iter()
                        .filter(|c| self.vars.lookup(c.var).map(|v| v.derived().is_empty()).unwrap_or(false))
                        .map(|c| c.var)
                        .collect();
                    if !emptied.is_empty() {
                        for v in emptied {
                            self.violations.entry(v).or_default();
                        }
                        if !self.config.allow_violations {
                            self.inconsistent = true;
                            return PropagationOutcome::Inconsistent;
                        }
                    }
                }
                continue;
            }

            if self.config.use_temporal_propagator {
                let temporal_outcome = self.temporal.propagate(&mut self.vars);
                if !temporal_outcome.changes.is_empty() || temporal_outcome.inconsistent.is_some() {
                    made_progress = true;
                    for change in &temporal_outcome.changes {
                        self.route_change_generic(change.var);
                    }
                    if let Some(node) = temporal_outcome.inconsistent {
                        self.violations.entry(node).or_default();
                        if !self.config.allow_violations {
                            self.inconsistent = true;
                            return PropagationOutcome::Inconsistent;
                        }
                    }
                }
            } else if self.step_temporal_fallback() {
                made_progress = true;
                if self.inconsistent && !self.config.allow_violations {
                    return PropagationOutcome::Inconsistent;
                }
            }

            if !made_progress {
                break;
            }
        }

        PropagationOutcome::Consistent
    }

    /// One fixed-point pass of `TemporalNetwork::fallback_execute` over
    /// every active temporal-kind constraint, used in place of the STN
    /// when `Config.use_temporal_propagator` is off (spec §4.7
    /// "Fallback"). Returns whether any variable changed.
    fn step_temporal_fallback(&mut self) -> bool {
        let temporal_constraints: Vec<(ConstraintId, ConstraintKind, Vec<VarId>)> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.active && !c.discarded && c.kind.propagator() == PropagatorAssignment::Temporal)
            .map(|(id, c)| (id, c.kind, c.scope.clone()))
            .collect();

        let mut any_change = false;
        for (_id, kind, scope) in temporal_constraints {
            let changes = TemporalNetwork::fallback_execute(kind, &scope, &mut self.vars);
            if !changes.is_empty() {
                any_change = true;
            }
            for change in &changes {
                self.route_change_generic(change.var);
                if self.vars.lookup(change.var).map(|v| v.derived().is_empty()).unwrap_or(false) {
                    self.violations.entry(change.var).or_default();
                    if !self.config.allow_violations {
                        self.inconsistent = true;
                    }
                }
            }
        }
        any_change
    }

    fn any_emptied(&self, changes: &[crate::constraints::VarChange]) -> bool {
        changes.iter().any(|c| {
            self.vars
                .lookup(c.var)
                .map(|v| v.derived().is_empty())
                .unwrap_or(false)
        })
    }

    fn record_or_halt(&mut self, outcome: &crate::propagator::StepOutcome) -> bool {
        for change in &outcome.changes {
            if self
                .vars
                .lookup(change.var)
                .map(|v| v.derived().is_empty())
                .unwrap_or(false)
            {
                self.violations
                    .entry(change.var)
                    .or_default()
                    .push(outcome.constraint);
            }
        }
        if self.config.allow_violations {
            true
        } else {
            self.inconsistent = true;
            false
        }
    }

    /// Every currently recorded violation, for clients that want to
    /// report/explain an `allowViolations` run rather than halt on it.
    pub fn violations(&self) -> &HashMap<VarId, Vec<ConstraintId>> {
        &self.violations
    }

    /// Route a domain change on `changed_var` (caused by `source`'s own
    /// execution) to every other constraint in whose scope it appears,
    /// via `canIgnore`-equivalent filtering (spec §4.3 "Change routing").
    /// The source constraint itself is excluded by the propagators'
    /// re-entry guards, not here.
    fn route_change(&mut self, changed_var: VarId, source: ConstraintId) {
        let interested: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(id, c)| *id != source && c.active && !c.discarded && c.scope.contains(&changed_var))
            .map(|(id, _)| id)
            .collect();
        for id in interested {
            let kind = self.constraints.lookup(id).expect("just filtered as live").kind;
            match kind.propagator() {
                PropagatorAssignment::Default => self.default_prop.notify(id),
                PropagatorAssignment::Equality => {}
                PropagatorAssignment::Temporal => {}
            }
        }
        self.equality_prop.notify(changed_var);
    }

    /// Same routing but with no single "source" constraint to exclude
    /// (used after equality-class / temporal propagation, which touch
    /// many variables per step with no one originating constraint).
    fn route_change_generic(&mut self, changed_var: VarId) {
        let interested: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.active && !c.discarded && c.scope.contains(&changed_var))
            .map(|(id, _)| id)
            .collect();
        for id in interested {
            let kind = self.constraints.lookup(id).expect("just filtered as live").kind;
            if kind.propagator() == PropagatorAssignment::Default {
                self.default_prop.notify(id);
            }
        }
        self.equality_prop.notify(changed_var);
    }

    /// Discard a constraint: remove it from its propagator's agenda,
    /// mark it inactive, and (for `eq`) trigger the equality propagator's
    /// full-reprop rebuild (spec §4.5, §4.11 "Undo").
    pub fn discard_constraint(&mut self, id: ConstraintId) {
        if let Some(c) = self.constraints.lookup_mut(id) {
            c.discarded = true;
            c.active = false;
        }
        self.log(TransactionKind::ConstraintDestroyed, id.to_string(), serde_json::Value::Null);
        self.default_prop.forget(id);
        if self.eq_pairs.iter().any(|(_, cid, _, _)| *cid == id) {
            self.eq_pairs.retain(|(_, cid, _, _)| *cid != id);
            let pairs: Vec<(VarId, VarId)> = self.eq_pairs.iter().map(|(_, _, a, b)| (*a, *b)).collect();
            self.equality_prop.rebuild(&pairs);
        }
        self.constraints.remove(id);
    }

    /// Impose a client restriction on `var` and notify the constraints in
    /// its scope (spec §4.2 `specify`).
    pub fn specify(&mut self, var: VarId, restriction: &Domain) -> EngineResult<()> {
        let Some(cv) = self.vars.lookup_mut(var) else {
            return Err(EngineError::StaleReference {
                entity_type: "Variable".into(),
                key: var.to_string(),
            });
        };
        cv.specify(restriction);
        self.log(
            TransactionKind::VariableSpecified,
            var.to_string(),
            serde_json::json!({ "bounds": restriction.bounds() }),
        );
        self.route_change_generic(var);
        Ok(())
    }

    /// Relax `var`'s specified restriction back to its base domain (spec
    /// §4.2 `reset`, §8 invariant 3).
    pub fn reset_variable(&mut self, var: VarId) -> EngineResult<()> {
        let Some(cv) = self.vars.lookup_mut(var) else {
            return Err(EngineError::StaleReference {
                entity_type: "Variable".into(),
                key: var.to_string(),
            });
        };
        cv.reset();
        self.log(TransactionKind::VariableReset, var.to_string(), serde_json::Value::Null);
        self.route_change_generic(var);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn int_var(engine: &mut Engine, lb: i64, ub: i64, name: &str) -> VarId {
        engine.create_variable(DataType::Int, Domain::int_interval(lb, ub), name, false, true, None, None)
    }

    /// S1 — addition triangle (spec §8).
    #[test]
    fn s1_addition_triangle() {
        let mut engine = Engine::new(Config::default());
        let x = int_var(&mut engine, 0, 10, "x");
        let y = int_var(&mut engine, 0, 10, "y");
        let z = int_var(&mut engine, 0, 10, "z");
        engine
            .create_constraint(ConstraintKind::AddEq, vec![x, y, z])
            .unwrap();

        engine.specify(x, &Domain::int_interval(3, 3)).unwrap();
        engine.specify(z, &Domain::int_interval(5, 5)).unwrap();
        assert_eq!(engine.propagate(), PropagationOutcome::Consistent);

        assert_eq!(engine.vars().lookup(y).unwrap().derived().bounds(), Some((2.0, 2.0)));
    }

    /// S2 — equality class (spec §8).
    #[test]
    fn s2_equality_class() {
        let mut engine = Engine::new(Config::default());
        let a = int_var(&mut engine, 0, 5, "a");
        let b = int_var(&mut engine, 0, 5, "b");
        let c = int_var(&mut engine, 0, 5, "c");
        engine.create_constraint(ConstraintKind::Eq, vec![a, b]).unwrap();
        engine.create_constraint(ConstraintKind::Eq, vec![b, c]).unwrap();

        engine.specify(a, &Domain::int_interval(2, 3)).unwrap();
        assert_eq!(engine.propagate(), PropagationOutcome::Consistent);

        for v in [a, b, c] {
            assert_eq!(engine.vars().lookup(v).unwrap().derived().bounds(), Some((2.0, 3.0)));
        }
    }

    /// `eq` is variadic (spec §4.6): a single n-ary constraint over
    /// `a, b, c, d` folds into the same equality class as three pairwise
    /// ones would.
    #[test]
    fn eq_n_ary_scope_joins_one_class() {
        let mut engine = Engine::new(Config::default());
        let a = int_var(&mut engine, 0, 5, "a");
        let b = int_var(&mut engine, 0, 5, "b");
        let c = int_var(&mut engine, 0, 5, "c");
        let d = int_var(&mut engine, 0, 5, "d");
        engine.create_constraint(ConstraintKind::Eq, vec![a, b, c, d]).unwrap();

        engine.specify(a, &Domain::int_interval(2, 3)).unwrap();
        assert_eq!(engine.propagate(), PropagationOutcome::Consistent);

        for v in [a, b, c, d] {
            assert_eq!(engine.vars().lookup(v).unwrap().derived().bounds(), Some((2.0, 3.0)));
        }
    }

    /// S3 — STN (spec §8).
    #[test]
    fn s3_stn() {
        let mut engine = Engine::new(Config::default());
        let t0 = int_var(&mut engine, 0, 0, "t0");
        let t1 = engine.create_variable(
            DataType::Float,
            Domain::float_interval(0.0, f64::INFINITY),
            "t1",
            false,
            true,
            None,
            None,
        );
        let t2 = engine.create_variable(
            DataType::Float,
            Domain::float_interval(0.0, f64::INFINITY),
            "t2",
            false,
            true,
            None,
            None,
        );
        let d1 = engine.create_variable(
            DataType::Float,
            Domain::float_interval(5.0, 10.0),
            "d1",
            false,
            true,
            None,
            None,
        );
        let d2 = engine.create_variable(DataType::Float, Domain::float_interval(3.0, 3.0), "d2", false, true, None, None);
        engine
            .create_constraint(ConstraintKind::TemporalDistance, vec![t0, t1, d1])
            .unwrap();
        engine
            .create_constraint(ConstraintKind::TemporalDistance, vec![t1, t2, d2])
            .unwrap();

        assert_eq!(engine.propagate(), PropagationOutcome::Consistent);
        assert_eq!(engine.vars().lookup(t1).unwrap().derived().bounds(), Some((5.0, 10.0)));
        assert_eq!(engine.vars().lookup(t2).unwrap().derived().bounds(), Some((8.0, 13.0)));
    }

    #[test]
    fn inconsistent_propagation_reports_and_relax_recovers() {
        let mut engine = Engine::new(Config::default());
        let x = int_var(&mut engine, 0, 5, "x");
        let y = int_var(&mut engine, 10, 15, "y");
        engine.create_constraint(ConstraintKind::Eq, vec![x, y]).unwrap();
        assert_eq!(engine.propagate(), PropagationOutcome::Inconsistent);
        assert!(engine.is_inconsistent());

        engine.relax();
        engine.reset_variable(x).unwrap();
        engine.reset_variable(y).unwrap();
        engine.specify(x, &Domain::int_interval(10, 10)).unwrap();
        assert_eq!(engine.propagate(), PropagationOutcome::Consistent);
    }

    #[test]
    fn construction_rejects_illegal_scope() {
        let mut engine = Engine::new(Config::default());
        let x = int_var(&mut engine, 0, 5, "x");
        let err = engine.create_constraint(ConstraintKind::AddEq, vec![x, x]).unwrap_err();
        assert!(matches!(err, EngineError::Construction { .. }));
    }
}
