//! The temporal propagator: a Simple Temporal Network (STN) over
//! timepoint variables, propagated by incremental Bellman-Ford shortest
//! paths with negative-cycle detection (spec §4.7).
//!
//! **Model.** One node per timepoint variable plus a single reference
//! origin node. A directed edge `u → v` weight `w` encodes `v − u ≤ w`.
//! Each timepoint's own derived-domain bounds are folded into the graph
//! each propagation pass as a synthetic pair of edges to/from the origin
//! (`origin → v` weight `v.ub`, `v → origin` weight `−v.lb`), so the
//! timepoint's domain and its distance-graph position are always the
//! same set of constraints seen from two different representations.
//!
//! **Incrementality.** [`TemporalNetwork::propagate`] seeds its
//! relaxation queue from the origin plus whichever nodes were touched by
//! an edge add/update since the last call (`dirty`), rather than
//! blindly restarting Bellman-Ford from every node — the queue-based
//! relaxation below is the standard SPFA form of Bellman-Ford, which
//! degrades gracefully to a full recompute when the dirty set is large
//! (e.g. the first call) without needing a separate code path.
//!
//! **Negative-cycle detection** runs as a separate pass seeded from
//! every node at once (a virtual zero-source), not from the origin:
//! two timepoints related only to each other, with no finite-weight
//! path from the origin at all, can still form a cycle, and an
//! origin-seeded relaxation would never visit them.

use crate::constraints::VarChange;
use crate::variable::{ConstrainedVariable, Variable, VarId};
use crate::entity::Registry;
use indexmap::IndexSet;
use std::collections::{HashMap, VecDeque};

type Vars = Registry<Variable, ConstrainedVariable>;

/// Outcome of one [`TemporalNetwork::propagate`] call.
#[derive(Debug, Default)]
pub struct TemporalOutcome {
    pub changes: Vec<VarChange>,
    /// A node on a detected negative cycle, if propagation found temporal
    /// inconsistency (spec §4.7: "emit EMPTIED on a variable participating
    /// in the cycle and halt").
    pub inconsistent: Option<VarId>,
}

#[derive(Debug, Default)]
pub struct TemporalNetwork {
    origin: Option<VarId>,
    nodes: IndexSet<VarId>,
    /// Edges contributed by `concurrent`/`precedes`/`strictlyPrecedes`/
    /// `temporalDistance` constraints (as opposed to the synthetic
    /// domain-bound edges folded in at propagation time).
    forward: HashMap<VarId, Vec<(VarId, f64)>>,
    backward: HashMap<VarId, Vec<(VarId, f64)>>,
    dirty: IndexSet<VarId>,
}

impl TemporalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Designate the reference origin timepoint. Must be called before
    /// the first [`TemporalNetwork::propagate`].
    pub fn set_origin(&mut self, origin: VarId) {
        self.origin = Some(origin);
        self.ensure_node(origin);
    }

    pub fn ensure_node(&mut self, v: VarId) {
        if self.nodes.insert(v) {
            self.dirty.insert(v);
        }
    }

    fn add_edge(&mut self, u: VarId, v: VarId, w: f64) {
        self.ensure_node(u);
        self.ensure_node(v);
        self.forward.entry(u).or_default().push((v, w));
        self.backward.entry(v).or_default().push((u, w));
        self.dirty.insert(u);
    }

    /// `a` and `b` occur at the same time: zero-distance edges both ways.
    pub fn concurrent(&mut self, a: VarId, b: VarId) {
        self.add_edge(a, b, 0.0);
        self.add_edge(b, a, 0.0);
    }

    /// `a ≤ b` (optionally strict by `min_delta`): a single edge `b → a`
    /// weight `0` (or `−min_delta` when strict), which encodes `a − b ≤
    /// 0` (respectively `≤ −min_delta`, i.e. `a + min_delta ≤ b`).
    pub fn precedes(&mut self, a: VarId, b: VarId, strict: bool, min_delta: f64) {
        let w = if strict { -min_delta } else { 0.0 };
        self.add_edge(b, a, w);
    }

    pub fn strictly_precedes(&mut self, a: VarId, b: VarId, min_delta: f64) {
        self.precedes(a, b, true, min_delta);
    }

    /// `a + [lb, ub] = b`-style distance constraint: `a → b` weight `ub`
    /// and `b → a` weight `−lb`.
    pub fn temporal_distance(&mut self, a: VarId, b: VarId, lb: f64, ub: f64) {
        self.add_edge(a, b, ub);
        self.add_edge(b, a, -lb);
    }

    /// Run one Bellman-Ford pass in each direction from the origin and
    /// tighten every timepoint's derived domain to the resulting
    /// shortest-path bounds (spec §4.7 "Propagation").
    pub fn propagate(&mut self, vars: &mut Vars) -> TemporalOutcome {
        let Some(origin) = self.origin else {
            return TemporalOutcome::default();
        };

        let mut bound_edges = HashMap::new();
        for &v in self.nodes.iter() {
            if v == origin {
                continue;
            }
            if let Some((lb, ub)) = vars.lookup(v).and_then(|cv| cv.derived().bounds()) {
                bound_edges.insert(v, (lb, ub));
            }
        }

        let mut forward = self.forward.clone();
        let mut backward = self.backward.clone();
        for (&v, &(lb, ub)) in &bound_edges {
            forward.entry(origin).or_default().push((v, ub));
            backward.entry(v).or_default().push((origin, ub));
            forward.entry(v).or_default().push((origin, -lb));
            backward.entry(origin).or_default().push((v, -lb));
        }

        let limit = self.nodes.len() + 1;

        // Negative-cycle detection must not depend on reachability from
        // the physical origin: two timepoints related only to each other
        // (no finite-weight path from `origin` at all) can still form a
        // cycle. Seed every node at distance zero simultaneously — the
        // standard "virtual zero-source" construction — and run a
        // dedicated pass whose only job is to report inconsistency; its
        // distance values are not otherwise used.
        let all_nodes: Vec<VarId> = self.nodes.iter().copied().collect();
        let mut cycle_probe: HashMap<VarId, f64> = all_nodes.iter().map(|&v| (v, 0.0)).collect();
        if let Err(node) = relax(&forward, &all_nodes, limit, &mut cycle_probe) {
            self.dirty.clear();
            return TemporalOutcome {
                changes: Vec::new(),
                inconsistent: Some(node),
            };
        }

        let seeds: Vec<VarId> = if self.dirty.is_empty() {
            vec![origin]
        } else {
            std::iter::once(origin).chain(self.dirty.drain(..)).collect()
        };

        let mut dist_from_origin = HashMap::new();
        dist_from_origin.insert(origin, 0.0);
        if let Err(node) = relax(&forward, &seeds, limit, &mut dist_from_origin) {
            return TemporalOutcome {
                changes: Vec::new(),
                inconsistent: Some(node),
            };
        }

        let mut dist_to_origin = HashMap::new();
        dist_to_origin.insert(origin, 0.0);
        if let Err(node) = relax(&backward, &seeds, limit, &mut dist_to_origin) {
            return TemporalOutcome {
                changes: Vec::new(),
                inconsistent: Some(node),
            };
        }

        let mut changes = Vec::new();
        for &v in self.nodes.iter() {
            if v == origin {
                continue;
            }
            let ub = *dist_from_origin.get(&v).unwrap_or(&f64::INFINITY);
            let lb = -*dist_to_origin.get(&v).unwrap_or(&f64::INFINITY);
            if let Some(cv) = vars.lookup_mut(v) {
                let events = cv.derived_mut().intersect_bounds(lb, ub);
                if !events.is_empty() {
                    changes.push(VarChange { var: v, events });
                }
            }
        }
        TemporalOutcome {
            changes,
            inconsistent: None,
        }
    }

    /// Direct bound-propagation fallback for when `Config.use_temporal_propagator`
    /// is disabled (spec §4.7 "Fallback"): temporal constraints degrade to
    /// plain two-variable bound tightening instead of distance-graph
    /// shortest paths.
    pub fn fallback_execute(
        kind: crate::constraint::ConstraintKind,
        scope: &[VarId],
        vars: &mut Vars,
    ) -> Vec<VarChange> {
        use crate::constraint::ConstraintKind::*;
        let mut changes = Vec::new();
        let bound = |vars: &Vars, id: VarId| -> (f64, f64) {
            vars.lookup(id)
                .and_then(|cv| cv.derived().bounds())
                .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
        };
        let tighten = |vars: &mut Vars, id: VarId, lb: f64, ub: f64| -> Option<VarChange> {
            let events = vars.lookup_mut(id)?.derived_mut().intersect_bounds(lb, ub);
            (!events.is_empty()).then_some(VarChange { var: id, events })
        };

        match kind {
            Concurrent => {
                let [a, b] = scope else { return changes };
                let (al, au) = bound(vars, *a);
                let (bl, bu) = bound(vars, *b);
                changes.extend(tighten(vars, *a, bl, bu));
                changes.extend(tighten(vars, *b, al, au));
            }
            Precedes | StrictlyPrecedes => {
                let [a, b] = scope else { return changes };
                let delta = if kind == StrictlyPrecedes {
                    vars.lookup(*a).map(|cv| cv.data_type.min_delta()).unwrap_or(0.0)
                } else {
                    0.0
                };
                let (al, _) = bound(vars, *a);
                let (_, bu) = bound(vars, *b);
                changes.extend(tighten(vars, *a, f64::NEG_INFINITY, bu - delta));
                changes.extend(tighten(vars, *b, al + delta, f64::INFINITY));
            }
            TemporalDistance => {
                let [a, b, d] = scope else { return changes };
                let (al, au) = bound(vars, *a);
                let (bl, bu) = bound(vars, *b);
                let (dl, du) = bound(vars, *d);
                changes.extend(tighten(vars, *d, bl - au, bu - al));
                changes.extend(tighten(vars, *b, al + dl, au + du));
                changes.extend(tighten(vars, *a, bl - du, bu - dl));
            }
            _ => {}
        }
        changes
    }
}

/// Advisor interface for plan-database ordering decisions (spec §4.7).
/// Answers are conservative: derived from current domain bounds rather
/// than a full distance-graph query, matching what the spec's own
/// fallback path already commits to doing, so the advisor's contract is
/// the same whether or not the STN propagator is active.
pub struct Advisor<'a> {
    vars: &'a Vars,
}

impl<'a> Advisor<'a> {
    pub fn new(vars: &'a Vars) -> Self {
        Self { vars }
    }

    fn bounds(&self, v: VarId) -> (f64, f64) {
        self.vars
            .lookup(v)
            .and_then(|cv| cv.derived().bounds())
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY))
    }

    /// Whether `a ≤ b` is still feasible given current bounds.
    pub fn can_precede(&self, a: VarId, b: VarId) -> bool {
        let (a_lb, _) = self.bounds(a);
        let (_, b_ub) = self.bounds(b);
        a_lb <= b_ub
    }

    /// Whether a token spanning `[token_start, token_end]` could be
    /// inserted between `prev_end` and `next_start` on a timeline.
    pub fn can_fit_between(
        &self,
        token_start: VarId,
        token_end: VarId,
        prev_end: VarId,
        next_start: VarId,
    ) -> bool {
        self.can_precede(prev_end, token_start) && self.can_precede(token_end, next_start)
    }

    /// The current lower bound of a token's start timepoint.
    pub fn most_recent(&self, token_start: VarId) -> f64 {
        self.bounds(token_start).0
    }
}

/// Queue-based (SPFA-style) Bellman-Ford relaxation seeded from `seeds`.
/// `limit` bounds how many times any single node may be relaxed before a
/// negative cycle is declared (`nodes.len() + 1` is the standard bound:
/// a simple shortest path visits each node at most once).
fn relax(
    edges: &HashMap<VarId, Vec<(VarId, f64)>>,
    seeds: &[VarId],
    limit: usize,
    dist: &mut HashMap<VarId, f64>,
) -> Result<(), VarId> {
    let mut queue: VecDeque<VarId> = seeds.iter().copied().collect();
    let mut queued: std::collections::HashSet<VarId> = seeds.iter().copied().collect();
    let mut relax_count: HashMap<VarId, usize> = HashMap::new();

    while let Some(u) = queue.pop_front() {
        queued.remove(&u);
        let du = *dist.get(&u).unwrap_or(&f64::INFINITY);
        if du.is_infinite() {
            continue;
        }
        let Some(adj) = edges.get(&u) else { continue };
        for &(v, w) in adj {
            let candidate = du + w;
            let current = *dist.get(&v).unwrap_or(&f64::INFINITY);
            if candidate < current - 1e-9 {
                dist.insert(v, candidate);
                let count = relax_count.entry(v).or_insert(0);
                *count += 1;
                if *count > limit {
                    return Err(v);
                }
                if queued.insert(v) {
                    queue.push_back(v);
                }
            }
        }
    }
    Ok(())
}
