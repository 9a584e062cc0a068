//! The decision manager: maintains the six decision-point caches spec
//! §4.9 describes, enumerates each decision's choices, and answers "what
//! next" for the search driver.
//!
//! [`DecisionManager::refresh`] rebuilds every cache from scratch by
//! scanning the plan database and engine each time it is called, rather
//! than updating incrementally off entity-creation/destruction events.
//! The search driver calls it once per search step (after `propagate`),
//! so the cost is one scan per step rather than per entity change — a
//! deliberate simplification that trades a constant-factor rebuild cost
//! for not needing a second, independent cache-invalidation path to get
//! right.

use crate::config::PriorityPreference;
use crate::constraint::ConstraintId;
use crate::domain::Domain;
use crate::entity::{Key, Registry};
use crate::errors::EngineResult;
use crate::heuristic::{HeuristicTable, OrderingTag, RankedCandidate};
use crate::plan::{ObjectId, PlanDatabase, TokenId};
use crate::state_machine::TokenState;
use crate::variable::VarId;
use indexmap::IndexSet;
use std::collections::HashMap;

/// Marker type for [`Key<DecisionPoint>`].
pub struct DecisionMarker;
/// Stable handle to a [`DecisionPoint`].
pub type DecisionId = Key<DecisionMarker>;

/// Which of the six maintained caches a decision belongs to (spec §4.9).
/// Declared in the enumeration-order the search driver's tie-break uses:
/// objects, unit variables, unit tokens, non-unit tokens, non-unit
/// variables, resource flaws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Object,
    UnitVariable,
    UnitToken,
    NonUnitToken,
    NonUnitVariable,
    ResourceFlaw,
}

impl DecisionKind {
    /// The fixed kind-priority order the search driver's enumeration-order
    /// tie-break walks (spec §4.9).
    pub const ENUMERATION_ORDER: [DecisionKind; 6] = [
        DecisionKind::Object,
        DecisionKind::UnitVariable,
        DecisionKind::UnitToken,
        DecisionKind::NonUnitToken,
        DecisionKind::NonUnitVariable,
        DecisionKind::ResourceFlaw,
    ];
}

/// A decision point's lifecycle state (spec §3 `DecisionPoint`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStatus {
    /// Present in a cache, not yet chosen by the search driver.
    Open,
    /// The search driver's current decision on the stack.
    Current,
    /// Committed and popped off the stack normally.
    Closed,
    /// Undone by backtracking.
    Retracted,
}

/// What a decision point decides (spec §3 `DecisionPoint` variants).
#[derive(Debug, Clone)]
pub enum DecisionSubject {
    Variable(VarId),
    Token(TokenId),
    /// Which of `candidates` (every timeline `token` has been attached to
    /// and is not yet placed on) to place it on (spec §4.9
    /// `DecisionPoint::Object`).
    Object { token: TokenId, candidates: Vec<ObjectId> },
    ResourceFlaw { resource: ObjectId, a: TokenId, b: TokenId },
}

/// One entry in a decision cache.
#[derive(Debug, Clone)]
pub struct DecisionPoint {
    pub subject: DecisionSubject,
    pub kind: DecisionKind,
    pub status: DecisionStatus,
}

/// A concrete, committable choice enumerated for a decision (spec §4.9
/// "choice enumeration", §4.11 "Commit semantics").
#[derive(Debug, Clone)]
pub enum Choice {
    Variable { var: VarId, restriction: Domain },
    Activate { token: TokenId },
    Merge { token: TokenId, onto: TokenId },
    Reject { token: TokenId },
    Place { timeline: ObjectId, token: TokenId },
    Order { resource: ObjectId, before: TokenId, after: TokenId },
    PushBeyondHorizon { resource: ObjectId, token: TokenId },
}

/// What [`DecisionManager::commit`] needs to hand back to
/// [`DecisionManager::retract`] to undo exactly the effect of one
/// [`Choice`] (spec §4.11 "Undo").
#[derive(Debug, Clone)]
pub enum Undo {
    ResetVariable(VarId),
    CancelToken(TokenId),
    Unplace { timeline: ObjectId, token: TokenId, precedence: Option<ConstraintId> },
    DiscardPrecedence(ConstraintId),
}

/// Owns the six decision caches and the heuristic table that orders
/// their contents (spec §4.9).
pub struct DecisionManager {
    points: Registry<DecisionMarker, DecisionPoint>,
    by_kind: HashMap<DecisionKind, IndexSet<DecisionId>>,
    pub heuristics: HeuristicTable,
}

impl Default for DecisionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionManager {
    pub fn new() -> Self {
        let mut by_kind = HashMap::new();
        for kind in DecisionKind::ENUMERATION_ORDER {
            by_kind.insert(kind, IndexSet::new());
        }
        Self {
            points: Registry::new(),
            by_kind,
            heuristics: HeuristicTable::new(),
        }
    }

    pub fn point(&self, id: DecisionId) -> Option<&DecisionPoint> {
        self.points.lookup(id)
    }

    pub fn cache(&self, kind: DecisionKind) -> &IndexSet<DecisionId> {
        &self.by_kind[&kind]
    }

    /// Rebuild every cache from the current plan-database/engine state.
    pub fn refresh(&mut self, pdb: &mut PlanDatabase) {
        self.points = Registry::new();
        for set in self.by_kind.values_mut() {
            set.clear();
        }

        self.refresh_variables(pdb);
        self.refresh_tokens(pdb);
        self.refresh_objects(pdb);
        self.refresh_resource_flaws(pdb);
    }

    fn insert(&mut self, kind: DecisionKind, subject: DecisionSubject) {
        let id = self.points.insert(DecisionPoint {
            subject,
            kind,
            status: DecisionStatus::Open,
        });
        self.by_kind.get_mut(&kind).expect("every kind present").insert(id);
    }

    fn refresh_variables(&mut self, pdb: &PlanDatabase) {
        let entries: Vec<(VarId, bool, bool)> = pdb
            .engine
            .vars()
            .iter()
            .filter(|(_, cv)| !cv.internal)
            .map(|(id, cv)| (id, cv.is_unit_decision(), cv.is_open_decision()))
            .collect();
        for (var, is_unit, is_open) in entries {
            if is_unit {
                self.insert(DecisionKind::UnitVariable, DecisionSubject::Variable(var));
            } else if is_open {
                self.insert(DecisionKind::NonUnitVariable, DecisionSubject::Variable(var));
            }
        }
    }

    fn refresh_tokens(&mut self, pdb: &mut PlanDatabase) {
        let undecided: Vec<TokenId> = pdb
            .tokens()
            .iter()
            .filter(|(_, tok)| tok.state.committed().is_none() && !tok.state.is_empty())
            .map(|(id, _)| id)
            .collect();
        for t in &undecided {
            pdb.refresh_mergeable(*t);
        }
        for t in undecided {
            let unit = pdb.token(t).expect("just iterated").state.is_singleton();
            if unit {
                self.insert(DecisionKind::UnitToken, DecisionSubject::Token(t));
            } else {
                self.insert(DecisionKind::NonUnitToken, DecisionSubject::Token(t));
            }
        }
    }

    fn refresh_objects(&mut self, pdb: &PlanDatabase) {
        let mut candidates_by_token: HashMap<TokenId, Vec<ObjectId>> = HashMap::new();
        for (obj_id, obj) in pdb.objects().iter() {
            if !obj.is_timeline() {
                continue;
            }
            for &t in &obj.tokens {
                let Some(tok) = pdb.tokens().lookup(t) else { continue };
                if tok.state.committed() == Some(TokenState::Active) && tok.placed_on.is_none() {
                    candidates_by_token.entry(t).or_default().push(obj_id);
                }
            }
        }
        for (token, candidates) in candidates_by_token {
            self.insert(DecisionKind::Object, DecisionSubject::Object { token, candidates });
        }
    }

    fn refresh_resource_flaws(&mut self, pdb: &PlanDatabase) {
        let resources: Vec<ObjectId> = pdb.objects().iter().filter(|(_, o)| o.is_resource()).map(|(id, _)| id).collect();
        for resource in resources {
            for (a, b) in pdb.resource_flaws(resource) {
                self.insert(DecisionKind::ResourceFlaw, DecisionSubject::ResourceFlaw { resource, a, b });
            }
        }
    }

    /// The identity string a heuristic entry is keyed by for `subject`
    /// (spec §9: variable name, token predicate, object/resource type
    /// name).
    fn identity(&self, pdb: &PlanDatabase, subject: &DecisionSubject) -> String {
        match subject {
            DecisionSubject::Variable(v) => pdb.engine.vars().lookup(*v).map(|cv| cv.name.clone()).unwrap_or_default(),
            DecisionSubject::Token(t) => pdb.token(*t).map(|tok| tok.predicate.clone()).unwrap_or_default(),
            DecisionSubject::Object { candidates, .. } => candidates
                .first()
                .and_then(|&o| pdb.object(o).ok())
                .map(|obj| obj.type_name.clone())
                .unwrap_or_default(),
            DecisionSubject::ResourceFlaw { resource, .. } => {
                pdb.object(*resource).map(|obj| obj.type_name.clone()).unwrap_or_default()
            }
        }
    }

    /// Pick the next decision: first non-empty cache in
    /// [`DecisionKind::ENUMERATION_ORDER`], best heuristic priority within
    /// it, ties broken by cache (enumeration) order (spec §4.9 "Decision
    /// selection").
    pub fn next_decision(&self, pdb: &PlanDatabase, preference: PriorityPreference) -> Option<DecisionId> {
        for kind in DecisionKind::ENUMERATION_ORDER {
            let cache = &self.by_kind[&kind];
            if cache.is_empty() {
                continue;
            }
            // Stable sort: ties keep the cache's (enumeration) order.
            let mut ranked: Vec<(DecisionId, String)> = cache
                .iter()
                .map(|&id| {
                    let point = self.points.lookup(id).expect("cache entries are live");
                    (id, self.identity(pdb, &point.subject))
                })
                .collect();
            ranked.sort_by(|(_, a), (_, b)| self.heuristics.compare(a, b, preference));
            return ranked.into_iter().next().map(|(id, _)| id);
        }
        None
    }

    /// Enumerate every committable choice for `id`, ordered per the
    /// heuristic's [`OrderingTag`] where one applies (spec §4.9 "Choice
    /// enumeration").
    pub fn choices(&self, pdb: &PlanDatabase, id: DecisionId) -> Vec<Choice> {
        let Some(point) = self.points.lookup(id) else {
            return Vec::new();
        };
        let identity = self.identity(pdb, &point.subject);
        let ordering = self.heuristics.lookup(&identity).ordering;

        match &point.subject {
            DecisionSubject::Variable(var) => variable_choices(pdb, *var, &ordering),
            DecisionSubject::Token(t) => token_choices(pdb, *t),
            DecisionSubject::Object { token, candidates } => {
                candidates.iter().map(|&timeline| Choice::Place { timeline, token: *token }).collect()
            }
            DecisionSubject::ResourceFlaw { resource, a, b } => {
                let mut choices = vec![
                    Choice::Order { resource: *resource, before: *a, after: *b },
                    Choice::Order { resource: *resource, before: *b, after: *a },
                ];
                if pdb.engine.config().push_horizon {
                    choices.push(Choice::PushBeyondHorizon { resource: *resource, token: *a });
                    choices.push(Choice::PushBeyondHorizon { resource: *resource, token: *b });
                }
                choices
            }
        }
    }

    /// Apply `choice` and return what would undo it (spec §4.11 "Commit
    /// semantics").
    pub fn commit(&mut self, pdb: &mut PlanDatabase, choice: &Choice) -> EngineResult<Undo> {
        match choice {
            Choice::Variable { var, restriction } => {
                pdb.engine.specify(*var, restriction)?;
                Ok(Undo::ResetVariable(*var))
            }
            Choice::Activate { token } => {
                pdb.activate(*token)?;
                Ok(Undo::CancelToken(*token))
            }
            Choice::Merge { token, onto } => {
                pdb.merge(*token, *onto)?;
                Ok(Undo::CancelToken(*token))
            }
            Choice::Reject { token } => {
                pdb.reject(*token)?;
                Ok(Undo::CancelToken(*token))
            }
            Choice::Place { timeline, token } => {
                let precedence = pdb.place_at_end(*timeline, *token)?;
                Ok(Undo::Unplace {
                    timeline: *timeline,
                    token: *token,
                    precedence,
                })
            }
            Choice::Order { resource, before, after } => {
                let cid = pdb.order_transactions(*resource, *before, *after)?;
                Ok(Undo::DiscardPrecedence(cid))
            }
            Choice::PushBeyondHorizon { token, .. } => {
                pdb.push_beyond_horizon(*token)?;
                Ok(Undo::ResetVariable(pdb.token(*token)?.start))
            }
        }
    }

    /// Undo a previously committed choice (spec §4.11 "Undo").
    pub fn retract(&mut self, pdb: &mut PlanDatabase, undo: Undo) -> EngineResult<()> {
        match undo {
            Undo::ResetVariable(var) => pdb.engine.reset_variable(var),
            Undo::CancelToken(token) => pdb.cancel(token),
            Undo::Unplace { timeline, token, precedence } => pdb.unplace(timeline, token, precedence),
            Undo::DiscardPrecedence(cid) => {
                pdb.undo_precedence(cid);
                Ok(())
            }
        }
    }
}

/// Choices for a variable decision: one per value for a small/enumerated
/// domain, or a binary bisection of the interval for a large/continuous
/// one (spec §4.9: "variable choices are the domain's ordered values").
fn variable_choices(pdb: &PlanDatabase, var: VarId, ordering: &OrderingTag) -> Vec<Choice> {
    let Some(cv) = pdb.engine.vars().lookup(var) else {
        return Vec::new();
    };
    let domain = cv.derived();
    let max_choices = pdb.engine.config().max_choices;

    let mut ranked: Vec<RankedCandidate<Domain>> = match domain {
        Domain::Enumerated(e) => enumerate_members(domain)
            .into_iter()
            .map(|v| RankedCandidate {
                key: Domain::Enumerated(crate::domain::EnumDomain {
                    kind: e.kind,
                    values: vec![v.clone()],
                    closed: true,
                }),
                value: v.as_numeric().unwrap_or(0.0),
                width: 1.0,
            })
            .collect(),
        Domain::Interval(_) => {
            let (lb, ub) = domain.bounds().unwrap_or((0.0, 0.0));
            let width = ub - lb;
            if domain.is_int_valued() && width <= max_choices.unwrap_or(64) as f64 {
                let lb_i = lb.round() as i64;
                let ub_i = ub.round() as i64;
                (lb_i..=ub_i)
                    .map(|v| RankedCandidate {
                        key: Domain::singleton_int(v),
                        value: v as f64,
                        width: 1.0,
                    })
                    .collect()
            } else if domain.is_singleton() {
                vec![RankedCandidate {
                    key: domain.clone(),
                    value: lb,
                    width: 0.0,
                }]
            } else {
                let mid = lb + width / 2.0;
                let lower = if domain.is_int_valued() {
                    Domain::int_interval(lb as i64, mid.floor() as i64)
                } else {
                    Domain::float_interval(lb, mid)
                };
                let upper = if domain.is_int_valued() {
                    Domain::int_interval(mid.ceil() as i64, ub as i64)
                } else {
                    Domain::float_interval(mid, ub)
                };
                vec![
                    RankedCandidate { key: lower, value: lb, width: width / 2.0 },
                    RankedCandidate { key: upper, value: ub, width: width / 2.0 },
                ]
            }
        }
    };

    ordering.order(&mut ranked);
    if let Some(max) = max_choices {
        ranked.truncate(max);
    }
    ranked
        .into_iter()
        .map(|c| Choice::Variable { var, restriction: c.key })
        .collect()
}

/// Recover an enumerated domain's member list (no direct accessor exists
/// on [`Domain`] since callers are only ever expected to query
/// membership, not enumerate it — this is the one place that genuinely
/// needs to).
fn enumerate_members(domain: &Domain) -> Vec<crate::domain::Value> {
    match domain {
        Domain::Enumerated(e) => e.values.clone(),
        Domain::Interval(_) => Vec::new(),
    }
}

fn token_choices(pdb: &PlanDatabase, t: TokenId) -> Vec<Choice> {
    let Some(tok) = pdb.tokens().lookup(t) else {
        return Vec::new();
    };
    let mut choices = Vec::new();
    for state in tok.state.candidates() {
        match state {
            TokenState::Active => choices.push(Choice::Activate { token: t }),
            TokenState::Rejected => choices.push(Choice::Reject { token: t }),
            TokenState::Merged => {
                for onto in pdb.merge_candidates(t) {
                    choices.push(Choice::Merge { token: t, onto });
                }
            }
            TokenState::Inactive => {}
        }
    }
    choices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::Engine;
    use crate::types::DataType;

    fn pdb() -> PlanDatabase {
        PlanDatabase::new(Engine::new(Config::default()), (0.0, 100.0))
    }

    #[test]
    fn unit_variable_decision_offers_exactly_remaining_values() {
        let mut pdb = pdb();
        let v = pdb.engine.create_variable(DataType::Int, Domain::int_interval(0, 1), "x", false, true, None, None);
        pdb.engine.specify(v, &Domain::int_interval(0, 1)).unwrap();

        let mut dm = DecisionManager::new();
        dm.refresh(&mut pdb);
        assert!(!dm.cache(DecisionKind::NonUnitVariable).is_empty() || !dm.cache(DecisionKind::UnitVariable).is_empty());

        let id = dm.next_decision(&pdb, PriorityPreference::High).unwrap();
        let choices = dm.choices(&pdb, id);
        assert_eq!(choices.len(), 2);
    }

    #[test]
    fn token_decision_offers_activate_and_reject() {
        let mut pdb = pdb();
        let t = pdb.create_token("P", true).unwrap();
        let mut dm = DecisionManager::new();
        dm.refresh(&mut pdb);
        let id = dm.next_decision(&pdb, PriorityPreference::High).unwrap();
        let choices = dm.choices(&pdb, id);
        assert!(choices.iter().any(|c| matches!(c, Choice::Activate { token } if *token == t)));
        assert!(choices.iter().any(|c| matches!(c, Choice::Reject { token } if *token == t)));
    }

    #[test]
    fn commit_then_retract_round_trips_token_activation() {
        let mut pdb = pdb();
        let t = pdb.create_token("P", false).unwrap();
        let mut dm = DecisionManager::new();
        let undo = dm.commit(&mut pdb, &Choice::Activate { token: t }).unwrap();
        assert_eq!(pdb.token(t).unwrap().state.committed(), Some(TokenState::Active));
        dm.retract(&mut pdb, undo).unwrap();
        assert_eq!(pdb.token(t).unwrap().state.committed(), None);
    }

    #[test]
    fn resource_flaw_offers_both_orderings_and_horizon_pushes() {
        let mut pdb = pdb();
        let res = pdb.create_resource("Unary", "R", vec![], 0.0, 1.0).unwrap();
        let a = pdb.create_token("consume", false).unwrap();
        let b = pdb.create_token("consume", false).unwrap();
        pdb.add_transaction(res, a, -1.0).unwrap();
        pdb.add_transaction(res, b, -1.0).unwrap();

        let mut dm = DecisionManager::new();
        dm.refresh(&mut pdb);
        assert!(!dm.cache(DecisionKind::ResourceFlaw).is_empty());
        let id = *dm.cache(DecisionKind::ResourceFlaw).iter().next().unwrap();
        let choices = dm.choices(&pdb, id);
        assert_eq!(choices.len(), 4);
    }
}
