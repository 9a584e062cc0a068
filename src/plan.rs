//! The plan database: objects, tokens, timelines, and resources built on
//! top of the constraint engine (spec §3 `Object`/`Token`, §4.8).
//!
//! Resource-profile computation is explicitly out of scope (spec §1): this
//! module exposes just enough of a resource's transaction set and capacity
//! to let the decision manager (`crate::decision`) detect a flaw and offer
//! ordering choices, not a full level-profile algorithm.

use crate::constraint::{ConstraintId, ConstraintKind};
use crate::domain::Domain;
use crate::engine::Engine;
use crate::entity::{Key, Registry};
use crate::errors::{EngineError, EngineResult};
use crate::state_machine::{TokenState, TokenStateDomain};
use crate::transaction_log::{TransactionKind, TransactionSink};
use crate::types::DataType;
use crate::variable::{Parent, VarId};
use std::collections::HashSet;

/// Marker type for [`Key<Object>`].
pub struct ObjectMarker;
/// Stable handle to an [`Object`].
pub type ObjectId = Key<ObjectMarker>;

/// Marker type for [`Key<Token>`].
pub struct TokenMarker;
/// Stable handle to a [`Token`].
pub type TokenId = Key<TokenMarker>;

/// What kind of ordering/capacity discipline an [`Object`] enforces
/// (spec §3 "Timelines"/"Resources").
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// A plain object: tokens may be active concurrently, no ordering
    /// enforced by the object itself.
    Plain,
    /// A timeline: at most one active token at any instant, enforced by
    /// `constrain` posting `end(pred) <= start(succ)` between
    /// consecutively placed active tokens.
    Timeline { active_sequence: Vec<TokenId> },
    /// A resource: a capacity interval plus a set of production/
    /// consumption transactions (spec §3 "Resources").
    Resource {
        capacity_lb: f64,
        capacity_ub: f64,
        transactions: Vec<Transaction>,
        /// Transaction pairs with a committed precedence between them
        /// (both `(a, b)` and `(b, a)` are inserted once resolved, so a
        /// membership check doesn't need to know which side is which).
        ordered: HashSet<(TokenId, TokenId)>,
    },
}

/// A single production (positive) or consumption (negative) event on a
/// resource, attributed to the token whose window it shares (spec
/// glossary "Transaction").
#[derive(Debug, Clone, Copy)]
pub struct Transaction {
    pub token: TokenId,
    pub quantity: f64,
}

/// An object: a named typed entity with member variables and a token
/// list (spec §3 `Object`).
pub struct Object {
    pub type_name: String,
    pub name: String,
    pub member_vars: Vec<VarId>,
    pub tokens: Vec<TokenId>,
    pub kind: ObjectKind,
}

impl Object {
    pub fn is_timeline(&self) -> bool {
        matches!(self.kind, ObjectKind::Timeline { .. })
    }

    pub fn is_resource(&self) -> bool {
        matches!(self.kind, ObjectKind::Resource { .. })
    }
}

/// A time-bounded, typed proposition (spec §3 `Token`).
pub struct Token {
    pub predicate: String,
    pub start: VarId,
    pub end: VarId,
    pub duration: VarId,
    pub parameters: Vec<VarId>,
    pub rejectable: bool,
    pub state: TokenStateDomain,
    pub duration_constraint: ConstraintId,
    pub master: Option<TokenId>,
    pub slaves: Vec<TokenId>,
    /// Set once `merge` commits; the active token this token's variables
    /// were equated to.
    pub merged_onto: Option<TokenId>,
    /// The `eq` constraints posted by `merge`, remembered so `cancel` can
    /// discard exactly them (spec §4.8 "Merging").
    pub merge_constraints: Vec<ConstraintId>,
    /// The object this token is placed on once activated, if a timeline
    /// placement has been committed (spec §4.9 `DecisionPoint::Object`).
    pub placed_on: Option<ObjectId>,
}

impl Token {
    /// True once a committed state exists (spec §4.9 "unit token
    /// decision" needs this to have *already* resolved; a non-unit one
    /// has more than one candidate and no commitment).
    pub fn is_placed(&self) -> bool {
        self.placed_on.is_some()
    }
}

/// Plan database: the object/token layer built on top of an [`Engine`]
/// (spec §4.8, §6 `PlanDatabase`).
pub struct PlanDatabase {
    pub engine: Engine,
    objects: Registry<ObjectMarker, Object>,
    tokens: Registry<TokenMarker, Token>,
    horizon: (f64, f64),
    closed: bool,
}

impl PlanDatabase {
    pub fn new(engine: Engine, horizon: (f64, f64)) -> Self {
        Self {
            engine,
            objects: Registry::new(),
            tokens: Registry::new(),
            horizon,
            closed: false,
        }
    }

    pub fn horizon(&self) -> (f64, f64) {
        self.horizon
    }

    /// Install a transaction-log sink on the underlying engine; object/
    /// token/precedence-level events (not just variable/constraint ones)
    /// are appended to the same sink (spec §6, SPEC_FULL.md §6).
    pub fn set_sink(&mut self, sink: Box<dyn TransactionSink>) {
        self.engine.set_sink(sink);
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// No further objects/tokens may be created once closed (spec §6
    /// `close()`/`isClosed()`): a simple "model is fully loaded" gate the
    /// external parser (out of scope) is expected to call once.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn objects(&self) -> &Registry<ObjectMarker, Object> {
        &self.objects
    }

    pub fn tokens(&self) -> &Registry<TokenMarker, Token> {
        &self.tokens
    }

    pub fn object(&self, id: ObjectId) -> EngineResult<&Object> {
        self.objects.lookup(id).ok_or_else(|| stale("Object", id))
    }

    pub fn token(&self, id: TokenId) -> EngineResult<&Token> {
        self.tokens.lookup(id).ok_or_else(|| stale("Token", id))
    }

    /// `createObject(type, name, args) -> Object` (spec §6). `args` is
    /// the member-variable declaration list: `(type, base domain, name)`
    /// triples, following the modelling parser's (out-of-scope) object
    /// template expansion.
    pub fn create_object(
        &mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        args: Vec<(DataType, Domain, String)>,
    ) -> EngineResult<ObjectId> {
        self.create_object_kind(type_name, name, args, ObjectKind::Plain)
    }

    pub fn create_timeline(
        &mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        args: Vec<(DataType, Domain, String)>,
    ) -> EngineResult<ObjectId> {
        self.create_object_kind(
            type_name,
            name,
            args,
            ObjectKind::Timeline {
                active_sequence: Vec::new(),
            },
        )
    }

    pub fn create_resource(
        &mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        args: Vec<(DataType, Domain, String)>,
        capacity_lb: f64,
        capacity_ub: f64,
    ) -> EngineResult<ObjectId> {
        self.create_object_kind(
            type_name,
            name,
            args,
            ObjectKind::Resource {
                capacity_lb,
                capacity_ub,
                transactions: Vec::new(),
                ordered: HashSet::new(),
            },
        )
    }

    fn create_object_kind(
        &mut self,
        type_name: impl Into<String>,
        name: impl Into<String>,
        args: Vec<(DataType, Domain, String)>,
        kind: ObjectKind,
    ) -> EngineResult<ObjectId> {
        if self.closed {
            return Err(EngineError::construction("plan database is closed"));
        }
        let type_name = type_name.into();
        let name = name.into();
        let id = self.objects.insert(Object {
            type_name: type_name.clone(),
            name: name.clone(),
            member_vars: Vec::new(),
            tokens: Vec::new(),
            kind,
        });
        let member_vars: Vec<VarId> = args
            .into_iter()
            .enumerate()
            .map(|(i, (dt, dom, var_name))| {
                self.engine
                    .create_variable(dt, dom, var_name, false, true, Some(Parent::Object(id.index())), Some(i))
            })
            .collect();
        self.objects.lookup_mut(id).expect("just inserted").member_vars = member_vars;
        self.engine.log(
            TransactionKind::ObjectCreated,
            id.to_string(),
            serde_json::json!({ "type": type_name, "name": name }),
        );
        Ok(id)
    }

    /// `createToken(predicate, rejectable) -> Token` (spec §6). `start`/
    /// `end`/`duration` are created over the plan's horizon and linked by
    /// `start + duration = end` (spec §3 `Token`).
    pub fn create_token(&mut self, predicate: impl Into<String>, rejectable: bool) -> EngineResult<TokenId> {
        if self.closed {
            return Err(EngineError::construction("plan database is closed"));
        }
        let predicate = predicate.into();
        let (h_lb, h_ub) = self.horizon;
        let start = self
            .engine
            .create_variable(DataType::Float, Domain::float_interval(h_lb, h_ub), "start", false, true, None, None);
        let end = self
            .engine
            .create_variable(DataType::Float, Domain::float_interval(h_lb, h_ub), "end", false, true, None, None);
        let duration = self.engine.create_variable(
            DataType::Float,
            Domain::float_interval(0.0, h_ub - h_lb),
            "duration",
            false,
            true,
            None,
            None,
        );
        let duration_constraint = self
            .engine
            .create_constraint(ConstraintKind::AddEq, vec![start, duration, end])?;

        let id = self.tokens.insert(Token {
            predicate,
            start,
            end,
            duration,
            parameters: Vec::new(),
            rejectable,
            state: TokenStateDomain::new(rejectable, false),
            duration_constraint,
            master: None,
            slaves: Vec::new(),
            merged_onto: None,
            merge_constraints: Vec::new(),
            placed_on: None,
        });
        for (v, p) in [
            (start, 0usize),
            (end, 1),
            (duration, 2),
        ] {
            if let Some(cv) = self.engine.vars_mut().lookup_mut(v) {
                cv.parent = Some(Parent::Token(id.index()));
                cv.index = Some(p);
            }
        }
        self.engine.log(
            TransactionKind::TokenCreated,
            id.to_string(),
            serde_json::json!({ "predicate": self.tokens.lookup(id).expect("just inserted").predicate, "rejectable": rejectable }),
        );
        Ok(id)
    }

    /// Add a typed parameter variable to a token (spec §3: "Tokens may
    /// have typed parameters").
    pub fn add_parameter(&mut self, token: TokenId, data_type: DataType, base: Domain, name: impl Into<String>) -> EngineResult<VarId> {
        let index = self.tokens.lookup(token).ok_or_else(|| stale("Token", token))?.parameters.len();
        let var = self.engine.create_variable(
            data_type,
            base,
            name,
            false,
            true,
            Some(Parent::Token(token.index())),
            Some(3 + index),
        );
        self.tokens.lookup_mut(token).expect("checked above").parameters.push(var);
        Ok(var)
    }

    /// Record `rule-firing` parentage between a master and a newly
    /// created slave token (spec §3 "Master/slave"; the rule bodies
    /// themselves are out of scope, spec §1).
    pub fn set_master(&mut self, slave: TokenId, master: TokenId) -> EngineResult<()> {
        self.tokens.lookup_mut(slave).ok_or_else(|| stale("Token", slave))?.master = Some(master);
        self.tokens.lookup_mut(master).ok_or_else(|| stale("Token", master))?.slaves.push(slave);
        Ok(())
    }

    /// `A` is compatible with `T` iff predicate equal and
    /// start/end/duration/parameter domains pairwise intersect (spec §4.8
    /// "Compatibility test"). `A` must itself not be merged.
    pub fn compatible(&self, t: TokenId, a: TokenId) -> bool {
        let (Some(tk), Some(ak)) = (self.tokens.lookup(t), self.tokens.lookup(a)) else {
            return false;
        };
        if ak.merged_onto.is_some() {
            return false;
        }
        if tk.predicate != ak.predicate {
            return false;
        }
        if tk.parameters.len() != ak.parameters.len() {
            return false;
        }
        let vars = self.engine.vars();
        let intersects = |x: VarId, y: VarId| -> bool {
            match (vars.lookup(x), vars.lookup(y)) {
                (Some(vx), Some(vy)) => vx.derived().intersects(vy.derived()),
                _ => false,
            }
        };
        intersects(tk.start, ak.start)
            && intersects(tk.end, ak.end)
            && intersects(tk.duration, ak.duration)
            && tk.parameters.iter().zip(&ak.parameters).all(|(&p, &q)| intersects(p, q))
    }

    /// Every currently active token compatible with `t`, the candidate
    /// set for a MERGE choice (spec §4.8, §4.9).
    pub fn merge_candidates(&self, t: TokenId) -> Vec<TokenId> {
        self.tokens
            .iter()
            .filter(|&(id, tok)| id != t && tok.state.committed() == Some(TokenState::Active) && self.compatible(t, id))
            .map(|(id, _)| id)
            .collect()
    }

    /// Recompute the `MERGED` candidate flag on `t`'s state domain from
    /// the current set of active tokens (called by the decision manager
    /// whenever a token's state or an engine propagation changes the set
    /// of candidates).
    pub fn refresh_mergeable(&mut self, t: TokenId) {
        let mergeable = !self.merge_candidates(t).is_empty();
        if let Some(tok) = self.tokens.lookup_mut(t) {
            tok.state.set_mergeable(mergeable);
        }
    }

    /// `activate(Token)`: commit the token's state to `ACTIVE`.
    pub fn activate(&mut self, t: TokenId) -> EngineResult<()> {
        let tok = self.tokens.lookup_mut(t).ok_or_else(|| stale("Token", t))?;
        if tok.state.committed().is_some() {
            return Err(EngineError::InvalidTokenOperation {
                reason: "token already has a committed state".into(),
            });
        }
        tok.state.commit(TokenState::Active);
        self.engine.log(
            TransactionKind::TokenStateTransition,
            t.to_string(),
            serde_json::json!({ "to": "Active" }),
        );
        Ok(())
    }

    /// `reject(Token)`: commit the token's state to `REJECTED`. Only
    /// valid for rejectable tokens (spec §3 `Token`).
    pub fn reject(&mut self, t: TokenId) -> EngineResult<()> {
        let tok = self.tokens.lookup_mut(t).ok_or_else(|| stale("Token", t))?;
        if !tok.rejectable {
            return Err(EngineError::InvalidTokenOperation {
                reason: "token is not rejectable".into(),
            });
        }
        if tok.state.committed().is_some() {
            return Err(EngineError::InvalidTokenOperation {
                reason: "token already has a committed state".into(),
            });
        }
        tok.state.commit(TokenState::Rejected);
        self.engine.log(
            TransactionKind::TokenStateTransition,
            t.to_string(),
            serde_json::json!({ "to": "Rejected" }),
        );
        Ok(())
    }

    /// `merge(Token, Token)`: merge `t` onto active token `onto` (spec
    /// §4.8 "Merging"). `onto` must itself be `ACTIVE` and not merged.
    pub fn merge(&mut self, t: TokenId, onto: TokenId) -> EngineResult<()> {
        if !self.compatible(t, onto) {
            return Err(EngineError::InvalidTokenOperation {
                reason: "merge target is not compatible".into(),
            });
        }
        let onto_state = self.tokens.lookup(onto).ok_or_else(|| stale("Token", onto))?.state.committed();
        if onto_state != Some(TokenState::Active) {
            return Err(EngineError::InvalidTokenOperation {
                reason: "merge target is not an active token".into(),
            });
        }

        let pairs: Vec<(VarId, VarId)> = {
            let t_tok = self.tokens.lookup(t).ok_or_else(|| stale("Token", t))?;
            let onto_tok = self.tokens.lookup(onto).expect("checked above");
            let mut pairs = vec![
                (t_tok.start, onto_tok.start),
                (t_tok.end, onto_tok.end),
                (t_tok.duration, onto_tok.duration),
            ];
            pairs.extend(t_tok.parameters.iter().zip(&onto_tok.parameters).map(|(&a, &b)| (a, b)));
            pairs
        };

        let mut constraints = Vec::with_capacity(pairs.len());
        for (a, b) in pairs {
            constraints.push(self.engine.create_constraint(ConstraintKind::Eq, vec![a, b])?);
        }

        let tok = self.tokens.lookup_mut(t).expect("checked above");
        tok.state.commit(TokenState::Merged);
        tok.merged_onto = Some(onto);
        tok.merge_constraints = constraints;
        self.engine.log(
            TransactionKind::TokenStateTransition,
            t.to_string(),
            serde_json::json!({ "to": "Merged", "onto": onto.to_string() }),
        );
        Ok(())
    }

    /// `cancel(Token)`: inverse of whichever transition was committed
    /// (spec §3 "Transitions"). Discards any posted merge constraints and
    /// restores the state domain to its pre-commit candidate set (spec
    /// §4.11 "Undo").
    pub fn cancel(&mut self, t: TokenId) -> EngineResult<()> {
        let tok = self.tokens.lookup_mut(t).ok_or_else(|| stale("Token", t))?;
        let was_merged = tok.merged_onto.take();
        let constraints = std::mem::take(&mut tok.merge_constraints);
        tok.state.retract();
        tok.placed_on = None;
        let _ = was_merged;
        for c in constraints {
            self.engine.discard_constraint(c);
        }
        self.engine.log(
            TransactionKind::TokenStateTransition,
            t.to_string(),
            serde_json::json!({ "to": "Inactive" }),
        );
        Ok(())
    }

    /// `constrain(Timeline, pred, succ)`: post `end(pred) <= start(succ)`
    /// and place `succ` immediately after `pred` in the timeline's active
    /// sequence (spec §4.8).
    pub fn constrain(&mut self, timeline: ObjectId, pred: TokenId, succ: TokenId) -> EngineResult<ConstraintId> {
        let (pred_end, succ_start) = {
            let pred_tok = self.tokens.lookup(pred).ok_or_else(|| stale("Token", pred))?;
            let succ_tok = self.tokens.lookup(succ).ok_or_else(|| stale("Token", succ))?;
            (pred_tok.end, succ_tok.start)
        };
        let cid = self.engine.create_constraint(ConstraintKind::Precedes, vec![pred_end, succ_start])?;

        let obj = self.objects.lookup_mut(timeline).ok_or_else(|| stale("Object", timeline))?;
        let ObjectKind::Timeline { active_sequence } = &mut obj.kind else {
            return Err(EngineError::construction("constrain requires a timeline object"));
        };
        let insert_at = active_sequence.iter().position(|&t| t == pred).map(|i| i + 1).unwrap_or(active_sequence.len());
        active_sequence.insert(insert_at, succ);

        self.tokens.lookup_mut(succ).expect("checked above").placed_on = Some(timeline);
        self.engine.log(
            TransactionKind::PrecedenceAdded,
            cid.to_string(),
            serde_json::json!({ "pred": pred.to_string(), "succ": succ.to_string() }),
        );
        Ok(cid)
    }

    /// Place `token` at the end of `timeline`'s active sequence (spec
    /// §4.9 `DecisionPoint::Object`, simplified to append-only placement
    /// rather than a full insertion-slot search across every gap). Posts
    /// a precedence constraint against the current last token, if any.
    pub fn place_at_end(&mut self, timeline: ObjectId, token: TokenId) -> EngineResult<Option<ConstraintId>> {
        let last = {
            let obj = self.objects.lookup(timeline).ok_or_else(|| stale("Object", timeline))?;
            let ObjectKind::Timeline { active_sequence } = &obj.kind else {
                return Err(EngineError::construction("place_at_end requires a timeline object"));
            };
            active_sequence.last().copied()
        };
        match last {
            Some(pred) => Ok(Some(self.constrain(timeline, pred, token)?)),
            None => {
                let obj = self.objects.lookup_mut(timeline).ok_or_else(|| stale("Object", timeline))?;
                let ObjectKind::Timeline { active_sequence } = &mut obj.kind else {
                    return Err(EngineError::construction("place_at_end requires a timeline object"));
                };
                active_sequence.push(token);
                self.tokens.lookup_mut(token).ok_or_else(|| stale("Token", token))?.placed_on = Some(timeline);
                Ok(None)
            }
        }
    }

    /// Undo [`PlanDatabase::place_at_end`]: discard the precedence it
    /// posted (if any) and remove `token` from the timeline again.
    pub fn unplace(&mut self, timeline: ObjectId, token: TokenId, precedence: Option<ConstraintId>) -> EngineResult<()> {
        if let Some(cid) = precedence {
            self.engine.discard_constraint(cid);
        }
        self.free(timeline, token)
    }

    /// `free(Object, Token)`: remove `token` from the object's token list
    /// (and timeline sequence, if any) without destroying it (spec §6).
    pub fn free(&mut self, object: ObjectId, token: TokenId) -> EngineResult<()> {
        let obj = self.objects.lookup_mut(object).ok_or_else(|| stale("Object", object))?;
        obj.tokens.retain(|&t| t != token);
        if let ObjectKind::Timeline { active_sequence } = &mut obj.kind {
            active_sequence.retain(|&t| t != token);
        }
        if let Some(tok) = self.tokens.lookup_mut(token) {
            if tok.placed_on == Some(object) {
                tok.placed_on = None;
            }
        }
        Ok(())
    }

    /// Attach `token` to `object`'s token list (placement bookkeeping
    /// used by `createToken`-adjacent client code before `constrain`).
    pub fn attach(&mut self, object: ObjectId, token: TokenId) -> EngineResult<()> {
        self.objects.lookup_mut(object).ok_or_else(|| stale("Object", object))?.tokens.push(token);
        Ok(())
    }

    /// Register `token` as a transaction of `resource` with signed
    /// `quantity` (production positive, consumption negative).
    pub fn add_transaction(&mut self, resource: ObjectId, token: TokenId, quantity: f64) -> EngineResult<()> {
        let obj = self.objects.lookup_mut(resource).ok_or_else(|| stale("Object", resource))?;
        let ObjectKind::Resource { transactions, .. } = &mut obj.kind else {
            return Err(EngineError::construction("add_transaction requires a resource object"));
        };
        transactions.push(Transaction { token, quantity });
        Ok(())
    }

    /// Unordered transaction pairs on `resource` whose feasible windows
    /// can still overlap and whose combined quantity could violate
    /// capacity, and which have no committed ordering yet (spec §3
    /// `DecisionPoint::ResourceFlaw`, §4.9, §8 S6).
    pub fn resource_flaws(&self, resource: ObjectId) -> Vec<(TokenId, TokenId)> {
        let Some(obj) = self.objects.lookup(resource) else {
            return Vec::new();
        };
        let ObjectKind::Resource {
            capacity_lb,
            capacity_ub,
            transactions,
            ordered,
        } = &obj.kind
        else {
            return Vec::new();
        };

        let vars = self.engine.vars();
        let window = |t: TokenId| -> Option<(f64, f64, f64, f64)> {
            let tok = self.tokens.lookup(t)?;
            let (sl, su) = vars.lookup(tok.start)?.derived().bounds()?;
            let (el, eu) = vars.lookup(tok.end)?.derived().bounds()?;
            Some((sl, su, el, eu))
        };

        let mut flaws = Vec::new();
        for i in 0..transactions.len() {
            for j in (i + 1)..transactions.len() {
                let a = transactions[i];
                let b = transactions[j];
                if ordered.contains(&(a.token, b.token)) || ordered.contains(&(b.token, a.token)) {
                    continue;
                }
                let (Some((a_sl, _, _, a_eu)), Some((b_sl, _, _, b_eu))) = (window(a.token), window(b.token)) else {
                    continue;
                };
                let windows_can_overlap = a_sl < b_eu && b_sl < a_eu;
                if !windows_can_overlap {
                    continue;
                }
                let combined = a.quantity + b.quantity;
                if combined < *capacity_lb || combined > *capacity_ub {
                    flaws.push((a.token, b.token));
                }
            }
        }
        flaws
    }

    /// Commit a resource-flaw ordering choice: `before` precedes `after`
    /// (spec §4.9, §4.11 "Commit semantics").
    pub fn order_transactions(&mut self, resource: ObjectId, before: TokenId, after: TokenId) -> EngineResult<ConstraintId> {
        let (before_end, after_start) = {
            let before_tok = self.tokens.lookup(before).ok_or_else(|| stale("Token", before))?;
            let after_tok = self.tokens.lookup(after).ok_or_else(|| stale("Token", after))?;
            (before_tok.end, after_tok.start)
        };
        let cid = self.engine.create_constraint(ConstraintKind::Precedes, vec![before_end, after_start])?;

        let obj = self.objects.lookup_mut(resource).ok_or_else(|| stale("Object", resource))?;
        let ObjectKind::Resource { ordered, .. } = &mut obj.kind else {
            return Err(EngineError::construction("order_transactions requires a resource object"));
        };
        ordered.insert((before, after));
        ordered.insert((after, before));
        self.engine.log(
            TransactionKind::PrecedenceAdded,
            cid.to_string(),
            serde_json::json!({ "before": before.to_string(), "after": after.to_string() }),
        );
        Ok(cid)
    }

    /// The "push beyond horizon" resource-flaw choice (spec §9 Open
    /// Question 2, resolved per SPEC_FULL.md §4): posts
    /// `start(consumer) >= horizon.end`, gated by `Config.push_horizon`.
    pub fn push_beyond_horizon(&mut self, consumer: TokenId) -> EngineResult<()> {
        if !self.engine.config().push_horizon {
            return Err(EngineError::InvalidTokenOperation {
                reason: "push-beyond-horizon choice is disabled by configuration".into(),
            });
        }
        let start = self.tokens.lookup(consumer).ok_or_else(|| stale("Token", consumer))?.start;
        let (_, h_ub) = self.horizon;
        self.engine.specify(start, &Domain::float_interval(h_ub, h_ub))
    }

    /// Undo a committed timeline ordering or resource-ordering
    /// constraint (spec §4.11 "Undo"): discard it from the engine.
    pub fn undo_precedence(&mut self, constraint: ConstraintId) {
        self.engine.discard_constraint(constraint);
        self.engine.log(TransactionKind::PrecedenceDestroyed, constraint.to_string(), serde_json::Value::Null);
    }
}

fn stale<T>(entity_type: &str, key: Key<T>) -> EngineError {
    EngineError::StaleReference {
        entity_type: entity_type.into(),
        key: key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn pdb() -> PlanDatabase {
        PlanDatabase::new(Engine::new(Config::default()), (0.0, 100.0))
    }

    /// S4 — token merging (spec §8).
    #[test]
    fn s4_token_merging() {
        let mut pdb = pdb();
        let line = pdb.create_timeline("Line", "L", vec![]).unwrap();

        let a = pdb.create_token("P", false).unwrap();
        pdb.attach(line, a).unwrap();
        pdb.engine.specify(pdb.token(a).unwrap().start, &Domain::float_interval(0.0, 0.0)).unwrap();
        pdb.engine.specify(pdb.token(a).unwrap().end, &Domain::float_interval(10.0, 10.0)).unwrap();
        assert_eq!(pdb.engine.propagate(), crate::engine::PropagationOutcome::Consistent);
        pdb.activate(a).unwrap();

        let t = pdb.create_token("P", true).unwrap();
        pdb.refresh_mergeable(t);
        assert!(pdb.token(t).unwrap().state.candidates().contains(&TokenState::Merged));

        pdb.merge(t, a).unwrap();
        assert_eq!(pdb.token(t).unwrap().state.committed(), Some(TokenState::Merged));
        assert_eq!(pdb.engine.propagate(), crate::engine::PropagationOutcome::Consistent);

        assert_eq!(
            pdb.engine.vars().lookup(pdb.token(t).unwrap().start).unwrap().derived().bounds(),
            Some((0.0, 0.0))
        );
    }

    /// S6 — resource flaw (spec §8).
    #[test]
    fn s6_resource_flaw() {
        let mut pdb = pdb();
        let res = pdb.create_resource("Unary", "R", vec![], 0.0, 1.0).unwrap();

        let tx_a = pdb.create_token("consume", false).unwrap();
        let tx_b = pdb.create_token("consume", false).unwrap();
        pdb.engine.specify(pdb.token(tx_a).unwrap().start, &Domain::float_interval(0.0, 5.0)).unwrap();
        pdb.engine.specify(pdb.token(tx_a).unwrap().end, &Domain::float_interval(5.0, 10.0)).unwrap();
        pdb.engine.specify(pdb.token(tx_b).unwrap().start, &Domain::float_interval(2.0, 8.0)).unwrap();
        pdb.engine.specify(pdb.token(tx_b).unwrap().end, &Domain::float_interval(8.0, 12.0)).unwrap();
        pdb.engine.propagate();

        pdb.add_transaction(res, tx_a, -1.0).unwrap();
        pdb.add_transaction(res, tx_b, -1.0).unwrap();

        let flaws = pdb.resource_flaws(res);
        assert_eq!(flaws.len(), 1);

        pdb.order_transactions(res, tx_a, tx_b).unwrap();
        assert!(pdb.resource_flaws(res).is_empty());
    }

    #[test]
    fn cancel_restores_state_and_discards_merge_constraints() {
        let mut pdb = pdb();
        let a = pdb.create_token("P", false).unwrap();
        pdb.activate(a).unwrap();
        let t = pdb.create_token("P", true).unwrap();
        pdb.merge(t, a).unwrap();
        assert!(pdb.token(t).unwrap().merged_onto.is_some());

        pdb.cancel(t).unwrap();
        assert_eq!(pdb.token(t).unwrap().state.committed(), None);
        assert!(pdb.token(t).unwrap().merged_onto.is_none());
        assert!(pdb.token(t).unwrap().merge_constraints.is_empty());
    }

    #[test]
    fn reject_rejects_only_rejectable_tokens() {
        let mut pdb = pdb();
        let t = pdb.create_token("P", false).unwrap();
        assert!(pdb.reject(t).is_err());
    }

    #[test]
    fn installed_sink_observes_object_token_and_transition_records() {
        use crate::transaction_log::{TransactionKind, TransactionRecord, TransactionSink};
        use std::cell::RefCell;
        use std::rc::Rc;

        struct SharedSink(Rc<RefCell<Vec<TransactionRecord>>>);
        impl TransactionSink for SharedSink {
            fn record(&mut self, record: TransactionRecord) {
                self.0.borrow_mut().push(record);
            }
        }

        let observed = Rc::new(RefCell::new(Vec::new()));
        let mut pdb = pdb();
        pdb.set_sink(Box::new(SharedSink(observed.clone())));

        let line = pdb.create_timeline("Line", "L", vec![]).unwrap();
        let a = pdb.create_token("P", false).unwrap();
        pdb.attach(line, a).unwrap();
        pdb.activate(a).unwrap();

        let kinds: Vec<TransactionKind> = observed.borrow().iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&TransactionKind::ObjectCreated));
        assert!(kinds.contains(&TransactionKind::TokenCreated));
        // `createToken` also posts the `start + duration = end` constraint.
        assert!(kinds.contains(&TransactionKind::ConstraintCreated));
        assert!(kinds.contains(&TransactionKind::TokenStateTransition));
    }
}
