//! Chronological backtracking search (spec §4.11, §5, §6).
//!
//! [`SearchDriver`] drives [`DecisionManager`] and [`PlanDatabase`]/[`Engine`]
//! through commit → propagate → (retract on inconsistency) until no open
//! decisions remain, every decision's choices are exhausted, or an external
//! step budget or abort flag cuts the run short. Each choice tried for a
//! decision is recorded on a stack frame alongside the untried alternatives
//! that decision still has left, so retrying the next choice of a decision
//! being backtracked into never needs to re-ask the decision manager for a
//! fresh (and possibly differently ordered) choice list.

use crate::decision::{Choice, DecisionId, DecisionKind, DecisionManager, Undo};
use crate::engine::PropagationOutcome;
use crate::plan::PlanDatabase;

/// Search progress (spec §4.11 "Step budgeting", §6 `getStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    InProgress,
    PlanFound,
    SearchExhausted,
    TimeoutReached,
}

struct Frame {
    decision: DecisionId,
    undo: Undo,
    remaining: Vec<Choice>,
}

/// Drives a [`PlanDatabase`] to completion via chronological backtracking
/// (spec §4.11).
pub struct SearchDriver {
    pdb: PlanDatabase,
    decisions: DecisionManager,
    stack: Vec<Frame>,
    /// A decision whose choices were already enumerated (by a prior
    /// [`DecisionManager::choices`] call) but not yet exhausted, carried
    /// across steps so a retry never re-derives the list.
    pending: Option<(DecisionId, Vec<Choice>)>,
    status: SearchStatus,
    step_count: u64,
    max_steps: Option<u64>,
    aborted: bool,
    last_executed: Option<DecisionId>,
    last_retracted: Option<DecisionId>,
}

impl SearchDriver {
    pub fn new(pdb: PlanDatabase) -> Self {
        Self {
            pdb,
            decisions: DecisionManager::new(),
            stack: Vec::new(),
            pending: None,
            status: SearchStatus::InProgress,
            step_count: 0,
            max_steps: None,
            aborted: false,
            last_executed: None,
            last_retracted: None,
        }
    }

    pub fn pdb(&self) -> &PlanDatabase {
        &self.pdb
    }

    pub fn pdb_mut(&mut self) -> &mut PlanDatabase {
        &mut self.pdb
    }

    pub fn decisions(&self) -> &DecisionManager {
        &self.decisions
    }

    pub fn decisions_mut(&mut self) -> &mut DecisionManager {
        &mut self.decisions
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn last_executed_decision(&self) -> Option<DecisionId> {
        self.last_executed
    }

    pub fn last_retracted_decision(&self) -> Option<DecisionId> {
        self.last_retracted
    }

    /// Request the run stop at the next opportunity (spec §5 "Cancellation
    /// and timeouts"). Checked between steps, never mid-step.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Reset the run with a fresh step budget (`None` means unbounded) and
    /// return the initial status (spec §6 `initRun`).
    pub fn init_run(&mut self, max_steps: Option<u64>) -> SearchStatus {
        self.stack.clear();
        self.pending = None;
        self.step_count = 0;
        self.max_steps = max_steps;
        self.aborted = false;
        self.last_executed = None;
        self.last_retracted = None;
        self.status = SearchStatus::InProgress;
        self.status
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    /// Run up to `n` more steps (or until the run terminates), returning the
    /// step count reached (spec §6 `writeStep`).
    pub fn write_step(&mut self, n: u64) -> u64 {
        self.run_steps(n);
        self.step_count
    }

    /// Same contract as [`SearchDriver::write_step`] (spec §4.11 describes
    /// `writeStep`/`writeNext` identically: "run n steps and suspend").
    pub fn write_next(&mut self, n: u64) -> u64 {
        self.run_steps(n);
        self.step_count
    }

    /// Run to termination, honoring the step budget set by
    /// [`SearchDriver::init_run`] (spec §6 `completeRun`).
    pub fn complete_run(&mut self) -> u64 {
        self.run_steps(u64::MAX);
        self.step_count
    }

    fn run_steps(&mut self, n: u64) {
        for _ in 0..n {
            if self.aborted {
                self.status = SearchStatus::TimeoutReached;
                return;
            }
            if let Some(max) = self.max_steps {
                if self.step_count >= max {
                    self.status = SearchStatus::TimeoutReached;
                    return;
                }
            }
            if self.status != SearchStatus::InProgress {
                return;
            }
            self.tick();
        }
    }

    /// One pass of the spec's `loop`/`RETRACT` pseudocode: advances exactly
    /// one commit+propagate step, or decides the run's final status, before
    /// returning. Internal retractions (which do not consume step budget)
    /// loop silently until either a step completes or the stack empties.
    fn tick(&mut self) {
        loop {
            self.decisions.refresh(&mut self.pdb);
            let any_open = DecisionKind::ENUMERATION_ORDER
                .iter()
                .any(|kind| !self.decisions.cache(*kind).is_empty());
            if !any_open {
                self.status = SearchStatus::PlanFound;
                return;
            }

            let (decision, mut remaining) = match self.pending.take() {
                Some(pair) => pair,
                None => {
                    let preference = self.pdb.engine.config().priority_preference;
                    let Some(d) = self.decisions.next_decision(&self.pdb, preference) else {
                        self.status = SearchStatus::PlanFound;
                        return;
                    };
                    let choices = self.decisions.choices(&self.pdb, d);
                    (d, choices)
                }
            };

            if remaining.is_empty() {
                if self.retract() {
                    continue;
                }
                self.status = SearchStatus::SearchExhausted;
                return;
            }

            let choice = remaining.remove(0);
            match self.decisions.commit(&mut self.pdb, &choice) {
                Ok(undo) => {
                    self.last_executed = Some(decision);
                    self.stack.push(Frame { decision, undo, remaining });
                    self.step_count += 1;
                    if self.pdb.engine.propagate() == PropagationOutcome::Inconsistent {
                        if self.retract() {
                            continue;
                        }
                        self.status = SearchStatus::SearchExhausted;
                        return;
                    }
                    self.status = SearchStatus::InProgress;
                    return;
                }
                Err(_) => {
                    // The choice no longer applies (stale reference); drop
                    // it and try the next one from the same set without
                    // spending a step.
                    self.pending = Some((decision, remaining));
                    continue;
                }
            }
        }
    }

    /// Pop and undo frames until one with an untried alternative is found
    /// (spec's "try next choice of d' or retract further"), or the stack
    /// empties. Returns whether a retry is now pending.
    fn retract(&mut self) -> bool {
        while let Some(frame) = self.stack.pop() {
            self.last_retracted = Some(frame.decision);
            if self.decisions.retract(&mut self.pdb, frame.undo).is_err() {
                return false;
            }
            self.pdb.engine.relax();
            if !frame.remaining.is_empty() {
                self.pending = Some((frame.decision, frame.remaining));
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::constraint::ConstraintKind;
    use crate::domain::Domain;
    use crate::engine::Engine;
    use crate::types::DataType;

    fn driver() -> SearchDriver {
        SearchDriver::new(PlanDatabase::new(Engine::new(Config::default()), (0.0, 100.0)))
    }

    #[test]
    fn empty_plan_succeeds_without_spending_a_step() {
        let mut d = driver();
        d.init_run(None);
        assert_eq!(d.complete_run(), 0);
        assert_eq!(d.status(), SearchStatus::PlanFound);
    }

    #[test]
    fn resolves_a_small_enumerated_variable_in_one_step() {
        let mut d = driver();
        d.pdb_mut()
            .engine
            .create_variable(DataType::Int, Domain::int_enum(vec![1, 2, 3], false), "x", false, true, None, None);

        d.init_run(None);
        assert_eq!(d.complete_run(), 1);
        assert_eq!(d.status(), SearchStatus::PlanFound);
    }

    #[test]
    fn exhausts_every_choice_of_an_unsatisfiable_variable() {
        let mut d = driver();
        let x = d.pdb_mut().engine.create_variable(
            DataType::Int,
            Domain::int_enum(vec![1, 2, 3], false),
            "x",
            false,
            true,
            None,
            None,
        );
        let z = d.pdb_mut().engine.create_variable(
            DataType::Int,
            Domain::int_enum(vec![10], false),
            "z",
            false,
            false,
            None,
            None,
        );
        d.pdb_mut().engine.create_constraint(ConstraintKind::Eq, vec![x, z]).unwrap();

        d.init_run(None);
        assert_eq!(d.complete_run(), 3);
        assert_eq!(d.status(), SearchStatus::SearchExhausted);
    }

    #[test]
    fn step_budget_halts_a_run_that_has_not_yet_terminated() {
        let mut d = driver();
        let x = d.pdb_mut().engine.create_variable(
            DataType::Int,
            Domain::int_enum(vec![1, 2, 3], false),
            "x",
            false,
            true,
            None,
            None,
        );
        let z = d.pdb_mut().engine.create_variable(
            DataType::Int,
            Domain::int_enum(vec![10], false),
            "z",
            false,
            false,
            None,
            None,
        );
        d.pdb_mut().engine.create_constraint(ConstraintKind::Eq, vec![x, z]).unwrap();

        d.init_run(Some(2));
        assert_eq!(d.write_step(10), 2);
        assert_eq!(d.status(), SearchStatus::TimeoutReached);
    }

    #[test]
    fn abort_flag_halts_between_steps() {
        let mut d = driver();
        d.pdb_mut()
            .engine
            .create_variable(DataType::Int, Domain::int_enum(vec![1, 2, 3], false), "x", false, true, None, None);
        d.init_run(None);
        d.abort();
        d.write_step(1);
        assert_eq!(d.status(), SearchStatus::TimeoutReached);
    }
}
