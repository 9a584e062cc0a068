// Copyright (c) 2025 - Cowboy AI, LLC.

//! # tnet-planner
//!
//! A constraint satisfaction and propagation engine with temporal
//! extensions and plan-refinement search.
//!
//! - [`engine`]: typed variables, constraints, and the propagation loop
//!   that keeps their domains bound-consistent.
//! - [`temporal`]: a Simple Temporal Network propagator over timepoint
//!   variables.
//! - [`plan`]: objects, tokens, timelines, and resources built on top of
//!   the engine.
//! - [`decision`] / [`heuristic`]: the decision points a partial plan
//!   exposes, and the priorities/orderings that rank them.
//! - [`search`]: chronological backtracking over the decision manager and
//!   plan database to a complete plan.

#![warn(missing_docs)]

pub mod config;
pub mod constraint;
pub mod constraints;
pub mod decision;
pub mod domain;
pub mod entity;
pub mod engine;
pub mod equality;
pub mod errors;
pub mod heuristic;
pub mod plan;
pub mod propagator;
pub mod search;
pub mod state_machine;
pub mod temporal;
pub mod transaction_log;
pub mod types;
pub mod variable;

pub use config::{Config, PriorityPreference};
pub use decision::{Choice, DecisionId, DecisionKind, DecisionManager, DecisionPoint, DecisionSubject, Undo};
pub use domain::{Domain, EnumKind, Value};
pub use engine::{Engine, PropagationOutcome};
pub use errors::{EngineError, EngineResult};
pub use plan::{Object, ObjectId, PlanDatabase, Token, TokenId};
pub use search::{SearchDriver, SearchStatus};
pub use state_machine::{TokenState, TokenStateDomain};
pub use transaction_log::{InMemorySink, TransactionKind, TransactionRecord, TransactionSink};
pub use types::DataType;
pub use variable::{ConstrainedVariable, VarId};
