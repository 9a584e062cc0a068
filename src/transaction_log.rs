//! The transaction log: a record of every mutating API call, shaped so an
//! out-of-scope replayer can reconstruct an equivalent database (spec §6
//! "Persisted state", SPEC_FULL.md §6).
//!
//! The engine only ever appends; it never reads its own log back and
//! never touches disk. A caller installs a [`TransactionSink`] to receive
//! records as they are emitted, or leaves none installed (the default) to
//! pay nothing for logging it does not want.

use crate::entity::Key;
use serde::{Deserialize, Serialize};

/// Every mutating API call the transaction log replay needs to
/// distinguish (spec §6: "object/token/constraint created and destroyed,
/// variable specified/reset, token state transitions, precedence
/// additions").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    ObjectCreated,
    TokenCreated,
    ConstraintCreated,
    ConstraintDestroyed,
    VariableSpecified,
    VariableReset,
    TokenStateTransition,
    PrecedenceAdded,
    PrecedenceDestroyed,
}

/// One transaction-log record: `(kind, target_key, payload)` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub target_key: String,
    pub payload: serde_json::Value,
}

impl TransactionRecord {
    pub fn new(kind: TransactionKind, target_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            target_key: target_key.into(),
            payload,
        }
    }

    /// Convenience constructor keying the record by an entity [`Key`]'s
    /// display form (`index#generation`).
    pub fn for_key<T>(kind: TransactionKind, key: Key<T>, payload: serde_json::Value) -> Self {
        Self::new(kind, key.to_string(), payload)
    }
}

/// A sink a client installs on [`crate::engine::Engine`] to receive every
/// [`TransactionRecord`] it appends, in commit order (spec §6, SPEC_FULL.md
/// §6: "the core only appends ... via a `TransactionSink` trait object a
/// client may install, it never writes to disk itself").
pub trait TransactionSink {
    fn record(&mut self, record: TransactionRecord);
}

/// The default sink an embedder can use directly: an in-memory,
/// append-only buffer.
#[derive(Debug, Default)]
pub struct InMemorySink {
    records: Vec<TransactionRecord>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }
}

impl TransactionSink for InMemorySink {
    fn record(&mut self, record: TransactionRecord) {
        self.records.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_memory_sink_preserves_append_order() {
        let mut sink = InMemorySink::new();
        sink.record(TransactionRecord::new(TransactionKind::VariableSpecified, "v0#1", json!({"lb": 1})));
        sink.record(TransactionRecord::new(TransactionKind::VariableReset, "v0#1", json!(null)));
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.records()[0].kind, TransactionKind::VariableSpecified);
        assert_eq!(sink.records()[1].kind, TransactionKind::VariableReset);
    }
}
