//! Constraints: fixed-arity relations over a scope of variables, each
//! assigned to a propagator by name (spec §3, §4.6).

use crate::entity::Key;
use crate::types::DataType;
use crate::variable::VarId;

/// Marker type for [`Key<ConstraintMarker>`].
pub struct ConstraintMarker;

/// A stable handle to a [`Constraint`] owned by the engine.
pub type ConstraintId = Key<ConstraintMarker>;

/// Which propagator a constraint's execution is routed to (spec §4.3
/// "Change routing", §4.5, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagatorAssignment {
    /// The insertion-ordered default propagator (spec §4.4).
    Default,
    /// The equality-class propagator (spec §4.5). Only ever assigned to
    /// [`ConstraintKind::Eq`].
    Equality,
    /// The temporal (STN) propagator (spec §4.7).
    Temporal,
}

/// One argument-type requirement a constraint declares for a scope
/// position (spec §4.6: "Each constraint declares per-argument data-type
/// requirements").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRequirement {
    Any,
    Numeric,
    Boolean,
    Entity,
    Exact(DataTypeTag),
}

/// A coarse tag mirroring [`DataType`] used only for argument-requirement
/// declarations (kept distinct from `DataType` so requirements can be
/// declared as a `const` table without depending on enum variant
/// equality rules changing underneath them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeTag {
    Bool,
    Int,
    Float,
    String,
    Symbol,
    ObjectReference,
}

impl DataTypeTag {
    fn matches(&self, dt: &DataType) -> bool {
        matches!(
            (self, dt),
            (DataTypeTag::Bool, DataType::Bool)
                | (DataTypeTag::Int, DataType::Int)
                | (DataTypeTag::Float, DataType::Float)
                | (DataTypeTag::String, DataType::String)
                | (DataTypeTag::Symbol, DataType::Symbol)
                | (DataTypeTag::ObjectReference, DataType::ObjectReference)
        )
    }
}

impl ArgRequirement {
    pub fn accepts(&self, dt: &DataType) -> bool {
        match self {
            ArgRequirement::Any => true,
            ArgRequirement::Numeric => dt.is_numeric(),
            ArgRequirement::Boolean => matches!(dt, DataType::Bool),
            ArgRequirement::Entity => matches!(dt, DataType::ObjectReference),
            ArgRequirement::Exact(tag) => tag.matches(dt),
        }
    }
}

/// The ~35-primitive constraint library of spec §4.6, plus the four
/// temporal relations of spec §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Eq,
    Neq,
    Leq,
    Lt,
    AddEq,
    MultEq,
    DivEq,
    AbsVal,
    EqSum,
    EqProduct,
    EqMin,
    EqMax,
    AllDiff,
    TestEq,
    TestLeq,
    TestLt,
    TestNeq,
    TestAnd,
    TestOr,
    SubsetOf,
    Lock,
    Concurrent,
    Precedes,
    StrictlyPrecedes,
    TemporalDistance,
}

impl ConstraintKind {
    /// Parse a constraint by the name spec §4.6 gives it. Unknown names
    /// are a construction error at the call site, not here.
    pub fn by_name(name: &str) -> Option<Self> {
        use ConstraintKind::*;
        Some(match name {
            "eq" => Eq,
            "neq" => Neq,
            "leq" => Leq,
            "lt" => Lt,
            "addEq" => AddEq,
            "multEq" => MultEq,
            "divEq" => DivEq,
            "absVal" => AbsVal,
            "eqSum" => EqSum,
            "eqProduct" => EqProduct,
            "eqMin" => EqMin,
            "eqMax" => EqMax,
            "allDiff" => AllDiff,
            "testEq" => TestEq,
            "testLEQ" => TestLeq,
            "testLT" => TestLt,
            "testNEQ" => TestNeq,
            "testAnd" => TestAnd,
            "testOr" => TestOr,
            "subsetOf" => SubsetOf,
            "lock" => Lock,
            "concurrent" => Concurrent,
            "precedes" => Precedes,
            "strictlyPrecedes" => StrictlyPrecedes,
            "temporalDistance" => TemporalDistance,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        use ConstraintKind::*;
        match self {
            Eq => "eq",
            Neq => "neq",
            Leq => "leq",
            Lt => "lt",
            AddEq => "addEq",
            MultEq => "multEq",
            DivEq => "divEq",
            AbsVal => "absVal",
            EqSum => "eqSum",
            EqProduct => "eqProduct",
            EqMin => "eqMin",
            EqMax => "eqMax",
            AllDiff => "allDiff",
            TestEq => "testEq",
            TestLeq => "testLEQ",
            TestLt => "testLT",
            TestNeq => "testNEQ",
            TestAnd => "testAnd",
            TestOr => "testOr",
            SubsetOf => "subsetOf",
            Lock => "lock",
            Concurrent => "concurrent",
            Precedes => "precedes",
            StrictlyPrecedes => "strictlyPrecedes",
            TemporalDistance => "temporalDistance",
        }
    }

    /// Fixed arity, or `None` for the variadic constraints (spec §4.6:
    /// `eq`, `eqSum`, `eqProduct`, `eqMin`, `eqMax`, `allDiff` accept `n`
    /// or `≥k` variables).
    pub fn min_arity(&self) -> usize {
        use ConstraintKind::*;
        match self {
            Eq => 2,
            Neq | Leq | Lt | AbsVal | SubsetOf | Lock | Concurrent | Precedes
            | StrictlyPrecedes => 2,
            AddEq | MultEq | DivEq | TestEq | TestLeq | TestLt | TestNeq | TestAnd | TestOr
            | TemporalDistance => 3,
            EqSum | EqProduct => 3,
            EqMin | EqMax | AllDiff => 2,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Eq
                | ConstraintKind::EqSum
                | ConstraintKind::EqProduct
                | ConstraintKind::EqMin
                | ConstraintKind::EqMax
                | ConstraintKind::AllDiff
        )
    }

    /// Which propagator owns this constraint's agenda (spec §4.6, §4.7).
    pub fn propagator(&self) -> PropagatorAssignment {
        match self {
            ConstraintKind::Eq => PropagatorAssignment::Equality,
            ConstraintKind::Concurrent
            | ConstraintKind::Precedes
            | ConstraintKind::StrictlyPrecedes
            | ConstraintKind::TemporalDistance => PropagatorAssignment::Temporal,
            _ => PropagatorAssignment::Default,
        }
    }

    /// Per-argument-position type requirement for the first `k` fixed
    /// positions of a variadic constraint, or all positions of a
    /// fixed-arity one. Positions beyond the declared list (variadic
    /// tails) reuse the last declared requirement.
    pub fn arg_requirements(&self) -> Vec<ArgRequirement> {
        use ArgRequirement::*;
        use ConstraintKind::*;
        match self {
            Eq => vec![Any, Any],
            Neq | Leq | Lt => vec![Numeric, Numeric],
            AddEq | MultEq | DivEq => vec![Numeric, Numeric, Numeric],
            AbsVal => vec![Numeric, Numeric],
            EqSum | EqProduct => vec![Numeric, Numeric, Numeric],
            EqMin | EqMax => vec![Numeric, Numeric],
            AllDiff => vec![Any, Any],
            TestEq | TestLeq | TestLt | TestNeq => vec![Boolean, Numeric, Numeric],
            TestAnd | TestOr => vec![Boolean, Boolean, Boolean],
            SubsetOf => vec![Any, Any],
            Lock => vec![Any, Any],
            Concurrent | Precedes | StrictlyPrecedes => vec![Numeric, Numeric],
            TemporalDistance => vec![Numeric, Numeric, Numeric],
        }
    }
}

/// A constraint instance: a kind, an ordered scope, and the mutable
/// bookkeeping the propagators need (spec §3 `Constraint`, §4.4 re-entry
/// guard).
#[derive(Debug, Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub scope: Vec<VarId>,
    pub active: bool,
    pub discarded: bool,
}

impl Constraint {
    pub fn new(kind: ConstraintKind, scope: Vec<VarId>) -> Self {
        Self {
            kind,
            scope,
            active: true,
            discarded: false,
        }
    }

    /// Validate `scope`'s length and (via `data_types`, aligned
    /// positionally) per-argument types against `kind`'s declared
    /// requirements. An illegal scope is a fatal construction error
    /// (spec §4.6).
    pub fn validate_scope(kind: ConstraintKind, data_types: &[DataType]) -> Result<(), String> {
        let min_arity = kind.min_arity();
        if kind.is_variadic() {
            if data_types.len() < min_arity.min(2) {
                return Err(format!(
                    "{} requires at least {} arguments, got {}",
                    kind.name(),
                    min_arity.min(2),
                    data_types.len()
                ));
            }
        } else if data_types.len() != min_arity {
            return Err(format!(
                "{} requires exactly {} arguments, got {}",
                kind.name(),
                min_arity,
                data_types.len()
            ));
        }

        let reqs = kind.arg_requirements();
        for (i, dt) in data_types.iter().enumerate() {
            let req = reqs.get(i).or_else(|| reqs.last()).expect("non-empty requirements");
            if !req.accepts(dt) {
                return Err(format!(
                    "{} argument {} has type {:?}, which does not satisfy {:?}",
                    kind.name(),
                    i,
                    dt,
                    req
                ));
            }
        }
        Ok(())
    }
}
