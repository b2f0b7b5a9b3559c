//! PnL Bridge Engine - rule resolution, attribution and reconciliation.
//!
//! Given a hierarchy snapshot, a sparse rule set and an independently
//! computed scope anchor, the engine resolves the effective rule for each
//! leaf, decomposes the scope's original-to-adjusted gap by rule identity
//! with a conservation guarantee, and derives waterfall and drill-down
//! views from the breakdown.
//!
//! Everything is pure and synchronous over caller-supplied snapshots: no
//! I/O, no caches, no state between invocations. Structural hierarchy
//! corruption is the only fatal condition; every value-quality issue
//! degrades to zero/empty instead.

#![deny(unsafe_code)]

pub mod attribution;
pub mod drilldown;
pub mod error;
pub mod hierarchy;
pub mod measure;
pub mod resolver;
pub mod waterfall;

pub use attribution::{
    attribute, classify, run_scope, AttributionItem, AttributionResult, LeafDelta, ScopeRun,
    MATERIALITY_EPSILON,
};
pub use drilldown::{top_affected, AffectedLeaf, DEFAULT_DRILLDOWN_LIMIT};
pub use error::MalformedHierarchy;
pub use hierarchy::{SummaryNames, Tree};
pub use measure::{extract_delta, parse_measure, MeasurePair};
pub use resolver::{resolve_stack, RuleStack};
pub use waterfall::{build_waterfall, StepKind, WaterfallStep};

pub use bridge_types::{
    NodeSnapshot, PredicateClause, PredicateOp, Rule, RuleIdentity, ScopeAnchor,
};
