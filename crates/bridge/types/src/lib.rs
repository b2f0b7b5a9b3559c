//! PnL Bridge Types - the data model shared between the attribution engine
//! and the outer reporting layer.
//!
//! Everything here is a read-only snapshot shape: the reporting service
//! fetches hierarchy nodes and business rules per computation request, the
//! engine consumes them, and nothing is mutated or cached in between.

#![deny(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a reporting hierarchy snapshot.
///
/// Measure payloads are kept as raw [`serde_json::Value`] because upstream
/// feeds are heterogeneous: a measure may arrive as a plain number, a
/// currency-formatted string, or an object keyed by time window. The
/// engine's measure extractor owns the normalization rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Unique node identifier within the snapshot.
    pub id: String,
    /// Display name (used for summary-node classification and drill-downs).
    pub name: String,
    /// Parent node identifier; absent for a root.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Explicit leaf flag from the data source, when it supplies one.
    #[serde(default)]
    pub is_leaf_hint: Option<bool>,
    /// Aggregate measure before any business rule is applied.
    #[serde(default)]
    pub natural_value: Value,
    /// Aggregate measure after the effective rule's filter is applied.
    #[serde(default)]
    pub adjusted_value: Value,
    /// Remaining snapshot fields (fallback measures, override flags,
    /// standalone plug values) preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeSnapshot {
    /// Minimal snapshot row for the given id/name, everything else empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            is_leaf_hint: None,
            natural_value: Value::Null,
            adjusted_value: Value::Null,
            extra: Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_leaf_hint(mut self, hint: bool) -> Self {
        self.is_leaf_hint = Some(hint);
        self
    }

    pub fn with_values(mut self, natural: Value, adjusted: Value) -> Self {
        self.natural_value = natural;
        self.adjusted_value = adjusted;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A single field/operator/value clause of a structured rule predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredicateClause {
    pub field: String,
    pub op: PredicateOp,
    pub value: Value,
}

/// Comparison operators supported by structured predicates.
///
/// The engine never evaluates these against fact data (that happens in the
/// external query service); they ride along as rule metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    Contains,
}

/// A business rule attached directly to one hierarchy node.
///
/// At most one rule per node; descendants inherit it unless they carry
/// their own. Rules are immutable once handed to a computation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    /// The node this rule is attached to.
    pub node_id: String,
    /// Free-text logic summary shown to analysts; doubles as the rule's
    /// identity in attribution breakdowns.
    pub logic: String,
    /// Structured predicate clauses, when the rule was built in the editor.
    #[serde(default)]
    pub predicate: Vec<PredicateClause>,
    /// Raw filter expression, when the rule was typed free-form.
    #[serde(default)]
    pub filter_expr: Option<String>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
    /// User who last modified the rule.
    pub modified_by: String,
}

impl Rule {
    pub fn new(node_id: impl Into<String>, logic: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            logic: logic.into(),
            predicate: Vec::new(),
            filter_expr: None,
            modified_at: Utc::now(),
            modified_by: String::new(),
        }
    }

    pub fn with_clause(mut self, field: impl Into<String>, op: PredicateOp, value: Value) -> Self {
        self.predicate.push(PredicateClause {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn with_filter_expr(mut self, expr: impl Into<String>) -> Self {
        self.filter_expr = Some(expr.into());
        self
    }

    pub fn by(mut self, user: impl Into<String>) -> Self {
        self.modified_by = user.into();
        self
    }
}

/// Resolved identity a leaf's delta is attributed under.
///
/// Classified once per leaf, up front; downstream stages (grouping,
/// waterfall, drill-down) only ever compare identities, never re-derive
/// them from row fields.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "logic", rename_all = "snake_case")]
pub enum RuleIdentity {
    /// A resolved rule with a logic summary.
    LogicDescribed(String),
    /// Row flagged as manually overridden with no resolvable rule object.
    ManualOverride,
    /// Row carrying a non-trivial standalone reconciliation plug value.
    ReconciliationPlug,
    /// Non-zero delta with no explanation at all.
    Unexplained,
}

impl RuleIdentity {
    /// Stable display label used in breakdowns, waterfalls and drill-downs.
    pub fn label(&self) -> &str {
        match self {
            RuleIdentity::LogicDescribed(logic) => logic,
            RuleIdentity::ManualOverride => "Manual Override",
            RuleIdentity::ReconciliationPlug => "Reconciliation Plug",
            RuleIdentity::Unexplained => "Unexplained / Plug",
        }
    }

    /// Label match tolerant of truncated display names: exact, or one
    /// label a prefix of the other. An empty query matches nothing (it
    /// would otherwise prefix-match every label).
    pub fn matches_label(&self, other: &str) -> bool {
        if other.is_empty() {
            return false;
        }
        let own = self.label();
        own == other || own.starts_with(other) || other.starts_with(own)
    }
}

impl std::fmt::Display for RuleIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ground-truth original/adjusted totals for the scope an attribution is
/// run against, computed independently by the query service from full
/// fact data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScopeAnchor {
    pub original: f64,
    pub adjusted: f64,
}

impl ScopeAnchor {
    pub fn new(original: f64, adjusted: f64) -> Self {
        Self { original, adjusted }
    }

    /// The gap the attribution must reconcile to.
    pub fn delta(&self) -> f64 {
        self.adjusted - self.original
    }
}
