//! Attribution Engine - anchor-and-scale reconciliation of leaf deltas.
//!
//! The leaf population visible here may be a strict subset of whatever
//! produced the scope-level rollup, so the per-rule raw sums are treated
//! as evidence of proportion only. The caller supplies the ground-truth
//! scope totals and every raw impact is scaled so the breakdown sums to
//! the observed gap exactly. That conservation property is the primary
//! correctness guard of the whole engine.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use bridge_types::{NodeSnapshot, Rule, RuleIdentity, ScopeAnchor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hierarchy::{SummaryNames, Tree};
use crate::measure::{extract_delta, parse_measure};
use crate::resolver::resolve_stack;

/// Deltas at or below this magnitude (in currency units) are treated as
/// floating-point noise and ignored everywhere.
pub const MATERIALITY_EPSILON: f64 = 0.01;

/// Normalized evidence row for one leaf: measures plus the identity its
/// delta is attributed under.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafDelta {
    pub node_id: String,
    pub node_name: String,
    pub original: f64,
    pub adjusted: f64,
    pub delta: f64,
    pub identity: RuleIdentity,
}

impl LeafDelta {
    pub fn from_node(node: &NodeSnapshot, identity: RuleIdentity) -> Self {
        let pair = extract_delta(node);
        Self {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            original: pair.original,
            adjusted: pair.adjusted,
            delta: pair.delta,
            identity,
        }
    }

    pub fn is_material(&self) -> bool {
        self.delta.abs() > MATERIALITY_EPSILON
    }
}

/// One line of the attribution breakdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributionItem {
    pub identity: RuleIdentity,
    /// Display label, denormalized from the identity for UI consumers.
    pub label: String,
    /// Summed leaf delta before anchoring.
    pub raw_impact: f64,
    /// Number of material leaves contributing.
    pub leaf_count: usize,
    /// Raw impact after scaling to the scope anchor.
    pub scaled_impact: f64,
}

/// Breakdown of a scope's original-to-adjusted gap by rule identity,
/// sorted by descending absolute scaled impact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributionResult {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub scope_original: f64,
    pub scope_adjusted: f64,
    /// Ground-truth gap the breakdown reconciles to.
    pub actual_delta: f64,
    /// Sum of raw leaf impacts before anchoring.
    pub raw_sum: f64,
    /// `actual_delta / raw_sum`, or 0 when there is no leaf evidence.
    pub scale_factor: f64,
    pub items: Vec<AttributionItem>,
}

impl AttributionResult {
    /// Portion of the gap the breakdown does not cover. Non-zero only in
    /// the no-evidence case (`scale_factor == 0`); callers surface it as
    /// a display/audit concern.
    pub fn unattributed(&self) -> f64 {
        let covered: f64 = self.items.iter().map(|i| i.scaled_impact).sum();
        self.actual_delta - covered
    }
}

/// Classify the identity a leaf's delta is attributed under.
///
/// Precedence: resolved rule logic, then a manual-override flag on the
/// row, then a non-trivial standalone plug value, then unexplained.
/// Resolved once per leaf; downstream stages never re-derive it.
pub fn classify(node: &NodeSnapshot, effective_rule: Option<&Rule>) -> RuleIdentity {
    if let Some(rule) = effective_rule {
        if !rule.logic.trim().is_empty() {
            return RuleIdentity::LogicDescribed(rule.logic.clone());
        }
    }
    if node.extra.get("manual_override").is_some_and(is_truthy) {
        return RuleIdentity::ManualOverride;
    }
    if let Some(plug) = node.extra.get("plug") {
        if parse_measure(plug).abs() > MATERIALITY_EPSILON {
            return RuleIdentity::ReconciliationPlug;
        }
    }
    RuleIdentity::Unexplained
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "t" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

/// Anchor-and-scale attribution over pre-classified leaf rows.
///
/// Immaterial leaves are skipped, surviving deltas are grouped by
/// identity, and the grouped raw impacts are scaled by
/// `actual_delta / raw_sum` so the breakdown sums to the anchored gap
/// regardless of how partial the leaf evidence was. When there is no
/// material leaf evidence (`|raw_sum| <= epsilon`) the scale factor is 0
/// and the entire gap stays unattributed.
///
/// Never fails on data quality; an empty breakdown alongside a non-zero
/// `actual_delta` is a legal result the caller must surface.
pub fn attribute(leaves: &[LeafDelta], anchor: ScopeAnchor) -> AttributionResult {
    let mut buckets: BTreeMap<RuleIdentity, (f64, usize)> = BTreeMap::new();
    for leaf in leaves.iter().filter(|l| l.is_material()) {
        let bucket = buckets.entry(leaf.identity.clone()).or_insert((0.0, 0));
        bucket.0 += leaf.delta;
        bucket.1 += 1;
    }

    let actual_delta = anchor.delta();
    let raw_sum: f64 = buckets.values().map(|(raw, _)| raw).sum();

    let scale_factor = if raw_sum.abs() <= MATERIALITY_EPSILON {
        if actual_delta.abs() > MATERIALITY_EPSILON {
            warn!(
                actual_delta,
                "no material leaf evidence; scope gap left unattributed"
            );
        }
        0.0
    } else {
        actual_delta / raw_sum
    };

    let mut items: Vec<AttributionItem> = buckets
        .into_iter()
        .map(|(identity, (raw_impact, leaf_count))| AttributionItem {
            label: identity.label().to_string(),
            identity,
            raw_impact,
            leaf_count,
            scaled_impact: raw_impact * scale_factor,
        })
        .collect();

    items.sort_by(|a, b| {
        b.scaled_impact
            .abs()
            .partial_cmp(&a.scaled_impact.abs())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });

    debug!(
        items = items.len(),
        raw_sum, scale_factor, actual_delta, "attribution computed"
    );

    AttributionResult {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        scope_original: anchor.original,
        scope_adjusted: anchor.adjusted,
        actual_delta,
        raw_sum,
        scale_factor,
        items,
    }
}

/// Everything one attribution request produces: the breakdown plus the
/// per-leaf evidence rows drill-downs run against.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScopeRun {
    pub result: AttributionResult,
    pub leaves: Vec<LeafDelta>,
}

/// End-to-end pipeline for one scope: walk the tree's leaves, resolve
/// each leaf's effective rule, extract and classify its delta, then
/// anchor-and-scale against the scope totals.
pub fn run_scope(
    tree: &Tree,
    rules: &HashMap<String, Rule>,
    summaries: &SummaryNames,
    anchor: ScopeAnchor,
) -> ScopeRun {
    let leaves: Vec<LeafDelta> = tree
        .leaves(summaries)
        .into_iter()
        .map(|node| {
            let stack = resolve_stack(&node.id, tree, rules);
            let identity = classify(node, stack.effective_rule());
            LeafDelta::from_node(node, identity)
        })
        .collect();

    let result = attribute(&leaves, anchor);
    ScopeRun { result, leaves }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(name: &str, delta: f64, identity: RuleIdentity) -> LeafDelta {
        LeafDelta {
            node_id: name.to_lowercase(),
            node_name: name.to_string(),
            original: 0.0,
            adjusted: delta,
            delta,
            identity,
        }
    }

    fn rule_identity(logic: &str) -> RuleIdentity {
        RuleIdentity::LogicDescribed(logic.to_string())
    }

    #[test]
    fn simple_scaling_scenario() {
        let leaves = vec![
            leaf("A", 100.0, rule_identity("R1")),
            leaf("B", 50.0, rule_identity("R1")),
        ];
        let result = attribute(&leaves, ScopeAnchor::new(1000.0, 1045.0));

        assert_eq!(result.items.len(), 1);
        assert!((result.raw_sum - 150.0).abs() < 1e-9);
        assert!((result.scale_factor - 0.3).abs() < 1e-9);

        let item = &result.items[0];
        assert_eq!(item.label, "R1");
        assert_eq!(item.leaf_count, 2);
        assert!((item.scaled_impact - 45.0).abs() < 1e-9);
    }

    #[test]
    fn conservation_across_mixed_identities() {
        let leaves = vec![
            leaf("A", 312.77, rule_identity("R1")),
            leaf("B", -81.03, rule_identity("R2")),
            leaf("C", 12.5, RuleIdentity::ManualOverride),
            leaf("D", -7.25, RuleIdentity::Unexplained),
        ];
        let anchor = ScopeAnchor::new(10_000.0, 10_123.45);
        let result = attribute(&leaves, anchor);

        let total: f64 = result.items.iter().map(|i| i.scaled_impact).sum();
        assert!((total - anchor.delta()).abs() < 1e-6 * anchor.delta().abs().max(1.0));
        assert!(result.unattributed().abs() < 1e-6);
    }

    #[test]
    fn immaterial_leaves_yield_empty_breakdown() {
        let leaves = vec![
            leaf("A", 0.005, rule_identity("R1")),
            leaf("B", -0.01, rule_identity("R2")),
        ];
        let result = attribute(&leaves, ScopeAnchor::new(1000.0, 1010.0));
        assert!(result.items.is_empty());
        assert_eq!(result.scale_factor, 0.0);
        assert!((result.unattributed() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn cancelling_deltas_leave_gap_unattributed() {
        // Material individually, but the evidence nets to zero.
        let leaves = vec![
            leaf("A", 50.0, rule_identity("R1")),
            leaf("B", -50.0, rule_identity("R2")),
        ];
        let result = attribute(&leaves, ScopeAnchor::new(1000.0, 1020.0));
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.scale_factor, 0.0);
        assert!(result.items.iter().all(|i| i.scaled_impact == 0.0));
        assert!((result.unattributed() - 20.0).abs() < 1e-9);
        // Both items are scaled to zero, so label order breaks the tie.
        let labels: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["R1", "R2"]);
    }

    #[test]
    fn tied_impacts_order_by_label() {
        let leaves = vec![
            leaf("A", -30.0, rule_identity("Zeta cut")),
            leaf("B", 30.0, rule_identity("Alpha add")),
            leaf("C", 40.0, rule_identity("Mid add")),
        ];
        let result = attribute(&leaves, ScopeAnchor::new(0.0, 40.0));

        // scale_factor is 1, so the two 30-magnitude items tie exactly and
        // must come out in label order behind the 40-magnitude item.
        assert!((result.scale_factor - 1.0).abs() < 1e-9);
        let labels: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["Mid add", "Alpha add", "Zeta cut"]);
    }

    #[test]
    fn items_sorted_by_absolute_scaled_impact() {
        let leaves = vec![
            leaf("A", -500.0, rule_identity("Big cut")),
            leaf("B", 300.0, rule_identity("Medium add")),
            leaf("C", -50.0, rule_identity("Small cut")),
        ];
        let result = attribute(&leaves, ScopeAnchor::new(0.0, -250.0));
        let labels: Vec<&str> = result.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["Big cut", "Medium add", "Small cut"]);
    }

    #[test]
    fn classify_precedence() {
        let rule = Rule::new("n1", "Exclude intercompany");
        let plain = NodeSnapshot::new("n1", "Desk");

        assert_eq!(
            classify(&plain, Some(&rule)),
            RuleIdentity::LogicDescribed("Exclude intercompany".into())
        );

        let overridden = NodeSnapshot::new("n1", "Desk").with_extra("manual_override", json!(true));
        assert_eq!(classify(&overridden, None), RuleIdentity::ManualOverride);
        // A resolvable rule beats the override flag.
        assert!(matches!(
            classify(&overridden, Some(&rule)),
            RuleIdentity::LogicDescribed(_)
        ));

        let plugged = NodeSnapshot::new("n1", "Desk").with_extra("plug", json!("(25.00)"));
        assert_eq!(classify(&plugged, None), RuleIdentity::ReconciliationPlug);

        let trivial_plug = NodeSnapshot::new("n1", "Desk").with_extra("plug", json!(0.004));
        assert_eq!(classify(&trivial_plug, None), RuleIdentity::Unexplained);

        assert_eq!(classify(&plain, None), RuleIdentity::Unexplained);
    }

    #[test]
    fn classify_blank_rule_logic_falls_through() {
        let blank = Rule::new("n1", "   ");
        let node = NodeSnapshot::new("n1", "Desk").with_extra("manual_override", json!("yes"));
        assert_eq!(classify(&node, Some(&blank)), RuleIdentity::ManualOverride);
    }

    #[test]
    fn run_scope_end_to_end() {
        let tree = Tree::build(vec![
            NodeSnapshot::new("root", "Global Markets"),
            NodeSnapshot::new("eq", "Equities").with_parent("root"),
            NodeSnapshot::new("eq-cash", "Cash Trading")
                .with_parent("eq")
                .with_values(json!(1000.0), json!(1100.0)),
            NodeSnapshot::new("eq-total", "Equities Total").with_parent("eq"),
            NodeSnapshot::new("fx", "FX")
                .with_parent("root")
                .with_values(json!("2,000.00"), json!("1,950.00")),
        ])
        .unwrap();

        let rules = HashMap::from([(
            "eq".to_string(),
            Rule::new("eq", "Exclude intercompany"),
        )]);
        let summaries = SummaryNames::new(["total"]);
        let anchor = ScopeAnchor::new(3000.0, 3025.0);

        let run = run_scope(&tree, &rules, &summaries, anchor);

        // Two material leaves: eq-cash (+100, under the eq rule) and fx
        // (-50, unexplained). The summary node contributes nothing.
        assert_eq!(run.leaves.len(), 2);
        assert_eq!(run.result.items.len(), 2);
        assert!((run.result.raw_sum - 50.0).abs() < 1e-9);

        let total: f64 = run.result.items.iter().map(|i| i.scaled_impact).sum();
        assert!((total - 25.0).abs() < 1e-6);

        let eq_item = run
            .result
            .items
            .iter()
            .find(|i| i.label == "Exclude intercompany")
            .unwrap();
        assert_eq!(eq_item.leaf_count, 1);
    }
}
