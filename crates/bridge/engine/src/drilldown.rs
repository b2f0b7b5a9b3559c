//! Drill-down Selector - the leaves most affected by one rule, for
//! audit/evidence views.

use serde::{Deserialize, Serialize};

use crate::attribution::LeafDelta;

/// Rows returned when no explicit limit is given.
pub const DEFAULT_DRILLDOWN_LIMIT: usize = 10;

/// One evidence row of a drill-down.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AffectedLeaf {
    pub node_name: String,
    pub original: f64,
    pub adjusted: f64,
    pub impact: f64,
}

/// The top `limit` leaves whose deltas are attributed under the given
/// rule label, by descending absolute impact.
///
/// Label matching tolerates truncated display names (exact match or
/// prefix in either direction) and immaterial deltas are dropped. Pure;
/// does not touch the hierarchy.
pub fn top_affected(rule_label: &str, leaves: &[LeafDelta], limit: usize) -> Vec<AffectedLeaf> {
    let mut rows: Vec<AffectedLeaf> = leaves
        .iter()
        .filter(|leaf| leaf.is_material() && leaf.identity.matches_label(rule_label))
        .map(|leaf| AffectedLeaf {
            node_name: leaf.node_name.clone(),
            original: leaf.original,
            adjusted: leaf.adjusted,
            impact: leaf.delta,
        })
        .collect();

    rows.sort_by(|a, b| {
        b.impact
            .abs()
            .partial_cmp(&a.impact.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_name.cmp(&b.node_name))
    });
    rows.truncate(limit);
    rows
}
