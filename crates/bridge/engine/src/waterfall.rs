//! Waterfall Builder - sequential bridge from original to adjusted total.

use bridge_types::ScopeAnchor;
use serde::{Deserialize, Serialize};

use crate::attribution::AttributionItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Opening bar: the scope's original total.
    Baseline,
    /// One bar per attribution item.
    Impact,
    /// Closing bar: the scope's adjusted total, restated from the anchor
    /// rather than accumulated.
    Total,
}

/// One bar of a bridge visualization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    pub kind: StepKind,
    pub start: f64,
    pub end: f64,
    pub impact: f64,
}

/// Build bridge steps from an ordered breakdown.
///
/// Impact steps chain (each starts where the previous ended). The closing
/// Total step restates the anchored adjusted value independently of the
/// running sum: if the cumulative bridge and the true scope figure
/// disagree, the discrepancy shows up in that step's `impact` instead of
/// being silently absorbed.
pub fn build_waterfall(items: &[AttributionItem], anchor: ScopeAnchor) -> Vec<WaterfallStep> {
    let mut steps = Vec::with_capacity(items.len() + 2);

    steps.push(WaterfallStep {
        label: "Original".to_string(),
        kind: StepKind::Baseline,
        start: 0.0,
        end: anchor.original,
        impact: anchor.original,
    });

    let mut cumulative = anchor.original;
    for item in items {
        let end = cumulative + item.scaled_impact;
        steps.push(WaterfallStep {
            label: item.label.clone(),
            kind: StepKind::Impact,
            start: cumulative,
            end,
            impact: item.scaled_impact,
        });
        cumulative = end;
    }

    steps.push(WaterfallStep {
        label: "Adjusted".to_string(),
        kind: StepKind::Total,
        start: cumulative,
        end: anchor.adjusted,
        impact: anchor.adjusted - cumulative,
    });

    steps
}
