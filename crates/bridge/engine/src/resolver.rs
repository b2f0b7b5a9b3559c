//! Rule Resolver - inheritance and override semantics over the hierarchy.
//!
//! A rule attached to a node governs every descendant without its own
//! rule; a direct rule always overrides inherited ones. The rule set is
//! passed in explicitly on every call; nothing is cached between requests.

use std::collections::HashMap;

use bridge_types::Rule;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hierarchy::Tree;

/// The rules visible from one node: inherited ancestors plus its own.
///
/// Surfaced to analysts to answer "why does this node have this rule";
/// `has_conflict` flags an override so the UI can call it out, it never
/// changes which rule wins.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RuleStack {
    pub node_id: String,
    /// Ancestor rules, most distant (root) first. Strict ancestors only.
    pub parent_rules: Vec<Rule>,
    /// The node's own rule, if one is attached.
    pub direct_rule: Option<Rule>,
    /// True exactly when a direct rule overrides at least one ancestor rule.
    pub has_conflict: bool,
}

impl RuleStack {
    /// The rule that governs this node's adjusted values: its own rule if
    /// present, else the nearest ancestor rule, else none.
    pub fn effective_rule(&self) -> Option<&Rule> {
        self.direct_rule.as_ref().or_else(|| self.parent_rules.last())
    }

    pub fn is_empty(&self) -> bool {
        self.direct_rule.is_none() && self.parent_rules.is_empty()
    }
}

/// Resolve the rule stack for one node.
///
/// O(depth); termination is guaranteed by the tree's forest invariant.
/// An id absent from the tree yields an empty stack (data quality, not
/// an error).
pub fn resolve_stack(node_id: &str, tree: &Tree, rules: &HashMap<String, Rule>) -> RuleStack {
    let parent_rules: Vec<Rule> = tree
        .ancestors(node_id)
        .iter()
        .filter_map(|ancestor| rules.get(&ancestor.id))
        .cloned()
        .collect();

    let direct_rule = rules.get(node_id).cloned();
    let has_conflict = direct_rule.is_some() && !parent_rules.is_empty();

    if has_conflict {
        debug!(
            node = node_id,
            inherited = parent_rules.len(),
            "direct rule overrides inherited rule(s)"
        );
    }

    RuleStack {
        node_id: node_id.to_string(),
        parent_rules,
        direct_rule,
        has_conflict,
    }
}
