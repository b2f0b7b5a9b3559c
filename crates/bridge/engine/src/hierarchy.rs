//! Hierarchy Model - indexed forest over a snapshot of reporting nodes.
//!
//! The tree is rebuilt from scratch for every computation request. Build
//! validates structure (dangling parents, cycles, duplicate ids) and
//! computes depths; everything else on the snapshot is taken as-is.

use std::collections::HashMap;

use bridge_types::NodeSnapshot;
use tracing::warn;

use crate::error::MalformedHierarchy;

/// Caller-supplied set of known summary/rollup name fragments.
///
/// Upstream snapshots sometimes ship summary nodes with zero children, so
/// childlessness alone cannot classify a leaf; any node whose display name
/// contains one of these fragments (case-insensitive) is treated as an
/// internal rollup regardless of its children.
#[derive(Clone, Debug, Default)]
pub struct SummaryNames {
    fragments: Vec<String>,
}

impl SummaryNames {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|f| f.into().to_lowercase())
                .collect(),
        }
    }

    /// No known summary names; classification falls back to childlessness.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.fragments.iter().any(|f| name.contains(f.as_str()))
    }
}

/// Validated, indexed forest over one hierarchy snapshot.
#[derive(Clone, Debug)]
pub struct Tree {
    nodes: HashMap<String, NodeSnapshot>,
    /// Node ids in snapshot order, for deterministic iteration.
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
    depths: HashMap<String, u32>,
    roots: Vec<String>,
}

impl Tree {
    /// Index and validate a snapshot.
    ///
    /// Fails on the structural corruptions only: a parent id absent from
    /// the node set, a parent chain that loops, or two nodes sharing an id.
    pub fn build(nodes: Vec<NodeSnapshot>) -> Result<Self, MalformedHierarchy> {
        let mut indexed: HashMap<String, NodeSnapshot> = HashMap::with_capacity(nodes.len());
        let mut order = Vec::with_capacity(nodes.len());

        for node in nodes {
            if indexed.contains_key(&node.id) {
                return Err(MalformedHierarchy::DuplicateNode(node.id));
            }
            order.push(node.id.clone());
            indexed.insert(node.id.clone(), node);
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut roots = Vec::new();

        for id in &order {
            let node = &indexed[id];
            match &node.parent_id {
                Some(parent) => {
                    if !indexed.contains_key(parent) {
                        return Err(MalformedHierarchy::DanglingParent {
                            node: id.clone(),
                            parent: parent.clone(),
                        });
                    }
                    children.entry(parent.clone()).or_default().push(id.clone());
                }
                None => roots.push(id.clone()),
            }
        }

        // Parent-chain walk bounded by node count: exceeding it means the
        // chain never reaches a root, i.e. a cycle.
        let mut depths: HashMap<String, u32> = HashMap::with_capacity(order.len());
        let limit = order.len();
        for id in &order {
            let mut depth = 0u32;
            let mut cursor = &indexed[id];
            let mut steps = 0usize;
            while let Some(parent) = &cursor.parent_id {
                steps += 1;
                if steps > limit {
                    return Err(MalformedHierarchy::CycleDetected(id.clone()));
                }
                depth += 1;
                cursor = &indexed[parent];
            }
            depths.insert(id.clone(), depth);
        }

        Ok(Self {
            nodes: indexed,
            order,
            children,
            depths,
            roots,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Depth of a node; roots are 0.
    pub fn depth(&self, id: &str) -> Option<u32> {
        self.depths.get(id).copied()
    }

    /// Child ids in snapshot order; empty for leaves and unknown ids.
    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Root ids in snapshot order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Nodes in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.order.iter().map(|id| &self.nodes[id])
    }

    /// Strict ancestors of a node, most distant (root) first.
    pub fn ancestors(&self, id: &str) -> Vec<&NodeSnapshot> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(id);
        while let Some(node) = cursor {
            cursor = node.parent_id.as_deref().and_then(|p| self.nodes.get(p));
            if let Some(parent) = cursor {
                chain.push(parent);
            }
        }
        chain.reverse();
        chain
    }

    /// Whether a node counts as a leaf for attribution purposes.
    ///
    /// An explicit `is_leaf_hint` always wins. Otherwise a node is a leaf
    /// iff it has no children and its name is not a known summary name.
    /// Unknown ids are never leaves.
    pub fn is_leaf(&self, id: &str, summaries: &SummaryNames) -> bool {
        let Some(node) = self.nodes.get(id) else {
            warn!(node = id, "leaf check on unknown node id");
            return false;
        };
        if let Some(hint) = node.is_leaf_hint {
            return hint;
        }
        self.children(id).is_empty() && !summaries.matches(&node.name)
    }

    /// All leaves in snapshot order.
    pub fn leaves(&self, summaries: &SummaryNames) -> Vec<&NodeSnapshot> {
        self.order
            .iter()
            .filter(|id| self.is_leaf(id, summaries))
            .map(|id| &self.nodes[id])
            .collect()
    }
}
