/// Structural hierarchy corruption. The only fatal condition the engine
/// raises: everything value-shaped degrades to zero/empty instead.
#[derive(Debug, thiserror::Error)]
pub enum MalformedHierarchy {
    #[error("node '{node}' references missing parent '{parent}'")]
    DanglingParent { node: String, parent: String },
    #[error("cycle detected in parent chain at node '{0}'")]
    CycleDetected(String),
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),
}
