//! Reentrant freeze lock over tree nodes.
//!
//! A compilation freezes every node it visits. Freezing is counted per node so
//! that shared substructure visited twice by the same compilation unfreezes
//! only when the last hold is released. A node held by one compilation cannot
//! be frozen by another, and no frozen node accepts mutations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::errors::FreezeError;
use super::node::NodeId;
use super::NodeTree;

static NEXT_COMPILATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique owner token of one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompilationId(u64);

impl CompilationId {
    pub fn next() -> Self {
        CompilationId(NEXT_COMPILATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CompilationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FreezeState {
    pub(crate) owner: Option<CompilationId>,
    pub(crate) count: u32,
}

impl NodeTree {
    pub fn freeze(&self, node: NodeId, owner: CompilationId) -> Result<(), FreezeError> {
        let mut states = self.inner.freeze.borrow_mut();
        let state = states
            .get_mut(node.index())
            .ok_or(FreezeError::UnknownNode { node })?;
        match state.owner {
            Some(current) if current != owner => Err(FreezeError::FrozenByOther {
                node,
                owner: current.value(),
            }),
            _ => {
                state.owner = Some(owner);
                state.count += 1;
                Ok(())
            }
        }
    }

    pub fn unfreeze(&self, node: NodeId, owner: CompilationId) -> Result<(), FreezeError> {
        let mut states = self.inner.freeze.borrow_mut();
        let state = states
            .get_mut(node.index())
            .ok_or(FreezeError::UnknownNode { node })?;
        match state.owner {
            None => Err(FreezeError::NotFrozen { node }),
            Some(current) if current != owner => Err(FreezeError::NotOwner {
                node,
                owner: current.value(),
                requester: owner.value(),
            }),
            Some(_) => {
                state.count -= 1;
                if state.count == 0 {
                    state.owner = None;
                }
                Ok(())
            }
        }
    }

    /// The compilation currently holding `node`, if any.
    pub fn frozen_by(&self, node: NodeId) -> Option<CompilationId> {
        self.inner
            .freeze
            .borrow()
            .get(node.index())
            .and_then(|state| state.owner)
    }

    pub fn is_frozen(&self, node: NodeId) -> bool {
        self.frozen_by(node).is_some()
    }
}

/// Scoped holder of every freeze taken by one compilation.
///
/// Each successful [`FreezeGuard::freeze`] is recorded and undone in reverse
/// order by [`FreezeGuard::release`], which `Drop` calls as well.
pub struct FreezeGuard {
    tree: NodeTree,
    owner: CompilationId,
    frozen: Vec<NodeId>,
}

impl FreezeGuard {
    pub fn new(tree: &NodeTree) -> Self {
        FreezeGuard {
            tree: tree.clone(),
            owner: CompilationId::next(),
            frozen: Vec::new(),
        }
    }

    pub fn owner(&self) -> CompilationId {
        self.owner
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn freeze(&mut self, node: NodeId) -> Result<(), FreezeError> {
        self.tree.freeze(node, self.owner)?;
        self.frozen.push(node);
        Ok(())
    }

    /// Number of holds currently taken, counting reentrant ones.
    pub fn holds(&self) -> usize {
        self.frozen.len()
    }

    /// Release every hold. All holds are attempted; the first failure is
    /// returned. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<(), FreezeError> {
        let mut first_error = None;
        while let Some(node) = self.frozen.pop() {
            if let Err(e) = self.tree.unfreeze(node, self.owner) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        if self.frozen.is_empty() {
            return;
        }
        log::debug!(
            "Releasing {} freeze holds of compilation {}",
            self.frozen.len(),
            self.owner
        );
        if let Err(e) = self.release() {
            log::warn!("Failed to release frozen nodes: {}", e);
        }
    }
}

impl fmt::Debug for FreezeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreezeGuard")
            .field("owner", &self.owner)
            .field("holds", &self.frozen.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reentrant_freeze_counts() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let owner = CompilationId::next();
        tree.freeze(stmt, owner).unwrap();
        tree.freeze(stmt, owner).unwrap();
        tree.unfreeze(stmt, owner).unwrap();
        assert_eq!(tree.frozen_by(stmt), Some(owner));
        tree.unfreeze(stmt, owner).unwrap();
        assert!(!tree.is_frozen(stmt));
        assert_eq!(
            tree.unfreeze(stmt, owner),
            Err(FreezeError::NotFrozen { node: stmt })
        );
    }

    #[test]
    fn test_foreign_owner_rejected() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let first = CompilationId::next();
        let second = CompilationId::next();
        tree.freeze(stmt, first).unwrap();
        assert_eq!(
            tree.freeze(stmt, second),
            Err(FreezeError::FrozenByOther {
                node: stmt,
                owner: first.value()
            })
        );
        assert_eq!(
            tree.unfreeze(stmt, second),
            Err(FreezeError::NotOwner {
                node: stmt,
                owner: first.value(),
                requester: second.value()
            })
        );
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        {
            let mut guard = FreezeGuard::new(&tree);
            guard.freeze(stmt).unwrap();
            guard.freeze(stmt).unwrap();
            assert_eq!(guard.holds(), 2);
            assert!(tree.is_frozen(stmt));
        }
        assert!(!tree.is_frozen(stmt));
    }

    #[test]
    fn test_unknown_node() {
        let tree = NodeTree::query();
        let missing = NodeId(999);
        assert_eq!(
            tree.freeze(missing, CompilationId::next()),
            Err(FreezeError::UnknownNode { node: missing })
        );
    }
}
