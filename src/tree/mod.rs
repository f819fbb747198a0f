//! The declarative query tree handed to the compiler.
//!
//! Nodes live in an arena owned by a shared [`NodeTree`] handle and are
//! addressed by [`NodeId`]. Callers build the tree through the builder methods
//! (see `builder.rs`) or from a YAML [`QueryDocument`]; the compiler then
//! reads it and freezes every node it visits for the lifetime of the
//! compilation.
//!
//! ## Key Types
//!
//! - [`NodeTree`]: shared handle over the arena and the per-node freeze state
//! - [`Node`]: statements, sources, fetches, paths, treats, placeholders,
//!   literals and operator expressions
//! - [`FreezeGuard`]: scoped owner of the freezes taken by one compilation

mod builder;
pub mod document;
pub mod errors;
pub mod freeze;
pub mod node;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub use document::QueryDocument;
pub use errors::{DocumentError, FreezeError, TreeError};
pub use freeze::{CompilationId, FreezeGuard};
pub use node::{
    Assignment, CollectionFetch, Expression, Fetch, JoinDirection, JoinMode, Literal, Node,
    NodeId, Operator, Order, Parameter, PathExpr, Source, SourceKind, Statement, StatementKind,
    Treat,
};

use freeze::FreezeState;

struct TreeInner {
    nodes: RefCell<Vec<Node>>,
    freeze: RefCell<Vec<FreezeState>>,
    top: NodeId,
}

/// Shared handle over one query tree. Clones point at the same arena.
#[derive(Clone)]
pub struct NodeTree {
    inner: Rc<TreeInner>,
}

impl NodeTree {
    pub fn new(kind: StatementKind) -> Self {
        let top = Node::Statement(Statement::new(kind, None));
        NodeTree {
            inner: Rc::new(TreeInner {
                nodes: RefCell::new(vec![top]),
                freeze: RefCell::new(vec![FreezeState::default()]),
                top: NodeId(0),
            }),
        }
    }

    pub fn query() -> Self {
        Self::new(StatementKind::Query)
    }

    pub fn update() -> Self {
        Self::new(StatementKind::Update)
    }

    pub fn delete() -> Self {
        Self::new(StatementKind::Delete)
    }

    /// The top-level statement created with the tree.
    pub fn top_statement(&self) -> NodeId {
        self.inner.top
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.len()
    }

    /// Whether two handles share one arena.
    pub fn same_tree(&self, other: &NodeTree) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Snapshot of one node.
    pub fn node(&self, node: NodeId) -> Result<Node, TreeError> {
        self.inner
            .nodes
            .borrow()
            .get(node.index())
            .cloned()
            .ok_or(TreeError::UnknownNode { node })
    }

    pub fn statement(&self, node: NodeId) -> Result<Statement, TreeError> {
        match self.node(node)? {
            Node::Statement(statement) => Ok(statement),
            other => Err(TreeError::NotAStatement {
                node,
                found: other.kind_name(),
            }),
        }
    }

    pub fn source(&self, node: NodeId) -> Result<Source, TreeError> {
        match self.node(node)? {
            Node::Source(source) => Ok(source),
            other => Err(TreeError::NotASource {
                node,
                found: other.kind_name(),
            }),
        }
    }

    /// Follows correlations until a root or join source is reached.
    pub fn resolve_correlation(&self, mut node: NodeId) -> Result<NodeId, TreeError> {
        loop {
            match self.source(node)?.kind {
                SourceKind::Correlated { of } => node = of,
                _ => return Ok(node),
            }
        }
    }

    /// Whether `ancestor` is `statement` itself or encloses it.
    pub fn statement_encloses(
        &self,
        ancestor: NodeId,
        statement: NodeId,
    ) -> Result<bool, TreeError> {
        let mut current = Some(statement);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(true);
            }
            current = self.statement(node)?.parent;
        }
        Ok(false)
    }

    pub(crate) fn push_node(&self, node: Node) -> NodeId {
        let mut nodes = self.inner.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push(node);
        self.inner.freeze.borrow_mut().push(FreezeState::default());
        id
    }

    /// Applies `f` to a node that is known to exist and is not frozen.
    pub(crate) fn mutate<T>(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut Node) -> Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        if !self.contains(node) {
            return Err(TreeError::UnknownNode { node });
        }
        if self.is_frozen(node) {
            return Err(TreeError::Frozen { node });
        }
        let mut nodes = self.inner.nodes.borrow_mut();
        f(&mut nodes[node.index()])
    }
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("top", &self.inner.top)
            .field("nodes", &self.inner.nodes.borrow().len())
            .finish()
    }
}
