use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::allocator::ParameterRegistry;
use super::errors::CompileError;
use super::graph::{DeclarationMap, GraphId, GraphNode, JoinGraph};
use super::path_identity::{PathIdAllocator, PathIdentity};
use super::path_optimizer::CompiledPathNode;
use crate::tree::{FreezeError, FreezeGuard, Literal, NodeId, NodeTree};

/// Result of one compilation, and the scope that keeps the compiled tree
/// frozen.
///
/// The tree stays immutable until [`CompiledGraph::close`] is called or the
/// value is dropped.
pub struct CompiledGraph {
    pub(crate) graph: JoinGraph,
    pub(crate) statement_roots: Vec<(NodeId, Vec<GraphId>)>,
    pub(crate) source_graph: DeclarationMap,
    pub(crate) fetch_graph: DeclarationMap,
    pub(crate) path_ids: Rc<[PathIdentity]>,
    pub(crate) paths: HashMap<PathIdentity, CompiledPathNode>,
    pub(crate) parameters: ParameterRegistry,
    pub(crate) literals: Vec<(NodeId, Literal)>,
    pub(crate) strict_schema: bool,
    pub(crate) guard: FreezeGuard,
}

impl CompiledGraph {
    pub fn tree(&self) -> &NodeTree {
        self.guard.tree()
    }

    pub fn is_strict_schema(&self) -> bool {
        self.strict_schema
    }

    pub fn graph(&self) -> &JoinGraph {
        &self.graph
    }

    pub fn graph_node(&self, id: GraphId) -> Option<&GraphNode> {
        self.graph.get(id)
    }

    /// Statements in the order they were compiled, the top-level one first.
    pub fn statements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.statement_roots.iter().map(|(statement, _)| *statement)
    }

    pub fn statement_roots(&self, statement: NodeId) -> &[GraphId] {
        self.statement_roots
            .iter()
            .find(|(s, _)| *s == statement)
            .map(|(_, roots)| roots.as_slice())
            .unwrap_or(&[])
    }

    /// Used nodes, ordered by identifier.
    pub fn used_nodes(&self) -> Vec<(GraphId, &GraphNode)> {
        let mut used: Vec<_> = self
            .graph
            .iter()
            .filter(|(_, node)| node.identifier().is_some())
            .collect();
        used.sort_by_key(|(_, node)| node.identifier());
        used
    }

    pub fn alias(&self, id: GraphId) -> Result<&str, CompileError> {
        self.graph
            .get(id)
            .and_then(GraphNode::alias)
            .ok_or(CompileError::AliasNotAllocated { node: id.0 })
    }

    pub fn lookup(&self, identity: &PathIdentity) -> Result<&CompiledPathNode, CompileError> {
        self.paths
            .get(identity)
            .ok_or_else(|| CompileError::UnknownPathIdentity {
                identity: identity.to_string(),
            })
    }

    /// `alias.field` text of a compiled path.
    pub fn render_path(&self, identity: &PathIdentity) -> Result<String, CompileError> {
        self.lookup(identity)?.render(&self.graph)
    }

    /// Every identity allocated by the compilation, in traversal order.
    pub fn path_identities(&self) -> &[PathIdentity] {
        &self.path_ids
    }

    pub fn named_parameters(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.parameters.named()
    }

    pub fn anonymous_parameters(&self) -> &[NodeId] {
        self.parameters.anonymous()
    }

    /// 1-based position of an anonymous parameter.
    pub fn parameter_position(&self, parameter: NodeId) -> Option<usize> {
        self.parameters.position(parameter)
    }

    pub fn literals(&self) -> &[(NodeId, Literal)] {
        &self.literals
    }

    pub fn source_graph(&self, source: NodeId) -> Option<GraphId> {
        self.source_graph.get(source)
    }

    pub fn fetch_graph(&self, fetch: NodeId) -> Option<GraphId> {
        self.fetch_graph.get(fetch)
    }

    /// Allocator for a renderer walking the same tree again.
    pub fn replay_allocator(&self) -> PathIdAllocator {
        PathIdAllocator::replay(Rc::clone(&self.path_ids))
    }

    /// Releases the tree. Dropping the scope does the same but can only log
    /// a failure.
    pub fn close(mut self) -> Result<(), FreezeError> {
        self.guard.release()
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: GraphId, depth: usize) -> fmt::Result {
        let node = self.graph.node(id);
        write!(f, "{:indent$}", "", indent = depth * 4)?;
        match &node.field {
            None => write!(f, "{}", node.record_type)?,
            Some(field) => write!(
                f,
                "{} join {}{}(mode = {}, used = {})",
                node.direction,
                if node.fetched { "fetch " } else { "" },
                field,
                node.mode,
                node.used
            )?,
        }
        if let Some(alias) = node.alias() {
            write!(f, " as {}", alias)?;
        }
        if node.children.is_empty() {
            return writeln!(f, ";");
        }
        writeln!(f, " {{")?;
        for &child in &node.children {
            self.fmt_node(f, child, depth + 1)?;
        }
        writeln!(f, "{:indent$}}}", "", indent = depth * 4)
    }
}

impl fmt::Display for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, roots) in &self.statement_roots {
            for &root in roots {
                self.fmt_node(f, root, 0)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("owner", &self.guard.owner())
            .field("graph_nodes", &self.graph.len())
            .field("paths", &self.path_ids.len())
            .field("parameters", &self.parameters.len())
            .finish()
    }
}
