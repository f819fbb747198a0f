//! Path compilation: turns every path occurrence into a chain of graph-node
//! and field references, joining implicitly where navigation requires it and
//! collapsing joins that a plain column reference can replace.

use super::errors::CompileError;
use super::graph::{self, DeclarationMap, GraphId, JoinGraph};
use super::path_identity::PathIdentity;
use crate::schema::SchemaProvider;
use crate::tree::{JoinDirection, Node, NodeId, NodeTree, SourceKind, TreeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    /// The path resolves to a joined entity.
    Graph(GraphId),
    /// The path resolves to a field of its parent.
    Field(String),
}

/// One link of a compiled path, pointing towards the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPathNode {
    pub treat_as: Option<String>,
    pub parent: Option<Box<CompiledPathNode>>,
    pub target: PathTarget,
}

impl CompiledPathNode {
    fn graph(id: GraphId, parent: Option<CompiledPathNode>) -> Self {
        CompiledPathNode {
            treat_as: None,
            parent: parent.map(Box::new),
            target: PathTarget::Graph(id),
        }
    }

    fn field(field: &str, parent: CompiledPathNode) -> Self {
        CompiledPathNode {
            treat_as: None,
            parent: Some(Box::new(parent)),
            target: PathTarget::Field(field.to_string()),
        }
    }

    pub fn graph_node(&self) -> Option<GraphId> {
        match self.target {
            PathTarget::Graph(id) => Some(id),
            PathTarget::Field(_) => None,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match &self.target {
            PathTarget::Field(field) => Some(field),
            PathTarget::Graph(_) => None,
        }
    }

    pub fn parent(&self) -> Option<&CompiledPathNode> {
        self.parent.as_deref()
    }

    /// Links from the root down to this node.
    pub fn chain(&self) -> Vec<&CompiledPathNode> {
        let mut links = Vec::new();
        let mut current = Some(self);
        while let Some(link) = current {
            links.push(link);
            current = link.parent();
        }
        links.reverse();
        links
    }

    /// Closest graph node on the chain, this node included.
    pub fn nearest_graph_node(&self) -> Option<GraphId> {
        self.chain().into_iter().rev().find_map(CompiledPathNode::graph_node)
    }

    /// `alias.field` text with allocated aliases.
    pub fn render(&self, graph: &JoinGraph) -> Result<String, CompileError> {
        let base = match &self.target {
            PathTarget::Graph(id) => graph
                .node(*id)
                .alias()
                .map(str::to_string)
                .ok_or(CompileError::AliasNotAllocated { node: id.0 })?,
            PathTarget::Field(field) => match self.parent() {
                Some(parent) => format!("{}.{}", parent.render(graph)?, field),
                None => field.clone(),
            },
        };
        Ok(match &self.treat_as {
            Some(as_type) => format!("treat({} as {})", base, as_type),
            None => base,
        })
    }
}

pub(crate) struct PathOptimizer<'a> {
    tree: &'a NodeTree,
    schema: &'a dyn SchemaProvider,
    strict_schema: bool,
    graph: &'a mut JoinGraph,
    source_graph: &'a DeclarationMap,
}

impl<'a> PathOptimizer<'a> {
    pub(crate) fn new(
        tree: &'a NodeTree,
        schema: &'a dyn SchemaProvider,
        strict_schema: bool,
        graph: &'a mut JoinGraph,
        source_graph: &'a DeclarationMap,
    ) -> Self {
        PathOptimizer {
            tree,
            schema,
            strict_schema,
            graph,
            source_graph,
        }
    }

    pub(crate) fn optimize(&mut self, identity: &PathIdentity) -> Result<CompiledPathNode, CompileError> {
        let compiled = self.compile(identity.node(), true, identity.is_directly_selected())?;
        log::trace!("Path {} compiled to {:?}", identity, compiled.target);
        Ok(compiled)
    }

    /// `selected` is only meaningful for the leaf.
    fn compile(&mut self, id: NodeId, leaf: bool, selected: bool) -> Result<CompiledPathNode, CompileError> {
        match self.tree.node(id)? {
            Node::Source(source) => {
                if let SourceKind::Join {
                    parent,
                    field,
                    direction,
                    ..
                } = &source.kind
                {
                    if leaf && !selected && self.is_left_or_guaranteed(*parent, field, *direction)? {
                        let parent = self.compile(*parent, false, false)?;
                        return Ok(CompiledPathNode::field(field, parent));
                    }
                }
                let resolved = self.resolved_source(id)?;
                self.graph.set_used(resolved);
                let parent = match source.kind {
                    SourceKind::Join { parent, .. } => Some(self.compile(parent, false, false)?),
                    _ => None,
                };
                Ok(CompiledPathNode::graph(resolved, parent))
            }
            Node::Path(path) => {
                let parent_type = self.record_type_of(path.parent)?;
                let field = self.schema.field(&parent_type, &path.field)?.clone();

                if leaf && field.is_id() {
                    if let Some(collapsed) = self.collapse_identifier(path.parent, &path.field)? {
                        return Ok(collapsed);
                    }
                }

                if field.is_relation() && (!leaf || (selected && field.is_to_one())) {
                    let parent = self.compile(path.parent, false, false)?;
                    let Some(parent_node) = parent.graph_node() else {
                        return Err(CompileError::InvalidNavigation {
                            record_type: parent_type,
                            field: path.field,
                            reason: "the parent path does not resolve to a joined entity",
                        });
                    };
                    let joined = graph::implicitly_join(self.graph, self.schema, parent_node, &path.field)?;
                    self.graph.set_used(joined);
                    return Ok(CompiledPathNode::graph(joined, Some(parent)));
                }

                if !leaf {
                    return Err(CompileError::InvalidNavigation {
                        record_type: parent_type,
                        field: path.field,
                        reason: "a scalar field cannot be navigated",
                    });
                }
                let parent = self.compile(path.parent, false, false)?;
                Ok(CompiledPathNode::field(&path.field, parent))
            }
            Node::Treat(treat) => {
                self.schema.require_record_type(&treat.as_type)?;
                let mut compiled = self.compile(treat.target, leaf, selected)?;
                compiled.treat_as = Some(treat.as_type);
                Ok(compiled)
            }
            other => Err(TreeError::InvalidPathParent {
                node: id,
                found: other.kind_name(),
            }
            .into()),
        }
    }

    /// Identifier access through a join that a foreign-key column can stand
    /// in for.
    fn collapse_identifier(
        &mut self,
        parent: NodeId,
        id_field: &str,
    ) -> Result<Option<CompiledPathNode>, CompileError> {
        match self.tree.node(parent)? {
            Node::Source(source) => {
                if let SourceKind::Join {
                    parent: owner,
                    field,
                    direction,
                    ..
                } = source.kind
                {
                    if self.is_left_or_guaranteed(owner, &field, direction)? {
                        let owner = self.compile(owner, false, false)?;
                        let relation = CompiledPathNode::field(&field, owner);
                        return Ok(Some(CompiledPathNode::field(id_field, relation)));
                    }
                }
            }
            Node::Path(path) => {
                let owner_type = self.record_type_of(path.parent)?;
                if self.schema.field(&owner_type, &path.field)?.is_to_one() {
                    let owner = self.compile(path.parent, false, false)?;
                    let relation = CompiledPathNode::field(&path.field, owner);
                    return Ok(Some(CompiledPathNode::field(id_field, relation)));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    /// A to-one relation that is declared left, or that is guaranteed to be
    /// present when the schema is trusted.
    fn is_left_or_guaranteed(
        &self,
        owner: NodeId,
        field: &str,
        direction: JoinDirection,
    ) -> Result<bool, CompileError> {
        let owner_type = self.record_type_of(owner)?;
        let schema = self.schema.field(&owner_type, field)?;
        Ok(schema.is_to_one()
            && (direction == JoinDirection::Left
                || (self.strict_schema && schema.is_guaranteed_present())))
    }

    fn resolved_source(&self, source: NodeId) -> Result<GraphId, CompileError> {
        self.source_graph.get(source).ok_or_else(|| {
            TreeError::NotASource {
                node: source,
                found: "unresolved source",
            }
            .into()
        })
    }

    fn record_type_of(&self, id: NodeId) -> Result<String, CompileError> {
        match self.tree.node(id)? {
            Node::Source(_) => {
                let resolved = self.resolved_source(id)?;
                Ok(self.graph.node(resolved).record_type.clone())
            }
            Node::Path(path) => {
                let owner = self.record_type_of(path.parent)?;
                graph::relation_target(self.schema, &owner, &path.field)
            }
            Node::Treat(treat) => {
                self.schema.require_record_type(&treat.as_type)?;
                Ok(treat.as_type)
            }
            other => Err(TreeError::InvalidPathParent {
                node: id,
                found: other.kind_name(),
            }
            .into()),
        }
    }
}
