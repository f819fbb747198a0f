//! Entity/fetch graph: one node per root and per resolved join edge.
//!
//! ## Key Types
//!
//! - [`JoinGraph`]: arena of [`GraphNode`]s addressed by [`GraphId`]
//! - [`DeclarationMap`]: ordered map from a tree declaration (source or fetch)
//!   to the graph node it resolved to
//!
//! Explicit joins are resolved while the tree is traversed
//! ([`build_source`]), implicit joins are added by the path optimizer
//! ([`implicitly_join`]) and fetches are merged last ([`merge_fetches`]).

use std::collections::HashMap;
use std::fmt;

use super::errors::CompileError;
use super::join_mode::{self, JoinOrigin, JoinRequest};
use crate::schema::SchemaProvider;
use crate::tree::{
    CollectionFetch, JoinDirection, JoinMode, Node, NodeId, NodeTree, SourceKind, TreeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub u32);

impl GraphId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub record_type: String,
    /// Relation the node was reached through; `None` for roots.
    pub field: Option<String>,
    pub direction: JoinDirection,
    pub mode: JoinMode,
    pub used: bool,
    pub fetched: bool,
    pub explicit: bool,
    pub on: Option<NodeId>,
    pub alias_hint: Option<String>,
    pub parent: Option<GraphId>,
    pub children: Vec<GraphId>,
    /// Statement declaring the root this node hangs off.
    pub statement: NodeId,
    pub(crate) identifier: Option<u32>,
    pub(crate) alias: Option<String>,
}

impl GraphNode {
    pub(crate) fn edge(
        record_type: &str,
        field: &str,
        direction: JoinDirection,
        mode: JoinMode,
        statement: NodeId,
    ) -> Self {
        GraphNode {
            record_type: record_type.to_string(),
            field: Some(field.to_string()),
            direction,
            mode,
            used: false,
            fetched: false,
            explicit: false,
            on: None,
            alias_hint: None,
            parent: None,
            children: Vec::new(),
            statement,
            identifier: None,
            alias: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Roots and merge-mode edges may be referenced from anywhere in the
    /// statement; create-new edges are single-use.
    pub fn is_shared(&self) -> bool {
        self.is_root() || !self.mode.is_new()
    }

    /// Sequential identifier; `None` when the node was pruned.
    pub fn identifier(&self) -> Option<u32> {
        self.identifier
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct JoinGraph {
    nodes: Vec<GraphNode>,
}

impl JoinGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: GraphId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    /// Ids are only handed out by this graph, so lookups cannot miss.
    pub fn node(&self, id: GraphId) -> &GraphNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: GraphId) -> &mut GraphNode {
        &mut self.nodes[id.index()]
    }

    pub fn children(&self, id: GraphId) -> &[GraphId] {
        &self.node(id).children
    }

    pub fn iter(&self) -> impl Iterator<Item = (GraphId, &GraphNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (GraphId(i as u32), node))
    }

    /// Roots are always part of the statement and start out used.
    pub(crate) fn add_root(
        &mut self,
        record_type: &str,
        alias_hint: Option<String>,
        statement: NodeId,
    ) -> GraphId {
        let id = GraphId(self.nodes.len() as u32);
        self.nodes.push(GraphNode {
            record_type: record_type.to_string(),
            field: None,
            direction: JoinDirection::Inner,
            mode: JoinMode::default(),
            used: true,
            fetched: false,
            explicit: true,
            on: None,
            alias_hint,
            parent: None,
            children: Vec::new(),
            statement,
            identifier: None,
            alias: None,
        });
        id
    }

    pub(crate) fn attach(&mut self, parent: GraphId, mut node: GraphNode) -> GraphId {
        let id = GraphId(self.nodes.len() as u32);
        node.parent = Some(parent);
        self.nodes.push(node);
        self.node_mut(parent).children.push(id);
        id
    }

    /// Marks `id` and every ancestor used.
    pub fn set_used(&mut self, id: GraphId) {
        let mut current = Some(id);
        while let Some(node) = current {
            let node = self.node_mut(node);
            node.used = true;
            current = node.parent;
        }
    }

    /// Marks `id` fetched; fetched nodes are used and explicit with their
    /// ancestors.
    pub fn set_fetched(&mut self, id: GraphId) {
        self.node_mut(id).fetched = true;
        self.set_used(id);
        let mut current = Some(id);
        while let Some(node) = current {
            let node = self.node_mut(node);
            node.explicit = true;
            current = node.parent;
        }
    }

    /// Dotted relation path from the root, for diagnostics.
    pub fn describe(&self, id: GraphId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            parts.push(node.field.clone().unwrap_or_else(|| node.record_type.clone()));
            current = node.parent;
        }
        parts.reverse();
        parts.join(".")
    }
}

/// Declaration handle to graph node, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct DeclarationMap {
    entries: Vec<(NodeId, GraphId)>,
    index: HashMap<NodeId, GraphId>,
}

impl DeclarationMap {
    pub(crate) fn insert(&mut self, declaration: NodeId, node: GraphId) {
        if self.index.insert(declaration, node).is_none() {
            self.entries.push((declaration, node));
        }
    }

    pub fn get(&self, declaration: NodeId) -> Option<GraphId> {
        self.index.get(&declaration).copied()
    }

    pub fn contains(&self, declaration: NodeId) -> bool {
        self.index.contains_key(&declaration)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, GraphId)> + '_ {
        self.entries.iter().copied()
    }
}

/// Resolves `source` and its declared joins, recursively, under `parent`
/// (`None` for a root). Every source handle is recorded in `source_graph`.
pub(crate) fn build_source(
    graph: &mut JoinGraph,
    tree: &NodeTree,
    schema: &dyn SchemaProvider,
    source_id: NodeId,
    parent: Option<GraphId>,
    source_graph: &mut DeclarationMap,
) -> Result<GraphId, CompileError> {
    let source = tree.source(source_id)?;
    let resolved = match (&source.kind, parent) {
        (SourceKind::Root { record_type }, None) => {
            schema.require_record_type(record_type)?;
            graph.add_root(record_type, source.alias.clone(), source.statement)
        }
        (
            SourceKind::Join {
                field,
                direction,
                mode,
                on,
                ..
            },
            Some(parent),
        ) => {
            let parent_type = graph.node(parent).record_type.clone();
            let target = relation_target(schema, &parent_type, field)?;
            join_mode::resolve(
                graph,
                parent,
                &JoinRequest {
                    field,
                    target_type: &target,
                    direction: *direction,
                    mode: *mode,
                    alias: source.alias.as_deref(),
                    on: *on,
                    origin: JoinOrigin::Explicit,
                },
            )?
            .id()
        }
        _ => {
            return Err(TreeError::NotASource {
                node: source_id,
                found: "misplaced source",
            }
            .into())
        }
    };
    source_graph.insert(source_id, resolved);
    for &join in &source.joins {
        build_source(graph, tree, schema, join, Some(resolved), source_graph)?;
    }
    Ok(resolved)
}

/// Finds or synthesizes the inner join for navigating `field` from `parent`.
pub(crate) fn implicitly_join(
    graph: &mut JoinGraph,
    schema: &dyn SchemaProvider,
    parent: GraphId,
    field: &str,
) -> Result<GraphId, CompileError> {
    let parent_type = graph.node(parent).record_type.clone();
    let target = relation_target(schema, &parent_type, field)?;
    let resolution = join_mode::resolve(
        graph,
        parent,
        &JoinRequest {
            field,
            target_type: &target,
            direction: JoinDirection::Inner,
            mode: JoinMode::OptionallyMergeExisting,
            alias: None,
            on: None,
            origin: JoinOrigin::Implicit,
        },
    )?;
    Ok(resolution.id())
}

/// Merges every fetch declared on a mapped source, in declaration order.
pub(crate) fn merge_fetches(
    graph: &mut JoinGraph,
    tree: &NodeTree,
    schema: &dyn SchemaProvider,
    source_graph: &DeclarationMap,
    fetch_graph: &mut DeclarationMap,
) -> Result<(), CompileError> {
    for (source, node) in source_graph.iter() {
        let fetches = tree.source(source)?.fetches;
        for fetch in fetches {
            merge_fetch(graph, tree, schema, node, fetch, fetch_graph)?;
        }
    }
    Ok(())
}

fn merge_fetch(
    graph: &mut JoinGraph,
    tree: &NodeTree,
    schema: &dyn SchemaProvider,
    parent: GraphId,
    fetch_id: NodeId,
    fetch_graph: &mut DeclarationMap,
) -> Result<(), CompileError> {
    let fetch = match tree.node(fetch_id)? {
        Node::Fetch(fetch) => fetch,
        other => {
            return Err(TreeError::NotAFetchParent {
                node: fetch_id,
                found: other.kind_name(),
            }
            .into())
        }
    };
    let parent_type = graph.node(parent).record_type.clone();
    let field = schema.field(&parent_type, &fetch.field)?.clone();
    let Some(target) = field.target() else {
        return Err(CompileError::InvalidNavigation {
            record_type: parent_type,
            field: fetch.field,
            reason: "only relations can be fetched",
        });
    };

    // A full collection fetch only rides on an edge that is already fetched.
    let reusable = graph.children(parent).iter().copied().find(|&candidate| {
        let node = graph.node(candidate);
        node.field.as_deref() == Some(fetch.field.as_str())
            && !node.mode.is_new()
            && node.on.is_none()
            && (fetch.collection == CollectionFetch::Partial || field.is_to_one() || node.fetched)
    });
    let resolved = match reusable {
        Some(existing) => {
            let node = graph.node_mut(existing);
            if node.direction != fetch.direction {
                log::debug!(
                    "Fetch of `{}` forces merged join to inner ({} vs {})",
                    fetch.field,
                    node.direction,
                    fetch.direction
                );
                node.direction = JoinDirection::Inner;
            }
            existing
        }
        None => {
            let statement = graph.node(parent).statement;
            log::trace!("Fetch of `{}` synthesizes a new edge", fetch.field);
            graph.attach(
                parent,
                GraphNode::edge(
                    target,
                    &fetch.field,
                    fetch.direction,
                    JoinMode::OptionallyMergeExisting,
                    statement,
                ),
            )
        }
    };
    graph.set_fetched(resolved);
    fetch_graph.insert(fetch_id, resolved);
    for nested in fetch.fetches {
        merge_fetch(graph, tree, schema, resolved, nested, fetch_graph)?;
    }
    Ok(())
}

/// Target record type of the relation `record_type.field`.
pub(crate) fn relation_target(
    schema: &dyn SchemaProvider,
    record_type: &str,
    field: &str,
) -> Result<String, CompileError> {
    let field_schema = schema.field(record_type, field)?;
    field_schema
        .target()
        .map(str::to_string)
        .ok_or_else(|| CompileError::InvalidNavigation {
            record_type: record_type.to_string(),
            field: field.to_string(),
            reason: "field is not a relation",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_root() -> (JoinGraph, GraphId) {
        let mut graph = JoinGraph::new();
        let root = graph.add_root("Employee", None, NodeId(0));
        (graph, root)
    }

    #[test]
    fn test_used_propagates_to_ancestors() {
        let (mut graph, root) = graph_with_root();
        graph.node_mut(root).used = false;
        let dept = graph.attach(
            root,
            GraphNode::edge("Department", "department", JoinDirection::Inner, JoinMode::default(), NodeId(0)),
        );
        let company = graph.attach(
            dept,
            GraphNode::edge("Company", "company", JoinDirection::Inner, JoinMode::default(), NodeId(0)),
        );
        graph.set_used(company);
        assert!(graph.node(root).used);
        assert!(graph.node(dept).used);
        assert!(graph.node(company).used);
        assert_eq!(graph.describe(company), "Employee.department.company");
    }

    #[test]
    fn test_fetched_implies_explicit_and_used() {
        let (mut graph, root) = graph_with_root();
        let dept = graph.attach(
            root,
            GraphNode::edge("Department", "department", JoinDirection::Left, JoinMode::default(), NodeId(0)),
        );
        assert!(!graph.node(dept).explicit);
        graph.set_fetched(dept);
        let node = graph.node(dept);
        assert!(node.fetched && node.explicit && node.used);
    }

    #[test]
    fn test_declaration_map_keeps_order() {
        let mut map = DeclarationMap::default();
        map.insert(NodeId(5), GraphId(0));
        map.insert(NodeId(2), GraphId(1));
        map.insert(NodeId(5), GraphId(0));
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![(NodeId(5), GraphId(0)), (NodeId(2), GraphId(1))]);
    }
}
