//! Identifier, alias and parameter allocation.

use std::collections::HashMap;

use super::errors::CompileError;
use super::graph::{GraphId, JoinGraph};
use crate::config::CompilerConfig;
use crate::tree::NodeId;

/// Placeholders in tree-traversal order.
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    named: Vec<(String, NodeId)>,
    named_index: HashMap<String, NodeId>,
    anonymous: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
}

impl ParameterRegistry {
    /// Every occurrence of a name must be the same parameter object.
    pub fn register_named(&mut self, name: &str, parameter: NodeId) -> Result<(), CompileError> {
        match self.named_index.get(name) {
            Some(&first) if first != parameter => Err(CompileError::NamedParameterConflict {
                name: name.to_string(),
                first,
                second: parameter,
            }),
            Some(_) => Ok(()),
            None => {
                self.named_index.insert(name.to_string(), parameter);
                self.named.push((name.to_string(), parameter));
                Ok(())
            }
        }
    }

    /// Assigns the next 1-based position; a second encounter is an error.
    pub fn register_anonymous(&mut self, parameter: NodeId) -> Result<usize, CompileError> {
        if self.positions.contains_key(&parameter) {
            return Err(CompileError::AnonymousParameterReused { parameter });
        }
        self.anonymous.push(parameter);
        let position = self.anonymous.len();
        self.positions.insert(parameter, position);
        Ok(position)
    }

    pub fn named(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.named.iter().map(|(name, node)| (name.as_str(), *node))
    }

    pub fn anonymous(&self) -> &[NodeId] {
        &self.anonymous
    }

    pub fn position(&self, parameter: NodeId) -> Option<usize> {
        self.positions.get(&parameter).copied()
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.anonymous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Numbers used nodes pre-order from each root, in root order, and derives
/// their aliases. Returns the number of identifiers handed out.
pub(crate) fn allocate_identifiers(
    graph: &mut JoinGraph,
    roots: &[GraphId],
    config: &CompilerConfig,
) -> u32 {
    let mut next = 0;
    for &root in roots {
        allocate_node(graph, root, config, &mut next);
    }
    log::debug!(
        "Allocated {} identifiers, pruned {} graph nodes",
        next,
        graph.len() as u32 - next
    );
    next
}

fn allocate_node(graph: &mut JoinGraph, id: GraphId, config: &CompilerConfig, next: &mut u32) {
    let node = graph.node_mut(id);
    if node.used && node.identifier.is_none() {
        let identifier = *next;
        *next += 1;
        node.identifier = Some(identifier);
        node.alias = Some(alias_text(
            node.is_shared(),
            node.alias_hint.as_deref(),
            identifier,
            config,
        ));
    }
    let children = node.children.clone();
    for child in children {
        allocate_node(graph, child, config, next);
    }
}

fn alias_text(shared: bool, hint: Option<&str>, identifier: u32, config: &CompilerConfig) -> String {
    match (shared, hint) {
        (true, Some(hint)) => hint.to_string(),
        (true, None) => format!("{}{}", config.shared_alias_prefix, identifier),
        (false, Some(hint)) => format!("{}{}", config.unshared_alias_prefix, hint),
        (false, None) => format!("{}{}", config.unshared_alias_prefix, identifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::graph::GraphNode;
    use crate::tree::{JoinDirection, JoinMode};

    #[test]
    fn test_named_parameters() {
        let mut registry = ParameterRegistry::default();
        registry.register_named("id", NodeId(3)).unwrap();
        registry.register_named("id", NodeId(3)).unwrap();
        assert_eq!(
            registry.register_named("id", NodeId(4)),
            Err(CompileError::NamedParameterConflict {
                name: "id".to_string(),
                first: NodeId(3),
                second: NodeId(4)
            })
        );
        assert_eq!(registry.named().collect::<Vec<_>>(), vec![("id", NodeId(3))]);
    }

    #[test]
    fn test_anonymous_positions() {
        let mut registry = ParameterRegistry::default();
        assert_eq!(registry.register_anonymous(NodeId(8)), Ok(1));
        assert_eq!(registry.register_anonymous(NodeId(2)), Ok(2));
        assert_eq!(
            registry.register_anonymous(NodeId(8)),
            Err(CompileError::AnonymousParameterReused {
                parameter: NodeId(8)
            })
        );
        assert_eq!(registry.position(NodeId(2)), Some(2));
        assert_eq!(registry.anonymous(), &[NodeId(8), NodeId(2)]);
    }

    #[test]
    fn test_pre_order_allocation_skips_unused() {
        let mut graph = JoinGraph::new();
        let root = graph.add_root("Employee", None, NodeId(0));
        let unused = graph.attach(
            root,
            GraphNode::edge("Department", "department", JoinDirection::Left, JoinMode::default(), NodeId(0)),
        );
        let mut fresh = GraphNode::edge("Employee", "supervisor", JoinDirection::Inner, JoinMode::OptionallyCreateNew, NodeId(0));
        fresh.alias_hint = Some("boss".to_string());
        let hinted = graph.attach(root, fresh);
        let plain_new = graph.attach(
            hinted,
            GraphNode::edge("Department", "department", JoinDirection::Inner, JoinMode::RequiredToCreateNew, NodeId(0)),
        );
        graph.set_used(plain_new);

        let config = CompilerConfig::default();
        assert_eq!(allocate_identifiers(&mut graph, &[root], &config), 3);
        assert_eq!(graph.node(root).alias(), Some("shared_alias_0"));
        assert_eq!(graph.node(unused).identifier(), None);
        assert_eq!(graph.node(hinted).alias(), Some("unshared_alias_boss"));
        assert_eq!(graph.node(plain_new).alias(), Some("unshared_alias_2"));
    }
}
