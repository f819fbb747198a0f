//! Join-mode resolution: decides whether a join request reuses a sibling
//! edge under the same parent or becomes a new edge.
//!
//! A request in a merge mode reuses the first sibling reached through the same
//! relation whose own mode is not create-new. The merged edge becomes `inner`
//! when the directions disagree, adopts the request's alias hint, and is
//! upgraded to the required variant when a required request lands on it.
//! On-conditions only ever live on the edge that declared them: an explicit
//! request may neither bring one onto an existing edge nor merge into an edge
//! that already carries one, and implicit requests skip such edges.
//!
//! Resolution marks an edge used only for required or conditioned requests.
//! Navigation that needs an edge marks it itself.

pub use crate::tree::{JoinDirection, JoinMode};

use super::errors::CompileError;
use super::graph::{GraphId, GraphNode, JoinGraph};
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOrigin {
    /// Declared by the caller on a source.
    Explicit,
    /// Synthesized for path navigation.
    Implicit,
}

#[derive(Debug, Clone)]
pub struct JoinRequest<'a> {
    pub field: &'a str,
    pub target_type: &'a str,
    pub direction: JoinDirection,
    pub mode: JoinMode,
    pub alias: Option<&'a str>,
    pub on: Option<NodeId>,
    pub origin: JoinOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created(GraphId),
    Merged(GraphId),
}

impl Resolution {
    pub fn id(self) -> GraphId {
        match self {
            Resolution::Created(id) | Resolution::Merged(id) => id,
        }
    }
}

/// First sibling under `parent` that a merge-mode request for `field` may
/// reuse.
pub fn find_mergeable(
    graph: &JoinGraph,
    parent: GraphId,
    field: &str,
    origin: JoinOrigin,
) -> Option<GraphId> {
    graph.children(parent).iter().copied().find(|&child| {
        let node = graph.node(child);
        node.field.as_deref() == Some(field)
            && !node.mode.is_new()
            && (origin == JoinOrigin::Explicit || node.on.is_none())
    })
}

pub fn merged_direction(existing: JoinDirection, requested: JoinDirection) -> JoinDirection {
    if existing == requested {
        existing
    } else {
        JoinDirection::Inner
    }
}

pub fn resolve(
    graph: &mut JoinGraph,
    parent: GraphId,
    request: &JoinRequest<'_>,
) -> Result<Resolution, CompileError> {
    let candidate = if request.mode.is_new() {
        None
    } else {
        find_mergeable(graph, parent, request.field, request.origin)
    };

    let Some(existing) = candidate else {
        return Ok(Resolution::Created(create(graph, parent, request)));
    };

    let node = graph.node_mut(existing);
    if request.on.is_some() || node.on.is_some() {
        return Err(CompileError::OnConditionOnMergedJoin {
            field: request.field.to_string(),
        });
    }
    if let Some(requested) = request.alias {
        match &node.alias_hint {
            Some(current) if current != requested => {
                return Err(CompileError::ConflictingAliases {
                    field: request.field.to_string(),
                    existing: current.clone(),
                    requested: requested.to_string(),
                })
            }
            _ => node.alias_hint = Some(requested.to_string()),
        }
    }
    let direction = merged_direction(node.direction, request.direction);
    if direction != node.direction {
        log::debug!(
            "Join `{}` merged with direction {} over {}, forcing inner",
            request.field,
            request.direction,
            node.direction
        );
        node.direction = direction;
    }
    if request.mode.is_required() && !node.mode.is_required() {
        node.mode = node.mode.to_required();
    }
    if request.origin == JoinOrigin::Explicit {
        node.explicit = true;
    }
    if request.mode.is_required() {
        graph.set_used(existing);
    }
    log::trace!("Join `{}` merged into {}", request.field, existing);
    Ok(Resolution::Merged(existing))
}

fn create(graph: &mut JoinGraph, parent: GraphId, request: &JoinRequest<'_>) -> GraphId {
    let statement = graph.node(parent).statement;
    let mut node = GraphNode::edge(
        request.target_type,
        request.field,
        request.direction,
        request.mode,
        statement,
    );
    node.on = request.on;
    node.alias_hint = request.alias.map(str::to_string);
    node.explicit = request.origin == JoinOrigin::Explicit;
    let id = graph.attach(parent, node);
    if request.mode.is_required() || request.on.is_some() {
        graph.set_used(id);
    }
    if request.origin == JoinOrigin::Implicit {
        log::debug!(
            "Synthesized implicit join `{}` under {}",
            request.field,
            graph.describe(parent)
        );
    }
    id
}
