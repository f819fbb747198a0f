use std::collections::HashMap;

use crate::config::CompilerConfig;
use crate::schema::SchemaProvider;
use crate::tree::{FreezeGuard, NodeTree};

use graph::{DeclarationMap, GraphId};
use path_optimizer::PathOptimizer;
use traversal::PreVisitor;

mod allocator;
mod compiled;
mod errors;
pub mod graph;
pub mod join_mode;
pub mod path_identity;
pub mod path_optimizer;
mod traversal;


pub use allocator::ParameterRegistry;
pub use compiled::CompiledGraph;
pub use errors::CompileError;
pub use graph::{GraphNode, JoinGraph};
pub use join_mode::{JoinOrigin, JoinRequest, Resolution};
pub use path_identity::{Clause, PathIdAllocator, PathIdentity, StackEntry};
pub use path_optimizer::{CompiledPathNode, PathTarget};

/// Compiles `tree` into its join graph.
///
/// Phases run strictly in order: traversal with the explicit graph, path
/// compilation with implicit joins, fetch merge, then identifier allocation.
/// On error every node frozen so far is released before returning.
pub fn compile(
    tree: &NodeTree,
    schema: &dyn SchemaProvider,
    config: &CompilerConfig,
) -> Result<CompiledGraph, CompileError> {
    let mut guard = FreezeGuard::new(tree);
    log::debug!(
        "Compilation {} started over {} tree nodes (strict schema: {})",
        guard.owner(),
        tree.len(),
        config.strict_schema
    );

    let traversal = PreVisitor::new(tree, schema, &mut guard).run()?;
    let path_ids = traversal.allocator.into_identities();
    let mut graph = traversal.graph;
    log::debug!(
        "Traversal found {} statements, {} path occurrences, {} explicit graph nodes",
        traversal.statement_roots.len(),
        path_ids.len(),
        graph.len()
    );

    let mut paths = HashMap::with_capacity(path_ids.len());
    {
        let mut optimizer = PathOptimizer::new(
            tree,
            schema,
            config.strict_schema,
            &mut graph,
            &traversal.source_graph,
        );
        for identity in path_ids.iter() {
            let compiled = optimizer.optimize(identity)?;
            paths.insert(identity.clone(), compiled);
        }
    }

    let mut fetch_graph = DeclarationMap::default();
    graph::merge_fetches(
        &mut graph,
        tree,
        schema,
        &traversal.source_graph,
        &mut fetch_graph,
    )?;

    let roots: Vec<GraphId> = traversal
        .statement_roots
        .iter()
        .flat_map(|(_, roots)| roots.iter().copied())
        .collect();
    let used = allocator::allocate_identifiers(&mut graph, &roots, config);

    log::debug!(
        "Compilation {} finished: {} graph nodes, {} used, {} parameters, {} freeze holds",
        guard.owner(),
        graph.len(),
        used,
        traversal.parameters.len(),
        guard.holds()
    );

    Ok(CompiledGraph {
        graph,
        statement_roots: traversal.statement_roots,
        source_graph: traversal.source_graph,
        fetch_graph,
        path_ids,
        paths,
        parameters: traversal.parameters,
        literals: traversal.literals,
        strict_schema: config.strict_schema,
        guard,
    })
}
