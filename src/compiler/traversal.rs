//! First compilation phase: one depth-first walk over the statement tree.
//!
//! The walk freezes every node it reaches, builds the explicit join graph of
//! each statement the first time the statement is entered, allocates a path
//! identity for every path occurrence and registers placeholders and literals
//! in encounter order.

use super::allocator::ParameterRegistry;
use super::errors::CompileError;
use super::graph::{self, DeclarationMap, GraphId, JoinGraph};
use super::path_identity::{Clause, PathIdAllocator, StackEntry};
use crate::schema::SchemaProvider;
use crate::tree::{
    FreezeGuard, Literal, Node, NodeId, NodeTree, Operator, SourceKind, Statement, StatementKind,
    TreeError,
};

/// What the walk hands to the later phases.
pub(crate) struct Traversal {
    pub(crate) allocator: PathIdAllocator,
    pub(crate) graph: JoinGraph,
    /// Root graph nodes per statement, in the order statements were entered.
    pub(crate) statement_roots: Vec<(NodeId, Vec<GraphId>)>,
    pub(crate) source_graph: DeclarationMap,
    pub(crate) parameters: ParameterRegistry,
    pub(crate) literals: Vec<(NodeId, Literal)>,
}

pub(crate) struct PreVisitor<'a> {
    tree: &'a NodeTree,
    schema: &'a dyn SchemaProvider,
    guard: &'a mut FreezeGuard,
    allocator: PathIdAllocator,
    graph: JoinGraph,
    statement_roots: Vec<(NodeId, Vec<GraphId>)>,
    source_graph: DeclarationMap,
    parameters: ParameterRegistry,
    literals: Vec<(NodeId, Literal)>,
    statements: Vec<NodeId>,
}

impl<'a> PreVisitor<'a> {
    pub(crate) fn new(
        tree: &'a NodeTree,
        schema: &'a dyn SchemaProvider,
        guard: &'a mut FreezeGuard,
    ) -> Self {
        PreVisitor {
            tree,
            schema,
            guard,
            allocator: PathIdAllocator::primary(),
            graph: JoinGraph::new(),
            statement_roots: Vec::new(),
            source_graph: DeclarationMap::default(),
            parameters: ParameterRegistry::default(),
            literals: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> Result<Traversal, CompileError> {
        self.visit_statement(self.tree.top_statement())?;
        Ok(Traversal {
            allocator: self.allocator,
            graph: self.graph,
            statement_roots: self.statement_roots,
            source_graph: self.source_graph,
            parameters: self.parameters,
            literals: self.literals,
        })
    }

    fn visit_statement(&mut self, id: NodeId) -> Result<(), CompileError> {
        // A statement may be shared but never nested in itself.
        if self.statements.contains(&id) {
            return Err(CompileError::RecursiveSubquery { statement: id });
        }
        self.guard.freeze(id)?;
        let statement = self.tree.statement(id)?;
        self.allocator.push(StackEntry::Statement(id, statement.kind))?;
        self.statements.push(id);
        self.build_statement_graph(id, &statement)?;

        match statement.kind {
            StatementKind::Query | StatementKind::Subquery => {
                self.visit_clause(Clause::Selection, &statement.selection)?;
                self.visit_on_tree(&statement)?;
                self.visit_clause(Clause::Restriction, statement.restriction.as_slice())?;
                self.visit_clause(Clause::GroupList, &statement.group_list)?;
                self.visit_clause(Clause::GroupRestriction, statement.group_restriction.as_slice())?;
                if statement.kind == StatementKind::Query {
                    self.visit_clause(Clause::OrderList, &statement.order_list)?;
                }
            }
            StatementKind::Update => {
                self.visit_on_tree(&statement)?;
                self.visit_clause(Clause::Assignments, &statement.assignments)?;
                self.visit_clause(Clause::Restriction, statement.restriction.as_slice())?;
            }
            StatementKind::Delete => {
                self.visit_on_tree(&statement)?;
                self.visit_clause(Clause::Restriction, statement.restriction.as_slice())?;
            }
        }

        self.statements.pop();
        self.allocator.pop()?;
        Ok(())
    }

    /// Builds the explicit graph of a statement once; repeated visits of a
    /// shared subquery only take additional freezes.
    fn build_statement_graph(&mut self, id: NodeId, statement: &Statement) -> Result<(), CompileError> {
        let first_visit = !self.statement_roots.iter().any(|(s, _)| *s == id);
        if statement.roots.is_empty() && statement.correlations.is_empty() {
            return Err(CompileError::NoRoots { statement: id });
        }
        let mut roots = Vec::with_capacity(statement.roots.len());
        for &root in &statement.roots {
            self.freeze_declarations(root)?;
            if first_visit {
                roots.push(graph::build_source(
                    &mut self.graph,
                    self.tree,
                    self.schema,
                    root,
                    None,
                    &mut self.source_graph,
                )?);
            }
        }
        for &correlated in &statement.correlations {
            self.guard.freeze(correlated)?;
            let outer = self.tree.resolve_correlation(correlated)?;
            let Some(node) = self.source_graph.get(outer) else {
                return Err(TreeError::RootOutsideStatement {
                    source_node: outer,
                    statement: id,
                }
                .into());
            };
            self.source_graph.insert(correlated, node);
        }
        if first_visit {
            log::trace!("Statement {} has {} root graph nodes", id, roots.len());
            self.statement_roots.push((id, roots));
        }
        Ok(())
    }

    /// Freezes a source with its joins and fetches.
    fn freeze_declarations(&mut self, source_id: NodeId) -> Result<(), CompileError> {
        self.guard.freeze(source_id)?;
        let source = self.tree.source(source_id)?;
        for &fetch in &source.fetches {
            self.freeze_fetch(fetch)?;
        }
        for &join in &source.joins {
            self.freeze_declarations(join)?;
        }
        Ok(())
    }

    fn freeze_fetch(&mut self, fetch_id: NodeId) -> Result<(), CompileError> {
        self.guard.freeze(fetch_id)?;
        if let Node::Fetch(fetch) = self.tree.node(fetch_id)? {
            for nested in fetch.fetches {
                self.freeze_fetch(nested)?;
            }
        }
        Ok(())
    }

    fn visit_clause(&mut self, clause: Clause, expressions: &[NodeId]) -> Result<(), CompileError> {
        self.allocator.push(StackEntry::Clause(clause))?;
        for &expression in expressions {
            self.visit_expression(expression)?;
        }
        self.allocator.pop()?;
        Ok(())
    }

    /// On-conditions of every join, roots in order, joins pre-order.
    fn visit_on_tree(&mut self, statement: &Statement) -> Result<(), CompileError> {
        self.allocator.push(StackEntry::Clause(Clause::OnTree))?;
        for &root in &statement.roots {
            self.visit_on_conditions(root)?;
        }
        self.allocator.pop()?;
        Ok(())
    }

    fn visit_on_conditions(&mut self, source_id: NodeId) -> Result<(), CompileError> {
        let source = self.tree.source(source_id)?;
        if let SourceKind::Join { on: Some(on), .. } = source.kind {
            self.visit_expression(on)?;
        }
        for join in source.joins {
            self.visit_on_conditions(join)?;
        }
        Ok(())
    }

    fn visit_expression(&mut self, id: NodeId) -> Result<(), CompileError> {
        let node = self.tree.node(id)?;
        if let Node::Statement(statement) = &node {
            if statement.kind == StatementKind::Subquery {
                return self.visit_statement(id);
            }
        }
        self.guard.freeze(id)?;
        match node {
            Node::Source(_) | Node::Path(_) | Node::Treat(_) => {
                self.allocator.push(StackEntry::Node(id))?;
                self.freeze_path_chain(id)?;
                self.allocator.allocate()?;
                self.allocator.pop()?;
            }
            Node::Parameter(parameter) => {
                self.allocator.push(StackEntry::Node(id))?;
                match &parameter.name {
                    Some(name) => self.parameters.register_named(name, id)?,
                    None => {
                        self.parameters.register_anonymous(id)?;
                    }
                }
                self.allocator.pop()?;
            }
            Node::Literal(literal) => {
                self.allocator.push(StackEntry::Node(id))?;
                self.literals.push((id, literal));
                self.allocator.pop()?;
            }
            Node::Expression(expression) => {
                let entry = if expression.operator == Operator::Tuple {
                    StackEntry::Compound(id)
                } else {
                    StackEntry::Node(id)
                };
                self.allocator.push(entry)?;
                for operand in expression.operands {
                    self.visit_expression(operand)?;
                }
                self.allocator.pop()?;
            }
            Node::Order(order) => {
                self.allocator.push(StackEntry::Node(id))?;
                self.visit_expression(order.expression)?;
                self.allocator.pop()?;
            }
            Node::Assignment(assignment) => {
                self.allocator.push(StackEntry::Node(id))?;
                self.visit_expression(assignment.target)?;
                self.visit_expression(assignment.value)?;
                self.allocator.pop()?;
            }
            other => {
                return Err(TreeError::NotAnExpression {
                    node: id,
                    found: other.kind_name(),
                }
                .into())
            }
        }
        Ok(())
    }

    /// Freezes the parents of a path down to its source and checks that the
    /// source belongs to a statement currently being visited.
    fn freeze_path_chain(&mut self, id: NodeId) -> Result<(), CompileError> {
        let mut current = id;
        loop {
            match self.tree.node(current)? {
                Node::Path(path) => current = path.parent,
                Node::Treat(treat) => current = treat.target,
                Node::Source(source) => {
                    if !self.statements.contains(&source.statement) {
                        let statement = self.statements.last().copied().unwrap_or(current);
                        return Err(TreeError::RootOutsideStatement {
                            source_node: current,
                            statement,
                        }
                        .into());
                    }
                    return Ok(());
                }
                other => {
                    return Err(TreeError::InvalidPathParent {
                        node: current,
                        found: other.kind_name(),
                    }
                    .into())
                }
            }
            if current != id {
                self.guard.freeze(current)?;
            }
        }
    }
}
