use super::errors::TreeError;
use super::node::{
    Assignment, CollectionFetch, Expression, Fetch, JoinDirection, JoinMode, Literal, Node,
    NodeId, Operator, Order, Parameter, PathExpr, Source, SourceKind, Statement, StatementKind,
    Treat,
};
use super::NodeTree;

impl NodeTree {
    /// Declares a subquery enclosed by `parent`. It is compiled only where it
    /// is used as an expression.
    pub fn subquery(&self, parent: NodeId) -> Result<NodeId, TreeError> {
        self.statement(parent)?;
        Ok(self.push_node(Node::Statement(Statement::new(
            StatementKind::Subquery,
            Some(parent),
        ))))
    }

    /// Adds a root source of `record_type` to `statement`.
    pub fn from(&self, statement: NodeId, record_type: &str) -> Result<NodeId, TreeError> {
        self.writable_statement(statement)?;
        let root = self.push_node(Node::Source(Source {
            statement,
            kind: SourceKind::Root {
                record_type: record_type.to_string(),
            },
            alias: None,
            joins: Vec::new(),
            fetches: Vec::new(),
        }));
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.roots.push(root);
            }
            Ok(())
        })?;
        Ok(root)
    }

    pub fn join(
        &self,
        parent: NodeId,
        field: &str,
        direction: JoinDirection,
        mode: JoinMode,
    ) -> Result<NodeId, TreeError> {
        let source = self.joinable_source(parent)?;
        let join = self.push_node(Node::Source(Source {
            statement: source.statement,
            kind: SourceKind::Join {
                parent,
                field: field.to_string(),
                direction,
                mode,
                on: None,
            },
            alias: None,
            joins: Vec::new(),
            fetches: Vec::new(),
        }));
        self.mutate(parent, |node| {
            if let Node::Source(s) = node {
                s.joins.push(join);
            }
            Ok(())
        })?;
        Ok(join)
    }

    /// Makes `outer`, a source of an enclosing statement, addressable inside
    /// `subquery`.
    pub fn correlate(&self, subquery: NodeId, outer: NodeId) -> Result<NodeId, TreeError> {
        let statement = self.writable_statement(subquery)?;
        if statement.kind != StatementKind::Subquery {
            return Err(TreeError::UnsupportedClause {
                kind: statement.kind.to_string(),
                clause: "correlation",
            });
        }
        let outer_statement = self.source(outer)?.statement;
        let visible = match statement.parent {
            Some(parent) => self.statement_encloses(outer_statement, parent)?,
            None => false,
        };
        if !visible {
            return Err(TreeError::RootOutsideStatement {
                source_node: outer,
                statement: subquery,
            });
        }
        let correlated = self.push_node(Node::Source(Source {
            statement: subquery,
            kind: SourceKind::Correlated { of: outer },
            alias: None,
            joins: Vec::new(),
            fetches: Vec::new(),
        }));
        self.mutate(subquery, |node| {
            if let Node::Statement(s) = node {
                s.correlations.push(correlated);
            }
            Ok(())
        })?;
        Ok(correlated)
    }

    /// Declares an eager fetch under a source or another fetch.
    pub fn fetch(
        &self,
        parent: NodeId,
        field: &str,
        direction: JoinDirection,
        collection: CollectionFetch,
    ) -> Result<NodeId, TreeError> {
        match self.node(parent)? {
            Node::Source(_) => {
                self.joinable_source(parent)?;
            }
            Node::Fetch(_) => {
                if self.is_frozen(parent) {
                    return Err(TreeError::Frozen { node: parent });
                }
            }
            other => {
                return Err(TreeError::NotAFetchParent {
                    node: parent,
                    found: other.kind_name(),
                })
            }
        }
        let fetch = self.push_node(Node::Fetch(Fetch {
            parent,
            field: field.to_string(),
            direction,
            collection,
            fetches: Vec::new(),
        }));
        self.mutate(parent, |node| {
            match node {
                Node::Source(s) => s.fetches.push(fetch),
                Node::Fetch(f) => f.fetches.push(fetch),
                _ => {}
            }
            Ok(())
        })?;
        Ok(fetch)
    }

    pub fn set_alias(&self, source: NodeId, alias: &str) -> Result<(), TreeError> {
        self.mutate(source, |node| match node {
            Node::Source(s) => {
                s.alias = Some(alias.to_string());
                Ok(())
            }
            other => Err(TreeError::NotASource {
                node: source,
                found: other.kind_name(),
            }),
        })
    }

    /// Attaches an on-condition to a join.
    pub fn set_on(&self, join: NodeId, condition: NodeId) -> Result<(), TreeError> {
        self.expect_expression(condition)?;
        self.mutate(join, |node| match node {
            Node::Source(Source {
                kind: SourceKind::Join { on, .. },
                ..
            }) => {
                *on = Some(condition);
                Ok(())
            }
            other => Err(TreeError::NotAJoin {
                node: join,
                found: other.kind_name(),
            }),
        })
    }

    /// Field access `parent.field`.
    pub fn get(&self, parent: NodeId, field: &str) -> Result<NodeId, TreeError> {
        let node = self.node(parent)?;
        if !node.is_path_like() {
            return Err(TreeError::InvalidPathParent {
                node: parent,
                found: node.kind_name(),
            });
        }
        Ok(self.push_node(Node::Path(PathExpr {
            parent,
            field: field.to_string(),
        })))
    }

    /// Chained field access `parent.a.b.c`.
    pub fn get_path(&self, parent: NodeId, fields: &[&str]) -> Result<NodeId, TreeError> {
        fields
            .iter()
            .try_fold(parent, |current, field| self.get(current, field))
    }

    pub fn treat(&self, target: NodeId, as_type: &str) -> Result<NodeId, TreeError> {
        let node = self.node(target)?;
        if !node.is_path_like() {
            return Err(TreeError::InvalidPathParent {
                node: target,
                found: node.kind_name(),
            });
        }
        Ok(self.push_node(Node::Treat(Treat {
            target,
            as_type: as_type.to_string(),
        })))
    }

    pub fn named_parameter(&self, name: &str) -> NodeId {
        self.push_node(Node::Parameter(Parameter {
            name: Some(name.to_string()),
        }))
    }

    pub fn anonymous_parameter(&self) -> NodeId {
        self.push_node(Node::Parameter(Parameter { name: None }))
    }

    pub fn literal(&self, value: Literal) -> NodeId {
        self.push_node(Node::Literal(value))
    }

    pub fn expression(&self, operator: Operator, operands: &[NodeId]) -> Result<NodeId, TreeError> {
        for &operand in operands {
            self.expect_expression(operand)?;
        }
        Ok(self.push_node(Node::Expression(Expression {
            operator,
            operands: operands.to_vec(),
        })))
    }

    pub fn eq(&self, left: NodeId, right: NodeId) -> Result<NodeId, TreeError> {
        self.expression(Operator::Eq, &[left, right])
    }

    pub fn and(&self, operands: &[NodeId]) -> Result<NodeId, TreeError> {
        self.expression(Operator::And, operands)
    }

    pub fn select(&self, statement: NodeId, expression: NodeId) -> Result<(), TreeError> {
        self.expect_clause(statement, "selection", &[StatementKind::Query, StatementKind::Subquery])?;
        self.expect_expression(expression)?;
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.selection.push(expression);
            }
            Ok(())
        })
    }

    /// Adds a restriction; repeated calls are combined with `and`.
    pub fn restrict(&self, statement: NodeId, predicate: NodeId) -> Result<(), TreeError> {
        let existing = self.writable_statement(statement)?.restriction;
        self.expect_expression(predicate)?;
        let combined = match existing {
            Some(previous) => self.and(&[previous, predicate])?,
            None => predicate,
        };
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.restriction = Some(combined);
            }
            Ok(())
        })
    }

    pub fn group_by(&self, statement: NodeId, expression: NodeId) -> Result<(), TreeError> {
        self.expect_clause(statement, "group by", &[StatementKind::Query, StatementKind::Subquery])?;
        self.expect_expression(expression)?;
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.group_list.push(expression);
            }
            Ok(())
        })
    }

    /// Adds a group restriction; repeated calls are combined with `and`.
    pub fn having(&self, statement: NodeId, predicate: NodeId) -> Result<(), TreeError> {
        let existing = self
            .expect_clause(statement, "having", &[StatementKind::Query, StatementKind::Subquery])?
            .group_restriction;
        self.expect_expression(predicate)?;
        let combined = match existing {
            Some(previous) => self.and(&[previous, predicate])?,
            None => predicate,
        };
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.group_restriction = Some(combined);
            }
            Ok(())
        })
    }

    pub fn order_by(
        &self,
        statement: NodeId,
        expression: NodeId,
        ascending: bool,
    ) -> Result<NodeId, TreeError> {
        self.expect_clause(statement, "order by", &[StatementKind::Query])?;
        self.expect_expression(expression)?;
        let order = self.push_node(Node::Order(Order {
            expression,
            ascending,
        }));
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.order_list.push(order);
            }
            Ok(())
        })?;
        Ok(order)
    }

    /// `set target = value` of an update statement.
    pub fn assign(&self, statement: NodeId, target: NodeId, value: NodeId) -> Result<NodeId, TreeError> {
        self.expect_clause(statement, "assignment", &[StatementKind::Update])?;
        let target_node = self.node(target)?;
        if !matches!(target_node, Node::Path(_)) {
            return Err(TreeError::InvalidPathParent {
                node: target,
                found: target_node.kind_name(),
            });
        }
        self.expect_expression(value)?;
        let assignment = self.push_node(Node::Assignment(Assignment { target, value }));
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.assignments.push(assignment);
            }
            Ok(())
        })?;
        Ok(assignment)
    }

    pub fn distinct(&self, statement: NodeId, distinct: bool) -> Result<(), TreeError> {
        self.expect_clause(statement, "distinct", &[StatementKind::Query, StatementKind::Subquery])?;
        self.mutate(statement, |node| {
            if let Node::Statement(s) = node {
                s.distinct = distinct;
            }
            Ok(())
        })
    }

    fn writable_statement(&self, statement: NodeId) -> Result<Statement, TreeError> {
        let s = self.statement(statement)?;
        if self.is_frozen(statement) {
            return Err(TreeError::Frozen { node: statement });
        }
        Ok(s)
    }

    fn expect_clause(
        &self,
        statement: NodeId,
        clause: &'static str,
        allowed: &[StatementKind],
    ) -> Result<Statement, TreeError> {
        let s = self.writable_statement(statement)?;
        if !allowed.contains(&s.kind) {
            return Err(TreeError::UnsupportedClause {
                kind: s.kind.to_string(),
                clause,
            });
        }
        Ok(s)
    }

    /// A root or join source that accepts new joins and fetches.
    fn joinable_source(&self, node: NodeId) -> Result<Source, TreeError> {
        let source = self.source(node)?;
        if matches!(source.kind, SourceKind::Correlated { .. }) {
            return Err(TreeError::JoinOnCorrelatedSource { node });
        }
        if self.is_frozen(node) {
            return Err(TreeError::Frozen { node });
        }
        Ok(source)
    }

    fn expect_expression(&self, node: NodeId) -> Result<(), TreeError> {
        let n = self.node(node)?;
        if n.is_expression() {
            Ok(())
        } else {
            Err(TreeError::NotAnExpression {
                node,
                found: n.kind_name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::freeze::CompilationId;

    #[test]
    fn test_build_simple_query() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let employee = tree.from(stmt, "Employee").unwrap();
        let department = tree
            .join(employee, "department", JoinDirection::Left, JoinMode::default())
            .unwrap();
        let name = tree.get(department, "name").unwrap();
        tree.select(stmt, name).unwrap();

        let statement = tree.statement(stmt).unwrap();
        assert_eq!(statement.roots, vec![employee]);
        assert_eq!(statement.selection, vec![name]);
        assert_eq!(tree.source(employee).unwrap().joins, vec![department]);
    }

    #[test]
    fn test_restrict_combines_with_and() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let root = tree.from(stmt, "Employee").unwrap();
        let first = tree
            .eq(tree.get(root, "name").unwrap(), tree.anonymous_parameter())
            .unwrap();
        let second = tree
            .eq(tree.get(root, "id").unwrap(), tree.named_parameter("id"))
            .unwrap();
        tree.restrict(stmt, first).unwrap();
        tree.restrict(stmt, second).unwrap();

        let restriction = tree.statement(stmt).unwrap().restriction.unwrap();
        match tree.node(restriction).unwrap() {
            Node::Expression(e) => {
                assert_eq!(e.operator, Operator::And);
                assert_eq!(e.operands, vec![first, second]);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_frozen_nodes_reject_mutation() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let root = tree.from(stmt, "Employee").unwrap();
        let owner = CompilationId::next();
        tree.freeze(root, owner).unwrap();
        tree.freeze(stmt, owner).unwrap();

        assert_eq!(
            tree.join(root, "department", JoinDirection::Inner, JoinMode::default()),
            Err(TreeError::Frozen { node: root })
        );
        assert_eq!(
            tree.set_alias(root, "e"),
            Err(TreeError::Frozen { node: root })
        );
        let name = tree.get(root, "name").unwrap();
        assert_eq!(tree.select(stmt, name), Err(TreeError::Frozen { node: stmt }));

        tree.unfreeze(root, owner).unwrap();
        assert!(tree.set_alias(root, "e").is_ok());
    }

    #[test]
    fn test_correlated_source_rules() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let employee = tree.from(stmt, "Employee").unwrap();
        let sub = tree.subquery(stmt).unwrap();
        let correlated = tree.correlate(sub, employee).unwrap();

        assert_eq!(
            tree.join(correlated, "department", JoinDirection::Inner, JoinMode::default()),
            Err(TreeError::JoinOnCorrelatedSource { node: correlated })
        );
        assert_eq!(tree.resolve_correlation(correlated), Ok(employee));

        let other_sub = tree.subquery(sub).unwrap();
        let inner_root = tree.from(other_sub, "Department").unwrap();
        assert_eq!(
            tree.correlate(sub, inner_root),
            Err(TreeError::RootOutsideStatement {
                source_node: inner_root,
                statement: sub
            })
        );
        assert!(matches!(
            tree.correlate(stmt, employee),
            Err(TreeError::UnsupportedClause { .. })
        ));
    }

    #[test]
    fn test_kind_checks() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let root = tree.from(stmt, "Employee").unwrap();
        let literal = tree.literal(Literal::Integer(1));

        assert!(matches!(
            tree.get(literal, "name"),
            Err(TreeError::InvalidPathParent { .. })
        ));
        assert!(matches!(
            tree.set_on(root, literal),
            Err(TreeError::NotAJoin { .. })
        ));
        assert!(matches!(
            tree.fetch(literal, "department", JoinDirection::Left, CollectionFetch::All),
            Err(TreeError::NotAFetchParent { .. })
        ));
        let order = tree.order_by(stmt, literal, true).unwrap();
        assert!(matches!(
            tree.select(stmt, order),
            Err(TreeError::NotAnExpression { .. })
        ));
        assert!(matches!(
            tree.from(literal, "Employee"),
            Err(TreeError::NotAStatement { .. })
        ));
    }

    #[test]
    fn test_update_accepts_assignments_only() {
        let tree = NodeTree::update();
        let stmt = tree.top_statement();
        let root = tree.from(stmt, "Employee").unwrap();
        let name = tree.get(root, "name").unwrap();
        let value = tree.named_parameter("name");
        assert!(tree.assign(stmt, name, value).is_ok());
        assert_eq!(
            tree.select(stmt, name),
            Err(TreeError::UnsupportedClause {
                kind: "update".to_string(),
                clause: "selection"
            })
        );
    }

    #[test]
    fn test_nested_fetches() {
        let tree = NodeTree::query();
        let stmt = tree.top_statement();
        let root = tree.from(stmt, "Employee").unwrap();
        let dept = tree
            .fetch(root, "department", JoinDirection::Left, CollectionFetch::All)
            .unwrap();
        let company = tree
            .fetch(dept, "company", JoinDirection::Left, CollectionFetch::All)
            .unwrap();
        assert_eq!(tree.source(root).unwrap().fetches, vec![dept]);
        match tree.node(dept).unwrap() {
            Node::Fetch(f) => assert_eq!(f.fetches, vec![company]),
            other => panic!("unexpected node {:?}", other),
        }
    }
}
