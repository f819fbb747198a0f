//! Declarative YAML form of a query tree.
//!
//! ```yaml
//! kind: query
//! from:
//!   - record_type: Employee
//!     alias: e
//!     joins:
//!       - field: department
//!         name: d
//!         direction: left
//!     fetches:
//!       - field: supervisor
//! select: [e.name, d.name]
//! where:
//!   op: "="
//!   args: [d.name, { anonymous: dept }]
//! ```
//!
//! Expressions are written as dotted paths rooted at a source name, or as
//! single-key maps (`param`, `anonymous`, `literal`, `treat`, `subquery`,
//! `tuple`) and `{ op, args }` applications. A subquery that mentions a name
//! of an enclosing statement is correlated with that source automatically.
//! Named placeholders, and anonymous placeholders with the same label, share
//! one parameter object.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::errors::DocumentError;
use super::node::{
    CollectionFetch, JoinDirection, JoinMode, Literal, NodeId, Operator, StatementKind,
};
use super::NodeTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDocument {
    #[serde(default = "default_kind")]
    pub kind: StatementKind,
    #[serde(flatten)]
    pub statement: StatementDoc,
}

fn default_kind() -> StatementKind {
    StatementKind::Query
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatementDoc {
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub from: Vec<RootDoc>,
    #[serde(default)]
    pub select: Vec<ExprDoc>,
    #[serde(default, rename = "where")]
    pub restriction: Option<ExprDoc>,
    #[serde(default)]
    pub group_by: Vec<ExprDoc>,
    #[serde(default)]
    pub having: Option<ExprDoc>,
    #[serde(default)]
    pub order_by: Vec<OrderDoc>,
    #[serde(default)]
    pub set: Vec<AssignmentDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootDoc {
    pub record_type: String,
    /// Alias hint; also usable as the reference name.
    #[serde(default)]
    pub alias: Option<String>,
    /// Reference name inside the document only.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub joins: Vec<JoinDoc>,
    #[serde(default)]
    pub fetches: Vec<FetchDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDoc {
    pub field: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub direction: JoinDirection,
    #[serde(default)]
    pub mode: JoinMode,
    #[serde(default)]
    pub on: Option<ExprDoc>,
    #[serde(default)]
    pub joins: Vec<JoinDoc>,
    #[serde(default)]
    pub fetches: Vec<FetchDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchDoc {
    pub field: String,
    #[serde(default)]
    pub direction: JoinDirection,
    #[serde(default)]
    pub collection: CollectionFetch,
    #[serde(default)]
    pub fetches: Vec<FetchDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDoc {
    pub expr: ExprDoc,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentDoc {
    pub target: String,
    pub value: ExprDoc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprDoc {
    Path(String),
    Param {
        param: String,
    },
    Anonymous {
        anonymous: String,
    },
    Literal {
        literal: Literal,
    },
    Treat {
        treat: Box<ExprDoc>,
        as_type: String,
    },
    Subquery {
        subquery: Box<StatementDoc>,
    },
    Tuple {
        tuple: Vec<ExprDoc>,
    },
    Apply {
        op: String,
        #[serde(default)]
        args: Vec<ExprDoc>,
    },
}

impl QueryDocument {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, DocumentError> {
        let contents = fs::read_to_string(path).map_err(|e| DocumentError::ReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, DocumentError> {
        serde_yaml::from_str(yaml).map_err(|e| DocumentError::ParseError {
            error: e.to_string(),
        })
    }

    /// Builds a fresh tree through the public builder.
    pub fn build(&self) -> Result<NodeTree, DocumentError> {
        let kind = match self.kind {
            StatementKind::Subquery => StatementKind::Query,
            other => other,
        };
        let tree = NodeTree::new(kind);
        let mut builder = DocumentBuilder {
            tree: &tree,
            scopes: Vec::new(),
            labels: HashMap::new(),
            parameters: HashMap::new(),
        };
        builder.statement(tree.top_statement(), &self.statement)?;
        log::debug!("Built query document into {} tree nodes", tree.len());
        Ok(tree)
    }
}

struct Scope {
    statement: NodeId,
    names: HashMap<String, NodeId>,
}

struct DocumentBuilder<'a> {
    tree: &'a NodeTree,
    scopes: Vec<Scope>,
    labels: HashMap<String, NodeId>,
    parameters: HashMap<String, NodeId>,
}

impl DocumentBuilder<'_> {
    fn statement(&mut self, statement: NodeId, doc: &StatementDoc) -> Result<(), DocumentError> {
        self.scopes.push(Scope {
            statement,
            names: HashMap::new(),
        });
        let result = self.statement_body(statement, doc);
        self.scopes.pop();
        result
    }

    fn statement_body(&mut self, statement: NodeId, doc: &StatementDoc) -> Result<(), DocumentError> {
        let tree = self.tree;
        let mut pending_on = Vec::new();
        for root_doc in &doc.from {
            let root = tree.from(statement, &root_doc.record_type)?;
            if let Some(alias) = &root_doc.alias {
                tree.set_alias(root, alias)?;
            }
            self.declare(root_doc.name.as_ref().or(root_doc.alias.as_ref()), root)?;
            for join_doc in &root_doc.joins {
                self.join(root, join_doc, &mut pending_on)?;
            }
            self.fetches(root, &root_doc.fetches)?;
        }
        // On-conditions may name any source of the statement.
        for (join, on) in pending_on {
            let condition = self.expr(on)?;
            tree.set_on(join, condition)?;
        }
        if doc.distinct {
            tree.distinct(statement, true)?;
        }
        for item in &doc.select {
            let expr = self.expr(item)?;
            tree.select(statement, expr)?;
        }
        if let Some(restriction) = &doc.restriction {
            let expr = self.expr(restriction)?;
            tree.restrict(statement, expr)?;
        }
        for item in &doc.group_by {
            let expr = self.expr(item)?;
            tree.group_by(statement, expr)?;
        }
        if let Some(having) = &doc.having {
            let expr = self.expr(having)?;
            tree.having(statement, expr)?;
        }
        for order in &doc.order_by {
            let expr = self.expr(&order.expr)?;
            tree.order_by(statement, expr, order.ascending)?;
        }
        for assignment in &doc.set {
            let target = self.path(&assignment.target)?;
            let value = self.expr(&assignment.value)?;
            tree.assign(statement, target, value)?;
        }
        Ok(())
    }

    fn join<'d>(
        &mut self,
        parent: NodeId,
        doc: &'d JoinDoc,
        pending_on: &mut Vec<(NodeId, &'d ExprDoc)>,
    ) -> Result<(), DocumentError> {
        let join = self.tree.join(parent, &doc.field, doc.direction, doc.mode)?;
        if let Some(alias) = &doc.alias {
            self.tree.set_alias(join, alias)?;
        }
        self.declare(doc.name.as_ref().or(doc.alias.as_ref()), join)?;
        if let Some(on) = &doc.on {
            pending_on.push((join, on));
        }
        for child in &doc.joins {
            self.join(join, child, pending_on)?;
        }
        self.fetches(join, &doc.fetches)
    }

    fn fetches(&mut self, parent: NodeId, docs: &[FetchDoc]) -> Result<(), DocumentError> {
        for doc in docs {
            let fetch = self
                .tree
                .fetch(parent, &doc.field, doc.direction, doc.collection)?;
            self.fetches(fetch, &doc.fetches)?;
        }
        Ok(())
    }

    fn declare(&mut self, name: Option<&String>, source: NodeId) -> Result<(), DocumentError> {
        let Some(name) = name else {
            return Ok(());
        };
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if scope.names.insert(name.clone(), source).is_some() {
            return Err(DocumentError::DuplicateAlias {
                alias: name.clone(),
            });
        }
        Ok(())
    }

    /// Resolves a source name, correlating names of enclosing statements.
    fn lookup(&mut self, name: &str) -> Result<NodeId, DocumentError> {
        let depth = self.scopes.len();
        let found = self
            .scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(level, scope)| scope.names.get(name).map(|&node| (level, node)));
        match found {
            Some((level, node)) if level + 1 == depth => Ok(node),
            Some((_, outer)) => {
                let Some(scope) = self.scopes.last_mut() else {
                    return Err(DocumentError::UnknownAlias {
                        alias: name.to_string(),
                    });
                };
                let correlated = self.tree.correlate(scope.statement, outer)?;
                scope.names.insert(name.to_string(), correlated);
                Ok(correlated)
            }
            None => Err(DocumentError::UnknownAlias {
                alias: name.to_string(),
            }),
        }
    }

    fn path(&mut self, text: &str) -> Result<NodeId, DocumentError> {
        let mut segments = text.split('.');
        let head = match segments.next() {
            Some(head) if !head.is_empty() => head,
            _ => {
                return Err(DocumentError::InvalidPath {
                    path: text.to_string(),
                })
            }
        };
        let mut current = self.lookup(head)?;
        for field in segments {
            if field.is_empty() {
                return Err(DocumentError::InvalidPath {
                    path: text.to_string(),
                });
            }
            current = self.tree.get(current, field)?;
        }
        Ok(current)
    }

    fn expr(&mut self, doc: &ExprDoc) -> Result<NodeId, DocumentError> {
        let tree = self.tree;
        let node = match doc {
            ExprDoc::Path(text) => self.path(text)?,
            ExprDoc::Param { param } => *self
                .parameters
                .entry(param.clone())
                .or_insert_with(|| tree.named_parameter(param)),
            ExprDoc::Anonymous { anonymous } => *self
                .labels
                .entry(anonymous.clone())
                .or_insert_with(|| tree.anonymous_parameter()),
            ExprDoc::Literal { literal } => tree.literal(literal.clone()),
            ExprDoc::Treat { treat, as_type } => {
                let target = self.expr(treat)?;
                tree.treat(target, as_type)?
            }
            ExprDoc::Subquery { subquery } => {
                let parent = self
                    .scopes
                    .last()
                    .map(|scope| scope.statement)
                    .unwrap_or_else(|| tree.top_statement());
                let statement = tree.subquery(parent)?;
                self.statement(statement, subquery)?;
                statement
            }
            ExprDoc::Tuple { tuple } => {
                let operands = tuple
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                tree.expression(Operator::Tuple, &operands)?
            }
            ExprDoc::Apply { op, args } => {
                let operator: Operator =
                    op.parse()
                        .map_err(|message| DocumentError::InvalidOperator {
                            operator: op.clone(),
                            message,
                        })?;
                let operands = args
                    .iter()
                    .map(|item| self.expr(item))
                    .collect::<Result<Vec<_>, _>>()?;
                tree.expression(operator, &operands)?
            }
        };
        Ok(node)
    }
}
