use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handle of a node inside one [`NodeTree`](super::NodeTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Query,
    Subquery,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_top_level(&self) -> bool {
        !matches!(self, StatementKind::Subquery)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Query => write!(f, "query"),
            StatementKind::Subquery => write!(f, "subquery"),
            StatementKind::Update => write!(f, "update"),
            StatementKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinDirection {
    #[default]
    Inner,
    Left,
    Right,
}

impl fmt::Display for JoinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinDirection::Inner => write!(f, "inner"),
            JoinDirection::Left => write!(f, "left"),
            JoinDirection::Right => write!(f, "right"),
        }
    }
}

/// How a declared join combines with sibling joins over the same relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Reuse a compatible sibling; pruned when nothing references it.
    #[default]
    OptionallyMergeExisting,
    /// Reuse a compatible sibling; always kept.
    RequiredToMergeExisting,
    /// Always a distinct edge; pruned when nothing references it.
    OptionallyCreateNew,
    /// Always a distinct edge; always kept.
    RequiredToCreateNew,
}

impl JoinMode {
    pub fn is_new(&self) -> bool {
        matches!(
            self,
            JoinMode::OptionallyCreateNew | JoinMode::RequiredToCreateNew
        )
    }

    pub fn is_required(&self) -> bool {
        matches!(
            self,
            JoinMode::RequiredToMergeExisting | JoinMode::RequiredToCreateNew
        )
    }

    /// The required variant of the same family.
    pub fn to_required(self) -> JoinMode {
        if self.is_new() {
            JoinMode::RequiredToCreateNew
        } else {
            JoinMode::RequiredToMergeExisting
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinMode::OptionallyMergeExisting => write!(f, "optionally_merge_existing"),
            JoinMode::RequiredToMergeExisting => write!(f, "required_to_merge_existing"),
            JoinMode::OptionallyCreateNew => write!(f, "optionally_create_new"),
            JoinMode::RequiredToCreateNew => write!(f, "required_to_create_new"),
        }
    }
}

/// Whether a collection fetch materialises every element or only the
/// elements that survive the query's own join conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionFetch {
    #[default]
    All,
    Partial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    /// Enclosing statement for subqueries.
    pub parent: Option<NodeId>,
    pub roots: Vec<NodeId>,
    pub correlations: Vec<NodeId>,
    pub selection: Vec<NodeId>,
    pub restriction: Option<NodeId>,
    pub group_list: Vec<NodeId>,
    pub group_restriction: Option<NodeId>,
    pub order_list: Vec<NodeId>,
    pub assignments: Vec<NodeId>,
    pub distinct: bool,
}

impl Statement {
    pub(crate) fn new(kind: StatementKind, parent: Option<NodeId>) -> Self {
        Statement {
            kind,
            parent,
            roots: Vec::new(),
            correlations: Vec::new(),
            selection: Vec::new(),
            restriction: None,
            group_list: Vec::new(),
            group_restriction: None,
            order_list: Vec::new(),
            assignments: Vec::new(),
            distinct: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Root {
        record_type: String,
    },
    Join {
        parent: NodeId,
        field: String,
        direction: JoinDirection,
        mode: JoinMode,
        on: Option<NodeId>,
    },
    /// Stands for a source of an enclosing statement inside a subquery.
    Correlated {
        of: NodeId,
    },
}

/// A root, join or correlated source of a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub statement: NodeId,
    pub kind: SourceKind,
    pub alias: Option<String>,
    pub joins: Vec<NodeId>,
    pub fetches: Vec<NodeId>,
}

impl Source {
    pub fn is_join(&self) -> bool {
        matches!(self.kind, SourceKind::Join { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetch {
    pub parent: NodeId,
    pub field: String,
    pub direction: JoinDirection,
    pub collection: CollectionFetch,
    pub fetches: Vec<NodeId>,
}

/// Field access relative to a source, a treat or another path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub parent: NodeId,
    pub field: String,
}

/// Downcast of a path or source to a more specific record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Treat {
    pub target: NodeId,
    pub as_type: String,
}

/// A placeholder; `name == None` is an anonymous (positional) parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    IsNull,
    IsNotNull,
    Like,
    In,
    Between,
    Exists,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
    /// Compound selection; members of a tuple in the selection count as
    /// directly selected.
    Tuple,
    Function(String),
    Aggregate(String),
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Not => "not",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
            Operator::Like => "like",
            Operator::In => "in",
            Operator::Between => "between",
            Operator::Exists => "exists",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Concat => "concat",
            Operator::Tuple => "tuple",
            Operator::Function(name) => return write!(f, "fn:{}", name),
            Operator::Aggregate(name) => return write!(f, "agg:{}", name),
        };
        write!(f, "{}", text)
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.to_ascii_lowercase().as_str() {
            "=" | "eq" => Operator::Eq,
            "<>" | "!=" | "ne" => Operator::Ne,
            "<" | "lt" => Operator::Lt,
            "<=" | "le" => Operator::Le,
            ">" | "gt" => Operator::Gt,
            ">=" | "ge" => Operator::Ge,
            "and" => Operator::And,
            "or" => Operator::Or,
            "not" => Operator::Not,
            "is_null" => Operator::IsNull,
            "is_not_null" => Operator::IsNotNull,
            "like" => Operator::Like,
            "in" => Operator::In,
            "between" => Operator::Between,
            "exists" => Operator::Exists,
            "+" | "add" => Operator::Add,
            "-" | "sub" => Operator::Sub,
            "*" | "mul" => Operator::Mul,
            "/" | "div" => Operator::Div,
            "concat" => Operator::Concat,
            "tuple" => Operator::Tuple,
            "count" | "sum" | "avg" | "min" | "max" => {
                Operator::Aggregate(s.to_ascii_lowercase())
            }
            other => match other.strip_prefix("fn:") {
                Some(name) if !name.is_empty() => Operator::Function(name.to_string()),
                _ => return Err(format!("unknown operator `{}`", s)),
            },
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub operator: Operator,
    pub operands: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub expression: NodeId,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Statement(Statement),
    Source(Source),
    Fetch(Fetch),
    Path(PathExpr),
    Treat(Treat),
    Parameter(Parameter),
    Literal(Literal),
    Expression(Expression),
    Order(Order),
    Assignment(Assignment),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Statement(_) => "statement",
            Node::Source(_) => "source",
            Node::Fetch(_) => "fetch",
            Node::Path(_) => "path",
            Node::Treat(_) => "treat",
            Node::Parameter(_) => "parameter",
            Node::Literal(_) => "literal",
            Node::Expression(_) => "expression",
            Node::Order(_) => "order",
            Node::Assignment(_) => "assignment",
        }
    }

    /// Sources, treats and paths all address a value reachable from a root.
    pub fn is_path_like(&self) -> bool {
        matches!(self, Node::Source(_) | Node::Path(_) | Node::Treat(_))
    }

    /// Whether the node may appear as an operand, a selection item or a
    /// predicate.
    pub fn is_expression(&self) -> bool {
        match self {
            Node::Statement(statement) => statement.kind == StatementKind::Subquery,
            Node::Source(_)
            | Node::Path(_)
            | Node::Treat(_)
            | Node::Parameter(_)
            | Node::Literal(_)
            | Node::Expression(_) => true,
            Node::Fetch(_) | Node::Order(_) | Node::Assignment(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_mode_families() {
        assert!(!JoinMode::default().is_new());
        assert!(!JoinMode::default().is_required());
        assert!(JoinMode::RequiredToCreateNew.is_new());
        assert!(JoinMode::RequiredToCreateNew.is_required());
        assert_eq!(
            JoinMode::OptionallyMergeExisting.to_required(),
            JoinMode::RequiredToMergeExisting
        );
        assert_eq!(
            JoinMode::OptionallyCreateNew.to_required(),
            JoinMode::RequiredToCreateNew
        );
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("=".parse::<Operator>(), Ok(Operator::Eq));
        assert_eq!("AND".parse::<Operator>(), Ok(Operator::And));
        assert_eq!(
            "count".parse::<Operator>(),
            Ok(Operator::Aggregate("count".to_string()))
        );
        assert_eq!(
            "fn:upper".parse::<Operator>(),
            Ok(Operator::Function("upper".to_string()))
        );
        assert!("fn:".parse::<Operator>().is_err());
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_literal_display_escapes_quotes() {
        assert_eq!(Literal::String("O'Neil".into()).to_string(), "'O''Neil'");
        assert_eq!(Literal::Null.to_string(), "null");
    }
}
