use thiserror::Error;

use super::node::NodeId;

/// Builder misuse and structural violations of the node tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    #[error("Node {node} is frozen by an active compilation")]
    Frozen { node: NodeId },

    #[error("Node {node} does not exist in this tree")]
    UnknownNode { node: NodeId },

    #[error("Node {node} is a {found}, expected a source")]
    NotASource { node: NodeId, found: &'static str },

    #[error("Node {node} is a {found}, expected a join")]
    NotAJoin { node: NodeId, found: &'static str },

    #[error("Node {node} is a {found}, expected a statement")]
    NotAStatement { node: NodeId, found: &'static str },

    #[error("Node {node} is a {found}, fetches hang off sources or fetches")]
    NotAFetchParent { node: NodeId, found: &'static str },

    #[error("Node {node} is a {found}, paths hang off sources, paths or treats")]
    InvalidPathParent { node: NodeId, found: &'static str },

    #[error("Node {node} is a {found} and cannot be used as an expression")]
    NotAnExpression { node: NodeId, found: &'static str },

    #[error("Correlated source {node} cannot declare joins or fetches")]
    JoinOnCorrelatedSource { node: NodeId },

    #[error("Source {source_node} is not visible from statement {statement}")]
    RootOutsideStatement { source_node: NodeId, statement: NodeId },

    #[error("A {kind} statement does not accept a {clause} clause")]
    UnsupportedClause { kind: String, clause: &'static str },
}

/// Failures of the reentrant freeze lock.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FreezeError {
    #[error("Node {node} is frozen by compilation {owner}")]
    FrozenByOther { node: NodeId, owner: u64 },

    #[error("Node {node} is not frozen")]
    NotFrozen { node: NodeId },

    #[error("Node {node} is frozen by compilation {owner}, not {requester}")]
    NotOwner {
        node: NodeId,
        owner: u64,
        requester: u64,
    },

    #[error("Node {node} does not exist in this tree")]
    UnknownNode { node: NodeId },
}

/// Errors raised while turning a YAML query document into a tree.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DocumentError {
    #[error("Failed to read query document: {error}")]
    ReadError { error: String },

    #[error("Failed to parse query document: {error}")]
    ParseError { error: String },

    #[error("Alias `{alias}` is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("Alias `{alias}` is not declared by this statement or an enclosing one")]
    UnknownAlias { alias: String },

    #[error("Path expression `{path}` is empty or malformed")]
    InvalidPath { path: String },

    #[error("Invalid operator `{operator}`: {message}")]
    InvalidOperator { operator: String, message: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}
