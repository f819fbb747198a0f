use thiserror::Error;

use crate::schema::SchemaError;
use crate::tree::{FreezeError, NodeId, TreeError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("Statement {statement} declares no source")]
    NoRoots { statement: NodeId },

    #[error("Subquery {statement} refers to itself while it is being compiled")]
    RecursiveSubquery { statement: NodeId },

    #[error("No record type `{record_type}` in schema")]
    UnknownRecordType { record_type: String },

    #[error("Record type `{record_type}` has no field `{field}`")]
    UnknownField { record_type: String, field: String },

    #[error("Cannot navigate through `{record_type}.{field}`: {reason}")]
    InvalidNavigation {
        record_type: String,
        field: String,
        reason: &'static str,
    },

    #[error("Join `{field}` merges into an existing edge and cannot carry an on-condition")]
    OnConditionOnMergedJoin { field: String },

    #[error("Merged join `{field}` has conflicting aliases `{existing}` and `{requested}`")]
    ConflictingAliases {
        field: String,
        existing: String,
        requested: String,
    },

    #[error("Anonymous parameter {parameter} is used more than once")]
    AnonymousParameterReused { parameter: NodeId },

    #[error("Named parameter `{name}` refers to both {first} and {second}")]
    NamedParameterConflict {
        name: String,
        first: NodeId,
        second: NodeId,
    },

    #[error("Path identity {identity} was not produced by this compilation")]
    UnknownPathIdentity { identity: String },

    #[error("Graph node {node} was pruned and has no alias")]
    AliasNotAllocated { node: u32 },

    #[error("Replayed path identity {found} does not match {expected}")]
    PathIdentityMismatch { expected: String, found: String },

    #[error("Replay allocated more path identities than the {allocated} of the compilation")]
    PathIdentityOverflow { allocated: usize },

    #[error("Cannot push {entry} onto the path stack: {reason}")]
    InvalidStackPush { entry: String, reason: &'static str },

    #[error("Path stack is empty")]
    EmptyPathStack,

    #[error("Top of the path stack is {entry}, not a path")]
    NotAPath { entry: String },

    #[error("Schema definition error: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Freeze(#[from] FreezeError),
}

impl From<SchemaError> for CompileError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnknownRecordType { record_type } => {
                CompileError::UnknownRecordType { record_type }
            }
            SchemaError::UnknownField { record_type, field } => {
                CompileError::UnknownField { record_type, field }
            }
            other => CompileError::InvalidSchema(other.to_string()),
        }
    }
}
