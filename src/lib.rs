//! Relgraph - join graph compiler for declarative relational queries
//!
//! This crate turns a tree of statements, sources, joins, fetches and path
//! expressions into the join graph a SQL renderer needs:
//! - Join-mode resolution (merge or create, direction forcing)
//! - Implicit joins for path navigation and fetch merging
//! - Path optimization with join collapse under a strict schema
//! - Pruning, identifier and alias allocation, placeholder ordering
//!
//! The compiled tree stays frozen while its [`compiler::CompiledGraph`] is
//! alive.

pub mod compiler;
pub mod config;
pub mod schema;
pub mod tree;

pub use compiler::{compile, CompileError, CompiledGraph};
pub use config::CompilerConfig;
pub use schema::{Schema, SchemaProvider};
pub use tree::NodeTree;
