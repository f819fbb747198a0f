//! Integration tests - query documents compiled against a YAML schema
//!
//! These tests drive the crate the way the command-line tool does: load a
//! schema, build a tree from a query document, compile it and inspect the
//! rendered graph and paths.

mod document_compile_tests;
mod freeze_scope_tests;
