//! Unit tests - public configuration and schema APIs
//!
//! These tests load configuration and schema definitions the way the binary
//! does, without compiling query documents.

mod config_tests;
mod schema_loading_tests;
