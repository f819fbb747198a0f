//! # Schema Error Types
//!
//! Errors raised while loading record-type definitions or while the compiler
//! classifies a field it was asked to navigate.
//!
//! ## Error Categories
//!
//! - **Lookup Errors**: a record type or field that the schema does not declare
//! - **Definition Errors**: structurally invalid record-type definitions
//! - **Configuration Errors**: file I/O and YAML parsing failures

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("No record type `{record_type}` in schema")]
    UnknownRecordType { record_type: String },

    #[error("Record type `{record_type}` has no field `{field}`")]
    UnknownField { record_type: String, field: String },

    #[error("Record type `{record_type}` declares field `{field}` more than once")]
    DuplicateField { record_type: String, field: String },

    #[error("Relation `{record_type}.{field}` targets unknown record type `{target}`")]
    UnknownRelationTarget {
        record_type: String,
        field: String,
        target: String,
    },

    #[error("Record type `{record_type}` declares more than one identifier field")]
    MultipleIdentifiers { record_type: String },

    #[error("Failed to read schema file: {error}")]
    ConfigReadError { error: String },

    #[error("Failed to parse schema: {error}")]
    ConfigParseError { error: String },
}
