//! Record-type metadata consulted by the compiler.
//!
//! ## Key Types
//!
//! - [`SchemaProvider`]: lookup trait the compiler is written against
//! - [`Schema`]: in-memory provider, loadable from YAML
//! - [`FieldSchema`] / [`RelationKind`]: field classification (identifier,
//!   scalar, to-one or to-many relation, optionality)

pub mod config;
pub mod errors;
mod record_schema;

pub use config::{RecordTypeConfig, RelationConfig, SchemaConfig};
pub use errors::SchemaError;
pub use record_schema::{FieldKind, FieldSchema, RecordType, RelationKind, Schema, SchemaProvider};
