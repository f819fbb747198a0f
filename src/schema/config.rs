//! YAML representation of a record-type schema.
//!
//! ```yaml
//! name: company
//! record_types:
//!   Employee:
//!     id: id
//!     attributes: [name, salary]
//!     relations:
//!       department: { target: Department, kind: many_to_one, optional: false }
//!   Department:
//!     id: id
//!     attributes: [name]
//!     relations:
//!       employees: { target: Employee, kind: one_to_many }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::errors::SchemaError;
use super::record_schema::{FieldSchema, RecordType, RelationKind, Schema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub record_types: BTreeMap<String, RecordTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeConfig {
    /// Name of the identifier field.
    pub id: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationConfig {
    pub target: String,
    pub kind: RelationKind,
    #[serde(default = "default_optional")]
    pub optional: bool,
}

fn default_optional() -> bool {
    true
}

impl SchemaConfig {
    /// Load schema configuration from YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path).map_err(|e| SchemaError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse schema configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(yaml).map_err(|e| SchemaError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Build and validate the in-memory schema.
    pub fn to_schema(&self) -> Result<Schema, SchemaError> {
        let mut schema = Schema::new();
        for (name, config) in &self.record_types {
            let mut record_type = RecordType::new(name.clone());
            record_type.add_field(FieldSchema::id(config.id.clone()))?;
            for attribute in &config.attributes {
                record_type.add_field(FieldSchema::scalar(attribute.clone()))?;
            }
            for (field, relation) in &config.relations {
                record_type.add_field(FieldSchema::relation(
                    field.clone(),
                    relation.target.clone(),
                    relation.kind,
                    relation.optional,
                ))?;
            }
            schema.insert(record_type);
        }
        schema.validate()?;
        log::debug!(
            "Loaded schema {:?} with {} record types",
            self.name,
            self.record_types.len()
        );
        Ok(schema)
    }
}

impl Schema {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaError> {
        SchemaConfig::from_yaml_str(yaml)?.to_schema()
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        SchemaConfig::from_yaml_file(path)?.to_schema()
    }
}
