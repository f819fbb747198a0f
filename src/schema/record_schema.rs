use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::errors::SchemaError;

/// Cardinality of a relation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// True for relations that reach at most one record (one-to-one, many-to-one).
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::OneToOne | RelationKind::ManyToOne)
    }

    pub fn is_collection(&self) -> bool {
        !self.is_to_one()
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::OneToOne => write!(f, "one_to_one"),
            RelationKind::ManyToOne => write!(f, "many_to_one"),
            RelationKind::OneToMany => write!(f, "one_to_many"),
            RelationKind::ManyToMany => write!(f, "many_to_many"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain value column; `is_id` marks the record identifier.
    Scalar { is_id: bool },
    /// Reference or collection of another record type.
    Relation {
        target: String,
        relation: RelationKind,
    },
}

/// One declared field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    /// Whether the field may be absent. For to-one relations this is the
    /// nullability of the foreign key; collections are always optional.
    pub optional: bool,
}

impl FieldSchema {
    pub fn id(name: impl Into<String>) -> Self {
        FieldSchema {
            name: name.into(),
            kind: FieldKind::Scalar { is_id: true },
            optional: false,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        FieldSchema {
            name: name.into(),
            kind: FieldKind::Scalar { is_id: false },
            optional: true,
        }
    }

    pub fn relation(
        name: impl Into<String>,
        target: impl Into<String>,
        relation: RelationKind,
        optional: bool,
    ) -> Self {
        FieldSchema {
            name: name.into(),
            kind: FieldKind::Relation {
                target: target.into(),
                relation,
            },
            optional: optional || relation.is_collection(),
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar { is_id: true })
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, FieldKind::Relation { .. })
    }

    pub fn relation_kind(&self) -> Option<RelationKind> {
        match &self.kind {
            FieldKind::Relation { relation, .. } => Some(*relation),
            FieldKind::Scalar { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Relation { target, .. } => Some(target.as_str()),
            FieldKind::Scalar { .. } => None,
        }
    }

    pub fn is_to_one(&self) -> bool {
        self.relation_kind().is_some_and(|r| r.is_to_one())
    }

    pub fn is_collection(&self) -> bool {
        self.relation_kind().is_some_and(|r| r.is_collection())
    }

    /// A non-optional many-to-one reference. Under the strict-schema flag such
    /// a relation is backed by a non-null foreign key and always has a match.
    pub fn is_guaranteed_present(&self) -> bool {
        !self.optional && self.relation_kind() == Some(RelationKind::ManyToOne)
    }
}

/// Declared shape of one record type.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldSchema>,
    index: HashMap<String, usize>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        RecordType {
            name: name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builder-style field registration, used by tests and by the YAML loader.
    pub fn with_field(mut self, field: FieldSchema) -> Result<Self, SchemaError> {
        self.add_field(field)?;
        Ok(self)
    }

    pub fn add_field(&mut self, field: FieldSchema) -> Result<(), SchemaError> {
        if self.index.contains_key(&field.name) {
            return Err(SchemaError::DuplicateField {
                record_type: self.name.clone(),
                field: field.name,
            });
        }
        if field.is_id() && self.id_field().is_some() {
            return Err(SchemaError::MultipleIdentifiers {
                record_type: self.name.clone(),
            });
        }
        self.index.insert(field.name.clone(), self.fields.len());
        self.fields.push(field);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn id_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_id())
    }
}

/// Record-type metadata consulted by the compiler while classifying fields.
///
/// The compiler calls this only to resolve relation targets and to decide
/// how a path is rendered; it performs no caching beyond one compilation.
pub trait SchemaProvider {
    fn record_type(&self, name: &str) -> Option<&RecordType>;

    fn require_record_type(&self, name: &str) -> Result<&RecordType, SchemaError> {
        self.record_type(name)
            .ok_or_else(|| SchemaError::UnknownRecordType {
                record_type: name.to_string(),
            })
    }

    fn field(&self, record_type: &str, field: &str) -> Result<&FieldSchema, SchemaError> {
        self.require_record_type(record_type)?
            .field(field)
            .ok_or_else(|| SchemaError::UnknownField {
                record_type: record_type.to_string(),
                field: field.to_string(),
            })
    }
}

/// In-memory schema catalog.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    record_types: HashMap<String, RecordType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record_type: RecordType) {
        self.record_types
            .insert(record_type.name().to_string(), record_type);
    }

    pub fn with_record_type(mut self, record_type: RecordType) -> Self {
        self.insert(record_type);
        self
    }

    pub fn record_types(&self) -> impl Iterator<Item = &RecordType> {
        self.record_types.values()
    }

    /// Every relation must point at a declared record type.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names: Vec<&String> = self.record_types.keys().collect();
        names.sort();
        for name in names {
            let record_type = &self.record_types[name];
            for field in record_type.fields() {
                if let Some(target) = field.target() {
                    if !self.record_types.contains_key(target) {
                        return Err(SchemaError::UnknownRelationTarget {
                            record_type: name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl SchemaProvider for Schema {
    fn record_type(&self, name: &str) -> Option<&RecordType> {
        self.record_types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> RecordType {
        RecordType::new("Employee")
            .with_field(FieldSchema::id("id"))
            .and_then(|r| r.with_field(FieldSchema::scalar("name")))
            .and_then(|r| {
                r.with_field(FieldSchema::relation(
                    "department",
                    "Department",
                    RelationKind::ManyToOne,
                    false,
                ))
            })
            .unwrap()
    }

    #[test]
    fn test_field_classification() {
        let record_type = employee();
        assert!(record_type.field("id").unwrap().is_id());
        let department = record_type.field("department").unwrap();
        assert!(department.is_to_one());
        assert!(department.is_guaranteed_present());
        assert_eq!(department.target(), Some("Department"));
        assert!(record_type.field("missing").is_none());
    }

    #[test]
    fn test_collections_are_always_optional() {
        let field = FieldSchema::relation("employees", "Employee", RelationKind::OneToMany, false);
        assert!(field.optional);
        assert!(field.is_collection());
        assert!(!field.is_guaranteed_present());
    }

    #[test]
    fn test_duplicate_and_multiple_ids_rejected() {
        let err = employee().with_field(FieldSchema::scalar("name")).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));

        let err = employee().with_field(FieldSchema::id("code")).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MultipleIdentifiers {
                record_type: "Employee".to_string()
            }
        );
    }

    #[test]
    fn test_validate_unknown_target() {
        let schema = Schema::new().with_record_type(employee());
        assert_eq!(
            schema.validate(),
            Err(SchemaError::UnknownRelationTarget {
                record_type: "Employee".to_string(),
                field: "department".to_string(),
                target: "Department".to_string(),
            })
        );
    }

    #[test]
    fn test_provider_lookup_errors() {
        let schema = Schema::new().with_record_type(employee());
        assert!(schema.field("Employee", "name").is_ok());
        assert!(matches!(
            schema.field("Employee", "salary"),
            Err(SchemaError::UnknownField { .. })
        ));
        assert!(matches!(
            schema.field("Office", "name"),
            Err(SchemaError::UnknownRecordType { .. })
        ));
    }
}
