//! Tests for loading record-type schemas from YAML.

#[cfg(test)]
mod schema_loading_tests {
    use std::io::Write;

    use relgraph::schema::{RelationKind, Schema, SchemaConfig, SchemaError, SchemaProvider};
    use tempfile::NamedTempFile;

    const COMPANY: &str = include_str!("../fixtures/company_schema.yaml");

    #[test]
    fn test_load_fixture_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(COMPANY.as_bytes()).unwrap();

        let schema = Schema::from_yaml_file(file.path()).unwrap();
        let employee = schema.require_record_type("Employee").unwrap();
        assert_eq!(employee.id_field().map(|f| f.name.as_str()), Some("id"));

        let department = schema.field("Employee", "department").unwrap();
        assert_eq!(department.relation_kind(), Some(RelationKind::ManyToOne));
        assert_eq!(department.target(), Some("Department"));
        assert!(department.is_guaranteed_present());

        let members = schema.field("Project", "members").unwrap();
        assert!(members.is_collection());
        assert!(!members.is_to_one());
    }

    #[test]
    fn test_schema_config_keeps_name() {
        let config = SchemaConfig::from_yaml_str(COMPANY).unwrap();
        assert_eq!(config.name.as_deref(), Some("company"));
        assert_eq!(config.record_types.len(), 6);
    }

    #[test]
    fn test_lookup_errors() {
        let schema = Schema::from_yaml_str(COMPANY).unwrap();
        assert_eq!(
            schema.require_record_type("Payroll").unwrap_err(),
            SchemaError::UnknownRecordType {
                record_type: "Payroll".to_string()
            }
        );
        assert_eq!(
            schema.field("Company", "ceo").unwrap_err(),
            SchemaError::UnknownField {
                record_type: "Company".to_string(),
                field: "ceo".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_relation_target() {
        let yaml = r#"
record_types:
  Employee:
    id: id
    relations:
      badge: { target: Badge, kind: one_to_one }
"#;
        assert!(matches!(
            Schema::from_yaml_str(yaml),
            Err(SchemaError::UnknownRelationTarget { ref target, .. }) if target == "Badge"
        ));
    }

    #[test]
    fn test_unreadable_file() {
        assert!(matches!(
            Schema::from_yaml_file("/no/such/schema.yaml"),
            Err(SchemaError::ConfigReadError { .. })
        ));
    }
}
