//! Compiles declarative query documents end to end.

#[cfg(test)]
mod document_compile_tests {
    use relgraph::compiler::{compile, CompileError, CompiledGraph};
    use relgraph::config::CompilerConfig;
    use relgraph::schema::Schema;
    use relgraph::tree::{Literal, QueryDocument};

    const COMPANY: &str = include_str!("../fixtures/company_schema.yaml");

    fn compile_document(yaml: &str, config: &CompilerConfig) -> Result<CompiledGraph, CompileError> {
        let schema = Schema::from_yaml_str(COMPANY).unwrap();
        let tree = QueryDocument::from_yaml_str(yaml).unwrap().build().unwrap();
        compile(&tree, &schema, config)
    }

    fn rendered_paths(compiled: &CompiledGraph) -> Vec<String> {
        compiled
            .path_identities()
            .iter()
            .map(|identity| compiled.render_path(identity).unwrap())
            .collect()
    }

    /// Two optional merge joins to `department` (left and right), each with
    /// its own singular leaf compared to a value.
    #[test]
    fn test_merged_department_document() {
        let yaml = r#"
from:
  - record_type: Employee
    alias: r
    joins:
      - field: department
        name: d1
        direction: left
        joins:
          - field: company
            name: c
      - field: department
        name: d2
        direction: right
        joins:
          - field: location
            name: l
select: [r.name]
where:
  op: and
  args:
    - { op: "=", args: [c.name, { literal: Acme }] }
    - { op: "=", args: [l.city, { anonymous: city }] }
"#;
        let compiled = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(
            compiled.to_string(),
            "\
Employee as r {
    inner join department(mode = optionally_merge_existing, used = true) as shared_alias_1 {
        inner join company(mode = optionally_merge_existing, used = true) as shared_alias_2;
        inner join location(mode = optionally_merge_existing, used = true) as shared_alias_3;
    }
}
"
        );
        assert_eq!(
            rendered_paths(&compiled),
            vec!["r.name", "shared_alias_2.name", "shared_alias_3.city"]
        );
        let literals: Vec<&Literal> = compiled.literals().iter().map(|(_, l)| l).collect();
        assert_eq!(literals, vec![&Literal::String("Acme".to_string())]);
        assert_eq!(compiled.anonymous_parameters().len(), 1);
    }

    #[test]
    fn test_strict_schema_document() {
        let yaml = r#"
from:
  - record_type: Employee
    alias: e
    joins:
      - field: department
        name: d
select: [d.id]
"#;
        let strict = compile_document(yaml, &CompilerConfig::strict()).unwrap();
        assert_eq!(rendered_paths(&strict), vec!["e.department.id"]);
        assert_eq!(strict.used_nodes().len(), 1);

        let lenient = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(rendered_paths(&lenient), vec!["shared_alias_1.id"]);
        assert_eq!(lenient.used_nodes().len(), 2);
    }

    #[test]
    fn test_correlated_subquery_document() {
        let yaml = r#"
from:
  - record_type: Department
    alias: d
where:
  op: exists
  args:
    - subquery:
        from:
          - record_type: Employee
            name: e
        select: [e.id]
        where:
          op: "="
          args: [e.department, d]
"#;
        let compiled = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(compiled.statements().count(), 2);
        assert_eq!(
            rendered_paths(&compiled),
            vec!["shared_alias_1.id", "shared_alias_1.department", "d"]
        );
        let aliases: Vec<&str> = compiled
            .used_nodes()
            .into_iter()
            .filter_map(|(_, node)| node.alias())
            .collect();
        assert_eq!(aliases, vec!["d", "shared_alias_1"]);
    }

    #[test]
    fn test_fetch_document() {
        let yaml = r#"
from:
  - record_type: Employee
    alias: e
    joins:
      - field: department
        mode: required_to_merge_existing
    fetches:
      - field: department
        fetches:
          - field: company
      - field: projects
        collection: partial
select: [e]
"#;
        let compiled = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(
            compiled.to_string(),
            "\
Employee as e {
    inner join fetch department(mode = required_to_merge_existing, used = true) as shared_alias_1 {
        inner join fetch company(mode = optionally_merge_existing, used = true) as shared_alias_2;
    }
    inner join fetch projects(mode = optionally_merge_existing, used = true) as shared_alias_3;
}
"
        );
    }

    #[test]
    fn test_update_document() {
        let yaml = r#"
kind: update
from:
  - record_type: Employee
    alias: e
set:
  - target: e.salary
    value: { anonymous: salary }
where:
  op: and
  args:
    - { op: "=", args: [e.supervisor.id, { param: boss }] }
    - { op: "<>", args: [e.id, { param: boss }] }
"#;
        let compiled = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(
            rendered_paths(&compiled),
            vec!["e.salary", "e.supervisor.id", "e.id"]
        );
        assert_eq!(compiled.used_nodes().len(), 1);
        assert_eq!(compiled.anonymous_parameters().len(), 1);
        let names: Vec<&str> = compiled.named_parameters().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["boss"]);
    }

    #[test]
    fn test_treat_document() {
        let yaml = r#"
from:
  - record_type: Employee
    alias: e
select:
  - { op: max, args: [{ treat: e.supervisor, as_type: Manager }] }
group_by: [e.name]
"#;
        let compiled = compile_document(yaml, &CompilerConfig::default()).unwrap();
        assert_eq!(
            rendered_paths(&compiled),
            vec!["treat(e.supervisor as Manager)", "e.name"]
        );
    }

    #[test]
    fn test_merge_conflicts() {
        let conditioned = r#"
from:
  - record_type: Employee
    alias: e
    joins:
      - field: department
      - field: department
        name: d
        on: { op: "=", args: [d.name, { literal: x }] }
"#;
        assert_eq!(
            compile_document(conditioned, &CompilerConfig::default()).unwrap_err(),
            CompileError::OnConditionOnMergedJoin {
                field: "department".to_string()
            }
        );

        let aliased = r#"
from:
  - record_type: Employee
    alias: e
    joins:
      - field: department
        alias: a
      - field: department
        alias: b
"#;
        assert_eq!(
            compile_document(aliased, &CompilerConfig::default()).unwrap_err(),
            CompileError::ConflictingAliases {
                field: "department".to_string(),
                existing: "a".to_string(),
                requested: "b".to_string()
            }
        );
    }
}
