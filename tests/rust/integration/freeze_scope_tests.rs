//! Tests for the freeze held by a compiled graph over its tree.

#[cfg(test)]
mod freeze_scope_tests {
    use relgraph::compiler::{compile, CompileError};
    use relgraph::config::CompilerConfig;
    use relgraph::schema::Schema;
    use relgraph::tree::{FreezeError, JoinDirection, JoinMode, QueryDocument, TreeError};

    const COMPANY: &str = include_str!("../fixtures/company_schema.yaml");

    const QUERY: &str = r#"
from:
  - record_type: Employee
    alias: e
select: [e.name]
"#;

    #[test]
    fn test_tree_is_frozen_while_compiled() -> anyhow::Result<()> {
        let schema = Schema::from_yaml_str(COMPANY)?;
        let tree = QueryDocument::from_yaml_str(QUERY)?.build()?;
        let config = CompilerConfig::default();
        let root = tree.statement(tree.top_statement())?.roots[0];

        let compiled = compile(&tree, &schema, &config)?;
        assert_eq!(
            tree.join(root, "department", JoinDirection::Left, JoinMode::default()),
            Err(TreeError::Frozen { node: root })
        );
        assert!(matches!(
            compile(&tree, &schema, &config),
            Err(CompileError::Freeze(FreezeError::FrozenByOther { .. }))
        ));
        compiled.close()?;

        let department = tree.join(root, "department", JoinDirection::Left, JoinMode::default())?;
        let name = tree.get(department, "name")?;
        tree.select(tree.top_statement(), name)?;
        let recompiled = compile(&tree, &schema, &config)?;
        assert_eq!(recompiled.used_nodes().len(), 2);
        Ok(())
    }

    #[test]
    fn test_drop_releases_tree() -> anyhow::Result<()> {
        let schema = Schema::from_yaml_str(COMPANY)?;
        let tree = QueryDocument::from_yaml_str(QUERY)?.build()?;
        {
            let _compiled = compile(&tree, &schema, &CompilerConfig::default())?;
            assert!(tree.is_frozen(tree.top_statement()));
        }
        assert!(!tree.is_frozen(tree.top_statement()));
        assert_eq!(tree.frozen_by(tree.top_statement()), None);
        Ok(())
    }

    #[test]
    fn test_failed_compilation_releases_tree() -> anyhow::Result<()> {
        let schema = Schema::from_yaml_str(COMPANY)?;
        let tree = QueryDocument::from_yaml_str(
            "from: [{ record_type: Employee, alias: e }]\nselect: [e.nickname]\n",
        )?
        .build()?;
        let err = compile(&tree, &schema, &CompilerConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownField { .. }));
        assert!(!tree.is_frozen(tree.top_statement()));
        tree.distinct(tree.top_statement(), true)?;
        Ok(())
    }
}
