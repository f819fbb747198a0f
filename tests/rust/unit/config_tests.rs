//! Tests for compiler configuration loading from the environment, YAML files
//! and command-line overrides.

#[cfg(test)]
mod compiler_config_tests {
    use std::env;
    use std::io::Write;

    use relgraph::config::{CliConfig, CompilerConfig, ConfigError};
    use serial_test::serial;
    use tempfile::NamedTempFile;

    const ENV_KEYS: [&str; 3] = [
        "RELGRAPH_STRICT_SCHEMA",
        "RELGRAPH_SHARED_ALIAS_PREFIX",
        "RELGRAPH_UNSHARED_ALIAS_PREFIX",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = CompilerConfig::from_env().unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("RELGRAPH_STRICT_SCHEMA", "true");
        env::set_var("RELGRAPH_SHARED_ALIAS_PREFIX", "t");
        env::set_var("RELGRAPH_UNSHARED_ALIAS_PREFIX", "n");
        let config = CompilerConfig::from_env();
        clear_env();

        let config = config.unwrap();
        assert!(config.strict_schema);
        assert_eq!(config.shared_alias_prefix, "t");
        assert_eq!(config.unshared_alias_prefix, "n");
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        clear_env();
        env::set_var("RELGRAPH_STRICT_SCHEMA", "sometimes");
        let parse = CompilerConfig::from_env();
        env::set_var("RELGRAPH_STRICT_SCHEMA", "false");
        env::set_var("RELGRAPH_SHARED_ALIAS_PREFIX", "x_");
        env::set_var("RELGRAPH_UNSHARED_ALIAS_PREFIX", "x_");
        let collision = CompilerConfig::from_env();
        clear_env();

        assert!(matches!(
            parse,
            Err(ConfigError::Parse { ref field, .. }) if field == "RELGRAPH_STRICT_SCHEMA"
        ));
        assert!(matches!(collision, Err(ConfigError::Validation(_))));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_from_env_rejects_non_unicode_value() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        clear_env();
        env::set_var(
            "RELGRAPH_SHARED_ALIAS_PREFIX",
            OsStr::from_bytes(&[b'p', 0xff, b'_']),
        );
        let result = CompilerConfig::from_env();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::EnvVar(env::VarError::NotUnicode(_)))
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "strict_schema: true").unwrap();
        writeln!(file, "unshared_alias_prefix: fresh_").unwrap();

        let config = CompilerConfig::from_yaml_file(file.path()).unwrap();
        assert!(config.strict_schema);
        assert_eq!(config.shared_alias_prefix, "shared_alias_");
        assert_eq!(config.unshared_alias_prefix, "fresh_");
    }

    #[test]
    fn test_from_yaml_file_validates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "shared_alias_prefix: \"\"").unwrap();
        assert!(matches!(
            CompilerConfig::from_yaml_file(file.path()),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            CompilerConfig::from_yaml_file("/no/such/relgraph.yaml"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_cli_merges_over_file_settings() {
        let mut config = CompilerConfig {
            shared_alias_prefix: "s_".to_string(),
            ..CompilerConfig::default()
        };
        config
            .merge(CliConfig {
                strict_schema: true,
                shared_alias_prefix: None,
                unshared_alias_prefix: Some("u_".to_string()),
            })
            .unwrap();
        assert!(config.strict_schema);
        assert_eq!(config.shared_alias_prefix, "s_");
        assert_eq!(config.unshared_alias_prefix, "u_");

        let rejected = CompilerConfig::from_cli(CliConfig {
            unshared_alias_prefix: Some("shared_alias_".to_string()),
            ..CliConfig::default()
        });
        assert!(matches!(rejected, Err(ConfigError::Validation(_))));
    }
}
