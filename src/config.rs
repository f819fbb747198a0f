use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub const DEFAULT_SHARED_ALIAS_PREFIX: &str = "shared_alias_";
pub const DEFAULT_UNSHARED_ALIAS_PREFIX: &str = "unshared_alias_";

/// Compiler configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[validate(schema(function = "validate_alias_prefixes"))]
#[serde(default)]
pub struct CompilerConfig {
    /// Treat non-optional many-to-one relations as backed by non-null foreign
    /// keys, which allows more joins to collapse into dotted navigation
    pub strict_schema: bool,

    /// Prefix of generated aliases for shared (root and merge-mode) nodes
    #[validate(length(min = 1, message = "Shared alias prefix cannot be empty"))]
    pub shared_alias_prefix: String,

    /// Prefix of aliases for create-new joins
    #[validate(length(min = 1, message = "Unshared alias prefix cannot be empty"))]
    pub unshared_alias_prefix: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strict_schema: false,
            shared_alias_prefix: DEFAULT_SHARED_ALIAS_PREFIX.to_string(),
            unshared_alias_prefix: DEFAULT_UNSHARED_ALIAS_PREFIX.to_string(),
        }
    }
}

fn validate_alias_prefixes(config: &CompilerConfig) -> Result<(), ValidationError> {
    if config.shared_alias_prefix == config.unshared_alias_prefix {
        let mut err = ValidationError::new("alias_prefix_collision");
        err.message = Some("Shared and unshared alias prefixes must differ".into());
        return Err(err);
    }
    for prefix in [&config.shared_alias_prefix, &config.unshared_alias_prefix] {
        let identifier_like = prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && !prefix.starts_with(|c: char| c.is_ascii_digit());
        if !identifier_like {
            let mut err = ValidationError::new("alias_prefix_format");
            err.message = Some(
                format!("Alias prefix `{}` must be an identifier fragment", prefix).into(),
            );
            return Err(err);
        }
    }
    Ok(())
}

impl CompilerConfig {
    pub fn strict() -> Self {
        Self {
            strict_schema: true,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            strict_schema: parse_env_var("RELGRAPH_STRICT_SCHEMA", "false")?,
            shared_alias_prefix: env_var_or(
                "RELGRAPH_SHARED_ALIAS_PREFIX",
                DEFAULT_SHARED_ALIAS_PREFIX,
            )?,
            unshared_alias_prefix: env_var_or(
                "RELGRAPH_UNSHARED_ALIAS_PREFIX",
                DEFAULT_UNSHARED_ALIAS_PREFIX,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge(cli)?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge CLI settings over this configuration (CLI overrides file and environment)
    pub fn merge(&mut self, cli: CliConfig) -> Result<(), ConfigError> {
        if cli.strict_schema {
            self.strict_schema = true;
        }
        if let Some(prefix) = cli.shared_alias_prefix {
            self.shared_alias_prefix = prefix;
        }
        if let Some(prefix) = cli.unshared_alias_prefix {
            self.unshared_alias_prefix = prefix;
        }

        self.validate()?;
        Ok(())
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug, Default)]
pub struct CliConfig {
    pub strict_schema: bool,
    pub shared_alias_prefix: Option<String>,
    pub unshared_alias_prefix: Option<String>,
}

/// Read an environment variable, falling back to `default` only when it is unset
fn env_var_or(key: &str, default: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => Ok(value),
        Err(env::VarError::NotPresent) => Ok(default.to_string()),
        Err(err) => {
            log::warn!("Environment variable {} is not valid unicode", key);
            Err(err.into())
        }
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env_var_or(key, default)?;
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
