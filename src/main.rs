use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relgraph::compiler::{self, CompiledGraph};
use relgraph::config::{CliConfig, CompilerConfig};
use relgraph::schema::Schema;
use relgraph::tree::{JoinDirection, JoinMode, QueryDocument};
use serde::Serialize;

/// Relgraph - compile a declarative query document into its join graph
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schema YAML describing record types and relations
    #[arg(long)]
    schema: PathBuf,

    /// Query document YAML
    #[arg(long)]
    query: PathBuf,

    /// Compiler configuration YAML (environment variables are used otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Trust non-optional many-to-one relations to be backed by non-null keys
    #[arg(long)]
    strict_schema: bool,

    /// Alias prefix for roots and merge-mode joins
    #[arg(long)]
    shared_alias_prefix: Option<String>,

    /// Alias prefix for create-new joins
    #[arg(long)]
    unshared_alias_prefix: Option<String>,

    /// Print a JSON summary instead of the graph dump
    #[arg(long)]
    json: bool,
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        CliConfig {
            strict_schema: cli.strict_schema,
            shared_alias_prefix: cli.shared_alias_prefix.clone(),
            unshared_alias_prefix: cli.unshared_alias_prefix.clone(),
        }
    }
}

#[derive(Serialize)]
struct NodeSummary {
    identifier: u32,
    alias: String,
    record_type: String,
    field: Option<String>,
    direction: JoinDirection,
    mode: JoinMode,
    fetched: bool,
}

#[derive(Serialize)]
struct PathSummary {
    identity: String,
    rendered: String,
    directly_selected: bool,
}

#[derive(Serialize)]
struct Summary {
    strict_schema: bool,
    nodes: Vec<NodeSummary>,
    paths: Vec<PathSummary>,
    named_parameters: Vec<String>,
    anonymous_parameters: usize,
    literals: Vec<String>,
}

fn summarize(compiled: &CompiledGraph) -> anyhow::Result<Summary> {
    let nodes = compiled
        .used_nodes()
        .into_iter()
        .map(|(id, node)| {
            Ok(NodeSummary {
                identifier: node.identifier().unwrap_or_default(),
                alias: compiled.alias(id)?.to_string(),
                record_type: node.record_type.clone(),
                field: node.field.clone(),
                direction: node.direction,
                mode: node.mode,
                fetched: node.fetched,
            })
        })
        .collect::<Result<Vec<_>, compiler::CompileError>>()?;
    let paths = compiled
        .path_identities()
        .iter()
        .map(|identity| {
            Ok(PathSummary {
                identity: identity.to_string(),
                rendered: compiled.render_path(identity)?,
                directly_selected: identity.is_directly_selected(),
            })
        })
        .collect::<Result<Vec<_>, compiler::CompileError>>()?;
    Ok(Summary {
        strict_schema: compiled.is_strict_schema(),
        nodes,
        paths,
        named_parameters: compiled
            .named_parameters()
            .map(|(name, _)| name.to_string())
            .collect(),
        anonymous_parameters: compiled.anonymous_parameters().len(),
        literals: compiled
            .literals()
            .iter()
            .map(|(_, literal)| literal.to_string())
            .collect(),
    })
}

fn print_report(compiled: &CompiledGraph) -> anyhow::Result<()> {
    print!("{}", compiled);
    println!();
    println!("Paths:");
    for identity in compiled.path_identities() {
        println!("  {} -> {}", identity, compiled.render_path(identity)?);
    }
    println!("Parameters:");
    for (name, _) in compiled.named_parameters() {
        println!("  :{}", name);
    }
    for (position, _) in compiled.anonymous_parameters().iter().enumerate() {
        println!("  ?{}", position + 1);
    }
    for (_, literal) in compiled.literals() {
        println!("  {}", literal);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Loads .env when present; a missing file is not an error
    dotenvy::dotenv().ok();
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => CompilerConfig::from_env().context("reading configuration from environment")?,
    };
    config.merge(CliConfig::from(&cli))?;
    log::info!("Compiling with strict schema: {}", config.strict_schema);

    let schema = Schema::from_yaml_file(&cli.schema)
        .with_context(|| format!("loading schema {}", cli.schema.display()))?;
    let document = QueryDocument::from_yaml_file(&cli.query)
        .with_context(|| format!("loading query {}", cli.query.display()))?;
    let tree = document.build()?;

    let compiled = compiler::compile(&tree, &schema, &config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summarize(&compiled)?)?);
    } else {
        print_report(&compiled)?;
    }
    compiled.close()?;
    Ok(())
}
