//! CLI command definitions and dispatch.

pub mod dataset;
pub mod graph;
pub mod rules;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use terramap_common::config::PipelineConfig;
use terramap_graph::ProviderRules;

/// terramap: Terraform sources to architecture graphs.
#[derive(Parser, Debug)]
#[command(name = "tmap", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the resource graph of one or more sources.
    Graph(graph::GraphArgs),
    /// Dump the merged configuration dataset.
    Dataset(dataset::DatasetArgs),
    /// Validate a rule table and print its summary.
    Rules(rules::RulesArgs),
}

/// Source selection shared by commands that run the pipeline.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Local directory or remote repository URL; repeatable.
    #[arg(short, long = "source", required = true, num_args = 1..)]
    pub sources: Vec<String>,

    /// Variable file, in load order; repeatable.
    #[arg(long = "varfile")]
    pub varfiles: Vec<PathBuf>,

    /// Architecture annotation file; overrides any found in a source.
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// Walk source directories recursively.
    #[arg(short, long)]
    pub recursive: bool,
}

impl SourceArgs {
    /// Turns the arguments into a pipeline configuration.
    pub fn config(&self, provider_prefix: &str) -> PipelineConfig {
        PipelineConfig {
            sources: self.sources.clone(),
            recursive: self.recursive,
            varfiles: self.varfiles.clone(),
            annotation_file: self.annotate.clone(),
            provider_prefix: provider_prefix.to_string(),
        }
    }
}

/// Loads the rule table named on the command line, or the embedded one.
///
/// # Errors
///
/// Returns an error if the table cannot be read or fails validation.
pub fn load_rules(path: Option<&PathBuf>) -> anyhow::Result<ProviderRules> {
    let rules = match path {
        Some(p) => {
            tracing::info!(path = %p.display(), "loading rule table");
            ProviderRules::from_file(p)?
        }
        None => ProviderRules::aws()?,
    };
    Ok(rules)
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Graph(args) => graph::execute(&args),
        Command::Dataset(args) => dataset::execute(&args),
        Command::Rules(args) => rules::execute(&args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn graph_arguments_become_config() {
        let cli = Cli::try_parse_from([
            "tmap",
            "graph",
            "--source",
            "./infra",
            "https://github.com/acme/net.git",
            "--varfile",
            "prod.tfvars",
            "--recursive",
        ])
        .expect("parse");
        let Command::Graph(args) = cli.command else {
            panic!("expected graph command");
        };
        let config = args.sources.config("aws_");
        assert_eq!(config.sources.len(), 2);
        assert!(config.recursive);
        assert_eq!(config.varfiles, vec![PathBuf::from("prod.tfvars")]);
        assert!(config.annotation_file.is_none());
    }

    #[test]
    fn a_source_is_required() {
        assert!(Cli::try_parse_from(["tmap", "graph"]).is_err());
    }
}
