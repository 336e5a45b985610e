//! `tmap graph`: Build the resource graph of one or more sources.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use terramap_graph::{BuildOptions, GraphBuilder};

use super::SourceArgs;
use crate::output;

/// Output formats of the `graph` command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// The graph model as pretty JSON.
    #[default]
    Json,
    /// A human-readable listing of nodes and edges.
    Summary,
}

/// Arguments for the `graph` command.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Sources to ingest.
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Provider rule table in YAML; defaults to the embedded AWS table.
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Leave data sources out of the graph.
    #[arg(long)]
    pub no_data: bool,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Json)]
    pub format: Format,
}

/// Executes the `graph` command.
///
/// Runs the resolution pipeline over every source, builds the graph with
/// the selected rule table and writes the model.
///
/// # Errors
///
/// Returns an error if the rules, the pipeline or the output fail.
pub fn execute(args: &GraphArgs) -> anyhow::Result<()> {
    let rules = super::load_rules(args.rules.as_ref())?;
    let config = args.sources.config(&rules.prefix);
    let dataset = terramap_resolve::run(&config)?;

    let model = GraphBuilder::new(&rules)
        .with_options(BuildOptions {
            include_data: !args.no_data,
        })
        .build(&dataset);

    let text = match args.format {
        Format::Json => model.to_json()?,
        Format::Summary => output::graph_summary(&model),
    };
    output::emit(&text, args.output.as_deref())
}
