//! `tmap dataset`: Dump the merged configuration dataset as JSON.

use std::path::PathBuf;

use clap::Args;

use super::SourceArgs;
use crate::output;

/// Arguments for the `dataset` command.
#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Sources to ingest.
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Provider identifier prefix used when salvaging broken files.
    #[arg(long, default_value = "aws_")]
    pub prefix: String,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the `dataset` command.
///
/// # Errors
///
/// Returns an error if the pipeline fails or the output cannot be written.
pub fn execute(args: &DatasetArgs) -> anyhow::Result<()> {
    let dataset = terramap_resolve::run(&args.sources.config(&args.prefix))?;
    for (kind, count) in dataset.summary() {
        tracing::info!(section = %kind, count, "merged section");
    }
    let text = serde_json::to_string_pretty(&dataset)?;
    output::emit(&text, args.output.as_deref())
}
