//! `tmap rules`: Validate a rule table and print its summary.

use std::path::PathBuf;

use clap::Args;

use crate::output;

/// Arguments for the `rules` command.
#[derive(Args, Debug)]
pub struct RulesArgs {
    /// Rule table to check; defaults to the embedded AWS table.
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

/// Executes the `rules` command.
///
/// # Errors
///
/// Returns an error if the table cannot be read or is invalid.
pub fn execute(args: &RulesArgs) -> anyhow::Result<()> {
    let rules = super::load_rules(args.rules.as_ref())?;
    output::emit(&rules.summary(), None)
}
