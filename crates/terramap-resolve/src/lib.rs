//! # terramap-resolve
//!
//! Builds the unified configuration dataset for a run.
//!
//! Handles:
//! - **Merge**: Folding parsed files into per-section, per-file datasets.
//! - **Pipeline**: Locate, load, merge and expand modules through a work queue.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod merge;
pub mod pipeline;

pub use merge::MergedDataset;
pub use pipeline::{Pipeline, run};
