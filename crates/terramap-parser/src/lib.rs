//! # terramap-parser
//!
//! Reads Terraform configuration files into raw blocks.
//!
//! Handles:
//! - **Grammar**: The block grammar collaborator, backed by `hcl-rs`.
//! - **Salvage**: Line rewriting for files the grammar cannot evaluate.
//! - **Loader**: Parse, salvage once on failure, abort if still broken.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod grammar;
pub mod loader;
pub mod salvage;
