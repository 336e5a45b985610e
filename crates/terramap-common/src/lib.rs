//! # terramap-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire terramap workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the primitives the resolution pipeline and
//! the graph builder exchange.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
