//! # terramap-graph
//!
//! Turns a merged dataset into an ordered resource graph.
//!
//! Handles:
//! - **Rules**: Versioned provider rule tables, embedded or loaded from YAML.
//! - **Declarations**: Resource and data declarations placed in module scope.
//! - **References**: Address scanning over unevaluated attribute text.
//! - **Builder**: Consolidation, variants, edges, handlers and draw order.
//! - **Model**: The serialisable graph handed to renderers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod declarations;
mod handlers;
pub mod model;
pub mod references;
pub mod rules;

pub use builder::{BuildOptions, GraphBuilder};
pub use model::{Arrow, EdgeOrigin, GraphEdge, GraphModel, GraphNode};
pub use rules::ProviderRules;
