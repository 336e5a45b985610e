//! # terramap-source
//!
//! Turns user-supplied sources into the set of configuration files a run
//! parses.
//!
//! Handles:
//! - **Locator**: Listing `.tf` / `auto.tfvars` files and annotation detection.
//! - **Address**: Parsing Terraform module source addresses.
//! - **Fetch**: Git, HTTP archive, and registry downloads into the run cache.
//! - **Module**: Deduplicated module resolution with cache-path mapping.
//! - **Annotation**: Loading `architecture.yml` files.
//! - **Workspace**: The run-scoped temporary directory.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod address;
pub mod annotation;
pub mod fetch;
pub mod locator;
pub mod module;
pub mod workspace;
