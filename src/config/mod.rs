//! Configuration module for the asset pipeline
//!
//! Provides types and parsing for `assetpipe.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, find_config, load_config, merge_cli_overrides, CliOverrides, ConfigError};
pub use schema::*;
