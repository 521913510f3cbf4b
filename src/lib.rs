//! assetpipe - front-end asset pipeline
//!
//! This library provides functionality to:
//! - Compile scripts, styles, templates and static assets from a source tree
//! - Pack icon images into a sprite sheet with a matching SCSS partial
//! - Fingerprint production output and rewrite references through manifests
//! - Rebuild on change and serve the in-memory output with live reload

pub mod build;
pub mod cli;
pub mod config;
pub mod reload;
pub mod server;
pub mod sprite;
pub mod tasks;
pub mod watch;
