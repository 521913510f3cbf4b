//! Build pipeline module for assetpipe
//!
//! Provides the core build system turning front-end sources into an output
//! tree of scripts, stylesheets, assets and HTML.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: Find source files using glob patterns from config
//! - **Compilation**: One task per category produces output files
//! - **Finalization**: Production output is fingerprinted and listed in
//!   per-category manifests
//! - **Processing**: References in emitted files are rewritten to the
//!   fingerprinted names
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{BuildContext, BuildMode, Orchestrator, Pipeline};
//! use assetpipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root, BuildMode::Production);
//! let result = Orchestrator::new(context).run(&Pipeline::prod())?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod discovery;
pub mod fingerprint;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod result;
pub mod task;

pub use context::*;
pub use discovery::*;
pub use manifest::*;
pub use output::*;
pub use pipeline::*;
pub use result::*;
pub use task::*;
