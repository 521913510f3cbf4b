//! Per-category compile functions.
//!
//! Each category reads its selection from the config and returns the files it
//! wants to emit; finalization and emission live in [`crate::build::task`].

pub mod assets;
pub mod bundle;
pub mod scripts;
pub mod sprites;
pub mod styles;
pub mod templates;
pub mod tool;
pub mod transpile;

pub use tool::run_tool;
