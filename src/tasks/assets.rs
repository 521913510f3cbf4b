//! Static asset copying (images, fonts).

use crate::build::{discover, BuildContext, CategoryOutput, OutputFile, TaskError};
use rayon::prelude::*;
use std::fs;

/// Output directory for assets, relative to the output root
pub const ASSETS_DIR: &str = "assets";

/// Copy every asset to `assets/<relative path>`.
pub fn compile(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let files = discover(ctx.project_root(), &ctx.config().assets.sources)?;
    tracing::debug!("assets: {} file(s)", files.len());

    let loaded: Vec<_> = files
        .par_iter()
        .map(|file| {
            fs::read(&file.path)
                .map(|contents| OutputFile::new(format!("{}/{}", ASSETS_DIR, file.relative), contents))
                .map_err(|e| TaskError::io(&file.path, e))
        })
        .collect();

    let mut output = CategoryOutput::new();
    for result in loaded {
        match result {
            Ok(file) => output.push(file),
            Err(e) => output.push_error(e),
        }
    }
    Ok(output)
}
