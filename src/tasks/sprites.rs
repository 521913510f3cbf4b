//! Sprite task: pack icon PNGs into the sprite image and its SCSS partial.
//!
//! Both outputs are written into the source tree, where the asset task and
//! the vendor style task pick them up.

use crate::build::{discover, BuildContext, TaskError};
use crate::sprite::{pack_top_down, sheet_scss, Icon};
use std::fs;
use std::path::Path;

fn write_file(path: &Path, contents: &[u8]) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}

/// Build the sprite sheet. Returns the written paths, project-relative.
///
/// With no icons nothing is written.
pub fn run(ctx: &BuildContext) -> Result<Vec<String>, TaskError> {
    let cfg = &ctx.config().sprites;
    let files = discover(ctx.project_root(), &cfg.sources)?;

    let mut icons = Vec::with_capacity(files.len());
    for file in &files {
        let image = image::open(&file.path)
            .map_err(|source| TaskError::Image { path: file.path.clone(), source })?;
        icons.push(Icon::new(file.stem(), image.to_rgba8()));
    }

    let Some(sheet) = pack_top_down(icons, cfg.padding) else {
        tracing::info!("sprites: no icons found, nothing to pack");
        return Ok(Vec::new());
    };

    let image_path = ctx.resolve_path(&cfg.image);
    if let Some(parent) = image_path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    sheet
        .image
        .save(&image_path)
        .map_err(|source| TaskError::Image { path: image_path.clone(), source })?;

    let stylesheet_path = ctx.resolve_path(&cfg.stylesheet);
    write_file(&stylesheet_path, sheet_scss(&sheet, &cfg.prefix, &cfg.image_url).as_bytes())?;

    tracing::debug!(
        "sprites: packed {} icon(s) into {}x{}",
        sheet.frames.len(),
        sheet.image.width(),
        sheet.image.height()
    );

    Ok(vec![
        cfg.image.to_string_lossy().into_owned(),
        cfg.stylesheet.to_string_lossy().into_owned(),
    ])
}
