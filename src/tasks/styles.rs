//! Stylesheet compilation and the vendor style bundle.
//!
//! Sass sources are compiled with `grass`; the resulting CSS is then
//! prefixed for the configured browser targets and printed with
//! `lightningcss`, minified in production and beautified in development.

use crate::build::{
    discover, select_category, BuildContext, CategoryOutput, OutputFile, SourceFile, TaskError,
};
use crate::config::BrowserTargets;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Output directory for stylesheets, relative to the output root
pub const STYLES_DIR: &str = "css";

/// Output path for a stylesheet: `css/<relative path with .css extension>`.
pub fn output_path(relative: &str) -> String {
    let without_ext = relative
        .strip_suffix(".scss")
        .or_else(|| relative.strip_suffix(".sass"))
        .or_else(|| relative.strip_suffix(".css"))
        .unwrap_or(relative);
    format!("{}/{}.css", STYLES_DIR, without_ext)
}

/// Sass partials are only compiled through imports.
pub fn is_partial(file: &SourceFile) -> bool {
    file.file_name().starts_with('_')
}

fn version(major: Option<u32>) -> Option<u32> {
    major.map(|v| v << 16)
}

/// Convert configured major versions into lightningcss targets.
pub fn targets(browsers: &BrowserTargets) -> Targets {
    let browsers = Browsers {
        android: version(browsers.android),
        chrome: version(browsers.chrome),
        edge: version(browsers.edge),
        firefox: version(browsers.firefox),
        ie: version(browsers.ie),
        ios_saf: version(browsers.ios_saf),
        opera: version(browsers.opera),
        safari: version(browsers.safari),
        samsung: None,
    };
    Targets { browsers: Some(browsers), ..Targets::default() }
}

/// Compile one Sass or CSS source to plain CSS.
pub fn compile_sass(path: &Path, load_paths: &[std::path::PathBuf]) -> Result<String, TaskError> {
    if path.extension().is_some_and(|e| e == "css") {
        return fs::read_to_string(path).map_err(|e| TaskError::io(path, e));
    }

    let options = load_paths.iter().fold(
        grass::Options::default().style(grass::OutputStyle::Expanded),
        |options, p| options.load_path(p),
    );
    grass::from_path(path, &options)
        .map_err(|e| TaskError::Compile { path: path.to_path_buf(), message: e.to_string() })
}

/// Prefix and print CSS for the given targets.
pub fn finish_css(
    css: &str,
    path: &Path,
    browsers: &BrowserTargets,
    minify: bool,
) -> Result<String, TaskError> {
    let compile_error =
        |message: String| TaskError::Compile { path: path.to_path_buf(), message };

    let mut sheet = StyleSheet::parse(
        css,
        ParserOptions { filename: path.display().to_string(), ..ParserOptions::default() },
    )
    .map_err(|e| compile_error(e.to_string()))?;

    let targets = targets(browsers);
    sheet
        .minify(MinifyOptions { targets, ..MinifyOptions::default() })
        .map_err(|e| compile_error(e.to_string()))?;

    let printed = sheet
        .to_css(PrinterOptions { minify, targets, ..PrinterOptions::default() })
        .map_err(|e| compile_error(e.to_string()))?;
    Ok(printed.code)
}

fn load_paths(ctx: &BuildContext) -> Vec<std::path::PathBuf> {
    ctx.config().styles.load_paths.iter().map(|p| ctx.resolve_path(p)).collect()
}

fn compile_file(ctx: &BuildContext, file: &SourceFile) -> Result<OutputFile, TaskError> {
    let cfg = &ctx.config().styles;
    let css = compile_sass(&file.path, &load_paths(ctx))?;
    let code = finish_css(&css, &file.path, &cfg.targets, ctx.is_production())?;
    Ok(OutputFile::new(output_path(&file.relative), code))
}

/// Compile project stylesheets (common ones and partials removed).
pub fn compile(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let cfg = &ctx.config().styles;
    let selection = select_category(ctx.project_root(), &cfg.sources, &cfg.exclude, &cfg.common)?;
    let sources: Vec<&SourceFile> = selection.main.iter().filter(|f| !is_partial(f)).collect();
    tracing::debug!("css: {} file(s)", sources.len());

    let compiled: Vec<_> = sources.par_iter().map(|file| compile_file(ctx, file)).collect();

    let mut output = CategoryOutput::new();
    for result in compiled {
        match result {
            Ok(file) => output.push(file),
            Err(e) => output.push_error(e),
        }
    }
    Ok(output)
}

/// Compile the common stylesheets in order, concatenate and finish them as
/// one bundle. Any failing member leaves the bundle unwritten.
pub fn compile_vendor(ctx: &BuildContext) -> Result<CategoryOutput, TaskError> {
    let cfg = &ctx.config().styles;
    let files = discover(ctx.project_root(), &cfg.common)?;
    let mut output = CategoryOutput::new();

    if files.is_empty() {
        tracing::warn!("vendor-css: no files match {:?}", cfg.common);
        return Ok(output);
    }

    let paths = load_paths(ctx);
    let mut parts = Vec::with_capacity(files.len());
    for file in &files {
        match compile_sass(&file.path, &paths) {
            Ok(css) => parts.push(css),
            Err(e) => output.push_error(e),
        }
    }
    if !output.errors.is_empty() {
        return Ok(output);
    }

    let bundle_path = format!("{}/{}", STYLES_DIR, cfg.bundle);
    match finish_css(&parts.join("\n"), Path::new(&bundle_path), &cfg.targets, ctx.is_production()) {
        Ok(code) => output.push(OutputFile::new(bundle_path, code)),
        Err(e) => output.push_error(e),
    }
    Ok(output)
}
