//! Build tasks and the shared compile contract.
//!
//! Every compile category produces a [`CategoryOutput`]: the files it wants
//! to emit plus any per-file errors. The output is finalized by mode
//! (fingerprinted with a manifest in production) and emitted to the sink.

use crate::build::discovery::DiscoveryError;
use crate::build::fingerprint::fingerprint;
use crate::build::manifest::{ManifestError, RevManifest};
use crate::build::{process, BuildContext, BuildMode, TaskResult};
use crate::tasks;
use std::path::PathBuf;
use std::time::Instant;

/// Error raised by a single task or while transforming a single file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TaskError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    /// Stylesheet or script compilation failure
    #[error("{path}: {message}")]
    Compile { path: PathBuf, message: String },
    /// External tool could not be run or exited unsuccessfully
    #[error("{program}: {message}")]
    Tool { program: String, message: String },
    #[error("template {name}: {message}")]
    Template { name: String, message: String },
    #[error("{path}: {source}")]
    Image { path: PathBuf, source: image::ImageError },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The manifest keys could not be compiled into a matcher
    #[error("cannot build reference table: {0}")]
    Rewrite(aho_corasick::BuildError),
    /// Writing to the output sink failed
    #[error("cannot write {path}: {source}")]
    Output { path: String, source: std::io::Error },
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io { path: path.into(), source }
    }
}

/// A unit of work in a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Sprites,
    Assets,
    VendorScripts,
    VendorStyles,
    Scripts,
    Styles,
    Templates,
    /// Production reference-rewrite pass
    Process,
}

impl TaskKind {
    pub const ALL: [TaskKind; 8] = [
        TaskKind::Sprites,
        TaskKind::Assets,
        TaskKind::VendorScripts,
        TaskKind::VendorStyles,
        TaskKind::Scripts,
        TaskKind::Styles,
        TaskKind::Templates,
        TaskKind::Process,
    ];

    /// Every compile category, in the order pipelines list them.
    pub const COMPILE: [TaskKind; 6] = [
        TaskKind::Assets,
        TaskKind::VendorScripts,
        TaskKind::VendorStyles,
        TaskKind::Scripts,
        TaskKind::Styles,
        TaskKind::Templates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Sprites => "sprites",
            TaskKind::Assets => "assets",
            TaskKind::VendorScripts => "vendor-js",
            TaskKind::VendorStyles => "vendor-css",
            TaskKind::Scripts => "js",
            TaskKind::Styles => "css",
            TaskKind::Templates => "templates",
            TaskKind::Process => "process",
        }
    }

    /// Name of the manifest this task writes in production, if any.
    pub fn manifest_name(self) -> Option<&'static str> {
        match self {
            TaskKind::Assets => Some("assets"),
            TaskKind::VendorScripts => Some("vendors-js"),
            TaskKind::VendorStyles => Some("vendors-css"),
            TaskKind::Scripts => Some("js"),
            TaskKind::Styles => Some("css"),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A file to emit, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into(), contents: contents.into() }
    }
}

/// What one compile category produced.
#[derive(Debug, Default)]
pub struct CategoryOutput {
    pub files: Vec<OutputFile>,
    /// Original to fingerprinted path; empty until fingerprinted
    pub manifest: RevManifest,
    /// Files that failed, already logged
    pub errors: Vec<String>,
}

impl CategoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: OutputFile) {
        self.files.push(file);
    }

    /// Log and record a per-file failure.
    pub fn push_error(&mut self, error: TaskError) {
        tracing::error!("{}", error);
        self.errors.push(error.to_string());
    }

    /// Rename every file to its content-hashed name and record the mapping.
    pub fn fingerprint(mut self) -> Self {
        for file in &mut self.files {
            let hashed = fingerprint(&file.path, &file.contents);
            self.manifest.insert(file.path.clone(), hashed.clone());
            file.path = hashed;
        }
        self
    }

    /// Apply mode-dependent finalization.
    pub fn finalize(self, kind: TaskKind, mode: BuildMode) -> Self {
        if mode.is_production() && kind.manifest_name().is_some() {
            self.fingerprint()
        } else {
            self
        }
    }
}

/// Write a category's files to the sink, plus its manifest in production.
///
/// Returns the emitted paths.
pub fn emit(
    ctx: &BuildContext,
    kind: TaskKind,
    output: &CategoryOutput,
) -> Result<Vec<String>, TaskError> {
    let sink = ctx.output().as_ref();
    let mut written = Vec::with_capacity(output.files.len() + 1);

    for file in &output.files {
        sink.write(&file.path, &file.contents)
            .map_err(|source| TaskError::Output { path: file.path.clone(), source })?;
        tracing::debug!("emitted {}", file.path);
        written.push(file.path.clone());
    }

    if ctx.is_production() {
        if let Some(name) = kind.manifest_name() {
            written.push(output.manifest.save(sink, name)?);
        }
    }

    Ok(written)
}

/// Compile one category without emitting.
pub fn compile(ctx: &BuildContext, kind: TaskKind) -> Result<CategoryOutput, TaskError> {
    let output = match kind {
        TaskKind::Assets => tasks::assets::compile(ctx)?,
        TaskKind::VendorScripts => tasks::scripts::compile_vendor(ctx)?,
        TaskKind::VendorStyles => tasks::styles::compile_vendor(ctx)?,
        TaskKind::Scripts => tasks::scripts::compile(ctx)?,
        TaskKind::Styles => tasks::styles::compile(ctx)?,
        TaskKind::Templates => tasks::templates::compile(ctx)?,
        TaskKind::Sprites | TaskKind::Process => CategoryOutput::new(),
    };
    Ok(output.finalize(kind, ctx.mode()))
}

fn execute(ctx: &BuildContext, kind: TaskKind) -> Result<(Vec<String>, Vec<String>), TaskError> {
    match kind {
        TaskKind::Sprites => Ok((tasks::sprites::run(ctx)?, Vec::new())),
        TaskKind::Process => {
            let rewritten = process::run(ctx.output().as_ref())?;
            Ok((rewritten, Vec::new()))
        }
        _ => {
            let output = compile(ctx, kind)?;
            let written = emit(ctx, kind, &output)?;
            Ok((written, output.errors))
        }
    }
}

/// Run a single task to completion and report how it went.
///
/// Failures are logged and folded into the result; they never propagate.
pub fn run_task(ctx: &BuildContext, kind: TaskKind) -> TaskResult {
    let start = Instant::now();
    tracing::info!("starting '{}'", kind);

    match execute(ctx, kind) {
        Ok((outputs, errors)) => {
            let duration = start.elapsed();
            if errors.is_empty() {
                tracing::info!("finished '{}' after {:?}", kind, duration);
                TaskResult::success(kind.name(), outputs, duration)
            } else {
                tracing::warn!(
                    "finished '{}' after {:?} with {} failed file(s)",
                    kind,
                    duration,
                    errors.len()
                );
                let mut result = TaskResult::failed(
                    kind.name(),
                    format!("{} file(s) failed", errors.len()),
                    duration,
                )
                .with_errors(errors);
                result.outputs = outputs;
                result
            }
        }
        Err(e) => {
            tracing::error!("'{}' failed: {}", kind, e);
            TaskResult::failed(kind.name(), e.to_string(), start.elapsed())
        }
    }
}
