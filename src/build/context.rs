//! Build context containing configuration and state for a build.

use crate::build::output::{DiskOutput, MemoryOutput, OutputSink};
use crate::config::PipelineConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Development or production behavior for every task in a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// In-memory output, no minification, no fingerprinting
    #[default]
    Development,
    /// On-disk output, minified and fingerprinted, with manifests
    Production,
}

impl BuildMode {
    pub fn is_production(self) -> bool {
        matches!(self, BuildMode::Production)
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

/// Build context containing configuration and paths for a build operation.
///
/// The mode is fixed at construction and passed to every task; there is no
/// ambient mode state. The output sink is shared between tasks, the watcher
/// and the dev server.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: PipelineConfig,
    /// Project root directory (where assetpipe.toml is located)
    project_root: PathBuf,
    mode: BuildMode,
    /// Whether to run in verbose mode
    verbose: bool,
    /// Where emitted files go
    output: Arc<dyn OutputSink>,
}

impl BuildContext {
    /// Create a new build context.
    ///
    /// Production writes to the configured output directory on disk;
    /// development writes to a fresh in-memory store.
    pub fn new(config: PipelineConfig, project_root: PathBuf, mode: BuildMode) -> Self {
        let out_dir = resolve(&project_root, &config.project.out);
        let output: Arc<dyn OutputSink> = match mode {
            BuildMode::Production => Arc::new(DiskOutput::new(out_dir)),
            BuildMode::Development => Arc::new(MemoryOutput::new()),
        };
        Self { config, project_root, mode, verbose: false, output }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn is_production(&self) -> bool {
        self.mode.is_production()
    }

    /// Get the output directory (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// The sink every task emits into.
    pub fn output(&self) -> &Arc<dyn OutputSink> {
        &self.output
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Replace the output sink.
    pub fn with_output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = output;
        self
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        resolve(&self.project_root, path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
