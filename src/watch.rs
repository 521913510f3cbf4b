//! Watch mode: per-category rebuilds on file changes with live reload
//!
//! Debounced file events are routed to the categories whose patterns match
//! the changed path. Each category owns a worker thread running a small state
//! machine (Idle -> Compiling -> Reloading -> Idle); changes arriving while it
//! compiles are coalesced into a single follow-up run.

use crate::build::discovery::{glob_base, PatternSet};
use crate::build::output::to_slash;
use crate::build::{DiscoveryError, Orchestrator, Step, TaskKind};
use crate::config::PipelineConfig;
use crate::reload::{ReloadEvent, ReloadHub};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error during watch mode
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch {path}: {source}")]
    WatchPath { path: PathBuf, source: notify::Error },
    /// Channel receive error
    #[error("Watch channel error: {0}")]
    Channel(String),
    /// A watch pattern did not compile
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// No pattern base directory exists
    #[error("Nothing to watch: no source directories exist")]
    NothingToWatch,
}

/// A watched source category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchCategory {
    Assets,
    Sprites,
    VendorScripts,
    VendorStyles,
    Scripts,
    Styles,
    Templates,
}

impl WatchCategory {
    pub const ALL: [WatchCategory; 7] = [
        WatchCategory::Assets,
        WatchCategory::Sprites,
        WatchCategory::VendorScripts,
        WatchCategory::VendorStyles,
        WatchCategory::Scripts,
        WatchCategory::Styles,
        WatchCategory::Templates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WatchCategory::Assets => "assets",
            WatchCategory::Sprites => "sprites",
            WatchCategory::VendorScripts => "vendor-js",
            WatchCategory::VendorStyles => "vendor-css",
            WatchCategory::Scripts => "js",
            WatchCategory::Styles => "css",
            WatchCategory::Templates => "templates",
        }
    }

    /// Patterns whose changes trigger this category.
    ///
    /// Vendor categories also watch their `exclude` patterns: the common
    /// subtree holds the files the vendor entry points import.
    pub fn patterns(self, config: &PipelineConfig) -> Vec<String> {
        match self {
            WatchCategory::Assets => config.assets.sources.clone(),
            WatchCategory::Sprites => config.sprites.sources.clone(),
            WatchCategory::VendorScripts => {
                [config.scripts.common.clone(), config.scripts.exclude.clone()].concat()
            }
            WatchCategory::VendorStyles => {
                [config.styles.common.clone(), config.styles.exclude.clone()].concat()
            }
            WatchCategory::Scripts => config.scripts.sources.clone(),
            WatchCategory::Styles => config.styles.sources.clone(),
            WatchCategory::Templates => config.templates.sources.clone(),
        }
    }

    /// The step re-run when this category changes.
    pub fn step(self) -> Step {
        match self {
            WatchCategory::Assets => Step::Task(TaskKind::Assets),
            WatchCategory::Sprites => Step::Series(vec![
                Step::Task(TaskKind::Sprites),
                Step::Parallel(vec![
                    Step::Task(TaskKind::Assets),
                    Step::Task(TaskKind::VendorStyles),
                ]),
            ]),
            WatchCategory::VendorScripts => Step::Task(TaskKind::VendorScripts),
            WatchCategory::VendorStyles => Step::Task(TaskKind::VendorStyles),
            WatchCategory::Scripts => Step::Task(TaskKind::Scripts),
            WatchCategory::Styles => Step::Task(TaskKind::Styles),
            WatchCategory::Templates => Step::Task(TaskKind::Templates),
        }
    }
}

/// Worker state for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Idle,
    Compiling,
    Reloading,
}

/// State machine driving a category worker.
#[derive(Debug, Default)]
pub struct CategoryState {
    state: WatchState,
    pending: bool,
}

impl CategoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// A change arrived. Returns true if a compile should start now.
    pub fn on_change(&mut self) -> bool {
        match self.state {
            WatchState::Idle => {
                self.state = WatchState::Compiling;
                true
            }
            WatchState::Compiling | WatchState::Reloading => {
                self.pending = true;
                false
            }
        }
    }

    /// The compile step finished; reload comes next.
    pub fn on_compiled(&mut self) {
        if self.state == WatchState::Compiling {
            self.state = WatchState::Reloading;
        }
    }

    /// The reload was broadcast. Returns true if a coalesced follow-up
    /// compile should start immediately.
    pub fn on_reloaded(&mut self) -> bool {
        if self.state != WatchState::Reloading {
            return false;
        }
        if self.pending {
            self.pending = false;
            self.state = WatchState::Compiling;
            true
        } else {
            self.state = WatchState::Idle;
            false
        }
    }
}

/// Maps changed paths to the categories that must rebuild.
#[derive(Debug)]
pub struct WatchRouter {
    root: PathBuf,
    routes: Vec<(WatchCategory, PatternSet)>,
}

impl WatchRouter {
    pub fn new(root: &Path, config: &PipelineConfig) -> Result<Self, WatchError> {
        let mut routes = Vec::new();
        for category in WatchCategory::ALL {
            routes.push((category, PatternSet::new(&category.patterns(config))?));
        }
        Ok(Self { root: root.to_path_buf(), routes })
    }

    /// Categories affected by a change to `path`.
    pub fn classify(&self, path: &Path) -> Vec<WatchCategory> {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => to_slash(rel),
            Err(_) => return Vec::new(),
        };
        self.routes
            .iter()
            .filter(|(_, patterns)| patterns.matches(&relative))
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Existing base directories of the watch patterns, without nesting.
pub fn watch_roots(root: &Path, config: &PipelineConfig) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WatchCategory::ALL
        .iter()
        .flat_map(|c| c.patterns(config))
        .flat_map(|p| crate::build::discovery::expand_braces(&p))
        .map(|p| glob_base(&p))
        // Root-level patterns such as `**/*.d.ts` only filter events
        .filter(|base| !base.is_empty())
        .map(|base| root.join(base))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs.dedup();

    let mut roots: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if !roots.iter().any(|r| dir.starts_with(r)) {
            roots.push(dir);
        }
    }
    roots
}

fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

/// Worker loop for one category. Runs until its channel closes.
fn run_worker(
    category: WatchCategory,
    orchestrator: Arc<Orchestrator>,
    hub: ReloadHub,
    rx: Receiver<()>,
) {
    let step = category.step();
    let mut state = CategoryState::new();

    while rx.recv().is_ok() {
        // Collapse a burst of queued changes into one run
        while rx.try_recv().is_ok() {}
        if !state.on_change() {
            continue;
        }

        loop {
            let start = Instant::now();
            match orchestrator.run_step(&step) {
                Ok(result) if result.is_success() => {
                    tracing::info!("{} rebuilt in {}", category.name(), format_duration(start.elapsed()));
                }
                Ok(result) => {
                    tracing::warn!("{} rebuilt with errors\n{}", category.name(), result.summary());
                }
                Err(e) => tracing::error!("{} rebuild failed: {}", category.name(), e),
            }
            state.on_compiled();

            let reached = hub.broadcast(ReloadEvent { category: category.name().to_string() });
            tracing::debug!("reload sent to {} client(s)", reached);

            if rx.try_iter().count() > 0 {
                state.on_change();
            }
            if !state.on_reloaded() {
                break;
            }
        }
    }
}

/// Watch every category and rebuild on change.
///
/// Blocks until the event channel closes.
pub fn watch(orchestrator: Arc<Orchestrator>, hub: ReloadHub) -> Result<(), WatchError> {
    let ctx = orchestrator.context();
    let root = ctx.project_root().to_path_buf();
    let router = WatchRouter::new(&root, ctx.config())?;
    let roots = watch_roots(&root, ctx.config());
    if roots.is_empty() {
        return Err(WatchError::NothingToWatch);
    }

    let (tx, rx) = channel();
    let debounce = Duration::from_millis(u64::from(ctx.config().watch.debounce_ms));
    let mut debouncer = new_debouncer(debounce, tx).map_err(WatchError::WatcherInit)?;
    for dir in &roots {
        debouncer
            .watcher()
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath { path: dir.clone(), source })?;
        tracing::debug!("watching {}", dir.display());
    }

    let mut workers: Vec<(WatchCategory, Sender<()>)> = Vec::new();
    for category in WatchCategory::ALL {
        let (worker_tx, worker_rx) = channel();
        let orchestrator = Arc::clone(&orchestrator);
        let hub = hub.clone();
        std::thread::Builder::new()
            .name(format!("watch-{}", category.name()))
            .spawn(move || run_worker(category, orchestrator, hub, worker_rx))
            .map_err(|e| WatchError::Channel(e.to_string()))?;
        workers.push((category, worker_tx));
    }

    tracing::info!("watching {} director{} for changes", roots.len(), if roots.len() == 1 { "y" } else { "ies" });

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let mut triggered = Vec::new();
                for event in events.iter().filter(|e| matches!(e.kind, DebouncedEventKind::Any)) {
                    for category in router.classify(&event.path) {
                        if !triggered.contains(&category) {
                            tracing::debug!("{} changed ({})", event.path.display(), category.name());
                            triggered.push(category);
                        }
                    }
                }
                for (category, worker) in &workers {
                    if triggered.contains(category) {
                        let _ = worker.send(());
                    }
                }
            }
            Ok(Err(error)) => {
                // Watch error (non-fatal) - log but continue watching
                tracing::warn!("watch error: {:?}", error);
            }
            Err(e) => return Err(WatchError::Channel(e.to_string())),
        }
    }
}
