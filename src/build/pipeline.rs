//! Build pipeline orchestration.
//!
//! A pipeline is a tree of [`Step`]s: series steps run strictly in order,
//! parallel steps run their children on scoped threads and complete when all
//! children complete.

use crate::build::task::{run_task, TaskKind};
use crate::build::{BuildContext, BuildResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Error that aborts a pipeline run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// The previous output directory could not be removed
    #[error("cannot remove output directory {path}: {source}")]
    Clean { path: PathBuf, source: std::io::Error },
    /// Refused to remove an output directory holding the project or its sources
    #[error("refusing to remove output directory {path}: {reason}")]
    UnsafeOutput { path: PathBuf, reason: String },
    /// The in-memory output store could not be cleared
    #[error("cannot reset output: {0}")]
    Io(#[from] std::io::Error),
}

/// A node of the task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Reset the output: delete the output directory (production) or clear
    /// the in-memory store (development)
    Prepare,
    Task(TaskKind),
    Series(Vec<Step>),
    Parallel(Vec<Step>),
}

impl Step {
    /// Every compile category at once.
    pub fn compile_all() -> Step {
        Step::Parallel(TaskKind::COMPILE.iter().copied().map(Step::Task).collect())
    }

    /// Task kinds in this step, depth first.
    pub fn tasks(&self) -> Vec<TaskKind> {
        match self {
            Step::Prepare => Vec::new(),
            Step::Task(kind) => vec![*kind],
            Step::Series(steps) | Step::Parallel(steps) => {
                steps.iter().flat_map(Step::tasks).collect()
            }
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |steps: &[Step]| steps.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
        match self {
            Step::Prepare => write!(f, "prepare"),
            Step::Task(kind) => write!(f, "{}", kind),
            Step::Series(steps) => write!(f, "series({})", join(steps)),
            Step::Parallel(steps) => write!(f, "parallel({})", join(steps)),
        }
    }
}

/// A named task graph.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: &'static str,
    pub root: Step,
}

impl Pipeline {
    /// Clean in-memory build: prepare, sprites, then every category.
    ///
    /// Watching and serving are started by the caller once this completes.
    pub fn dev() -> Self {
        Self {
            name: "dev",
            root: Step::Series(vec![
                Step::Prepare,
                Step::Task(TaskKind::Sprites),
                Step::compile_all(),
            ]),
        }
    }

    /// Clean on-disk build with fingerprinting and the rewrite pass.
    pub fn prod() -> Self {
        Self {
            name: "prod",
            root: Step::Series(vec![
                Step::Prepare,
                Step::Task(TaskKind::Sprites),
                Step::compile_all(),
                Step::Task(TaskKind::Process),
            ]),
        }
    }

    /// A pipeline running a single task.
    pub fn single(kind: TaskKind) -> Self {
        Self { name: kind.name(), root: Step::Task(kind) }
    }
}

/// Executes pipelines against one build context.
///
/// Runs of the same task kind are serialized, so watch workers that both
/// schedule a category never write its outputs concurrently.
pub struct Orchestrator {
    context: BuildContext,
    running: HashMap<TaskKind, Mutex<()>>,
}

impl Orchestrator {
    pub fn new(context: BuildContext) -> Self {
        let running = TaskKind::ALL.iter().map(|&kind| (kind, Mutex::new(()))).collect();
        Self { context, running }
    }

    /// Exclusive access to run `kind`.
    pub(crate) fn lock(&self, kind: TaskKind) -> Option<MutexGuard<'_, ()>> {
        self.running.get(&kind).map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Run a pipeline to completion.
    ///
    /// Task failures are collected in the result; only a failed prepare step
    /// aborts the run.
    pub fn run(&self, pipeline: &Pipeline) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        tracing::info!("running '{}' pipeline ({})", pipeline.name, self.context.mode());
        tracing::debug!("steps: {}", pipeline.root);

        let result = self.run_step(&pipeline.root)?;
        Ok(result.with_duration(start.elapsed()))
    }

    /// Run one step of the task graph.
    pub fn run_step(&self, step: &Step) -> Result<BuildResult, BuildError> {
        match step {
            Step::Prepare => {
                prepare(&self.context)?;
                Ok(BuildResult::new())
            }
            Step::Task(kind) => {
                let _running = self.lock(*kind);
                let mut result = BuildResult::new();
                result.add_result(run_task(&self.context, *kind));
                Ok(result)
            }
            Step::Series(steps) => {
                let mut result = BuildResult::new();
                for step in steps {
                    result.extend(self.run_step(step)?);
                }
                Ok(result)
            }
            Step::Parallel(steps) => self.run_parallel(steps),
        }
    }

    fn run_parallel(&self, steps: &[Step]) -> Result<BuildResult, BuildError> {
        if steps.len() <= 1 {
            return steps.iter().try_fold(BuildResult::new(), |mut acc, s| {
                acc.extend(self.run_step(s)?);
                Ok(acc)
            });
        }

        let outcomes: Vec<Result<BuildResult, BuildError>> = std::thread::scope(|s| {
            let handles: Vec<_> =
                steps.iter().map(|step| s.spawn(move || self.run_step(step))).collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(BuildError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            "build worker panicked",
                        )))
                    })
                })
                .collect()
        });

        // Results keep step order regardless of completion order
        let mut result = BuildResult::new();
        for outcome in outcomes {
            result.extend(outcome?);
        }
        Ok(result)
    }
}

/// Reset the output before a pipeline run.
pub fn prepare(ctx: &BuildContext) -> Result<(), BuildError> {
    if ctx.is_production() {
        let path = ctx.out_dir();
        if let Some(error) = ctx.config().validate_output(ctx.project_root()).into_iter().next() {
            return Err(BuildError::UnsafeOutput { path, reason: error.message });
        }
        tracing::info!("removing {}", path.display());
        ctx.output().clear().map_err(|source| BuildError::Clean { path, source })
    } else {
        ctx.output().clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildMode;
    use crate::config::default_config;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prod_pipeline_shape() {
        let pipeline = Pipeline::prod();
        let Step::Series(steps) = &pipeline.root else {
            panic!("prod pipeline must be a series");
        };
        assert_eq!(steps[0], Step::Prepare);
        assert_eq!(steps[1], Step::Task(TaskKind::Sprites));
        assert!(matches!(&steps[2], Step::Parallel(children) if children.len() == 6));
        assert_eq!(steps[3], Step::Task(TaskKind::Process));
    }

    #[test]
    fn test_dev_pipeline_has_no_process() {
        assert!(!Pipeline::dev().root.tasks().contains(&TaskKind::Process));
        assert_eq!(Pipeline::dev().root.tasks()[0], TaskKind::Sprites);
    }

    #[test]
    fn test_step_display() {
        let step = Step::Series(vec![
            Step::Task(TaskKind::Sprites),
            Step::Parallel(vec![Step::Task(TaskKind::Assets), Step::Task(TaskKind::VendorStyles)]),
        ]);
        assert_eq!(step.to_string(), "series(sprites, parallel(assets, vendor-css))");
    }

    #[test]
    fn test_prepare_production_removes_previous_output() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("dist/js/old-0123456789.js");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Production);
        prepare(&ctx).unwrap();
        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn test_prepare_refuses_to_remove_project_root() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src/js/app.ts");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "export {};").unwrap();

        for out in [".", "", "src"] {
            let mut config = default_config();
            config.project.out = PathBuf::from(out);
            let ctx = BuildContext::new(config, temp.path().to_path_buf(), BuildMode::Production);
            let result = prepare(&ctx);
            assert!(matches!(result, Err(BuildError::UnsafeOutput { .. })), "out = {:?}", out);
        }
        assert!(source.exists());
    }

    #[test]
    fn test_prepare_development_clears_memory() {
        let ctx = BuildContext::new(default_config(), PathBuf::from("/project"), BuildMode::Development);
        ctx.output().write("css/a.css", b"a{}").unwrap();
        prepare(&ctx).unwrap();
        assert!(ctx.output().list().unwrap().is_empty());
    }

    #[test]
    fn test_parallel_results_keep_step_order() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let orchestrator = Orchestrator::new(ctx);

        let result = orchestrator.run_step(&Step::compile_all()).unwrap();
        let names: Vec<_> = result.tasks.iter().map(|t| t.task.as_str()).collect();
        assert_eq!(names, vec!["assets", "vendor-js", "vendor-css", "js", "css", "templates"]);
    }

    #[test]
    fn test_same_task_kind_runs_one_at_a_time() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(default_config(), temp.path().to_path_buf(), BuildMode::Development);
        let orchestrator = Orchestrator::new(ctx);

        let held = orchestrator.lock(TaskKind::Assets);
        std::thread::scope(|s| {
            let assets = s.spawn(|| orchestrator.run_step(&Step::Task(TaskKind::Assets)));
            let styles = s.spawn(|| orchestrator.run_step(&Step::Task(TaskKind::VendorStyles)));

            assert!(styles.join().unwrap().is_ok());
            std::thread::sleep(std::time::Duration::from_millis(100));
            assert!(!assets.is_finished());

            drop(held);
            assert!(assets.join().unwrap().is_ok());
        });
    }
}
