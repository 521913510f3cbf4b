//! Outcome of pipeline runs: one [`TaskResult`] per task run, aggregated into
//! a [`BuildResult`] whose summary the CLI prints.

use std::time::Duration;

/// Status of a single task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failed(String),
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Failed(_))
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Result of running one task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task name (e.g. `css`, `vendor-js`)
    pub task: String,
    pub status: TaskStatus,
    /// Output paths relative to the output root
    pub outputs: Vec<String>,
    pub duration: Duration,
    /// Per-file errors that did not stop the task
    pub errors: Vec<String>,
}

impl TaskResult {
    pub fn success(task: impl Into<String>, outputs: Vec<String>, duration: Duration) -> Self {
        Self { task: task.into(), status: TaskStatus::Success, outputs, duration, errors: vec![] }
    }

    pub fn failed(task: impl Into<String>, error: String, duration: Duration) -> Self {
        Self {
            task: task.into(),
            status: TaskStatus::Failed(error),
            outputs: vec![],
            duration,
            errors: vec![],
        }
    }

    /// Attach per-file errors.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete pipeline run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results in step order
    pub tasks: Vec<TaskResult>,
    pub total_duration: Duration,
}

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Append every result of another run.
    pub fn extend(&mut self, other: BuildResult) {
        self.tasks.extend(other.tasks);
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// No task failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn all_outputs(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    pub fn all_errors(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| r.errors.iter()).collect()
    }

    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    pub fn task(&self, name: &str) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == name)
    }

    /// One status line, each failed task, then up to five per-file errors.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let failed = self.failed_count();
        let total = self.tasks.len();
        let files = self.all_outputs().len();

        if failed > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} failed ({} total)",
                success, failed, total
            ));
            for task in self.failures() {
                lines.push(format!("  - {}: {}", task.task, task.status));
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} tasks, {} files in {:?}",
                total, files, self.total_duration
            ));
        }

        let errors = self.all_errors();
        if !errors.is_empty() {
            lines.push(format!("Errors ({}): ", errors.len()));
            for error in errors.iter().take(5) {
                lines.push(format!("  - {}", error));
            }
            if errors.len() > 5 {
                lines.push(format!("  ... and {} more", errors.len() - 5));
            }
        }

        lines.join("\n")
    }
}
