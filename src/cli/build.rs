//! One-shot build commands (prod, sprites, process)

use std::process::ExitCode;

use super::{Project, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, BuildMode, Orchestrator, Pipeline, TaskKind};

/// Run a pipeline to completion and report its summary.
fn run_pipeline(project: Project, mode: BuildMode, pipeline: Pipeline, verbose: bool) -> ExitCode {
    let context = BuildContext::new(project.config, project.root, mode).with_verbose(verbose);
    if verbose {
        println!("Output: {}", context.out_dir().display());
    }
    let orchestrator = Orchestrator::new(context);

    match orchestrator.run(&pipeline) {
        Ok(result) => {
            if result.is_success() {
                println!("{}", result.summary());
                ExitCode::from(EXIT_SUCCESS)
            } else {
                eprintln!("{}", result.summary());
                ExitCode::from(EXIT_ERROR)
            }
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the prod command
pub fn run_prod(project: Project, verbose: bool) -> ExitCode {
    run_pipeline(project, BuildMode::Production, Pipeline::prod(), verbose)
}

/// Run the sprites command
pub fn run_sprites(project: Project, verbose: bool) -> ExitCode {
    run_pipeline(project, BuildMode::Development, Pipeline::single(TaskKind::Sprites), verbose)
}

/// Run the process command against the on-disk output
pub fn run_process(project: Project, verbose: bool) -> ExitCode {
    run_pipeline(project, BuildMode::Production, Pipeline::single(TaskKind::Process), verbose)
}
