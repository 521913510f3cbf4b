//! Dev command: in-memory build, watchers and the live-reload server

use std::process::ExitCode;
use std::sync::Arc;

use super::{Project, EXIT_ERROR};
use crate::build::{BuildContext, BuildMode, Orchestrator, Pipeline};
use crate::reload::ReloadHub;
use crate::server::DevServer;

/// Run the dev command
///
/// Task failures in the initial build are reported but do not stop the
/// server; fixing the source triggers a rebuild.
pub fn run_dev(project: Project, verbose: bool) -> ExitCode {
    let context =
        BuildContext::new(project.config, project.root, BuildMode::Development).with_verbose(verbose);
    let orchestrator = Arc::new(Orchestrator::new(context));

    match orchestrator.run(&Pipeline::dev()) {
        Ok(result) if result.is_success() => println!("{}", result.summary()),
        Ok(result) => eprintln!("{}", result.summary()),
        Err(e) => {
            eprintln!("Build error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    }

    let hub = ReloadHub::new();
    let watcher = {
        let orchestrator = Arc::clone(&orchestrator);
        let hub = hub.clone();
        std::thread::Builder::new().name("watch".to_string()).spawn(move || {
            if let Err(e) = crate::watch::watch(orchestrator, hub) {
                tracing::error!("watch stopped: {}", e);
            }
        })
    };
    if let Err(e) = watcher {
        eprintln!("Error starting watcher: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    let server = DevServer::new(orchestrator.context(), hub);
    println!("Serving at http://{}", server.addr());
    println!("Press Ctrl+C to stop");

    match server.serve() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
