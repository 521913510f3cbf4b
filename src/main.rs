//! assetpipe - build, watch and serve front-end assets

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
