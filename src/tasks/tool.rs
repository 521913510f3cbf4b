//! External transform commands (script compiler, script minifier).
//!
//! A command receives the source on stdin and must print the result on
//! stdout. Arguments equal to `{file}` are replaced with the source path so
//! bundlers that need a real entry point can be used too.

use crate::build::TaskError;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

/// Placeholder replaced with the source file path
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Run `command` over `input`, returning its stdout.
///
/// An empty command returns the input unchanged.
pub fn run_tool(
    command: &[String],
    input: &[u8],
    cwd: &Path,
    file: &Path,
) -> Result<Vec<u8>, TaskError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(input.to_vec());
    };

    let tool_error = |message: String| TaskError::Tool { program: program.clone(), message };

    let mut cmd = Command::new(program);
    for arg in args {
        if arg == FILE_PLACEHOLDER {
            cmd.arg(file);
        } else {
            cmd.arg(arg);
        }
    }
    cmd.current_dir(cwd);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child =
        cmd.spawn().map_err(|e| tool_error(format!("failed to spawn: {}", e)))?;

    let mut stdin =
        child.stdin.take().ok_or_else(|| tool_error("stdin unavailable".to_string()))?;
    let mut stdout =
        child.stdout.take().ok_or_else(|| tool_error("stdout unavailable".to_string()))?;
    let mut stderr =
        child.stderr.take().ok_or_else(|| tool_error("stderr unavailable".to_string()))?;

    // Feed stdin while draining both pipes
    let (written, out, err) = std::thread::scope(|s| {
        let writer = s.spawn(move || stdin.write_all(input));
        let err_reader = s.spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf
        });
        let mut out = Vec::new();
        let read = stdout.read_to_end(&mut out).map(|_| out);
        let written = writer.join().unwrap_or(Ok(()));
        let err = err_reader.join().unwrap_or_default();
        (written, read, err)
    });

    let status = child.wait().map_err(|e| tool_error(format!("failed to wait: {}", e)))?;
    let out = out.map_err(|e| tool_error(format!("failed to read output: {}", e)))?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&err);
        return Err(tool_error(format!(
            "{} exited with {}: {}",
            file.display(),
            status,
            stderr.trim()
        )));
    }

    // A tool that reads its own input file may close stdin early
    if let Err(e) = written {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            return Err(tool_error(format!("failed to write input: {}", e)));
        }
    }

    Ok(out)
}
