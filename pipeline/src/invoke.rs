//! Running one converter invocation under a wall-clock limit.
//!
//! The child's stdout and stderr go straight into the item's append-only
//! log, so nothing is buffered in memory and a chatty converter cannot
//! fill a pipe and stall.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use corpus_lab_core::TIMEOUT_EXIT_CODE;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Recorded when the converter could not be started at all.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 127;

/// Recorded when the converter exists but could not be executed.
pub const NOT_EXECUTABLE_EXIT_CODE: i32 = 126;

/// Recorded when waiting on the child failed; the outcome is unknown.
pub const WAIT_FAILED_EXIT_CODE: i32 = -1;

/// Opens `path` for appending, creating it if needed.
pub fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn render_command(program: &Path, args: &[OsString]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(WAIT_FAILED_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(WAIT_FAILED_EXIT_CODE)
}

/// Runs `program` with `args` in `cwd`, logging to `log_path`.
///
/// The log receives `$ <command line>`, the child's combined output, then
/// either `[exit=N]` or `ERROR: timeout`. A child that outlives `timeout` is
/// killed and reaped and the call returns [`TIMEOUT_EXIT_CODE`].
///
/// # Errors
///
/// Only failures to open or write the log are errors. Spawn and wait
/// failures are reported through the returned exit code.
pub fn run_logged(
    program: &Path,
    args: &[OsString],
    cwd: &Path,
    log_path: &Path,
    timeout: Duration,
) -> io::Result<i32> {
    let mut log = open_log(log_path)?;
    writeln!(log, "$ {}", render_command(program, args))?;
    log.flush()?;

    let spawn_result = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log.try_clone()?))
        .spawn();

    let mut child = match spawn_result {
        Ok(child) => child,
        Err(err) => {
            let code = if err.kind() == io::ErrorKind::NotFound {
                SPAWN_FAILED_EXIT_CODE
            } else {
                NOT_EXECUTABLE_EXIT_CODE
            };
            warn!(program = %program.display(), error = %err, "Failed to spawn converter");
            writeln!(log, "ERROR: spawn failed: {err}")?;
            writeln!(log, "\n[exit={code}]")?;
            return Ok(code);
        }
    };

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => {
            let code = exit_code(status);
            debug!(program = %program.display(), exit_code = code, "Converter finished");
            writeln!(log, "\n[exit={code}]")?;
            Ok(code)
        }
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(
                cwd = %cwd.display(),
                timeout_ms = timeout.as_millis() as u64,
                "Converter timed out"
            );
            writeln!(log, "ERROR: timeout")?;
            Ok(TIMEOUT_EXIT_CODE)
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            warn!(cwd = %cwd.display(), error = %err, "Waiting on converter failed");
            writeln!(log, "ERROR: wait failed: {err}")?;
            Ok(WAIT_FAILED_EXIT_CODE)
        }
    }
}
