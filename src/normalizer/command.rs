//! Bounded execution of external converters

use crate::error::ConversionError;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Longest stderr tail kept in error messages
const STDERR_TAIL: usize = 512;

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (None when killed by a signal)
    pub code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Run `program` with `args`, killing it once `timeout` elapses
///
/// Succeeds only when the program exits with status zero.
pub async fn run_with_timeout<P, I, S>(
    program: P,
    args: I,
    timeout: Duration,
) -> Result<CommandOutput, ConversionError>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.as_ref().to_string_lossy().into_owned();

    let child = Command::new(program.as_ref())
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ConversionError::Spawn {
            program: program_name.clone(),
            reason: e.to_string(),
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ConversionError::Spawn {
                program: program_name,
                reason: e.to_string(),
            });
        }
        Err(_) => {
            tracing::warn!(program = %program_name, timeout = ?timeout, "converter timed out");
            return Err(ConversionError::Timeout {
                program: program_name,
                timeout,
            });
        }
    };

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !output.status.success() {
        tracing::debug!(program = %program_name, code = ?result.code, "converter failed");
        return Err(ConversionError::NonZeroExit {
            program: program_name,
            code: result.code,
            stderr: stderr_tail(&result.stderr),
        });
    }

    Ok(result)
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= STDERR_TAIL {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
