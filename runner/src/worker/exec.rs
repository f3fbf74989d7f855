use super::WorkerError;
use std::{
    process::{Command, ExitStatus, Stdio},
    time::{Duration, Instant},
};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
/// container for information extracted from running a domain tool
pub struct RunOutput {
    pub program: String,
    pub runtime: Duration,
    pub status: ExitStatus,
}

/// Run a prepared command to completion.
///
/// The tool inherits stdout and stderr, so its output ends up in the
/// scheduler's per-node log. With a timeout, a tool still running when it
/// expires is killed and the run fails.
#[tracing::instrument(level = "debug", skip(command), fields(program = ?command.get_program()))]
pub fn run_tool(command: &mut Command, timeout: Option<Duration>) -> Result<RunOutput, WorkerError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let start = Instant::now();

    let mut child = command
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| WorkerError::Spawn {
            program: program.clone(),
            source,
        })?;

    debug!("Tool running as {}", child.id());

    let status = match timeout {
        Some(timeout) => match child.wait_timeout(timeout).map_err(WorkerError::Wait)? {
            Some(status) => status,
            None => {
                warn!("Tool ran into timeout after {}s, killing it", timeout.as_secs());
                // the child may have exited in the meantime, only the wait matters
                let _ = child.kill();
                child.wait().map_err(WorkerError::Wait)?;

                return Err(WorkerError::Timeout { program, timeout });
            }
        },
        None => child.wait().map_err(WorkerError::Wait)?,
    };

    let runtime = start.elapsed();

    debug!(
        "Finished in {} ms | status: {}",
        runtime.as_millis(),
        status.success()
    );

    if status.success() {
        Ok(RunOutput {
            program,
            runtime,
            status,
        })
    } else {
        Err(WorkerError::Execution { program, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_run() {
        let output = run_tool(Command::new("sh").args(["-c", "exit 0"]), None).unwrap();

        assert!(output.status.success());
        assert_eq!(output.program, "sh");
    }

    #[test]
    fn failing_run() {
        let result = run_tool(Command::new("sh").args(["-c", "exit 3"]), None);

        assert!(matches!(
            result,
            Err(WorkerError::Execution { status, .. }) if status.code() == Some(3)
        ));
    }

    #[test]
    fn missing_program() {
        let result = run_tool(&mut Command::new("/definitely/not/here"), None);

        assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    }

    #[test]
    fn timeout_kills_the_tool() {
        let start = Instant::now();
        let result = run_tool(
            Command::new("sh").args(["-c", "sleep 30"]),
            Some(Duration::from_millis(200)),
        );

        assert!(matches!(result, Err(WorkerError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
