//! Shell command job bodies.

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use dsched_core::JobError;

/// Run `command` with `sh -c` and map its exit status to a job outcome.
///
/// Exit status 0 yields the trimmed stdout. A non-zero exit is a domain
/// failure with code `EXIT_<status>` and the trimmed stderr as message.
/// Failing to spawn, or termination by a signal, is unclassified.
pub(crate) async fn run_command(command: &str) -> Result<String, JobError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    debug!(command, status = ?output.status, "Command finished");

    if output.status.success() {
        return Ok(stdout);
    }

    match output.status.code() {
        Some(code) => Err(JobError::domain(format!("EXIT_{}", code), stderr)),
        None => Err(JobError::unclassified(format!(
            "command terminated by signal: {}",
            output.status
        ))),
    }
}
