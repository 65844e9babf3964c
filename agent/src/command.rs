//! Subprocess helpers with hard timeouts.
//!
//! Every command the agent runs goes through here so none of them can
//! stall the sampling loop or a request for longer than its limit. The
//! child is spawned with `kill_on_drop`, so an elapsed timeout also kills
//! the process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Limit for internal sampling and status commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error("{program} exited with status {status}")]
    Failed { program: String, status: String },
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// stdout followed by stderr, trailing newlines trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out.trim_end_matches(['\n', '\r']).to_string()
    }
}

/// Run `command` through `sh -c`, optionally in `cwd`, within `limit`.
pub async fn run_shell(
    command: &str,
    cwd: Option<&Path>,
    limit: Duration,
) -> Result<CommandOutput, CommandError> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    run(cmd, "sh", limit).await
}

/// Run `program` with `args` and return stdout; a non-zero exit is an error.
pub async fn run_program(program: &str, args: &[&str]) -> Result<String, CommandError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let output = run(cmd, program, COMMAND_TIMEOUT).await?;
    if !output.success {
        return Err(CommandError::Failed {
            program: program.to_string(),
            status: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// Run a shell command for its trimmed stdout regardless of exit status.
///
/// Failures are folded into the returned text as `"Error: ..."`; callers
/// display the result rather than branch on it.
pub async fn run_command(command: &str) -> String {
    match run_shell(command, None, COMMAND_TIMEOUT).await {
        Ok(output) => output.stdout.trim().to_string(),
        Err(e) => format!("Error: {e}"),
    }
}

async fn run(mut cmd: Command, program: &str, limit: Duration) -> Result<CommandOutput, CommandError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| CommandError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?,
        Err(_) => {
            debug!("{program} timed out after {:?}", limit);
            return Err(CommandError::TimedOut(limit));
        }
    };

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    })
}
