//! Running one terminal command: `cd` interception and shell execution.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::command::run_shell;

/// Characters that make a `cd` line a compound shell command.
const SHELL_OPERATORS: &[char] = &['&', '|', ';', '<', '>', '`', '$', '(', ')'];

/// If `command`'s first word is exactly `cd`, its argument (`None` for a
/// bare `cd`).
///
/// The rest of the line is taken as one path. A `cd` line containing shell
/// operators (`cd /tmp && ls`) is not intercepted and runs in the shell
/// instead, so it doesn't change the session cwd.
pub fn parse_cd(command: &str) -> Option<Option<&str>> {
    let trimmed = command.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    if parts.next()? != "cd" {
        return None;
    }
    let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
    if arg.is_some_and(|a| a.contains(SHELL_OPERATORS)) {
        return None;
    }
    Some(arg)
}

/// Resolve a `cd` argument against `cwd`: `~` expands to `home`, relative
/// paths are joined, and `.`/`..` are collapsed lexically.
pub fn resolve_cd_target(arg: Option<&str>, cwd: &Path, home: &Path) -> PathBuf {
    let Some(arg) = arg else {
        return home.to_path_buf();
    };
    let home_str = home.to_string_lossy().into_owned();
    let expanded = shellexpand::tilde_with_context(arg, || Some(home_str.as_str()));
    let path = Path::new(&*expanded);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    normalize(&joined)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}

/// Apply a `cd` to `cwd`. Returns the command output (empty on success).
pub async fn change_dir(arg: Option<&str>, cwd: &mut PathBuf, home: &Path) -> String {
    let target = resolve_cd_target(arg, cwd, home);
    let is_dir = tokio::fs::metadata(&target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        debug!("cd -> {}", target.display());
        *cwd = target;
        String::new()
    } else {
        format!("cd: {}: No such file or directory", arg.unwrap_or("~"))
    }
}

/// Run `command` through the shell in `cwd`. Timeouts and spawn failures
/// are reported as `Error: ...` output.
pub async fn run_in(command: &str, cwd: &Path, limit: Duration) -> String {
    match run_shell(command, Some(cwd), limit).await {
        Ok(output) => output.combined(),
        Err(e) => format!("Error: {e}"),
    }
}
