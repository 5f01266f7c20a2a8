/// Runs `command` actions through the user's shell.
///
/// The child is spawned from inside the event loop and reaped on a separate
/// tokio task, so a slow command never delays the next button press. Its exit
/// status is logged and otherwise ignored.
use std::ffi::OsString;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::dispatcher::CommandRunner;
use crate::error::DispatchError;

#[cfg(not(windows))]
const FALLBACK_SHELL: &str = "/bin/sh";

/// Shell program and the flag that makes it run one command string.
pub fn shell_invocation(shell_env: Option<OsString>) -> (OsString, &'static str) {
    #[cfg(windows)]
    {
        let _ = shell_env;
        (OsString::from("cmd"), "/C")
    }
    #[cfg(not(windows))]
    {
        let shell = shell_env
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| OsString::from(FALLBACK_SHELL));
        (shell, "-c")
    }
}

pub struct ShellCommandRunner {
    shell: OsString,
    flag: &'static str,
}

impl ShellCommandRunner {
    /// Uses `$SHELL` (falling back to `/bin/sh`), or `cmd /C` on Windows.
    pub fn from_env() -> Self {
        let (shell, flag) = shell_invocation(std::env::var_os("SHELL"));
        Self { shell, flag }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&mut self, command: &str) -> Result<(), DispatchError> {
        let mut child = Command::new(&self.shell)
            .arg(self.flag)
            .arg(command)
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| DispatchError::CommandFailure {
                command: command.to_string(),
                source,
            })?;

        let command = command.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(%command, "command finished"),
                Ok(status) => warn!(%command, %status, "command exited unsuccessfully"),
                Err(e) => warn!(%command, "Failed to wait for command: {e}"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn shell_env_is_used_when_set() {
        let (shell, flag) = shell_invocation(Some(OsString::from("/usr/bin/zsh")));
        assert_eq!(shell, "/usr/bin/zsh");
        assert_eq!(flag, "-c");
    }

    #[cfg(not(windows))]
    #[test]
    fn missing_or_empty_shell_falls_back_to_sh() {
        assert_eq!(shell_invocation(None).0, FALLBACK_SHELL);
        assert_eq!(shell_invocation(Some(OsString::new())).0, FALLBACK_SHELL);
    }

    #[cfg(windows)]
    #[test]
    fn windows_uses_cmd() {
        assert_eq!(shell_invocation(None), (OsString::from("cmd"), "/C"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let mut runner = ShellCommandRunner {
            shell: OsString::from("/bin/sh"),
            flag: "-c",
        };

        runner.run(&format!("touch '{}'", marker.display())).unwrap();

        for _ in 0..100 {
            if marker.exists() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("command did not run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_shell_is_a_command_failure() {
        let mut runner = ShellCommandRunner {
            shell: OsString::from("/nonexistent/shell"),
            flag: "-c",
        };
        let err = runner.run("true").unwrap_err();
        assert!(matches!(err, DispatchError::CommandFailure { .. }));
    }
}
