use std::collections::BTreeMap;
use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::CaptureError;

/// The service under test, running as a child process.
///
/// On unix the shell leads its own process group, and stopping the session
/// kills the whole group, so servers the shell started do not outlive it.
pub struct CommandSession {
    child: Option<Child>,
    exit: Option<ExitStatus>,
    group: Option<u32>,
}

impl CommandSession {
    /// Run `command` through the platform shell with `env` layered over the
    /// inherited environment.
    pub fn spawn(command: &str, env: &BTreeMap<String, String>) -> Result<Self, CaptureError> {
        let mut cmd = shell(command);
        cmd.envs(env).kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        let child = cmd
            .spawn()
            .map_err(|e| CaptureError::startup("command", format!("{command}: {e}")))?;
        debug!(pid = child.id(), command, "command started");
        Ok(Self {
            group: child.id(),
            child: Some(child),
            exit: None,
        })
    }

    /// Resolves once the process exits. Safe to use inside `select!`.
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        if let Some(status) = self.exit {
            return Some(status);
        }
        let Some(child) = self.child.as_mut() else {
            return None;
        };
        match child.wait().await {
            Ok(status) => {
                self.exit = Some(status);
                Some(status)
            }
            Err(error) => {
                warn!(%error, "failed waiting for command");
                None
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Kill the process group, then reap the shell. Idempotent.
    ///
    /// The group is signalled even when the shell has already exited, since
    /// anything it put in the background is still running.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        self.kill_group();
        if let Some(status) = child.try_wait()? {
            self.exit.get_or_insert(status);
            return Ok(());
        }
        debug!(pid = child.id(), "stopping command");
        if let Err(error) = child.start_kill() {
            debug!(%error, "command already gone");
        }
        let status = child.wait().await?;
        self.exit.get_or_insert(status);
        Ok(())
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = self.group.and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => debug!(pgid, "process group killed"),
            Err(Errno::ESRCH) => {}
            Err(error) => warn!(pgid, %error, "failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for CommandSession {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.kill_group();
        }
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
