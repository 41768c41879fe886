//! Process spawning and signalling.
//!
//! The supervisor only ever talks to children through [`Spawner`] and
//! [`ProcessHandle`], so the loop and the shutdown coordinator can be driven by
//! in-memory fakes in tests. [`OsSpawner`] is the real implementation.

use crate::error::{Error, Result};
use crate::service::ServiceDescriptor;
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Exit status of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code (if exited normally)
    pub code: Option<i32>,
    /// Signal (if killed by signal)
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Check if the process exited successfully.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(sig)) => write!(f, "signal {}", sig),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Handle to one spawned child.
///
/// Signalling methods never block. `wait_for_exit` is the only suspension
/// point and is bounded by the caller.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, `None` once the child has been reaped.
    fn pid(&self) -> Option<u32>;

    /// Send the cooperative stop request (SIGTERM on Unix).
    fn request_stop(&mut self) -> io::Result<()>;

    /// Send the unconditional stop request (SIGKILL on Unix).
    fn force_kill(&mut self) -> io::Result<()>;

    /// Wait up to `bound` for the child to exit.
    ///
    /// Returns `Ok(None)` if the bound elapsed first.
    async fn wait_for_exit(&mut self, bound: Duration) -> io::Result<Option<ExitStatus>>;

    /// Non-blocking check whether the child has already exited.
    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>>;
}

/// Something that can turn a descriptor into a running child.
pub trait Spawner: Send + Sync {
    fn spawn(&self, def: &ServiceDescriptor) -> Result<Box<dyn ProcessHandle>>;
}

/// Spawns real OS processes with tokio.
#[derive(Debug, Clone, Default)]
pub struct OsSpawner {
    /// Keep children in the supervisor's process group so a terminal Ctrl-C
    /// reaches them directly. Off by default: the supervisor alone decides
    /// when children are asked to stop.
    pub share_process_group: bool,
}

impl OsSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self, def: &ServiceDescriptor) -> Command {
        let mut cmd = Command::new(&def.program);
        cmd.args(&def.args);

        if let Some(ref dir) = def.working_directory {
            cmd.current_dir(dir);
        }

        cmd.envs(&def.environment);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        // Last-resort finalizer: anything still unreaped when its handle is
        // dropped (e.g. during a panic) gets SIGKILL.
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        if !self.share_process_group {
            cmd.process_group(0);
        }

        cmd
    }
}

impl Spawner for OsSpawner {
    fn spawn(&self, def: &ServiceDescriptor) -> Result<Box<dyn ProcessHandle>> {
        let child = self.command(def).spawn().map_err(|source| Error::Spawn {
            name: def.name.clone(),
            program: def.program.clone(),
            source,
        })?;

        let process = OsProcess::new(child, cfg!(unix) && !self.share_process_group);
        info!(
            service = %def.name,
            pid = ?process.pid(),
            group = process.pgid.is_some(),
            "Spawned process"
        );
        Ok(Box::new(process))
    }
}

/// A child spawned by [`OsSpawner`].
///
/// When the child leads its own process group, stop and kill requests go to
/// the whole group so helpers it forked (reload workers and the like) are
/// stopped with it.
#[derive(Debug)]
pub struct OsProcess {
    child: Child,
    /// Process group led by the child, kept after the leader is reaped
    pgid: Option<i32>,
}

impl OsProcess {
    /// Wrap a spawned child. `group_leader` says the child was started with
    /// `process_group(0)`.
    pub fn new(child: Child, group_leader: bool) -> Self {
        let pgid = child.id().filter(|_| group_leader).map(|pid| pid as i32);
        Self { child, pgid }
    }

    /// Signal the child's group when it leads one, otherwise the child alone.
    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;

        match self.pgid {
            Some(pgid) => killpg(Pid::from_raw(pgid), signal)?,
            None => kill(Pid::from_raw(pid as i32), signal)?,
        }
        debug!(pid = pid, group = self.pgid.is_some(), signal = signal.as_str(), "Sent signal");
        Ok(())
    }

    fn live_pid(&self) -> io::Result<u32> {
        self.child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process already exited"))
    }
}

#[async_trait]
impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn request_stop(&mut self) -> io::Result<()> {
        use nix::sys::signal::Signal;

        let pid = self.live_pid()?;
        self.signal(pid, Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) -> io::Result<()> {
        // No cooperative stop signal available; the grace wait still applies.
        self.live_pid().map(|_| ())
    }

    #[cfg(unix)]
    fn force_kill(&mut self) -> io::Result<()> {
        use nix::sys::signal::Signal;

        match (self.child.id(), self.pgid) {
            // Leader already reaped, but the group may still hold strays.
            (None, Some(pgid)) => self.signal(pgid as u32, Signal::SIGKILL),
            (Some(pid), Some(_)) => self.signal(pid, Signal::SIGKILL),
            (_, None) => {
                let pid = self.live_pid()?;
                self.child.start_kill()?;
                debug!(pid = pid, signal = "SIGKILL", "Sent signal to process");
                Ok(())
            }
        }
    }

    #[cfg(not(unix))]
    fn force_kill(&mut self) -> io::Result<()> {
        let pid = self.live_pid()?;
        self.child.start_kill()?;
        debug!(pid = pid, signal = "SIGKILL", "Sent signal to process");
        Ok(())
    }

    async fn wait_for_exit(&mut self, bound: Duration) -> io::Result<Option<ExitStatus>> {
        match tokio::time::timeout(bound, self.child.wait()).await {
            Ok(status) => Ok(Some(status?.into())),
            Err(_) => Ok(None),
        }
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?.map(Into::into))
    }
}
