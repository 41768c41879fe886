//! Shutdown coordinator - stops every registered child, gracefully first.
//!
//! For each entry, in registration order:
//!
//! ```text
//! Running ──request_stop()──► TerminationRequested
//!                                  │
//!                 wait_for_exit(grace_period)
//!                  ├─ exited  ──────────────────► Terminated
//!                  └─ timeout ──force_kill()────► Killed
//!                                  └─ wait_for_exit(kill_wait) to reap
//! ```
//!
//! Failures are recorded per entry and never propagated: one stubborn child
//! cannot prevent the rest from being stopped. Entries that are already in a
//! terminal state are left alone, which makes a repeated shutdown a no-op.
//!
//! [`ShutdownGuard`] makes sure the coordinator body runs at most once per
//! supervisor run, no matter how many triggers race for it.

use crate::error::SignalDeliveryError;
use crate::process::ExitStatus;
use crate::registry::{ProcessState, RegisteredProcess};
use crate::stack::SupervisorSettings;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Signal names recorded in reports.
pub const GRACEFUL_SIGNAL: &str = "SIGTERM";
pub const FORCED_SIGNAL: &str = "SIGKILL";

const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One-shot guard around the shutdown coordinator.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    fired: AtomicBool,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the shutdown. Returns `true` for exactly one caller.
    pub fn try_fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Run `fut` only if this call wins the guard; `fut` is never polled otherwise.
    pub async fn run_once<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.try_fire() {
            Some(fut.await)
        } else {
            debug!("Shutdown already in progress, ignoring trigger");
            None
        }
    }
}

/// What happened to one entry during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub name: String,
    pub pid: Option<u32>,
    pub state: ProcessState,
    pub exit: Option<ExitStatus>,
    /// Signals successfully delivered during this shutdown, in order
    pub signals_sent: Vec<&'static str>,
    pub delivery_errors: Vec<SignalDeliveryError>,
}

impl EntryReport {
    fn for_entry(entry: &RegisteredProcess) -> Self {
        Self {
            name: entry.name().to_string(),
            pid: entry.pid(),
            state: entry.state(),
            exit: entry.exit_status(),
            signals_sent: Vec::new(),
            delivery_errors: Vec::new(),
        }
    }

    fn finish(mut self, entry: &RegisteredProcess) -> Self {
        self.state = entry.state();
        self.exit = entry.exit_status();
        self
    }

    fn delivery_failed(&mut self, signal: &'static str, reason: impl std::fmt::Display) {
        let err = SignalDeliveryError::new(&self.name, self.pid, signal, reason.to_string());
        warn!(
            "Error during cleanup of process {} ({}): {}",
            fmt_pid(self.pid),
            self.name,
            err.reason
        );
        self.delivery_errors.push(err);
    }
}

/// Outcome of one shutdown pass, one entry per registered process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub entries: Vec<EntryReport>,
}

impl ShutdownReport {
    pub fn terminated(&self) -> usize {
        self.count(ProcessState::Terminated)
    }

    pub fn killed(&self) -> usize {
        self.count(ProcessState::Killed)
    }

    /// Total number of signals delivered during the pass.
    pub fn signals_sent(&self) -> usize {
        self.entries.iter().map(|e| e.signals_sent.len()).sum()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&EntryReport> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn count(&self, state: ProcessState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }
}

/// Stops registered processes with a bounded graceful wait and escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownCoordinator {
    grace_period: Duration,
    kill_wait: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace_period: Duration, kill_wait: Duration) -> Self {
        Self {
            grace_period,
            kill_wait,
        }
    }

    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self::new(settings.grace_period, settings.kill_wait)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Stop every entry in order. Never fails.
    pub async fn shutdown(&self, entries: &mut [RegisteredProcess]) -> ShutdownReport {
        info!("Shutting down all services...");

        let mut report = ShutdownReport::default();
        for entry in entries.iter_mut() {
            report.entries.push(self.stop_entry(entry).await);
        }

        info!(
            terminated = report.terminated(),
            killed = report.killed(),
            "All services have been shut down."
        );
        report
    }

    async fn stop_entry(&self, entry: &mut RegisteredProcess) -> EntryReport {
        let mut report = EntryReport::for_entry(entry);
        if !self.begin(entry, &mut report) {
            return report;
        }

        match entry.handle_mut().wait_for_exit(self.grace_period).await {
            Ok(Some(status)) => {
                self.terminated(entry, status);
                return report.finish(entry);
            }
            Ok(None) => {
                warn!(
                    "Process {} ({}) did not terminate gracefully, killing.",
                    fmt_pid(entry.pid()),
                    entry.name()
                );
            }
            Err(e) => {
                error!(service = %entry.name(), error = %e, "Failed waiting for process, killing");
            }
        }

        self.kill(entry, &mut report);
        match entry.handle_mut().wait_for_exit(self.kill_wait).await {
            Ok(Some(status)) => entry.record_exit(status),
            Ok(None) => warn!(service = %entry.name(), "Could not confirm exit after kill"),
            Err(e) => warn!(service = %entry.name(), error = %e, "Could not reap killed process"),
        }
        report.finish(entry)
    }

    /// Synchronous variant used where awaiting is impossible (drop sweep).
    ///
    /// Sends every graceful request first, then polls all entries against a
    /// single shared deadline before escalating.
    pub fn shutdown_blocking(&self, entries: &mut [RegisteredProcess]) -> ShutdownReport {
        info!("Shutting down all services...");

        let mut reports: Vec<Option<EntryReport>> = entries
            .iter_mut()
            .map(|entry| {
                let mut report = EntryReport::for_entry(entry);
                self.begin(entry, &mut report).then_some(report)
            })
            .collect();

        let deadline = Instant::now() + self.grace_period;
        loop {
            let mut pending = false;
            for entry in entries.iter_mut() {
                if entry.state() != ProcessState::TerminationRequested {
                    continue;
                }
                match entry.handle_mut().try_exit_status() {
                    Ok(Some(status)) => self.terminated(entry, status),
                    Ok(None) => pending = true,
                    Err(e) => {
                        debug!(service = %entry.name(), error = %e, "Exit check failed");
                        pending = true;
                    }
                }
            }
            if !pending || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(BLOCKING_POLL_INTERVAL);
        }

        let mut report = ShutdownReport::default();
        for (entry, slot) in entries.iter_mut().zip(reports.iter_mut()) {
            let entry_report = match slot.take() {
                Some(mut r) => {
                    if entry.state() == ProcessState::TerminationRequested {
                        warn!(
                            "Process {} ({}) did not terminate gracefully, killing.",
                            fmt_pid(entry.pid()),
                            entry.name()
                        );
                        self.kill(entry, &mut r);
                    }
                    r.finish(entry)
                }
                None => EntryReport::for_entry(entry),
            };
            report.entries.push(entry_report);
        }

        info!(
            terminated = report.terminated(),
            killed = report.killed(),
            "All services have been shut down."
        );
        report
    }

    /// Move a live entry to `TerminationRequested` and send the graceful
    /// request. Returns `false` for entries already in a terminal state.
    fn begin(&self, entry: &mut RegisteredProcess, report: &mut EntryReport) -> bool {
        if entry.state().is_terminal() {
            debug!(service = %entry.name(), state = %entry.state(), "Already stopped");
            return false;
        }
        entry.set_state(ProcessState::TerminationRequested);
        match entry.handle_mut().request_stop() {
            Ok(()) => report.signals_sent.push(GRACEFUL_SIGNAL),
            Err(e) => report.delivery_failed(GRACEFUL_SIGNAL, e),
        }
        true
    }

    fn terminated(&self, entry: &mut RegisteredProcess, status: ExitStatus) {
        entry.record_exit(status);
        entry.set_state(ProcessState::Terminated);
        debug!(service = %entry.name(), status = %status, "Process terminated");
    }

    fn kill(&self, entry: &mut RegisteredProcess, report: &mut EntryReport) {
        match entry.handle_mut().force_kill() {
            Ok(()) => report.signals_sent.push(FORCED_SIGNAL),
            Err(e) => report.delivery_failed(FORCED_SIGNAL, e),
        }
        entry.set_state(ProcessState::Killed);
    }
}

fn fmt_pid(pid: Option<u32>) -> String {
    pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
}
