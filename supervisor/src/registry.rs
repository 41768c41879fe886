//! Process registry - every child the supervisor has started, in start order.
//!
//! The registry is append-only while services are starting and is drained
//! exactly once when shutdown begins. It is owned by the supervisor loop, so
//! it needs no locking: ownership of the entries moves to the shutdown
//! coordinator through [`ProcessRegistry::snapshot`].
//!
//! Entries that never reach the coordinator (the registry is dropped while
//! still holding them, e.g. on an early return or a panic) are swept by the
//! registry's `Drop`, gated by the same one-shot guard. The sweep blocks the
//! dropping thread, so its grace wait is capped at [`DROP_SWEEP_GRACE`]; when
//! the drop happens on an async runtime that worker stalls for at most that
//! long.

use crate::process::{ExitStatus, ProcessHandle};
use crate::service::ServiceDescriptor;
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest grace wait the drop sweep will block for.
pub const DROP_SWEEP_GRACE: Duration = Duration::from_secs(1);

/// Shutdown state of a registered process.
///
/// `Running -> TerminationRequested -> {Terminated | Killed}`; the last two
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned and not yet asked to stop
    Running,
    /// Graceful stop requested, waiting for exit
    TerminationRequested,
    /// Exited within the grace period
    Terminated,
    /// Forcibly killed after the grace period
    Killed,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Terminated | ProcessState::Killed)
    }

    fn can_transition_to(self, next: ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::Running, ProcessState::TerminationRequested)
                | (ProcessState::TerminationRequested, ProcessState::Terminated)
                | (ProcessState::TerminationRequested, ProcessState::Killed)
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Running => write!(f, "running"),
            ProcessState::TerminationRequested => write!(f, "stopping"),
            ProcessState::Terminated => write!(f, "terminated"),
            ProcessState::Killed => write!(f, "killed"),
        }
    }
}

/// The supervisor's live record of one started child.
pub struct RegisteredProcess {
    name: String,
    pid: Option<u32>,
    listen: Option<String>,
    handle: Box<dyn ProcessHandle>,
    state: ProcessState,
    exit: Option<ExitStatus>,
}

impl RegisteredProcess {
    pub fn new(def: &ServiceDescriptor, handle: Box<dyn ProcessHandle>) -> Self {
        Self {
            name: def.name.clone(),
            pid: handle.pid(),
            listen: def.listen.clone(),
            handle,
            state: ProcessState::Running,
            exit: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process id captured at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn listen(&self) -> Option<&str> {
        self.listen.as_deref()
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    pub(crate) fn handle_mut(&mut self) -> &mut dyn ProcessHandle {
        self.handle.as_mut()
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn set_state(&mut self, next: ProcessState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(
                service = %self.name,
                from = %self.state,
                to = %next,
                "Rejected state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub(crate) fn record_exit(&mut self, status: ExitStatus) {
        self.exit = Some(status);
    }
}

impl std::fmt::Debug for RegisteredProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("exit", &self.exit)
            .finish()
    }
}

/// Ordered registry of started children.
pub struct ProcessRegistry {
    entries: Vec<RegisteredProcess>,
    guard: Arc<ShutdownGuard>,
    finalizer: ShutdownCoordinator,
}

impl ProcessRegistry {
    /// Create an empty registry. `finalizer` is used only by the drop sweep.
    pub fn new(guard: Arc<ShutdownGuard>, finalizer: ShutdownCoordinator) -> Self {
        Self {
            entries: Vec::new(),
            guard,
            finalizer,
        }
    }

    /// Append a freshly spawned child in `Running` state.
    pub fn register(
        &mut self,
        def: &ServiceDescriptor,
        handle: Box<dyn ProcessHandle>,
    ) -> &RegisteredProcess {
        let idx = self.entries.len();
        self.entries.push(RegisteredProcess::new(def, handle));
        let entry = &self.entries[idx];
        debug!(service = %entry.name, pid = ?entry.pid, position = idx + 1, "Registered process");
        entry
    }

    /// Take every entry for shutdown. Later snapshots are empty.
    pub fn snapshot(&mut self) -> Vec<RegisteredProcess> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProcess> {
        self.entries.iter()
    }

    /// Names of registered services, in start order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

impl Drop for ProcessRegistry {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        if !self.guard.try_fire() {
            // Whoever fired the guard owns shutdown; kill_on_drop covers the rest.
            return;
        }
        warn!(
            count = self.entries.len(),
            "Registry dropped with live processes, stopping them"
        );
        let sweep = ShutdownCoordinator::new(
            self.finalizer.grace_period().min(DROP_SWEEP_GRACE),
            Duration::ZERO,
        );
        let report = sweep.shutdown_blocking(&mut self.entries);
        debug!(killed = report.killed(), terminated = report.terminated(), "Drop sweep done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;

    struct Exited;

    #[async_trait]
    impl ProcessHandle for Exited {
        fn pid(&self) -> Option<u32> {
            Some(7)
        }
        fn request_stop(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn force_kill(&mut self) -> io::Result<()> {
            Ok(())
        }
        async fn wait_for_exit(&mut self, _bound: Duration) -> io::Result<Option<ExitStatus>> {
            Ok(Some(ExitStatus::exited(0)))
        }
        fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
            Ok(Some(ExitStatus::exited(0)))
        }
    }

    fn registry() -> (ProcessRegistry, Arc<ShutdownGuard>) {
        let guard = Arc::new(ShutdownGuard::new());
        let finalizer = ShutdownCoordinator::new(Duration::from_millis(50), Duration::from_millis(50));
        (ProcessRegistry::new(Arc::clone(&guard), finalizer), guard)
    }

    #[test]
    fn test_state_machine() {
        use ProcessState::*;
        assert!(Running.can_transition_to(TerminationRequested));
        assert!(TerminationRequested.can_transition_to(Terminated));
        assert!(TerminationRequested.can_transition_to(Killed));
        assert!(!Running.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Killed.can_transition_to(TerminationRequested));
        assert!(!Terminated.can_transition_to(Killed));
        assert!(Terminated.is_terminal() && Killed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_register_keeps_start_order() {
        let (mut reg, _guard) = registry();
        for name in ["a", "b", "c"] {
            let entry = reg.register(&ServiceDescriptor::new(name, "true"), Box::new(Exited));
            assert_eq!(entry.state(), ProcessState::Running);
            assert_eq!(entry.pid(), Some(7));
        }
        assert_eq!(reg.names(), vec!["a", "b", "c"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_snapshot_drains_once() {
        let (mut reg, guard) = registry();
        reg.register(&ServiceDescriptor::new("a", "true"), Box::new(Exited));

        let first = reg.snapshot();
        assert_eq!(first.len(), 1);
        assert!(reg.snapshot().is_empty());
        assert!(reg.is_empty());

        drop(reg);
        // Nothing left to sweep, so the guard is still unfired.
        assert!(!guard.has_fired());
    }

    #[test]
    fn test_drop_sweeps_live_entries_through_guard() {
        let (mut reg, guard) = registry();
        reg.register(&ServiceDescriptor::new("a", "true"), Box::new(Exited));
        drop(reg);
        assert!(guard.has_fired());
    }

    #[test]
    fn test_drop_skips_sweep_when_guard_already_fired() {
        let (mut reg, guard) = registry();
        reg.register(&ServiceDescriptor::new("a", "true"), Box::new(Exited));
        assert!(guard.try_fire());
        drop(reg);
        assert!(guard.has_fired());
    }
}
