//! Supervisor loop - start every active service, wait, then stop them all.
//!
//! ```text
//! for each enabled descriptor (table order):
//!     spawn ──► register ──► [readiness probe] ──► startup_delay
//!       │                         │                     │
//!       └─ SpawnError             └──── trigger ────────┘ (abort startup)
//!
//! block on TriggerSource::wait()
//!
//! any path ──► ShutdownGuard::run_once(coordinator.shutdown(registry.snapshot()))
//! ```
//!
//! Exactly one shutdown runs per supervisor. Triggers that arrive while it is
//! in progress are drained and ignored; they never hasten escalation.

use crate::error::Error;
use crate::probe;
use crate::process::Spawner;
use crate::registry::ProcessRegistry;
use crate::service::ServiceDescriptor;
use crate::shutdown::{ShutdownCoordinator, ShutdownGuard, ShutdownReport};
use crate::signals::{Trigger, TriggerSource};
use crate::stack::SupervisorSettings;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Why a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Operator interrupt
    Interrupted { signal: &'static str },
    /// The trigger source closed without a trigger
    TriggersClosed,
    /// Spawn failure or unrecoverable error
    Failed(Error),
}

impl RunOutcome {
    fn from_trigger(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Interrupt { signal } => RunOutcome::Interrupted { signal },
            Trigger::Failure(e) => RunOutcome::Failed(e),
        }
    }
}

/// Result of a full supervisor run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// `None` only if another path already claimed the shutdown guard, in
    /// which case the run is reported as failed
    pub shutdown: Option<ShutdownReport>,
}

impl RunReport {
    /// Process exit status for this run.
    ///
    /// Non-zero for a failed run, and for a run whose shutdown never ran
    /// because the guard was claimed elsewhere.
    pub fn exit_code(&self) -> i32 {
        match (&self.outcome, &self.shutdown) {
            (RunOutcome::Failed(_), _) | (_, None) => 1,
            (RunOutcome::Interrupted { .. } | RunOutcome::TriggersClosed, Some(_)) => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// Turn the report into a `Result`, surfacing the run's error if any.
    pub fn into_result(self) -> crate::Result<ShutdownReport> {
        match (self.outcome, self.shutdown) {
            (RunOutcome::Failed(e), _) => Err(e),
            (_, None) => Err(Error::ShutdownClaimed),
            (_, Some(report)) => Ok(report),
        }
    }
}

/// Startup was cut short.
enum Abort {
    Failed(Error),
    Triggered(Trigger),
}

/// Launches a stack and guarantees it is brought down exactly once.
pub struct Supervisor<S: Spawner> {
    spawner: S,
    coordinator: ShutdownCoordinator,
    guard: Arc<ShutdownGuard>,
}

impl<S: Spawner> Supervisor<S> {
    pub fn new(settings: &SupervisorSettings, spawner: S) -> Self {
        Self {
            spawner,
            coordinator: ShutdownCoordinator::from_settings(settings),
            guard: Arc::new(ShutdownGuard::new()),
        }
    }

    /// The one-shot guard protecting this supervisor's shutdown.
    pub fn guard(&self) -> Arc<ShutdownGuard> {
        Arc::clone(&self.guard)
    }

    /// Start every enabled descriptor in order, block until a trigger, then
    /// shut everything down.
    pub async fn run<T>(self, descriptors: &[ServiceDescriptor], triggers: &mut T) -> RunReport
    where
        T: TriggerSource + ?Sized,
    {
        let mut registry = ProcessRegistry::new(Arc::clone(&self.guard), self.coordinator);

        let outcome = match self.start_all(descriptors, &mut registry, triggers).await {
            Ok(()) => {
                announce(descriptors);
                match triggers.wait().await {
                    Some(trigger) => {
                        info!(trigger = %trigger, "Termination requested");
                        RunOutcome::from_trigger(trigger)
                    }
                    None => {
                        info!("Trigger source closed");
                        RunOutcome::TriggersClosed
                    }
                }
            }
            Err(Abort::Failed(e)) => RunOutcome::Failed(e),
            Err(Abort::Triggered(trigger)) => {
                info!(trigger = %trigger, "Termination requested during startup");
                RunOutcome::from_trigger(trigger)
            }
        };

        if let RunOutcome::Failed(ref e) = outcome {
            error!(kind = e.as_label(), "An error occurred: {}", e);
        }

        let shutdown = self.shutdown(&mut registry, triggers).await;
        RunReport { outcome, shutdown }
    }

    async fn start_all<T>(
        &self,
        descriptors: &[ServiceDescriptor],
        registry: &mut ProcessRegistry,
        triggers: &mut T,
    ) -> Result<(), Abort>
    where
        T: TriggerSource + ?Sized,
    {
        for def in descriptors.iter().filter(|d| d.enabled) {
            info!("Starting {}...", def.display_label());
            debug!(service = %def.name, command = %def.command_line(), "Spawning");

            let handle = self.spawner.spawn(def).map_err(Abort::Failed)?;
            registry.register(def, handle);

            if let Some(ref ready) = def.ready {
                interruptible(probe::wait_ready(&def.name, ready), triggers).await?;
            }
            if !def.startup_delay.is_zero() {
                interruptible(tokio::time::sleep(def.startup_delay), triggers).await?;
            }
        }
        Ok(())
    }

    /// Claim the guard and stop everything, ignoring further triggers.
    async fn shutdown<T>(
        &self,
        registry: &mut ProcessRegistry,
        triggers: &mut T,
    ) -> Option<ShutdownReport>
    where
        T: TriggerSource + ?Sized,
    {
        if !self.guard.try_fire() {
            let err = Error::ShutdownClaimed;
            error!(kind = err.as_label(), "An error occurred: {}", err);
            return None;
        }

        let mut entries = registry.snapshot();
        let shutdown = self.coordinator.shutdown(&mut entries);
        tokio::pin!(shutdown);

        let mut listening = true;
        loop {
            tokio::select! {
                report = &mut shutdown => return Some(report),
                trigger = triggers.wait(), if listening => match trigger {
                    Some(trigger) => debug!(trigger = %trigger, "Already shutting down, ignoring"),
                    None => listening = false,
                },
            }
        }
    }
}

/// Run `fut` unless a trigger arrives first.
async fn interruptible<F, T>(fut: F, triggers: &mut T) -> Result<(), Abort>
where
    F: Future,
    T: TriggerSource + ?Sized,
{
    tokio::pin!(fut);
    tokio::select! {
        _ = &mut fut => return Ok(()),
        trigger = triggers.wait() => if let Some(trigger) = trigger {
            return Err(Abort::Triggered(trigger));
        },
    }
    // Trigger source closed; finish the wait undisturbed.
    fut.await;
    Ok(())
}

fn announce(descriptors: &[ServiceDescriptor]) {
    info!("All services are running.");
    for def in descriptors.iter().filter(|d| d.enabled) {
        if let Some(ref listen) = def.listen {
            let label = if def.description.is_empty() {
                def.name.as_str()
            } else {
                def.description.as_str()
            };
            info!("  - {}: {}", label, listen);
        }
    }
    info!("Press Ctrl+C to shut down all services.");
}
