//! Stagehand supervisor - launches a fixed stack of local services and stops
//! them together.
//!
//! A run walks the descriptor table in order, spawning each enabled service,
//! registering it immediately and waiting out its startup stagger. It then
//! blocks until a termination trigger arrives (operator interrupt, error or
//! closed trigger source) and stops every registered child exactly once:
//! SIGTERM, a bounded grace wait, then SIGKILL for anything still alive.
//!
//! # Architecture
//!
//! - **Supervisor**: drives startup, waiting and shutdown
//! - **ProcessRegistry**: ordered record of every started child
//! - **ShutdownCoordinator**: graceful-then-forced stop of registered children
//! - **TriggerSource**: OS signals or programmatic triggers
//! - **StackConfig / loaders**: the descriptor table, built in or from a file
//!
//! # Example
//!
//! ```no_run
//! use stagehand_supervisor::{OsSpawner, SignalListener, StackConfig, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> stagehand_supervisor::Result<()> {
//!     let stack = StackConfig::builtin("python3");
//!     let mut triggers = SignalListener::install()?;
//!     let supervisor = Supervisor::new(&stack.supervisor, OsSpawner::new());
//!     let report = supervisor.run(&stack.services, &mut triggers).await;
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod error;
pub mod loaders;
pub mod probe;
pub mod process;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod signals;
pub mod stack;
pub mod supervisor;

// Re-export main types
pub use error::{Error, Result, SignalDeliveryError};
pub use loaders::{LoaderRegistry, StackLoader};
pub use process::{ExitStatus, OsProcess, OsSpawner, ProcessHandle, Spawner};
pub use registry::{ProcessRegistry, ProcessState, RegisteredProcess, DROP_SWEEP_GRACE};
pub use service::{ReadinessProbe, ServiceDescriptor};
pub use shutdown::{EntryReport, ShutdownCoordinator, ShutdownGuard, ShutdownReport};
pub use signals::{trigger_channel, ChannelTriggers, SignalListener, Trigger, TriggerSender, TriggerSource};
pub use stack::{StackConfig, SupervisorSettings, DEFAULT_INTERPRETER};
pub use supervisor::{RunOutcome, RunReport, Supervisor};
