//! Service stack - the ordered descriptor table for one run.
//!
//! A stack file lists the services to launch, in launch order, together with
//! supervisor-wide shutdown settings:
//!
//! ```toml
//! [supervisor]
//! grace_period = 5
//!
//! [[service]]
//! name = "api"
//! program = "python3"
//! args = ["api.py", "--port", "8012"]
//! startup_delay = 2
//! listen = "http://localhost:8012"
//! ```
//!
//! Disabled descriptors are dropped from the active sequence entirely: they
//! are never spawned, never registered and never shut down.

use crate::error::{Error, Result};
use crate::service::{secs_serde, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Interpreter used by the built-in stack.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Supervisor-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// How long each child gets to honor the graceful request
    #[serde(default = "default_grace_period")]
    #[serde(with = "secs_serde")]
    pub grace_period: Duration,
    /// How long to wait for a force-killed child to be reaped
    #[serde(default = "default_kill_wait")]
    #[serde(with = "secs_serde")]
    pub kill_wait: Duration,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_kill_wait() -> Duration {
    Duration::from_secs(1)
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            kill_wait: default_kill_wait(),
        }
    }
}

/// The descriptor table plus settings, as loaded from a stack file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StackConfig {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceDescriptor>,
}

impl StackConfig {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            supervisor: SupervisorSettings::default(),
            services,
        }
    }

    /// The built-in stack: API server, chat UI, indexing UI and the optional
    /// embedding proxy (disabled unless toggled on).
    pub fn builtin(interpreter: &str) -> Self {
        Self::new(vec![
            ServiceDescriptor::new("api", interpreter)
                .with_description("API server")
                .with_args(["api.py", "--host", "0.0.0.0", "--port", "8012", "--reload"])
                .with_startup_delay(Duration::from_secs(2))
                .with_listen("http://localhost:8012"),
            ServiceDescriptor::new("app", interpreter)
                .with_description("main chat UI")
                .with_args(["app.py"])
                .with_listen("http://localhost:7860"),
            ServiceDescriptor::new("index-app", interpreter)
                .with_description("indexing UI")
                .with_args(["index_app.py"])
                .with_listen("http://localhost:7861"),
            ServiceDescriptor::new("embedding-proxy", interpreter)
                .with_description("embedding proxy")
                .with_args([
                    "embedding_proxy.py",
                    "--port",
                    "11435",
                    "--host",
                    "http://localhost:11434",
                ])
                .with_listen("http://localhost:11435")
                .disabled(),
        ])
    }

    /// Check the table is usable for a run.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (idx, def) in self.services.iter().enumerate() {
            if def.name.trim().is_empty() {
                return Err(Error::InvalidStack(format!(
                    "service #{} has an empty name",
                    idx + 1
                )));
            }
            if def.program.trim().is_empty() {
                return Err(Error::InvalidStack(format!(
                    "service {} has an empty program",
                    def.name
                )));
            }
            if !seen.insert(def.name.as_str()) {
                return Err(Error::InvalidStack(format!(
                    "duplicate service name: {}",
                    def.name
                )));
            }
        }
        Ok(())
    }

    /// Flip the enable toggle of a named descriptor.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        let def = self
            .services
            .iter_mut()
            .find(|def| def.name == name)
            .ok_or_else(|| Error::UnknownService(name.to_string()))?;
        def.enabled = enabled;
        Ok(())
    }

    /// Descriptors taking part in this run, in table order.
    pub fn active(&self) -> Vec<ServiceDescriptor> {
        self.services
            .iter()
            .filter(|def| def.enabled)
            .cloned()
            .collect()
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
