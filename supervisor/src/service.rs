//! Service descriptors - static definitions of launchable children.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Optional readiness probe for a descriptor.
///
/// When configured, the supervisor polls a TCP connect to `tcp` after spawning
/// the service and before moving on to the next descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessProbe {
    /// Address to connect to, e.g. "127.0.0.1:8012"
    pub tcp: String,
    /// Give up waiting after this long
    #[serde(default = "default_probe_timeout")]
    #[serde(with = "secs_serde")]
    pub timeout: Duration,
    /// Delay between connection attempts
    #[serde(default = "default_probe_interval", rename = "interval_ms")]
    #[serde(with = "millis_serde")]
    pub interval: Duration,
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_probe_interval() -> Duration {
    Duration::from_millis(250)
}

impl ReadinessProbe {
    /// Create a TCP probe with default timeout and interval.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self {
            tcp: addr.into(),
            timeout: default_probe_timeout(),
            interval: default_probe_interval(),
        }
    }
}

/// Service descriptor - describes one child service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique name of the service (diagnostics only)
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Executable to launch
    pub program: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Time to wait after spawning before the next descriptor is spawned
    #[serde(default)]
    #[serde(with = "secs_serde")]
    pub startup_delay: Duration,
    /// Expected listen address, shown to the operator (never verified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    /// Whether this descriptor takes part in the run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Optional readiness probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<ReadinessProbe>,
}

fn default_enabled() -> bool {
    true
}

/// Whole-second duration serialization used by stack files.
pub(crate) mod secs_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod millis_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl ServiceDescriptor {
    /// Create an enabled descriptor with no arguments and no stagger.
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            program: program.into(),
            args: Vec::new(),
            working_directory: None,
            environment: BTreeMap::new(),
            startup_delay: Duration::ZERO,
            listen: None,
            enabled: true,
            ready: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = Some(listen.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ready(mut self, probe: ReadinessProbe) -> Self {
        self.ready = Some(probe);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Command line as the operator would type it.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Label used in "Starting ..." lines.
    pub fn display_label(&self) -> String {
        let label = if self.description.is_empty() {
            self.name.clone()
        } else {
            format!("{} ({})", self.description, self.name)
        };
        match &self.listen {
            Some(listen) => format!("{} on {}", label, listen),
            None => label,
        }
    }
}
