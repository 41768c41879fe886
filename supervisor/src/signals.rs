//! Termination triggers.
//!
//! A [`TriggerSource`] tells the supervisor when to stop waiting and begin
//! shutdown. Two implementations are provided:
//!
//! - [`SignalListener`] - OS signals. On Unix: `SIGINT` (Ctrl-C), `SIGTERM`
//!   and `SIGQUIT`. Elsewhere: Ctrl-C via [`tokio::signal::ctrl_c`].
//! - [`ChannelTriggers`] - programmatic triggers sent through a
//!   [`TriggerSender`], for embedding the supervisor or driving it in tests.
//!
//! Handlers are installed when the source is created, so an interrupt that
//! arrives while services are still starting is caught instead of killing
//! the supervisor outright.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Why the supervisor should shut down.
#[derive(Debug)]
pub enum Trigger {
    /// Operator-initiated interrupt
    Interrupt { signal: &'static str },
    /// Unrecoverable error observed while running
    Failure(Error),
}

impl Trigger {
    pub fn interrupt(signal: &'static str) -> Self {
        Trigger::Interrupt { signal }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Interrupt { signal } => write!(f, "{}", signal),
            Trigger::Failure(e) => write!(f, "error: {}", e),
        }
    }
}

/// Source of termination triggers.
#[async_trait]
pub trait TriggerSource: Send {
    /// Wait for the next trigger. `None` means the source is exhausted and
    /// will never produce another one.
    async fn wait(&mut self) -> Option<Trigger>;
}

/// OS signal listener.
#[cfg(unix)]
pub struct SignalListener {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Install handlers for SIGINT, SIGTERM and SIGQUIT.
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| Error::Signal(format!("failed to install {} handler: {}", name, e)))
        };

        Ok(Self {
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigquit: install(SignalKind::quit(), "SIGQUIT")?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl TriggerSource for SignalListener {
    async fn wait(&mut self) -> Option<Trigger> {
        let (received, name) = tokio::select! {
            r = self.sigint.recv() => (r, "SIGINT"),
            r = self.sigterm.recv() => (r, "SIGTERM"),
            r = self.sigquit.recv() => (r, "SIGQUIT"),
        };
        Some(match received {
            Some(()) => Trigger::interrupt(name),
            None => Trigger::Failure(Error::Signal(format!("{} stream closed", name))),
        })
    }
}

/// OS signal listener.
#[cfg(not(unix))]
pub struct SignalListener {
    _private: (),
}

#[cfg(not(unix))]
impl SignalListener {
    pub fn install() -> Result<Self> {
        Ok(Self { _private: () })
    }
}

#[cfg(not(unix))]
#[async_trait]
impl TriggerSource for SignalListener {
    async fn wait(&mut self) -> Option<Trigger> {
        Some(match tokio::signal::ctrl_c().await {
            Ok(()) => Trigger::interrupt("CTRL_C"),
            Err(e) => Trigger::Failure(Error::Signal(format!("ctrl-c handler failed: {}", e))),
        })
    }
}

/// Sending half of a programmatic trigger channel.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl TriggerSender {
    /// Deliver a trigger. Returns `false` if the supervisor is gone.
    pub fn send(&self, trigger: Trigger) -> bool {
        self.tx.send(trigger).is_ok()
    }

    pub fn interrupt(&self) -> bool {
        self.send(Trigger::interrupt("SIGINT"))
    }

    pub fn fail(&self, error: Error) -> bool {
        self.send(Trigger::Failure(error))
    }
}

/// Receiving half of a programmatic trigger channel.
#[derive(Debug)]
pub struct ChannelTriggers {
    rx: mpsc::UnboundedReceiver<Trigger>,
}

#[async_trait]
impl TriggerSource for ChannelTriggers {
    async fn wait(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }
}

/// Create a programmatic trigger channel.
pub fn trigger_channel() -> (TriggerSender, ChannelTriggers) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TriggerSender { tx }, ChannelTriggers { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_in_order_then_closes() {
        let (tx, mut rx) = trigger_channel();
        assert!(tx.interrupt());
        assert!(tx.fail(Error::Signal("boom".to_string())));
        drop(tx);

        assert!(matches!(
            rx.wait().await,
            Some(Trigger::Interrupt { signal: "SIGINT" })
        ));
        assert!(matches!(rx.wait().await, Some(Trigger::Failure(Error::Signal(_)))));
        assert!(rx.wait().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = trigger_channel();
        drop(rx);
        assert!(!tx.interrupt());
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(Trigger::interrupt("SIGTERM").to_string(), "SIGTERM");
        assert_eq!(
            Trigger::Failure(Error::Signal("x".to_string())).to_string(),
            "error: Signal error: x"
        );
    }
}
