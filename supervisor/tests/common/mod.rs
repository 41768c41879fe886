//! Shared fakes for supervisor integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use stagehand_supervisor::*;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How a fake child reacts to stop requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Exits as soon as SIGTERM arrives
    Cooperative,
    /// Ignores SIGTERM, dies on SIGKILL
    Stubborn,
    /// Every signal delivery fails and the child never exits
    Unreachable,
    /// The spawn itself fails
    FailSpawn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Spawn,
    Signal(&'static str),
}

#[derive(Debug, Clone)]
pub struct Event {
    pub service: String,
    pub kind: EventKind,
    pub at: Instant,
}

/// Ordered record of everything the fakes observed.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    fn push(&self, service: &str, kind: EventKind) {
        self.events.lock().unwrap().push(Event {
            service: service.to_string(),
            kind,
            at: Instant::now(),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Services in the order they were spawned.
    pub fn spawned(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == EventKind::Spawn)
            .map(|e| e.service)
            .collect()
    }

    /// `(service, signal)` pairs in delivery order.
    pub fn signals(&self) -> Vec<(String, &'static str)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::Signal(sig) => Some((e.service, sig)),
                EventKind::Spawn => None,
            })
            .collect()
    }

    pub fn signals_for(&self, service: &str) -> Vec<&'static str> {
        self.signals()
            .into_iter()
            .filter(|(name, _)| name == service)
            .map(|(_, sig)| sig)
            .collect()
    }

    /// When `signal` was sent to `service`.
    pub fn signal_time(&self, service: &str, signal: &'static str) -> Option<Instant> {
        self.events()
            .into_iter()
            .find(|e| e.service == service && e.kind == EventKind::Signal(signal))
            .map(|e| e.at)
    }

    pub fn spawn_time(&self, service: &str) -> Option<Instant> {
        self.events()
            .into_iter()
            .find(|e| e.service == service && e.kind == EventKind::Spawn)
            .map(|e| e.at)
    }
}

/// Spawner producing in-memory children.
#[derive(Debug, Clone, Default)]
pub struct FakeSpawner {
    behaviors: HashMap<String, Behavior>,
    log: EventLog,
    next_pid: Arc<AtomicU32>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            ..Default::default()
        }
    }

    pub fn with(mut self, service: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(service.to_string(), behavior);
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, def: &ServiceDescriptor) -> Result<Box<dyn ProcessHandle>> {
        let behavior = self
            .behaviors
            .get(&def.name)
            .copied()
            .unwrap_or(Behavior::Cooperative);

        if behavior == Behavior::FailSpawn {
            return Err(Error::Spawn {
                name: def.name.clone(),
                program: def.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        self.log.push(&def.name, EventKind::Spawn);
        Ok(Box::new(FakeHandle::new(
            &def.name,
            self.next_pid.fetch_add(1, Ordering::SeqCst),
            behavior,
            self.log.clone(),
        )))
    }
}

/// In-memory child process.
pub struct FakeHandle {
    name: String,
    pid: u32,
    behavior: Behavior,
    exit: Option<ExitStatus>,
    log: EventLog,
}

impl FakeHandle {
    pub fn new(name: &str, pid: u32, behavior: Behavior, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            pid,
            behavior,
            exit: None,
            log,
        }
    }

    fn deliver(&mut self, signal: &'static str, signo: i32) -> io::Result<()> {
        if self.behavior == Behavior::Unreachable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }
        if self.exit.is_some() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "process already exited"));
        }
        self.log.push(&self.name, EventKind::Signal(signal));
        if signal == "SIGKILL" || self.behavior == Behavior::Cooperative {
            self.exit = Some(ExitStatus::signaled(signo));
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn request_stop(&mut self) -> io::Result<()> {
        self.deliver("SIGTERM", 15)
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.deliver("SIGKILL", 9)
    }

    async fn wait_for_exit(&mut self, bound: Duration) -> io::Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            tokio::time::sleep(bound).await;
        }
        Ok(self.exit)
    }

    fn try_exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(self.exit)
    }
}

/// Log lines emitted while installed, as the operator would see them.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    /// Capture `info` and above on the current thread until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buf.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Index of the first line containing `needle`.
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|line| line.contains(needle))
    }

    /// Assert every needle appears, each on a later line than the previous.
    pub fn assert_in_order(&self, needles: &[&str]) {
        let lines = self.lines();
        let mut from = 0;
        for needle in needles {
            match lines[from..].iter().position(|line| line.contains(needle)) {
                Some(idx) => from += idx + 1,
                None => panic!("missing {:?} after line {} in:\n{}", needle, from, lines.join("\n")),
            }
        }
    }
}

/// A descriptor that would run `true`; fakes never execute it.
pub fn service(name: &str) -> ServiceDescriptor {
    ServiceDescriptor::new(name, "true")
}

pub fn settings(grace_secs: u64) -> SupervisorSettings {
    SupervisorSettings {
        grace_period: Duration::from_secs(grace_secs),
        kill_wait: Duration::from_secs(1),
    }
}

/// Register fresh fake children directly, bypassing the supervisor.
pub fn registered(specs: &[(&str, Behavior)], log: &EventLog) -> Vec<RegisteredProcess> {
    specs
        .iter()
        .enumerate()
        .map(|(idx, (name, behavior))| {
            RegisteredProcess::new(
                &service(name),
                Box::new(FakeHandle::new(name, 2000 + idx as u32, *behavior, log.clone())),
            )
        })
        .collect()
}
