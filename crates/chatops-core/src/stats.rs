//! Per-handler run statistics and the stopwatch timing each invocation.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Counters kept for one handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerStats {
    pub ran: u64,
    pub failed: u64,
    #[serde(with = "duration_millis")]
    pub total_run_time: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// Stats for every registered handler, each with its own counters.
#[derive(Debug, Default)]
pub struct StatsStore {
    inner: Mutex<HashMap<String, HandlerStats>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate fresh counters for a handler, replacing any previous ones.
    pub fn register(&self, handler: &str) {
        self.inner
            .lock()
            .insert(handler.to_string(), HandlerStats::default());
    }

    pub fn record_started(&self, handler: &str) {
        let mut inner = self.inner.lock();
        inner.entry(handler.to_string()).or_default().ran += 1;
    }

    /// Record the end of a run. Unknown elapsed time is skipped.
    pub fn record_finished(&self, handler: &str, failed: bool, elapsed: Option<Duration>) {
        let mut inner = self.inner.lock();
        let stats = inner.entry(handler.to_string()).or_default();
        if failed {
            stats.failed += 1;
        }
        if let Some(elapsed) = elapsed {
            stats.total_run_time += elapsed;
        }
    }

    pub fn get(&self, handler: &str) -> Option<HandlerStats> {
        self.inner.lock().get(handler).cloned()
    }

    /// Snapshot of all stats sorted by handler name.
    pub fn snapshot(&self) -> Vec<(String, HandlerStats)> {
        let mut all: Vec<(String, HandlerStats)> = self
            .inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Stopwatch was never started")]
pub struct NotStarted;

/// Monotonic stopwatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stopwatch {
    started: Option<Instant>,
    stopped: Option<Instant>,
}

impl Stopwatch {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.stopped = None;
    }

    pub fn stop(&mut self) {
        if self.started.is_some() {
            self.stopped = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Result<Duration, NotStarted> {
        let started = self.started.ok_or(NotStarted)?;
        Ok(self.stopped.unwrap_or_else(Instant::now) - started)
    }
}
