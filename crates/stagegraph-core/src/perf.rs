//! # Perf Sink
//!
//! The execution engine times every stage iteration and every object
//! invocation and hands the measurements to a [`PerfSink`]. What happens
//! to them (GPU queries, overlays, log lines) is up to the engine; the
//! scheduler ships a no-op sink and an aggregating [`PerfRecorder`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfScope<'a> {
    pub schedule: &'a str,
    pub stage: &'a str,
    /// Set for per-object measurements.
    pub object: Option<&'a str>,
}

impl<'a> PerfScope<'a> {
    #[must_use]
    pub const fn stage(schedule: &'a str, stage: &'a str) -> Self {
        Self {
            schedule,
            stage,
            object: None,
        }
    }

    #[must_use]
    pub const fn object(schedule: &'a str, stage: &'a str, object: &'a str) -> Self {
        Self {
            schedule,
            stage,
            object: Some(object),
        }
    }
}

/// Receiver of timing measurements.
pub trait PerfSink {
    fn record(&mut self, scope: PerfScope<'_>, elapsed: Duration);
}

/// Discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPerfSink;

impl PerfSink for NullPerfSink {
    fn record(&mut self, _scope: PerfScope<'_>, _elapsed: Duration) {}
}

/// Key of one aggregated series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PerfKey {
    pub schedule: String,
    pub stage: String,
    pub object: Option<String>,
}

/// Aggregated timings of one series. Durations are in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PerfStat {
    pub calls: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

impl PerfStat {
    fn add(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.calls = self.calls.saturating_add(1);
        self.total_micros = self.total_micros.saturating_add(micros);
        self.max_micros = self.max_micros.max(micros);
    }
}

/// Aggregates measurements per `(schedule, stage, object)`.
#[derive(Debug, Clone, Default)]
pub struct PerfRecorder {
    stats: BTreeMap<PerfKey, PerfStat>,
}

impl PerfRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage-level stats.
    #[must_use]
    pub fn stage(&self, schedule: &str, stage: &str) -> Option<&PerfStat> {
        self.find(schedule, stage, None)
    }

    /// Object-level stats.
    #[must_use]
    pub fn object(&self, schedule: &str, stage: &str, object: &str) -> Option<&PerfStat> {
        self.find(schedule, stage, Some(object))
    }

    fn find(&self, schedule: &str, stage: &str, object: Option<&str>) -> Option<&PerfStat> {
        self.stats.get(&PerfKey {
            schedule: schedule.to_string(),
            stage: stage.to_string(),
            object: object.map(str::to_string),
        })
    }

    /// All series in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&PerfKey, &PerfStat)> {
        self.stats.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }
}

impl PerfSink for PerfRecorder {
    fn record(&mut self, scope: PerfScope<'_>, elapsed: Duration) {
        let key = PerfKey {
            schedule: scope.schedule.to_string(),
            stage: scope.stage.to_string(),
            object: scope.object.map(str::to_string),
        };
        self.stats.entry(key).or_default().add(elapsed);
    }
}
