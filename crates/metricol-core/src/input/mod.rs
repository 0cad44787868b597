//! Pollable inputs.
//!
//! A concrete input is a [`MetricSource`]: it knows how to `fetch` raw data,
//! `parse` it into `(field, value)` samples and `extract` metric records from
//! each sample. [`InputWorker`] drives a source on the [`Worker`] contract and
//! owns the per-worker [`RateTracker`].

pub mod disks;
pub mod loadavg;
pub mod meminfo;
pub mod mysql;
pub mod net;
pub mod nginx;
pub mod redis;
pub mod uwsgi;

use std::time::Duration;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::queue::SampleQueue;
use crate::rate::{RateTracker, ResetPolicy};
use crate::record::{MetricKind, MetricRecord, MetricValue, unix_now};
use crate::worker::Worker;

/// Default timeout for network-backed sources.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Static description of a plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    /// Identifier used in the `plugin` key (e.g. `"meminfo"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Keys the section must define.
    pub required: &'static [&'static str],
}

/// Trait that every polled data source implements.
pub trait MetricSource: Send + 'static {
    /// Whatever `fetch` hands to `parse` (file text, HTTP body, ...).
    type Raw;

    /// Plugin metadata.
    fn info(&self) -> &'static PluginInfo;

    /// One-time resource acquisition.
    fn setup(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Read raw data from the source.
    fn fetch(&mut self) -> Result<Self::Raw, SourceError>;

    /// Turn raw data into `(field, value)` samples.
    fn parse(&self, raw: Self::Raw) -> Result<Vec<(String, MetricValue)>, SourceError>;

    /// Emit zero or more records for one sample.
    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>);
}

/// Collects the records produced during one tick, prefixing keys and
/// stamping them with the tick time.
pub struct Emitter<'a> {
    prefix: &'a str,
    timestamp: i64,
    rates: &'a mut RateTracker,
    records: Vec<MetricRecord>,
}

impl<'a> Emitter<'a> {
    pub fn new(prefix: &'a str, timestamp: i64, rates: &'a mut RateTracker) -> Self {
        Self {
            prefix,
            timestamp,
            rates,
            records: Vec::new(),
        }
    }

    /// Change the timestamp used for subsequent records.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn emit(&mut self, suffix: &str, value: impl Into<MetricValue>, kind: MetricKind) {
        let key = format!("{}{}", self.prefix, suffix);
        self.records
            .push(MetricRecord::new(key, value, kind, self.timestamp));
    }

    pub fn gauge(&mut self, suffix: &str, value: impl Into<MetricValue>) {
        self.emit(suffix, value, MetricKind::Gauge);
    }

    /// A counter record whose value is already an increment.
    pub fn counter(&mut self, suffix: &str, value: impl Into<MetricValue>) {
        self.emit(suffix, value, MetricKind::Counter);
    }

    pub fn timer(&mut self, suffix: &str, value: impl Into<MetricValue>) {
        self.emit(suffix, value, MetricKind::Timer);
    }

    /// Feed a cumulative total through the rate tracker and emit the delta
    /// as a counter, if there is one. Returns whether a record was emitted.
    pub fn counter_delta(&mut self, suffix: &str, total: &MetricValue, policy: ResetPolicy) -> bool {
        match self.rates.observe(suffix, total, policy) {
            Some(delta) => {
                self.counter(suffix, delta);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<MetricRecord> {
        self.records
    }
}

/// Field classification from the `counter_keys`, `timer_keys` and `kv_keys`
/// section lists.
#[derive(Debug, Clone, Default)]
pub struct KeyClasses {
    counters: Vec<String>,
    timers: Vec<String>,
    kv: Vec<String>,
}

impl KeyClasses {
    pub fn from_section(section: &SectionConfig) -> Self {
        Self {
            counters: section.list("counter_keys"),
            timers: section.list("timer_keys"),
            kv: section.list("kv_keys"),
        }
    }

    /// Counter wins over timer; everything else is a gauge.
    pub fn kind_of(&self, field: &str) -> MetricKind {
        if self.counters.iter().any(|k| k == field) {
            MetricKind::Counter
        } else if self.timers.iter().any(|k| k == field) {
            MetricKind::Timer
        } else {
            MetricKind::Gauge
        }
    }

    /// Whether the field's value becomes part of the key (`field.value = 1`).
    pub fn is_kv(&self, field: &str) -> bool {
        self.kv.iter().any(|k| k == field)
    }
}

/// Generic input worker: fetch → parse → extract → queue, once per tick.
pub struct InputWorker<S: MetricSource> {
    name: String,
    period: Duration,
    prefix: String,
    source: S,
    rates: RateTracker,
    queue: SampleQueue,
}

impl<S: MetricSource> InputWorker<S> {
    pub fn new(section: &SectionConfig, queue: SampleQueue, source: S) -> Result<Self, ConfigError> {
        Ok(Self {
            name: section.name().to_string(),
            period: section.period()?,
            prefix: section.get("prefix").unwrap_or_default().to_string(),
            source,
            rates: RateTracker::new(),
            queue,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch, parse and extract one interval's records without queueing.
    pub fn collect(&mut self, timestamp: i64) -> Result<Vec<MetricRecord>, SourceError> {
        let raw = self.source.fetch()?;
        let samples = self.source.parse(raw)?;
        let mut out = Emitter::new(&self.prefix, timestamp, &mut self.rates);
        for (field, value) in samples {
            self.source.extract(&field, value, &mut out);
        }
        Ok(out.into_records())
    }
}

impl<S: MetricSource> Worker for InputWorker<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        log::info!("[{}] plugin {}", self.name, self.source.info().name);
        self.source.setup()
    }

    fn tick(&mut self) {
        match self.collect(unix_now()) {
            Ok(records) => {
                log::debug!("[{}] {} record(s)", self.name, records.len());
                self.queue.extend(records);
            }
            Err(e) => log::warn!("[{}] {e}", self.name),
        }
    }
}

/// Read a whole text file for file-backed sources.
pub(crate) fn read_text(path: &str) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|e| {
        SourceError::Io(std::io::Error::new(e.kind(), format!("{path}: {e}")))
    })
}
