//! Log-following inputs.
//!
//! A [`LogWatcher`] owns a follower subprocess ([`TailProcess`]), reads the
//! lines it produces, matches them against the section's pattern, lets a
//! [`LineParser`] normalize the captured fields and hands the resulting
//! events to an [`EventMetrics`] extractor.
//!
//! The follower is shared with the teardown hook so a stop request can kill
//! it from the supervisor's thread.

pub mod extract;
pub mod parsers;
pub mod tail;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::input::{Emitter, KeyClasses, PluginInfo};
use crate::queue::SampleQueue;
use crate::rate::RateTracker;
use crate::record::unix_now;
use crate::worker::{TeardownHook, Worker};

pub use extract::{AuthSessions, EventMetrics, FieldMetrics};
pub use parsers::{LineParser, LinePattern, LogEvent, MatchMethod, line_parser};
pub use tail::{LineBuffer, Polled, TailProcess};

/// Readiness wait per poll.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on polls per tick while output keeps arriving.
const MAX_POLLS_PER_TICK: usize = 64;

const DEFAULT_TAIL_CMD: &str = "tail";
const DEFAULT_TAIL_LINES: u64 = 1000;

pub static LOG_WATCH_INFO: PluginInfo = PluginInfo {
    name: "log_watch",
    description: "Per-field metrics from lines appended to a log file",
    required: &["log_fpath", "parser", "pattern", "prefix"],
};

pub static AUTH_LOG_WATCH_INFO: PluginInfo = PluginInfo {
    name: "auth_log_watch",
    description: "Open sessions and authentication attempts from an auth log",
    required: &["log_fpath", "parser", "pattern", "prefix"],
};

type SharedTail = Arc<Mutex<Option<TailProcess>>>;

fn lock(tail: &SharedTail) -> MutexGuard<'_, Option<TailProcess>> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Input worker following one log file.
pub struct LogWatcher {
    name: String,
    period: Duration,
    prefix: String,
    log_path: String,
    tail_cmd: String,
    tail_lines: u64,
    pattern: LinePattern,
    parser: &'static dyn LineParser,
    metrics: Box<dyn EventMetrics>,
    rates: RateTracker,
    queue: SampleQueue,
    tail: SharedTail,
    exhausted_logged: bool,
}

impl LogWatcher {
    /// Build from a section, with `metrics` deciding what each event emits.
    pub fn new(
        section: &SectionConfig,
        queue: SampleQueue,
        info: &PluginInfo,
        metrics: Box<dyn EventMetrics>,
    ) -> Result<Self, ConfigError> {
        section.require_all(info.required)?;

        let parser_name = section.require("parser")?;
        let parser = line_parser(parser_name)
            .ok_or_else(|| section.invalid("parser", format!("unknown line parser {parser_name:?}")))?;
        let method: MatchMethod = section.parse_value("method", MatchMethod::default())?;
        let pattern = LinePattern::new(section.require("pattern")?, method)
            .map_err(|e| section.invalid("pattern", e.to_string()))?;

        Ok(Self {
            name: section.name().to_string(),
            period: section.period()?,
            prefix: section.require("prefix")?.to_string(),
            log_path: section.require("log_fpath")?.to_string(),
            tail_cmd: section.get("tail_cmd").unwrap_or(DEFAULT_TAIL_CMD).to_string(),
            tail_lines: section.parse_value("tail_lines", DEFAULT_TAIL_LINES)?,
            pattern,
            parser,
            metrics,
            rates: RateTracker::new(),
            queue,
            tail: Arc::new(Mutex::new(None)),
            exhausted_logged: false,
        })
    }

    /// `log_watch`: per-field gauges/counters/timers.
    pub fn fields(section: &SectionConfig, queue: SampleQueue) -> Result<Self, ConfigError> {
        let metrics = FieldMetrics::new(KeyClasses::from_section(section));
        Self::new(section, queue, &LOG_WATCH_INFO, Box::new(metrics))
    }

    /// `auth_log_watch`: sessions and attempts.
    pub fn auth(section: &SectionConfig, queue: SampleQueue) -> Result<Self, ConfigError> {
        Self::new(section, queue, &AUTH_LOG_WATCH_INFO, Box::new(AuthSessions::new()))
    }

    /// Turn raw follower lines into records stamped with their event time
    /// (or `now` when the pattern has no `time` group). Non-matching lines
    /// are dropped.
    pub fn process_lines(&mut self, lines: &[String], now: i64) -> usize {
        let mut out = Emitter::new(&self.prefix, now, &mut self.rates);
        let mut matched = 0;
        for line in lines {
            let Some(event) = self.parser.parse_line(&self.pattern, line) else {
                continue;
            };
            matched += 1;
            out.set_timestamp(event.time.unwrap_or(now));
            self.metrics.extract(event, &mut out);
        }
        let records = out.into_records();
        let emitted = records.len();
        self.queue.extend(records);
        log::debug!(
            "[{}] {} line(s), {} matched, {} record(s)",
            self.name,
            lines.len(),
            matched,
            emitted
        );
        emitted
    }

    /// One poll of the follower. Returns `None` when there is no follower.
    fn poll_once(&mut self) -> Option<Polled> {
        let mut guard = lock(&self.tail);
        let proc = guard.as_mut()?;
        if proc.is_exhausted() {
            if !self.exhausted_logged {
                log::error!("[{}] follower output closed, idling", self.name);
                self.exhausted_logged = true;
            }
            return None;
        }
        match proc.poll_lines(POLL_TIMEOUT) {
            Ok(polled) => Some(polled),
            Err(e) => {
                log::warn!("[{}] poll: {e}", self.name);
                Some(Polled::default())
            }
        }
    }
}

impl Worker for LogWatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        let args = tail::follow_args(&self.log_path, self.tail_lines);
        let proc = TailProcess::spawn(&self.tail_cmd, &args).map_err(|e| SourceError::Command {
            command: format!("{} {}", self.tail_cmd, args.join(" ")),
            message: e.to_string(),
        })?;
        log::info!("[{}] following {} (pid {})", self.name, self.log_path, proc.id());
        *lock(&self.tail) = Some(proc);
        Ok(())
    }

    fn tick(&mut self) {
        let mut lines = Vec::new();
        for _ in 0..MAX_POLLS_PER_TICK {
            let Some(polled) = self.poll_once() else {
                tail::idle_poll(POLL_TIMEOUT);
                break;
            };
            for line in &polled.stderr {
                log::warn!("[{}] ERR: {line:?}", self.name);
            }
            let got_data = !polled.is_empty();
            lines.extend(polled.stdout);
            if !got_data {
                break;
            }
        }
        if !lines.is_empty() {
            self.process_lines(&lines, unix_now());
        }
    }

    fn teardown_hook(&self) -> Option<TeardownHook> {
        let tail = Arc::clone(&self.tail);
        let name = self.name.clone();
        Some(Arc::new(move || {
            if let Some(mut proc) = lock(&tail).take() {
                log::info!("[{name}] stopping follower (pid {})", proc.id());
                proc.kill();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{MetricKind, MetricValue};

    fn section(pairs: &[(&str, &str)]) -> SectionConfig {
        let mut all = vec![
            ("log_fpath", "/var/log/app.log"),
            ("parser", "nginx"),
            ("pattern", r"(?P<method>[A-Z]+) (?P<uri>\S+) (?P<status>[0-9]{3})"),
            ("prefix", "web.logs."),
        ];
        all.extend_from_slice(pairs);
        SectionConfig::from_pairs("input:logs", all)
    }

    #[test]
    fn test_non_matching_lines_produce_nothing() {
        let queue = SampleQueue::new();
        let mut w = LogWatcher::fields(&section(&[]), queue.clone()).unwrap();
        let emitted = w.process_lines(&["-- MARK --".to_string(), "".to_string()], 1);
        assert_eq!(emitted, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lines_without_time_use_tick_time() {
        let queue = SampleQueue::new();
        let mut w =
            LogWatcher::fields(&section(&[("kv_keys", "status"), ("counter_keys", "method.GET")]), queue.clone())
                .unwrap();
        w.process_lines(&["GET /api/x 200".to_string()], 1_700_000_000);
        let records = queue.drain();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.timestamp() == 1_700_000_000));
        assert_eq!(records[0].key(), "web.logs.method.GET");
        assert_eq!(records[0].kind(), &MetricKind::Counter);
        assert_eq!(records[1].value(), &MetricValue::Text("api".into()));
        assert_eq!(records[2].key(), "web.logs.status.200");
    }

    #[test]
    fn test_section_errors() {
        let queue = SampleQueue::new();
        assert!(matches!(
            LogWatcher::fields(&section(&[("parser", "json")]), queue.clone()),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            LogWatcher::fields(&section(&[("pattern", "(unclosed")]), queue.clone()),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            LogWatcher::fields(&section(&[("method", "fullmatch")]), queue.clone()),
            Err(ConfigError::InvalidValue { .. })
        ));
        let missing = SectionConfig::from_pairs("input:logs", [("parser", "nginx")]);
        assert!(matches!(
            LogWatcher::auth(&missing, queue),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_setup_failure_leaves_idle_worker() {
        let queue = SampleQueue::new();
        let mut w = LogWatcher::fields(&section(&[("tail_cmd", "/nonexistent/tail")]), queue.clone()).unwrap();
        assert!(w.setup().is_err());
        w.tick();
        assert!(queue.is_empty());
        // Teardown without a follower is a no-op.
        let hook = w.teardown_hook().unwrap();
        hook();
        hook();
    }

    #[cfg(unix)]
    #[test]
    fn test_follower_stderr_is_logged_not_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fake-tail");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'GET /err 500' >&2\necho 'GET /ok 200'\nsleep 5\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let queue = SampleQueue::new();
        let script = script.to_str().unwrap();
        let mut w = LogWatcher::fields(&section(&[("tail_cmd", script), ("kv_keys", "status")]), queue.clone()).unwrap();
        w.setup().unwrap();

        let mut records = Vec::new();
        for _ in 0..50 {
            w.tick();
            records.extend(queue.drain());
            if records.iter().any(|r| r.key() == "web.logs.status.200") {
                break;
            }
        }
        // Give a late stderr line a chance to show up.
        w.tick();
        records.extend(queue.drain());
        w.teardown_hook().unwrap()();

        assert!(records.iter().any(|r| r.key() == "web.logs.status.200"));
        assert!(!records.iter().any(|r| r.key().contains("500")));
        assert!(!records.iter().any(|r| r.value() == &MetricValue::Text("err".into())));
    }
}
