//! uWSGI stats server (JSON over HTTP).

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::helpers::{build_url, http_client, http_get};
use crate::rate::ResetPolicy;
use crate::record::MetricValue;

use super::{DEFAULT_TIMEOUT, Emitter, MetricSource, PluginInfo};

const STRAIGHT_METRICS: &[&str] = &["listen_queue", "listen_queue_errors", "signal_queue", "load"];
const LOCK_METRICS: &[&str] = &[
    "user 0", "signal", "filemon", "timer", "rbtimer", "cron", "rpc", "snmp",
];
const SOCKET_METRICS: &[&str] = &["queue", "shared"];
const WORKER_METRICS: &[&str] = &[
    "requests",
    "delta_requests",
    "exceptions",
    "harakiri_count",
    "signals",
    "signal_queue",
    "rss",
    "vsz",
    "respawn_count",
    "tx",
    "avg_rt",
];
const LOCKS_PREFIX: &str = "locks.";

pub static INFO: PluginInfo = PluginInfo {
    name: "uwsgi_stats",
    description: "Queue, socket and worker gauges plus lock counters from the uWSGI stats server",
    required: &["scheme", "host", "port", "uri", "server_name", "prefix"],
};

pub struct UwsgiStats {
    url: String,
    server_name: String,
    timeout: Duration,
    client: Option<Client>,
}

impl UwsgiStats {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        Ok(Self {
            url: build_url(
                section.require("scheme")?,
                section.require("host")?,
                section.require("port")?,
                section.require("uri")?,
            ),
            server_name: section.require("server_name")?.to_string(),
            timeout: section.timeout(DEFAULT_TIMEOUT)?,
            client: None,
        })
    }

    fn client(&mut self) -> Result<&Client, SourceError> {
        if self.client.is_none() {
            self.client = Some(http_client(self.timeout, Some(&self.server_name))?);
        }
        self.client
            .as_ref()
            .ok_or_else(|| SourceError::NotReady("http client".into()))
    }
}

/// Flatten the stats document into dotted `(field, value)` samples.
pub fn flatten_stats(doc: &Value) -> Result<Vec<(String, MetricValue)>, SourceError> {
    let obj = doc
        .as_object()
        .ok_or_else(|| SourceError::Malformed("stats document is not an object".into()))?;
    let mut out = Vec::new();

    for key in STRAIGHT_METRICS {
        if let Some(v) = obj.get(*key).and_then(MetricValue::from_json) {
            out.push((key.to_string(), v));
        }
    }

    for lock in obj.get("locks").and_then(Value::as_array).into_iter().flatten() {
        let Some(lock) = lock.as_object() else {
            continue;
        };
        for (name, v) in lock {
            if !LOCK_METRICS.contains(&name.as_str()) {
                continue;
            }
            if let Some(v) = MetricValue::from_json(v) {
                out.push((format!("{LOCKS_PREFIX}{}", name.replace(' ', "_")), v));
            }
        }
    }

    let sockets = obj.get("sockets").and_then(Value::as_array);
    for (idx, socket) in sockets.into_iter().flatten().enumerate() {
        for key in SOCKET_METRICS {
            if let Some(v) = socket.get(*key).and_then(MetricValue::from_json) {
                out.push((format!("sockets.{idx}.{key}"), v));
            }
        }
    }

    for worker in obj.get("workers").and_then(Value::as_array).into_iter().flatten() {
        let Some(id) = worker.get("id").and_then(Value::as_i64) else {
            continue;
        };
        for key in WORKER_METRICS {
            if let Some(v) = worker.get(*key).and_then(MetricValue::from_json) {
                out.push((format!("workers.{id}.{key}"), v));
            }
        }
    }

    Ok(out)
}

impl MetricSource for UwsgiStats {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        self.client().map(|_| ())
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        let url = self.url.clone();
        Ok(http_get(self.client()?, &url)?.text()?)
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        let doc: Value = serde_json::from_str(&raw)?;
        flatten_stats(&doc)
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        if field.starts_with(LOCKS_PREFIX) {
            out.counter_delta(field, &value, ResetPolicy::Clamp);
        } else {
            out.gauge(field, value);
        }
    }
}
