//! System load from `/proc/loadavg`.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::record::MetricValue;

use super::{Emitter, MetricSource, PluginInfo, read_text};

const DEFAULT_PATH: &str = "/proc/loadavg";

/// `0.42 0.30 0.25 2/812 12345`: 1-minute load, running/existing tasks.
static LOADAVG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([.0-9]+) [.0-9]+ [.0-9]+ ([0-9]+)/([0-9]+) [0-9]+$")
        .expect("invalid loadavg regex")
});

pub static INFO: PluginInfo = PluginInfo {
    name: "load_info",
    description: "Load average and task counts from /proc/loadavg",
    required: &["prefix"],
};

pub struct LoadInfo {
    path: String,
}

impl LoadInfo {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        Ok(Self {
            path: section.get("loadavg").unwrap_or(DEFAULT_PATH).to_string(),
        })
    }
}

pub fn parse_loadavg(text: &str) -> Result<Vec<(String, MetricValue)>, SourceError> {
    let caps = LOADAVG_RE
        .captures(text.trim())
        .ok_or_else(|| SourceError::Malformed(format!("loadavg: {:?}", text.trim())))?;
    let bad = |e: &dyn std::fmt::Display| SourceError::Malformed(format!("loadavg: {e}"));

    let load: f64 = caps[1].parse().map_err(|e| bad(&e))?;
    let running: i64 = caps[2].parse().map_err(|e| bad(&e))?;
    let existing: i64 = caps[3].parse().map_err(|e| bad(&e))?;
    Ok(vec![
        ("load".to_string(), MetricValue::Float(load)),
        ("running".to_string(), MetricValue::Int(running)),
        ("existing".to_string(), MetricValue::Int(existing)),
    ])
}

impl MetricSource for LoadInfo {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        read_text(&self.path)
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        parse_loadavg(&raw)
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        out.gauge(field, value);
    }
}
