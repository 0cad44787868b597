//! Memory usage from `/proc/meminfo`.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::record::MetricValue;

use super::{Emitter, MetricSource, PluginInfo, read_text};

const DEFAULT_PATH: &str = "/proc/meminfo";
const UNITS: &str = "kMGTP";
const UNIT_BASE: i64 = 1024;

static METRIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]+):\s*([0-9]+)(?:\s*([kMGTP])B)?").expect("valid regex")
});

/// `/proc/meminfo` field → metric name.
const METRICS_MAP: &[(&str, &str)] = &[
    ("MemTotal", "total"),
    ("MemFree", "free"),
    ("Cached", "cached"),
    ("Buffers", "buffers"),
    ("SwapTotal", "swap_total"),
    ("SwapFree", "swap_free"),
    ("Active", "active"),
    ("Inactive", "inactive"),
    ("Unevictable", "unevictable"),
    ("Mlocked", "mlocked"),
    ("Dirty", "dirty"),
    ("Writeback", "writeback"),
    ("AnonPages", "anon_pages"),
    ("Shmem", "shared"),
    ("SReclaimable", "slab_reclaim"),
    ("SUnreclaim", "slab_unreclaim"),
];

pub static INFO: PluginInfo = PluginInfo {
    name: "meminfo",
    description: "Memory usage gauges from /proc/meminfo, in bytes",
    required: &["prefix"],
};

pub struct MemInfo {
    path: String,
}

impl MemInfo {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        Ok(Self {
            path: section.get("meminfo").unwrap_or(DEFAULT_PATH).to_string(),
        })
    }
}

/// Parse meminfo text into `(metric name, bytes)` pairs.
pub fn parse_meminfo(text: &str) -> Vec<(String, MetricValue)> {
    let mut out = Vec::new();
    for caps in METRIC_RE.captures_iter(text) {
        let Some(name) = lookup(&caps[1]) else {
            continue;
        };
        let Ok(value) = caps[2].parse::<i64>() else {
            continue;
        };
        let multiplier = caps
            .get(3)
            .and_then(|unit| UNITS.find(unit.as_str()))
            .map_or(1, |idx| UNIT_BASE.pow(idx as u32 + 1));
        out.push((name.to_string(), MetricValue::Int(value.saturating_mul(multiplier))));
    }
    out
}

fn lookup(field: &str) -> Option<&'static str> {
    METRICS_MAP
        .iter()
        .find(|(k, _)| *k == field)
        .map(|(_, v)| *v)
}

impl MetricSource for MemInfo {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        read_text(&self.path)
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        Ok(parse_meminfo(&raw))
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        out.gauge(field, value);
    }
}
