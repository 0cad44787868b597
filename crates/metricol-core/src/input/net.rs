//! Network interface statistics from `/sys/class/net/<iface>/statistics`.

use std::path::PathBuf;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::rate::ResetPolicy;
use crate::record::MetricValue;

use super::{Emitter, MetricSource, PluginInfo};

const DEFAULT_SYSFS_ROOT: &str = "/sys/class/net";

pub static INFO: PluginInfo = PluginInfo {
    name: "sys_class_net",
    description: "Per-interface traffic counters from sysfs",
    required: &["interfaces", "prefix"],
};

pub struct SysClassNet {
    root: PathBuf,
    interfaces: Vec<String>,
}

impl SysClassNet {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        Ok(Self {
            root: PathBuf::from(section.get("sysfs_root").unwrap_or(DEFAULT_SYSFS_ROOT)),
            interfaces: section.list("interfaces"),
        })
    }
}

impl MetricSource for SysClassNet {
    /// `(iface.statistic, file contents)`
    type Raw = Vec<(String, String)>;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn fetch(&mut self) -> Result<Self::Raw, SourceError> {
        let mut raw = Vec::new();
        for iface in &self.interfaces {
            let dir = self.root.join(iface).join("statistics");
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("{}: {e}", dir.display());
                    continue;
                }
            };
            let mut files: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
            files.sort();
            for path in files {
                let Some(stat) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                match std::fs::read_to_string(&path) {
                    Ok(text) => raw.push((format!("{iface}.{stat}"), text)),
                    Err(e) => log::warn!("{}: {e}", path.display()),
                }
            }
        }
        Ok(raw)
    }

    fn parse(&self, raw: Self::Raw) -> Result<Vec<(String, MetricValue)>, SourceError> {
        Ok(raw
            .into_iter()
            .filter_map(|(key, text)| text.trim().parse::<i64>().ok().map(|v| (key, MetricValue::Int(v))))
            .collect())
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        out.counter_delta(field, &value, ResetPolicy::Skip);
    }
}
