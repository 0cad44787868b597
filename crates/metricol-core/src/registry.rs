//! Static plugin registry: `plugin = <name>` → compiled-in worker.

use crate::config::{SectionConfig, SectionRole};
use crate::error::ConfigError;
use crate::input::{self, InputWorker, PluginInfo};
use crate::logwatch::{self, LogWatcher};
use crate::output::{self, HttpTransport, OutputWorker, TcpTransport, UdpTransport, WireFormat};
use crate::queue::SampleQueue;
use crate::worker::Worker;

/// Every input plugin, by registry name.
pub static INPUT_PLUGINS: &[&PluginInfo] = &[
    &logwatch::AUTH_LOG_WATCH_INFO,
    &input::disks::INFO,
    &input::loadavg::INFO,
    &logwatch::LOG_WATCH_INFO,
    &input::meminfo::INFO,
    &input::mysql::INFO,
    &input::nginx::INFO,
    &input::redis::INFO,
    &input::net::INFO,
    &input::uwsgi::INFO,
];

/// Every output plugin, by registry name.
pub static OUTPUT_PLUGINS: &[&PluginInfo] = &[
    &output::GRAPHITE_INFO,
    &output::GRAPHITE_GW_INFO,
    &output::STATSITE_INFO,
];

/// Look up a plugin for a section role.
pub fn plugin_info(role: SectionRole, name: &str) -> Option<&'static PluginInfo> {
    let table = match role {
        SectionRole::Input => INPUT_PLUGINS,
        SectionRole::Output => OUTPUT_PLUGINS,
    };
    table.iter().copied().find(|info| info.name == name)
}

/// `enabled` key, default on.
pub fn is_enabled(section: &SectionConfig) -> Result<bool, ConfigError> {
    section.flag("enabled", true)
}

/// Build the worker a section describes. Nothing is started and no
/// resources are acquired until the worker's `setup`.
pub fn build_worker(section: &SectionConfig, queue: &SampleQueue) -> Result<Box<dyn Worker>, ConfigError> {
    let plugin = section.require("plugin")?.trim();
    let unknown = || ConfigError::UnknownPlugin {
        section: section.name().to_string(),
        plugin: plugin.to_string(),
    };
    let role = section.role().ok_or_else(unknown)?;
    let info = plugin_info(role, plugin).ok_or_else(unknown)?;
    let queue = queue.clone();

    let worker: Box<dyn Worker> = match (role, info.name) {
        (SectionRole::Input, "meminfo") => input_worker(section, queue, input::meminfo::MemInfo::from_section(section)?)?,
        (SectionRole::Input, "load_info") => input_worker(section, queue, input::loadavg::LoadInfo::from_section(section)?)?,
        (SectionRole::Input, "disks_spaces") => {
            input_worker(section, queue, input::disks::DisksSpaces::from_section(section)?)?
        }
        (SectionRole::Input, "sys_class_net") => {
            input_worker(section, queue, input::net::SysClassNet::from_section(section)?)?
        }
        (SectionRole::Input, "nginx_status") => {
            input_worker(section, queue, input::nginx::NginxStatus::from_section(section)?)?
        }
        (SectionRole::Input, "uwsgi_stats") => {
            input_worker(section, queue, input::uwsgi::UwsgiStats::from_section(section)?)?
        }
        (SectionRole::Input, "redis_info") => {
            input_worker(section, queue, input::redis::RedisInfo::from_section(section)?)?
        }
        (SectionRole::Input, "mysql_status") => {
            input_worker(section, queue, input::mysql::MysqlStatus::from_section(section)?)?
        }
        (SectionRole::Input, "log_watch") => Box::new(LogWatcher::fields(section, queue)?),
        (SectionRole::Input, "auth_log_watch") => Box::new(LogWatcher::auth(section, queue)?),
        (SectionRole::Output, "graphite_gw") => Box::new(OutputWorker::new(
            section,
            queue,
            output::graphite_format(section),
            HttpTransport::from_section(section)?,
        )?),
        (SectionRole::Output, "graphite") => Box::new(OutputWorker::new(
            section,
            queue,
            output::graphite_format(section),
            TcpTransport::from_section(section)?,
        )?),
        (SectionRole::Output, "statsite") => Box::new(OutputWorker::new(
            section,
            queue,
            WireFormat::Statsd,
            UdpTransport::from_section(section)?,
        )?),
        _ => return Err(unknown()),
    };
    log::debug!("[{}] built {} worker", section.name(), info.name);
    Ok(worker)
}

fn input_worker<S: input::MetricSource>(
    section: &SectionConfig,
    queue: SampleQueue,
    source: S,
) -> Result<Box<dyn Worker>, ConfigError> {
    Ok(Box::new(InputWorker::new(section, queue, source)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        for table in [INPUT_PLUGINS, OUTPUT_PLUGINS] {
            let mut names: Vec<&str> = table.iter().map(|i| i.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), table.len());
        }
        assert_eq!(INPUT_PLUGINS.len(), 10);
        assert_eq!(OUTPUT_PLUGINS.len(), 3);
    }

    #[test]
    fn test_build_known_plugins() {
        let queue = SampleQueue::new();
        let mem = SectionConfig::from_pairs("input:mem", [("plugin", "meminfo"), ("prefix", "h.mem.")]);
        assert_eq!(build_worker(&mem, &queue).unwrap().name(), "input:mem");

        let out = SectionConfig::from_pairs(
            "output:statsite",
            [("plugin", "statsite"), ("host", "127.0.0.1"), ("port", "8125"), ("period", "2")],
        );
        let worker = build_worker(&out, &queue).unwrap();
        assert_eq!(worker.period(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_unknown_plugin_is_rejected() {
        let queue = SampleQueue::new();
        let s = SectionConfig::from_pairs("input:x", [("plugin", "os.system")]);
        assert!(matches!(build_worker(&s, &queue), Err(ConfigError::UnknownPlugin { .. })));

        // Output plugins are not inputs.
        let s = SectionConfig::from_pairs("input:x", [("plugin", "graphite")]);
        assert!(matches!(build_worker(&s, &queue), Err(ConfigError::UnknownPlugin { .. })));

        let s = SectionConfig::from_pairs("input:x", []);
        assert!(matches!(build_worker(&s, &queue), Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn test_enabled_flag() {
        let on = SectionConfig::from_pairs("input:a", [("plugin", "meminfo")]);
        assert!(is_enabled(&on).unwrap());
        let off = SectionConfig::from_pairs("input:a", [("enabled", "no")]);
        assert!(!is_enabled(&off).unwrap());
        let bad = SectionConfig::from_pairs("input:a", [("enabled", "maybe")]);
        assert!(is_enabled(&bad).is_err());
    }

    #[test]
    fn test_missing_required_key() {
        let queue = SampleQueue::new();
        let s = SectionConfig::from_pairs("input:disks", [("plugin", "disks_spaces"), ("prefix", "d.")]);
        match build_worker(&s, &queue) {
            Err(ConfigError::MissingKey { key, .. }) => assert_eq!(key, "targets"),
            other => panic!("unexpected {:?}", other.map(|w| w.name().to_string())),
        }
    }

    #[test]
    fn test_oversized_timeout_is_a_section_error() {
        let queue = SampleQueue::new();
        let s = SectionConfig::from_pairs(
            "output:graphite",
            [("plugin", "graphite"), ("host", "127.0.0.1"), ("port", "2003"), ("prefix", "g."), ("timeout", "1e30")],
        );
        match build_worker(&s, &queue) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, "timeout"),
            other => panic!("unexpected {:?}", other.map(|w| w.name().to_string())),
        }
    }
}
