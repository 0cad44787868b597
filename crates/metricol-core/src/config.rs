//! INI-style configuration.
//!
//! One `[input:NAME]` or `[output:NAME]` section per worker; `[DEFAULT]`
//! values are inherited by every section. Keys are case-insensitive.
//!
//! ```ini
//! [DEFAULT]
//! log_level = INFO
//!
//! [input:mem]
//! plugin = meminfo
//! period = 10
//! prefix = host.mem.
//!
//! [output:graphite]
//! plugin = graphite_gw
//! scheme = https
//! host = collector.example.com
//! ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, ParseOption};

use crate::error::ConfigError;
use crate::worker::DEFAULT_PERIOD;

const DEFAULT_SECTION: &str = "DEFAULT";
const INPUT_PREFIX: &str = "input:";
const OUTPUT_PREFIX: &str = "output:";

/// Parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct Config {
    defaults: BTreeMap<String, String>,
    sections: Vec<(String, BTreeMap<String, String>)>,
}

impl Config {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse INI text. Values are taken verbatim: no quote or escape
    /// processing, so regex patterns keep their backslashes. Indented lines
    /// continue the previous value.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(text, parse_options()).map_err(|e| ConfigError::Syntax {
            line: e.line + 1,
            message: e.msg.to_string(),
        })?;

        let mut config = Self::default();
        for (name, props) in ini.iter() {
            let Some(name) = name else {
                if props.iter().next().is_some() {
                    return Err(ConfigError::Syntax {
                        line: first_entry_line(text),
                        message: "key outside of a section".to_string(),
                    });
                }
                continue;
            };
            let section = if name == DEFAULT_SECTION {
                None
            } else {
                Some(config.section_index(name))
            };
            let map = config.section_map(section);
            for (key, value) in props.iter() {
                map.insert(key.trim().to_ascii_lowercase(), value.to_string());
            }
        }
        Ok(config)
    }

    fn section_index(&mut self, name: &str) -> usize {
        if let Some(pos) = self.sections.iter().position(|(n, _)| n == name) {
            return pos;
        }
        self.sections.push((name.to_string(), BTreeMap::new()));
        self.sections.len() - 1
    }

    fn section_map(&mut self, section: Option<usize>) -> &mut BTreeMap<String, String> {
        match section {
            None => &mut self.defaults,
            Some(idx) => &mut self.sections[idx].1,
        }
    }

    /// Names of all non-default sections, in file order.
    pub fn sections(&self) -> Vec<&str> {
        self.sections.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// A value from `[DEFAULT]`.
    pub fn default_value(&self, key: &str) -> Option<&str> {
        self.defaults
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Look up a section with defaults merged in.
    pub fn section(&self, name: &str) -> Option<SectionConfig> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, values)| self.merged(n, values))
    }

    /// Every `input:`/`output:` section, in file order.
    pub fn worker_sections(&self) -> Vec<SectionConfig> {
        self.sections
            .iter()
            .filter(|(n, _)| n.starts_with(INPUT_PREFIX) || n.starts_with(OUTPUT_PREFIX))
            .map(|(n, values)| self.merged(n, values))
            .collect()
    }

    pub fn has_output(&self) -> bool {
        self.sections.iter().any(|(n, _)| n.starts_with(OUTPUT_PREFIX))
    }

    /// Startup validation: at least one output must be declared.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.has_output() {
            Ok(())
        } else {
            Err(ConfigError::NoOutput)
        }
    }

    fn merged(&self, name: &str, values: &BTreeMap<String, String>) -> SectionConfig {
        let mut merged = self.defaults.clone();
        merged.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        SectionConfig {
            name: name.to_string(),
            values: merged,
        }
    }
}

fn parse_options() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        enabled_indented_mutiline_value: true,
        ..ParseOption::default()
    }
}

/// Line of the first key/value entry, for errors about keys preceding any
/// section header.
fn first_entry_line(text: &str) -> usize {
    text.lines()
        .position(|l| {
            let l = l.trim();
            !l.is_empty() && !l.starts_with(['#', ';'])
        })
        .map_or(1, |idx| idx + 1)
}

/// Role of a worker section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRole {
    Input,
    Output,
}

/// Key/value options of one worker section, defaults included.
#[derive(Debug, Clone, Default)]
pub struct SectionConfig {
    name: String,
    values: BTreeMap<String, String>,
}

impl SectionConfig {
    /// Build a section directly from pairs. Keys are lowercased.
    pub fn from_pairs<'a>(
        name: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            name: name.to_string(),
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<SectionRole> {
        if self.name.starts_with(INPUT_PREFIX) {
            Some(SectionRole::Input)
        } else if self.name.starts_with(OUTPUT_PREFIX) {
            Some(SectionRole::Output)
        } else {
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A value that must be present.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            section: self.name.clone(),
            key: key.to_string(),
        })
    }

    /// Check that every key in `keys` is present.
    pub fn require_all(&self, keys: &[&str]) -> Result<(), ConfigError> {
        keys.iter().try_for_each(|k| self.require(k).map(|_| ()))
    }

    /// Comma-separated list, whitespace-trimmed, empty items dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Parse an optional value, falling back to `default` when absent.
    pub fn parse_value<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key).map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| self.invalid(key, e.to_string())),
        }
    }

    /// Tick interval in whole seconds; at least one second.
    pub fn period(&self) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parse_value("period", DEFAULT_PERIOD.as_secs())?;
        if secs == 0 {
            return Err(self.invalid("period", "must be at least 1".to_string()));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Optional timeout in seconds, for network sources and sinks.
    pub fn timeout(&self, default: Duration) -> Result<Duration, ConfigError> {
        let secs: f64 = self.parse_value("timeout", default.as_secs_f64())?;
        if secs <= 0.0 {
            return Err(self.invalid("timeout", "must be positive".to_string()));
        }
        Duration::try_from_secs_f64(secs).map_err(|e| self.invalid("timeout", e.to_string()))
    }

    /// Boolean in configparser spelling (`1/yes/true/on`, `0/no/false/off`).
    pub fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "" => Ok(default),
                "1" | "yes" | "true" | "on" => Ok(true),
                "0" | "no" | "false" | "off" => Ok(false),
                _ => Err(self.invalid(key, format!("not a boolean: {v:?}"))),
            },
        }
    }

    pub(crate) fn invalid(&self, key: &str, message: String) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.clone(),
            key: key.to_string(),
            message,
        }
    }
}
