//! Filesystem space and inode usage via `df`.

use std::collections::HashMap;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::helpers::run_command;
use crate::record::MetricValue;

use super::{Emitter, MetricSource, PluginInfo};

const DF_PROGRAM: &str = "df";
const DF_COLUMNS: &[&str] = &["target", "itotal", "iused", "iavail", "size", "used", "avail"];

pub static INFO: PluginInfo = PluginInfo {
    name: "disks_spaces",
    description: "Space and inode usage per mount point from df",
    required: &["targets", "prefix"],
};

/// `targets = /:root, /var:var` → mount point → label.
pub struct DisksSpaces {
    targets: HashMap<String, String>,
    program: String,
}

impl DisksSpaces {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        let mut targets = HashMap::new();
        for item in section.list("targets") {
            let Some((mount, label)) = item.split_once(':') else {
                return Err(section.invalid("targets", format!("expected mount:label, got {item:?}")));
            };
            targets.insert(mount.trim().to_string(), label.trim().to_string());
        }
        Ok(Self {
            targets,
            program: section.get("df_cmd").unwrap_or(DF_PROGRAM).to_string(),
        })
    }
}

/// Parse `df --output=target,itotal,...` text for the configured targets.
/// Rows whose numeric columns do not parse are skipped.
pub fn parse_df(text: &str, targets: &HashMap<String, String>) -> Vec<(String, MetricValue)> {
    let mut out = Vec::new();
    for line in text.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() != DF_COLUMNS.len() {
            continue;
        }
        let Some(label) = targets.get(columns[0]) else {
            continue;
        };
        let values: Result<Vec<i64>, _> = columns[1..].iter().map(|c| c.parse::<i64>()).collect();
        let Ok(values) = values else {
            log::debug!("df: skipping row {line:?}");
            continue;
        };
        for (column, value) in DF_COLUMNS[1..].iter().zip(values) {
            out.push((format!("{label}.{column}"), MetricValue::Int(value)));
        }
    }
    out
}

impl MetricSource for DisksSpaces {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        let output = format!("--output={}", DF_COLUMNS.join(","));
        run_command(&self.program, &["--all", "--block-size=1", output.as_str()])
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        Ok(parse_df(&raw, &self.targets))
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        out.gauge(field, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Mounted on       Inodes  IUsed   IFree         1B-blocks         Used        Avail
/               6553600 412345 6141255      105089261568  42101456896  57598603264
/proc                 0      0       0                 0            0            0
/var            1310720  10000 1300720       21003583488   1073741824  18837843968
";

    #[test]
    fn test_parse_df_selected_targets() {
        let targets = HashMap::from([("/".to_string(), "root".to_string())]);
        let parsed = parse_df(SAMPLE, &targets);
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[0], ("root.itotal".to_string(), MetricValue::Int(6_553_600)));
        assert_eq!(parsed[5], ("root.avail".to_string(), MetricValue::Int(57_598_603_264)));
    }

    #[test]
    fn test_targets_config() {
        let section = SectionConfig::from_pairs(
            "input:disks",
            [("targets", "/:root, /var : var"), ("prefix", "host.disk.")],
        );
        let source = DisksSpaces::from_section(&section).unwrap();
        assert_eq!(source.targets.get("/var").map(String::as_str), Some("var"));

        let bad = SectionConfig::from_pairs("input:disks", [("targets", "/"), ("prefix", "p.")]);
        assert!(matches!(
            DisksSpaces::from_section(&bad),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
