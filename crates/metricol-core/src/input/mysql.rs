//! MySQL global status counters.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{ConnectOptions, Connection, Executor, Row};
use tokio::runtime::Runtime;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::rate::ResetPolicy;
use crate::record::MetricValue;

use super::{DEFAULT_TIMEOUT, Emitter, MetricSource, PluginInfo};

const STATUS_QUERY: &str = "SHOW GLOBAL STATUS";

/// Status variable families worth tracking. Group 1 is the family name
/// when the variable has one.
static METRICS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(ABORTED|BYTES|COM|CREATED|DELAYED|HANDLER|INNODB_BUFFER_POOL|INNODB_DATA|INNODB_LOG|INNODB_OS_LOG|INNODB_PAGES|INNODB_ROW_LOCK|INNODB_ROWS|KEY|OPEN|OPENED|QCACHE|SELECT|SLOW|SORT|TABLE_LOCKS|THREADS)_|CONNECTIONS|MAX_USED_CONNECTIONS|NOT_FLUSHED_DELAYED_ROWS|QUERIES|QUESTIONS)",
    )
    .expect("invalid mysql status regex")
});

pub static INFO: PluginInfo = PluginInfo {
    name: "mysql_status",
    description: "Global status counters from a MySQL server",
    required: &["db_host", "db_port", "db_user", "db_pass", "prefix"],
};

pub struct MysqlStatus {
    options: MySqlConnectOptions,
    timeout: Duration,
    runtime: Option<Runtime>,
}

impl MysqlStatus {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        let port = section
            .require("db_port")?
            .trim()
            .parse::<u16>()
            .map_err(|e| section.invalid("db_port", e.to_string()))?;
        let options = MySqlConnectOptions::new()
            .host(section.require("db_host")?.trim())
            .port(port)
            .username(section.require("db_user")?)
            .password(section.require("db_pass")?)
            .log_statements(log::LevelFilter::Trace);
        Ok(Self {
            options,
            timeout: section.timeout(DEFAULT_TIMEOUT)?,
            runtime: None,
        })
    }
}

/// One connection per poll: connect, read every status row, disconnect.
async fn global_status(options: &MySqlConnectOptions) -> Result<Vec<(String, String)>, sqlx::Error> {
    let mut conn = options.connect().await?;
    let rows = (&mut conn).fetch_all(STATUS_QUERY).await?;
    conn.close().await?;
    rows.iter()
        .map(|row| Ok::<_, sqlx::Error>((row.try_get::<String, _>(0)?, row.try_get::<String, _>(1)?)))
        .collect()
}

/// Metric name for a status variable, or `None` when it is not tracked.
///
/// `Innodb_rows_read` → `innodb_rows.read`, `Questions` → `questions`.
pub fn metric_name(variable: &str) -> Option<String> {
    let upper = variable.to_ascii_uppercase();
    let caps = METRICS_RE.captures(&upper)?;
    Some(match caps.get(1) {
        Some(family) => {
            let rest = &variable[family.end() + 1..];
            format!("{}.{}", family.as_str().to_ascii_lowercase(), rest.to_ascii_lowercase())
        }
        None => variable.to_ascii_lowercase(),
    })
}

/// Keep the tracked, numeric `(Variable_name, Value)` rows.
pub fn parse_status(rows: &[(String, String)]) -> Vec<(String, MetricValue)> {
    rows.iter()
        .filter_map(|(name, value)| {
            let value = MetricValue::parse(value);
            if !value.is_numeric() {
                return None;
            }
            metric_name(name.trim()).map(|metric| (metric, value))
        })
        .collect()
}

impl MetricSource for MysqlStatus {
    type Raw = Vec<(String, String)>;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        if self.runtime.is_none() {
            self.runtime = Some(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?,
            );
        }
        Ok(())
    }

    fn fetch(&mut self) -> Result<Vec<(String, String)>, SourceError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| SourceError::NotReady("no runtime".into()))?;
        let options = &self.options;
        let timeout = self.timeout;
        let rows = runtime
            .block_on(async { tokio::time::timeout(timeout, global_status(options)).await })
            .map_err(|_| SourceError::Io(std::io::ErrorKind::TimedOut.into()))??;
        Ok(rows)
    }

    fn parse(&self, raw: Vec<(String, String)>) -> Result<Vec<(String, MetricValue)>, SourceError> {
        Ok(parse_status(&raw))
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        out.counter_delta(field, &value, ResetPolicy::Clamp);
    }
}
