//! nginx `stub_status` page.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::helpers::{build_url, http_client, http_get};
use crate::rate::ResetPolicy;
use crate::record::MetricValue;

use super::{DEFAULT_TIMEOUT, Emitter, MetricSource, PluginInfo};

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)Active connections:\s*(?P<active>[0-9]+)\s+server accepts handled requests\s+(?P<accepts>[0-9]+)\s+(?P<handled>[0-9]+)\s+(?P<requests>[0-9]+)\s+Reading:\s*(?P<reading>[0-9]+)\s+Writing:\s*(?P<writing>[0-9]+)\s+Waiting:\s*(?P<waiting>[0-9]+)",
    )
    .expect("invalid stub_status regex")
});

const FIELDS: &[&str] = &["active", "accepts", "handled", "requests", "reading", "writing", "waiting"];
const COUNTERS: &[&str] = &["accepts", "handled", "requests"];

pub static INFO: PluginInfo = PluginInfo {
    name: "nginx_status",
    description: "Connection gauges and request counters from nginx stub_status",
    required: &["scheme", "host", "port", "uri", "server_name", "prefix"],
};

pub struct NginxStatus {
    url: String,
    server_name: String,
    timeout: Duration,
    client: Option<Client>,
}

impl NginxStatus {
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

pub fn parse_stub_status(text: &str) -> Result<Vec<(String, MetricValue)>, SourceError> {
    let caps = STATUS_RE
        .captures(text)
        .ok_or_else(|| SourceError::Malformed("no stub_status block".into()))?;
    Ok(FIELDS
        .iter()
        .map(|field| (field.to_string(), MetricValue::parse(&caps[*field])))
        .collect())
}

impl MetricSource for NginxStatus {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        self.client().map(|_| ())
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        let url = self.url.clone();
        let resp = http_get(self.client()?, &url)?;
        Ok(resp.text()?)
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        parse_stub_status(&raw)
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        if COUNTERS.contains(&field) {
            out.counter_delta(field, &value, ResetPolicy::Clamp);
        } else {
            out.gauge(field, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::RateTracker;
    use crate::record::MetricKind;

    const SAMPLE: &str = "Active connections: 291 \n\
server accepts handled requests\n 16630948 16630948 31070465 \n\
Reading: 6 Writing: 179 Waiting: 106 \n";

    #[test]
    fn test_parse_stub_status() {
        let parsed = parse_stub_status(SAMPLE).unwrap();
        assert_eq!(parsed.len(), 7);
        assert_eq!(parsed[0], ("active".to_string(), MetricValue::Int(291)));
        assert_eq!(parsed[3], ("requests".to_string(), MetricValue::Int(31_070_465)));
        assert_eq!(parsed[6], ("waiting".to_string(), MetricValue::Int(106)));
        assert!(parse_stub_status("<html>404</html>").is_err());
    }

    #[test]
    fn test_counters_are_rate_adjusted() {
        let section = SectionConfig::from_pairs(
            "input:nginx",
            [
                ("scheme", "http"),
                ("host", "127.0.0.1"),
                ("port", "8080"),
                ("uri", "/nginx_status"),
                ("server_name", "status.local"),
                ("prefix", "web.nginx."),
            ],
        );
        let mut source = NginxStatus::from_section(&section).unwrap();
        assert_eq!(source.url, "http://127.0.0.1:8080/nginx_status");

        let mut rates = RateTracker::new();
        let mut out = Emitter::new("web.nginx.", 1, &mut rates);
        source.extract("requests", MetricValue::Int(100), &mut out);
        source.extract("active", MetricValue::Int(3), &mut out);
        source.extract("requests", MetricValue::Int(90), &mut out);
        let records = out.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind(), &MetricKind::Gauge);
        // A restart is clamped to zero.
        assert_eq!(records[1].value(), &MetricValue::Int(0));
    }
}
