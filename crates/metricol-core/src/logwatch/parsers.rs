//! Line patterns and per-format normalization of matched fields.

use regex::Regex;

use crate::record::MetricValue;
use crate::timefmt::decode_time;

/// How the configured pattern is applied to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMethod {
    /// Anchored at the start of the line.
    #[default]
    Match,
    /// Anywhere in the line.
    Search,
}

impl std::str::FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "match" => Ok(Self::Match),
            "search" => Ok(Self::Search),
            other => Err(format!("expected \"match\" or \"search\", got {other:?}")),
        }
    }
}

/// Compiled line pattern with named capture groups.
#[derive(Debug, Clone)]
pub struct LinePattern {
    regex: Regex,
}

impl LinePattern {
    /// Python-style `(?P<name>...)` groups are accepted as-is.
    pub fn new(pattern: &str, method: MatchMethod) -> Result<Self, regex::Error> {
        let source = match method {
            MatchMethod::Match => format!("^(?:{pattern})"),
            MatchMethod::Search => pattern.to_string(),
        };
        Ok(Self {
            regex: Regex::new(&source)?,
        })
    }

    /// Named groups that took part in the match, in pattern order.
    pub fn captures(&self, line: &str) -> Option<Vec<(String, String)>> {
        let caps = self.regex.captures(line)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// A parsed log line: event time (if the pattern captures one) and the
/// normalized fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub time: Option<i64>,
    pub fields: Vec<(String, MetricValue)>,
}

impl LogEvent {
    pub fn get(&self, field: &str) -> Option<&MetricValue> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }
}

/// Format-specific normalization of captured groups.
pub trait LineParser: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    /// Turn captured groups into an event, or `None` to drop the line.
    fn normalize(&self, groups: Vec<(String, String)>) -> Option<LogEvent>;

    /// Match and normalize one line.
    fn parse_line(&self, pattern: &LinePattern, line: &str) -> Option<LogEvent> {
        let groups = pattern.captures(line)?;
        let event = self.normalize(groups);
        log::trace!("{}: {line:?} -> {event:?}", self.name());
        event
    }
}

/// Decode the `time` group. `Err(())` means the line must be dropped.
fn take_time(groups: &mut Vec<(String, String)>) -> Result<Option<i64>, ()> {
    let Some(pos) = groups.iter().position(|(k, _)| k == "time") else {
        return Ok(None);
    };
    let (_, raw) = groups.remove(pos);
    decode_time(&raw).map(Some).ok_or(())
}

// ---------------------------------------------------------------------------
// nginx access log
// ---------------------------------------------------------------------------

const INT_FIELDS: &[&str] = &["rbytes", "bbytes", "creqs"];
const FLOAT_FIELDS: &[&str] = &["rtime", "uctim", "uhtim", "urtim", "gzip"];
const OTHER_URI: &str = "_other";

/// nginx access-log fields: `method`, `uri`, `http`, sizes and timings.
pub struct NginxLineParser;

/// Reduce a request URI to its first path segment, or `_other`.
pub fn clean_uri(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or_default();
    let clean = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if clean {
        segment.to_string()
    } else {
        OTHER_URI.to_string()
    }
}

impl LineParser for NginxLineParser {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn normalize(&self, mut groups: Vec<(String, String)>) -> Option<LogEvent> {
        let time = take_time(&mut groups).ok()?;
        let mut fields = Vec::with_capacity(groups.len());
        for (name, raw) in groups {
            match name.as_str() {
                "method" => fields.push((format!("method.{raw}"), MetricValue::Int(1))),
                "uri" => fields.push((name, MetricValue::Text(clean_uri(&raw)))),
                "http" => fields.push((format!("http.{}", raw.replace('.', "_")), MetricValue::Int(1))),
                "pipe" => {
                    if raw == "p" {
                        fields.push((name, MetricValue::Text(raw)));
                    }
                }
                n if INT_FIELDS.contains(&n) => {
                    let v = raw.trim().parse::<i64>().ok()?;
                    fields.push((name, MetricValue::Int(v)));
                }
                n if FLOAT_FIELDS.contains(&n) => {
                    if raw == "-" {
                        continue;
                    }
                    let v = raw.trim().parse::<f64>().ok()?;
                    fields.push((name, MetricValue::Float(v)));
                }
                _ => fields.push((name, MetricValue::parse(&raw))),
            }
        }
        Some(LogEvent { time, fields })
    }
}

// ---------------------------------------------------------------------------
// auth.log
// ---------------------------------------------------------------------------

/// sshd/PAM auth-log fields: `user`, `action` or `method`.
pub struct AuthLineParser;

impl LineParser for AuthLineParser {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn normalize(&self, mut groups: Vec<(String, String)>) -> Option<LogEvent> {
        let time = take_time(&mut groups).ok()?;
        let fields = groups
            .into_iter()
            .map(|(name, raw)| {
                let value = if name == "user" {
                    MetricValue::Text(raw.replace('.', "_"))
                } else {
                    MetricValue::Text(raw)
                };
                (name, value)
            })
            .collect();
        Some(LogEvent { time, fields })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

static NGINX: NginxLineParser = NginxLineParser;
static AUTH: AuthLineParser = AuthLineParser;

/// Parser names accepted by the `parser` key.
pub const LINE_PARSERS: &[&str] = &["nginx", "auth"];

/// Resolve a parser by name. Dotted module paths ending in
/// `nginx_logs.parse_log_lines` / `auth_log.parse_log_lines` are accepted
/// for older configurations.
pub fn line_parser(name: &str) -> Option<&'static dyn LineParser> {
    let name = name.trim();
    let short = match name.rsplit_once('.') {
        Some((module, "parse_log_lines")) => module.rsplit('.').next().unwrap_or(module),
        _ => name,
    };
    match short {
        "nginx" | "nginx_logs" => Some(&NGINX),
        "auth" | "auth_log" => Some(&AUTH),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NGINX_PATTERN: &str = r#"(?P<ip>\S+) - \S+ \[(?P<time>[^\]]+)\] "(?P<method>[A-Z]+) (?P<uri>\S+) HTTP/(?P<http>[0-9.]+)" (?P<status>[0-9]+) (?P<bbytes>[0-9]+) (?P<rtime>\S+)"#;

    fn nginx_pattern() -> LinePattern {
        LinePattern::new(NGINX_PATTERN, MatchMethod::Match).unwrap()
    }

    // -----------------------------------------------------------------------
    // Patterns
    // -----------------------------------------------------------------------

    #[test]
    fn test_match_is_anchored_search_is_not() {
        let anchored = LinePattern::new(r"(?P<n>[0-9]+)", MatchMethod::Match).unwrap();
        assert!(anchored.captures("abc 123").is_none());
        let search = LinePattern::new(r"(?P<n>[0-9]+)", MatchMethod::Search).unwrap();
        assert_eq!(
            search.captures("abc 123").unwrap(),
            vec![("n".to_string(), "123".to_string())]
        );
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("search".parse::<MatchMethod>().unwrap(), MatchMethod::Search);
        assert!("fullmatch".parse::<MatchMethod>().is_err());
    }

    #[test]
    fn test_non_participating_groups_are_absent() {
        let p = LinePattern::new(r"(?P<a>x)|(?P<b>y)", MatchMethod::Match).unwrap();
        assert_eq!(p.captures("y").unwrap(), vec![("b".to_string(), "y".to_string())]);
    }

    // -----------------------------------------------------------------------
    // nginx
    // -----------------------------------------------------------------------

    #[test]
    fn test_nginx_line() {
        let line = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "GET /api/v1/users?id=3 HTTP/1.1" 200 512 0.004"#;
        let event = NginxLineParser.parse_line(&nginx_pattern(), line).unwrap();
        assert_eq!(event.time, Some(1_696_946_136));
        assert_eq!(event.get("method.GET"), Some(&MetricValue::Int(1)));
        assert_eq!(event.get("uri"), Some(&MetricValue::Text("api".into())));
        assert_eq!(event.get("http.1_1"), Some(&MetricValue::Int(1)));
        assert_eq!(event.get("status"), Some(&MetricValue::Int(200)));
        assert_eq!(event.get("bbytes"), Some(&MetricValue::Int(512)));
        assert_eq!(event.get("rtime"), Some(&MetricValue::Float(0.004)));
    }

    #[test]
    fn test_nginx_placeholders_and_bad_lines() {
        let pattern = nginx_pattern();
        let dash = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 +0000] "POST / HTTP/2.0" 204 0 -"#;
        let event = NginxLineParser.parse_line(&pattern, dash).unwrap();
        assert!(event.get("rtime").is_none());
        assert_eq!(event.get("uri"), Some(&MetricValue::Text("_other".into())));

        let bad_time = r#"10.0.0.1 - - [yesterday] "GET / HTTP/1.1" 200 1 0.1"#;
        assert!(NginxLineParser.parse_line(&pattern, bad_time).is_none());
        assert!(NginxLineParser.parse_line(&pattern, "garbage").is_none());
    }

    #[test]
    fn test_clean_uri() {
        assert_eq!(clean_uri("/static/app.js"), "static");
        assert_eq!(clean_uri("/health-check"), "health-check");
        assert_eq!(clean_uri("/favicon.ico"), "_other");
        assert_eq!(clean_uri("/"), "_other");
        assert_eq!(clean_uri(""), "_other");
        assert_eq!(clean_uri("/?q=1"), "_other");
    }

    // -----------------------------------------------------------------------
    // auth + registry
    // -----------------------------------------------------------------------

    #[test]
    fn test_auth_line() {
        let pattern = LinePattern::new(
            r"(?P<time>\w{3}\s+\d+ \d\d:\d\d:\d\d) \S+ sshd\[\d+\]: pam_unix\(sshd:session\): session (?P<action>opened|closed) for user (?P<user>[\w.]+)",
            MatchMethod::Match,
        )
        .unwrap();
        let line = "Oct  8 10:00:00 host sshd[42]: pam_unix(sshd:session): session opened for user john.doe by (uid=0)";
        let event = AuthLineParser.parse_line(&pattern, line).unwrap();
        assert!(event.time.is_some());
        assert_eq!(event.get("user"), Some(&MetricValue::Text("john_doe".into())));
        assert_eq!(event.get("action"), Some(&MetricValue::Text("opened".into())));
    }

    #[test]
    fn test_line_parser_registry() {
        assert_eq!(line_parser("nginx").unwrap().name(), "nginx");
        assert_eq!(
            line_parser("metricol.inputs.plugins.nginx_logs.parse_log_lines").unwrap().name(),
            "nginx"
        );
        assert_eq!(
            line_parser("metricol.inputs.plugins.auth_log.parse_log_lines").unwrap().name(),
            "auth"
        );
        assert!(line_parser("os.system").is_none());
        assert!(line_parser("json").is_none());
    }
}
