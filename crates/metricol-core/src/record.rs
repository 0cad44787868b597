//! Normalized metric records exchanged between inputs and outputs.

use std::fmt;

/// Kind of a metric, deciding how outputs categorize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Instantaneous value, reported as-is.
    Gauge,
    /// Per-interval delta of a monotonically increasing total.
    Counter,
    /// Duration or latency sample.
    Timer,
    /// A kind code no output knows how to format.
    Other(String),
}

impl MetricKind {
    /// Short statsd-style code (`g`, `c`, `ms`).
    pub fn code(&self) -> &str {
        match self {
            Self::Gauge => "g",
            Self::Counter => "c",
            Self::Timer => "ms",
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "g" => Self::Gauge,
            "c" => Self::Counter,
            "ms" => Self::Timer,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauge => write!(f, "gauge"),
            Self::Counter => write!(f, "counter"),
            Self::Timer => write!(f, "timer"),
            Self::Other(code) => write!(f, "other({code})"),
        }
    }
}

/// Value carried by a metric record.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    /// Convert a JSON scalar. Objects, arrays, null and booleans yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Parse a textual sample: integer first, then float, else text.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(v) = raw.parse::<i64>() {
            Self::Int(v)
        } else if let Ok(v) = raw.parse::<f64>() {
            Self::Float(v)
        } else {
            Self::Text(raw.to_string())
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One normalized sample: `(key, value, kind, timestamp)`.
///
/// Immutable once created; consumed exactly once by an output worker.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    key: String,
    value: MetricValue,
    kind: MetricKind,
    timestamp: i64,
}

impl MetricRecord {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<MetricValue>,
        kind: MetricKind,
        timestamp: i64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind,
            timestamp,
        }
    }

    pub fn gauge(key: impl Into<String>, value: impl Into<MetricValue>, timestamp: i64) -> Self {
        Self::new(key, value, MetricKind::Gauge, timestamp)
    }

    pub fn counter(key: impl Into<String>, value: impl Into<MetricValue>, timestamp: i64) -> Self {
        Self::new(key, value, MetricKind::Counter, timestamp)
    }

    pub fn timer(key: impl Into<String>, value: impl Into<MetricValue>, timestamp: i64) -> Self {
        Self::new(key, value, MetricKind::Timer, timestamp)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    pub fn kind(&self) -> &MetricKind {
        &self.kind
    }

    /// Unix timestamp in seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Current unix time in whole seconds.
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
