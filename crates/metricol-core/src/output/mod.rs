//! Output workers: drain the sample queue, format, deliver.
//!
//! Each tick pops every queued record without blocking, formats them into
//! wire lines and hands the batch to a [`Transport`]. A failed delivery is
//! logged and the batch is dropped; nothing is re-queued.

pub mod http;
pub mod socket;
pub mod statsd;

use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::config::SectionConfig;
use crate::error::{ConfigError, DeliveryError, SourceError};
use crate::input::PluginInfo;
use crate::queue::SampleQueue;
use crate::record::{MetricKind, MetricRecord};
use crate::worker::Worker;

pub use http::HttpTransport;
pub use socket::TcpTransport;
pub use statsd::UdpTransport;

/// Default request/connect timeout for network sinks.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How records are rendered on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFormat {
    /// `<prefix><gauges|counts|timers>.<key> <value> <timestamp>`
    Graphite { prefix: String },
    /// `<key>:<value>|<g|c|ms>`
    Statsd,
}

impl WireFormat {
    /// Render one record. Kinds the format has no category for are logged
    /// and yield `None`.
    pub fn format(&self, record: &MetricRecord) -> Option<String> {
        match self {
            Self::Graphite { prefix } => {
                let category = match record.kind() {
                    MetricKind::Gauge => "gauges",
                    MetricKind::Counter => "counts",
                    MetricKind::Timer => "timers",
                    MetricKind::Other(code) => {
                        log::warn!("unknown metric type: {code} @ {}", record.key());
                        return None;
                    }
                };
                Some(format!(
                    "{prefix}{category}.{} {} {}",
                    record.key(),
                    record.value(),
                    record.timestamp()
                ))
            }
            Self::Statsd => match record.kind() {
                MetricKind::Other(code) => {
                    log::warn!("unknown metric type: {code} @ {}", record.key());
                    None
                }
                kind => Some(format!("{}:{}|{}", record.key(), record.value(), kind.code())),
            },
        }
    }
}

/// An encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
    pub gzipped: bool,
}

impl Payload {
    /// Join `lines` with `\n` (plus a final `\n` when asked) and gzip the
    /// result when `gzip_level > 0`.
    pub fn encode(lines: &[String], gzip_level: u32, trailing_newline: bool) -> std::io::Result<Self> {
        let mut text = lines.join("\n");
        if trailing_newline {
            text.push('\n');
        }
        if gzip_level == 0 {
            return Ok(Self {
                body: text.into_bytes(),
                gzipped: false,
            });
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(gzip_level.min(9)));
        encoder.write_all(text.as_bytes())?;
        Ok(Self {
            body: encoder.finish()?,
            gzipped: true,
        })
    }
}

/// Delivery of one formatted batch to a remote collector.
pub trait Transport: Send + 'static {
    /// Acquire long-lived resources (HTTP client, socket). Failure is
    /// retried lazily by `deliver`.
    fn prepare(&mut self) -> Result<(), DeliveryError> {
        Ok(())
    }

    fn deliver(&mut self, lines: &[String]) -> Result<(), DeliveryError>;
}

/// Sink worker pairing a wire format with a transport.
pub struct OutputWorker<T: Transport> {
    name: String,
    period: Duration,
    format: WireFormat,
    transport: T,
    queue: SampleQueue,
}

impl<T: Transport> OutputWorker<T> {
    pub fn new(
        section: &SectionConfig,
        queue: SampleQueue,
        format: WireFormat,
        transport: T,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: section.name().to_string(),
            period: section.period()?,
            format,
            transport,
            queue,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Drain and format everything queued right now, preserving order.
    pub fn drain_lines(&self) -> Vec<String> {
        self.queue
            .drain()
            .iter()
            .filter_map(|record| self.format.format(record))
            .collect()
    }

    /// One flush. Returns the number of lines delivered.
    pub fn flush(&mut self) -> Result<usize, DeliveryError> {
        let lines = self.drain_lines();
        if lines.is_empty() {
            return Ok(0);
        }
        self.transport.deliver(&lines)?;
        Ok(lines.len())
    }
}

impl<T: Transport> Worker for OutputWorker<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn setup(&mut self) -> Result<(), SourceError> {
        self.transport
            .prepare()
            .map_err(|e| SourceError::NotReady(e.to_string()))
    }

    fn tick(&mut self) {
        match self.flush() {
            Ok(0) => {}
            Ok(n) => log::debug!("[{}] delivered {n} line(s)", self.name),
            Err(e) => log::warn!("[{}] batch dropped: {e}", self.name),
        }
    }
}

/// `prefix` for graphite-style sinks, empty when absent.
pub(crate) fn graphite_format(section: &SectionConfig) -> WireFormat {
    WireFormat::Graphite {
        prefix: section.get("prefix").unwrap_or_default().to_string(),
    }
}

pub static GRAPHITE_GW_INFO: PluginInfo = PluginInfo {
    name: "graphite_gw",
    description: "HTTP POST of graphite lines, optionally gzipped, with optional mutual TLS",
    required: &["scheme", "host", "port", "uri", "hostname", "prefix"],
};

pub static GRAPHITE_INFO: PluginInfo = PluginInfo {
    name: "graphite",
    description: "Graphite plaintext protocol over TCP",
    required: &["host", "port", "prefix"],
};

pub static STATSITE_INFO: PluginInfo = PluginInfo {
    name: "statsite",
    description: "statsd lines over UDP",
    required: &["host", "port"],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetricValue;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recording {
        batches: Arc<Mutex<Vec<Vec<String>>>>,
        fail: bool,
    }

    impl Transport for Recording {
        fn deliver(&mut self, lines: &[String]) -> Result<(), DeliveryError> {
            self.batches.lock().unwrap().push(lines.to_vec());
            if self.fail {
                return Err(DeliveryError::Status(503));
            }
            Ok(())
        }
    }

    fn graphite(prefix: &str) -> WireFormat {
        WireFormat::Graphite {
            prefix: prefix.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Formatting
    // -----------------------------------------------------------------------

    #[test]
    fn test_graphite_lines() {
        let fmt = graphite("");
        let gauge = MetricRecord::gauge("host.mem.free", 1024, 1_700_000_000);
        assert_eq!(
            fmt.format(&gauge).as_deref(),
            Some("gauges.host.mem.free 1024 1700000000")
        );
        let counter = MetricRecord::counter("web.requests", 7, 1_700_000_000);
        assert_eq!(
            graphite("env.").format(&counter).as_deref(),
            Some("env.counts.web.requests 7 1700000000")
        );
        let timer = MetricRecord::timer("web.rtime", 0.25, 5);
        assert_eq!(fmt.format(&timer).as_deref(), Some("timers.web.rtime 0.25 5"));
    }

    #[test]
    fn test_unknown_kind_is_dropped() {
        let odd = MetricRecord::new("x", 1, MetricKind::from_code("h"), 0);
        assert_eq!(graphite("").format(&odd), None);
        assert_eq!(WireFormat::Statsd.format(&odd), None);
    }

    #[test]
    fn test_statsd_lines() {
        let r = MetricRecord::counter("web.requests", 7, 0);
        assert_eq!(WireFormat::Statsd.format(&r).as_deref(), Some("web.requests:7|c"));
        let r = MetricRecord::timer("web.rtime", 12, 0);
        assert_eq!(WireFormat::Statsd.format(&r).as_deref(), Some("web.rtime:12|ms"));
    }

    // -----------------------------------------------------------------------
    // Payload
    // -----------------------------------------------------------------------

    #[test]
    fn test_payload_plain_and_gzip() {
        let lines = vec!["a 1 1".to_string(), "b 2 2".to_string()];
        let plain = Payload::encode(&lines, 0, false).unwrap();
        assert_eq!(plain.body, b"a 1 1\nb 2 2");
        assert!(!plain.gzipped);

        let tcp = Payload::encode(&lines, 0, true).unwrap();
        assert_eq!(tcp.body, b"a 1 1\nb 2 2\n");

        let gz = Payload::encode(&lines, 6, false).unwrap();
        assert!(gz.gzipped);
        let mut decoded = String::new();
        GzDecoder::new(&gz.body[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "a 1 1\nb 2 2");
    }

    // -----------------------------------------------------------------------
    // OutputWorker
    // -----------------------------------------------------------------------

    #[test]
    fn test_tick_drains_in_order_and_skips_empty() {
        let queue = SampleQueue::new();
        let transport = Recording::default();
        let batches = Arc::clone(&transport.batches);
        let section = SectionConfig::from_pairs("output:test", [("period", "1")]);
        let mut worker = OutputWorker::new(&section, queue.clone(), graphite("p."), transport).unwrap();

        worker.tick();
        assert!(batches.lock().unwrap().is_empty());

        queue.push(MetricRecord::gauge("a", 1, 10));
        queue.push(MetricRecord::new("skip", 1, MetricKind::from_code("h"), 10));
        queue.push(MetricRecord::counter("b", MetricValue::Int(2), 10));
        worker.tick();
        assert!(queue.is_empty());
        assert_eq!(
            batches.lock().unwrap()[0],
            vec!["p.gauges.a 1 10", "p.counts.b 2 10"]
        );
    }

    #[test]
    fn test_failed_delivery_drops_batch() {
        let queue = SampleQueue::new();
        let transport = Recording {
            fail: true,
            ..Recording::default()
        };
        let section = SectionConfig::from_pairs("output:test", []);
        let mut worker = OutputWorker::new(&section, queue.clone(), graphite(""), transport).unwrap();

        queue.push(MetricRecord::gauge("a", 1, 10));
        assert!(matches!(worker.flush(), Err(DeliveryError::Status(503))));
        assert!(queue.is_empty());
        assert_eq!(worker.flush().unwrap(), 0);
    }
}
