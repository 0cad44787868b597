//! redis `INFO` over a unix socket.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::SectionConfig;
use crate::error::{ConfigError, SourceError};
use crate::rate::ResetPolicy;
use crate::record::MetricValue;

use super::{DEFAULT_TIMEOUT, Emitter, MetricSource, PluginInfo};

static KEYSPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^db[0-9]+$").expect("invalid keyspace regex"));

const KEYSPACE_FIELDS: &[&str] = &["keys", "expires", "avg_ttl"];

/// INFO field → category used in the metric key.
const METRICS_MAP: &[(&str, &str)] = &[
    ("connected_clients", "clients"),
    ("client_longest_output_list", "clients"),
    ("client_biggest_input_buf", "clients"),
    ("blocked_clients", "clients"),
    ("used_memory", "memory"),
    ("used_memory_rss", "memory"),
    ("used_memory_peak", "memory"),
    ("used_memory_lua", "memory"),
    ("mem_fragmentation_ratio", "memory"),
    ("loading", "persistence"),
    ("rdb_changes_since_last_save", "persistence"),
    ("rdb_bgsave_in_progress", "persistence"),
    ("aof_rewrite_in_progress", "persistence"),
    ("aof_rewrite_scheduled", "persistence"),
    ("aof_current_size", "persistence"),
    ("aof_base_size", "persistence"),
    ("aof_pending_rewrite", "persistence"),
    ("aof_buffer_length", "persistence"),
    ("aof_rewrite_buffer_length", "persistence"),
    ("aof_pending_bio_fsync", "persistence"),
    ("aof_delayed_fsync", "persistence"),
    ("total_connections_received", "stats"),
    ("total_commands_processed", "stats"),
    ("instantaneous_ops_per_sec", "stats"),
    ("rejected_connections", "stats"),
    ("sync_full", "stats"),
    ("sync_partial_ok", "stats"),
    ("sync_partial_err", "stats"),
    ("expired_keys", "stats"),
    ("evicted_keys", "stats"),
    ("keyspace_hits", "stats"),
    ("keyspace_misses", "stats"),
    ("pubsub_channels", "stats"),
    ("pubsub_patterns", "stats"),
    ("latest_fork_usec", "stats"),
    ("connected_slaves", "replication"),
    ("master_repl_offset", "replication"),
    ("repl_backlog_active", "replication"),
    ("repl_backlog_size", "replication"),
    ("repl_backlog_first_byte_offset", "replication"),
    ("repl_backlog_histlen", "replication"),
    ("used_cpu_sys", "cpu"),
    ("used_cpu_user", "cpu"),
    ("used_cpu_sys_children", "cpu"),
    ("used_cpu_user_children", "cpu"),
];

const COUNTERS: &[&str] = &[
    "evicted_keys",
    "expired_keys",
    "keyspace_hits",
    "keyspace_misses",
    "rejected_connections",
    "total_commands_processed",
    "total_connections_received",
];

pub static INFO: PluginInfo = PluginInfo {
    name: "redis_info",
    description: "Server gauges, keyspace sizes and command counters from redis INFO",
    required: &["socket", "prefix"],
};

pub struct RedisInfo {
    socket: String,
    timeout: Duration,
    conn: Option<redis::Connection>,
}

impl RedisInfo {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(INFO.required)?;
        Ok(Self {
            socket: section.require("socket")?.to_string(),
            timeout: section.timeout(DEFAULT_TIMEOUT)?,
            conn: None,
        })
    }
}

#[cfg(unix)]
fn connect(path: &str, timeout: Duration) -> Result<redis::Connection, SourceError> {
    let info = redis::ConnectionInfo {
        addr: redis::ConnectionAddr::Unix(path.into()),
        redis: redis::RedisConnectionInfo::default(),
    };
    let conn = redis::Client::open(info)?.get_connection_with_timeout(timeout)?;
    conn.set_read_timeout(Some(timeout))?;
    conn.set_write_timeout(Some(timeout))?;
    Ok(conn)
}

#[cfg(not(unix))]
fn connect(_path: &str, _timeout: Duration) -> Result<redis::Connection, SourceError> {
    Err(SourceError::NotReady("unix sockets are not supported".into()))
}

fn query_info(conn: &mut redis::Connection) -> Result<String, SourceError> {
    Ok(redis::cmd("INFO").query(conn)?)
}

/// Parse INFO text into `category.field` and `keyspace.dbN.field` samples.
pub fn parse_info(text: &str) -> Vec<(String, MetricValue)> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if KEYSPACE_RE.is_match(key) {
            for pair in value.split(',') {
                let Some((sub, v)) = pair.split_once('=') else {
                    continue;
                };
                if KEYSPACE_FIELDS.contains(&sub) {
                    out.push((format!("keyspace.{key}.{sub}"), MetricValue::parse(v)));
                }
            }
            continue;
        }

        let Some((_, category)) = METRICS_MAP.iter().find(|(k, _)| *k == key) else {
            continue;
        };
        let value = MetricValue::parse(value);
        if value.is_numeric() {
            out.push((format!("{category}.{key}"), value));
        }
    }
    out
}

impl MetricSource for RedisInfo {
    type Raw = String;

    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn fetch(&mut self) -> Result<String, SourceError> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => connect(&self.socket, self.timeout)?,
        };
        let text = query_info(&mut conn)?;
        // A failed query drops the connection; the next tick reconnects.
        self.conn = Some(conn);
        Ok(text)
    }

    fn parse(&self, raw: String) -> Result<Vec<(String, MetricValue)>, SourceError> {
        Ok(parse_info(&raw))
    }

    fn extract(&mut self, field: &str, value: MetricValue, out: &mut Emitter<'_>) {
        let name = field.rsplit('.').next().unwrap_or(field);
        if !field.starts_with("keyspace.") && COUNTERS.contains(&name) {
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

    const SAMPLE: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
# Clients\r\n\
connected_clients:12\r\n\
# Memory\r\n\
used_memory:1048576\r\n\
mem_fragmentation_ratio:1.25\r\n\
# Stats\r\n\
keyspace_hits:900\r\n\
# Keyspace\r\n\
db0:keys=42,expires=3,avg_ttl=1000\r\n";

    #[test]
    fn test_parse_info() {
        let parsed = parse_info(SAMPLE);
        assert_eq!(
            parsed,
            vec![
                ("clients.connected_clients".to_string(), MetricValue::Int(12)),
                ("memory.used_memory".to_string(), MetricValue::Int(1_048_576)),
                ("memory.mem_fragmentation_ratio".to_string(), MetricValue::Float(1.25)),
                ("stats.keyspace_hits".to_string(), MetricValue::Int(900)),
                ("keyspace.db0.keys".to_string(), MetricValue::Int(42)),
                ("keyspace.db0.expires".to_string(), MetricValue::Int(3)),
                ("keyspace.db0.avg_ttl".to_string(), MetricValue::Int(1000)),
            ]
        );
    }

    #[test]
    fn test_extract_counters_and_gauges() {
        let section = SectionConfig::from_pairs("input:redis", [("socket", "/tmp/r.sock"), ("prefix", "r.")]);
        let mut source = RedisInfo::from_section(&section).unwrap();
        let mut rates = RateTracker::new();
        let mut out = Emitter::new("r.", 1, &mut rates);
        source.extract("stats.keyspace_hits", MetricValue::Int(900), &mut out);
        source.extract("stats.keyspace_hits", MetricValue::Int(950), &mut out);
        source.extract("keyspace.db0.keys", MetricValue::Int(42), &mut out);
        let records = out.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key(), "r.stats.keyspace_hits");
        assert_eq!(records[0].kind(), &MetricKind::Counter);
        assert_eq!(records[0].value(), &MetricValue::Int(50));
        assert_eq!(records[1].kind(), &MetricKind::Gauge);
    }

    /// Read one RESP command array, `None` once the client hangs up.
    #[cfg(unix)]
    fn read_command(reader: &mut impl std::io::BufRead) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        let argc: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            line.clear();
            reader.read_line(&mut line).ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut arg = vec![0u8; len + 2];
            reader.read_exact(&mut arg).ok()?;
            args.push(String::from_utf8_lossy(&arg[..len]).into_owned());
        }
        Some(args)
    }

    /// Serve a fake redis on a unix socket. `INFO` gets `reply`, any
    /// connection setup command gets `+OK`.
    #[cfg(unix)]
    fn serve_info(path: &std::path::Path, reply: &'static str) -> std::thread::JoinHandle<Vec<String>> {
        use std::io::{BufReader, Write};
        use std::os::unix::net::UnixListener;

        let listener = UnixListener::bind(path).unwrap();
        std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(conn.try_clone().unwrap());
            let mut writer = conn;
            let mut seen = Vec::new();
            while let Some(args) = read_command(&mut reader) {
                let name = args.first().cloned().unwrap_or_default().to_ascii_uppercase();
                seen.push(name.clone());
                if name == "INFO" {
                    writer.write_all(reply.as_bytes()).unwrap();
                    break;
                }
                writer.write_all(b"+OK\r\n").unwrap();
            }
            seen
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_fetch_over_unix_socket() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("redis.sock");
        let server = serve_info(&path, "$21\r\nconnected_clients:2\r\n\r\n");

        let socket = path.to_str().unwrap();
        let section = SectionConfig::from_pairs("input:redis", [("socket", socket), ("prefix", "r.")]);
        let mut source = RedisInfo::from_section(&section).unwrap();
        let raw = source.fetch().unwrap();
        assert!(server.join().unwrap().contains(&"INFO".to_string()));
        assert_eq!(source.parse(raw).unwrap()[0].1, MetricValue::Int(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_server_error_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("redis.sock");
        let server = serve_info(&path, "-NOAUTH Authentication required.\r\n");

        let socket = path.to_str().unwrap();
        let section = SectionConfig::from_pairs("input:redis", [("socket", socket), ("prefix", "r.")]);
        let mut source = RedisInfo::from_section(&section).unwrap();
        assert!(matches!(source.fetch(), Err(SourceError::Redis(_))));
        server.join().unwrap();
        assert!(source.conn.is_none());
    }

    #[test]
    fn test_missing_socket_is_a_fetch_error() {
        let section = SectionConfig::from_pairs(
            "input:redis",
            [("socket", "/nonexistent/redis.sock"), ("prefix", "r."), ("timeout", "0.5")],
        );
        let mut source = RedisInfo::from_section(&section).unwrap();
        assert!(source.fetch().is_err());
    }
}
