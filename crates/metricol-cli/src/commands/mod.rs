pub mod check;
pub mod run;

use std::path::Path;

use metricol_core::Config;

/// Filter used when neither the CLI, the config nor `RUST_LOG` sets one.
const DEFAULT_FILTER: &str = "info";

/// Map a level name to an `env_logger` filter. Accepts the classic
/// syslog-ish spellings (`WARNING`, `CRITICAL`, `NOTSET`) case-insensitively;
/// anything else is passed through as a filter directive.
pub fn parse_log_level(name: &str) -> String {
    let name = name.trim();
    match name.to_ascii_uppercase().as_str() {
        "NOTSET" | "TRACE" => "trace".to_string(),
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" | "FATAL" => "error".to_string(),
        "OFF" => "off".to_string(),
        _ => name.to_string(),
    }
}

/// Resolve the effective filter: CLI flag, then config `log_level`, then
/// `RUST_LOG`, then `info`.
pub fn log_filter(cli_level: Option<&str>, config_level: Option<&str>) -> String {
    let set = |l: &&str| !l.trim().is_empty();
    cli_level
        .filter(set)
        .or(config_level.filter(set))
        .map(parse_log_level)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init_logging(cli_level: Option<&str>, config_level: Option<&str>) {
    let filter = log_filter(cli_level, config_level);
    env_logger::Builder::new()
        .parse_filters(&filter)
        .format_timestamp_secs()
        .init();
}

/// Load and validate the configuration, exiting with status 1 on failure.
pub fn load_config(path: &Path) -> Config {
    let config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {}: {e}", path.display());
        std::process::exit(1);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level_names() {
        assert_eq!(parse_log_level("DEBUG"), "debug");
        assert_eq!(parse_log_level("warning"), "warn");
        assert_eq!(parse_log_level("Warn"), "warn");
        assert_eq!(parse_log_level("CRITICAL"), "error");
        assert_eq!(parse_log_level("NOTSET"), "trace");
        assert_eq!(parse_log_level(" info "), "info");
        assert_eq!(parse_log_level("metricol_core=debug"), "metricol_core=debug");
    }

    #[test]
    fn test_log_filter_precedence() {
        assert_eq!(log_filter(Some("ERROR"), Some("DEBUG")), "error");
        assert_eq!(log_filter(None, Some("DEBUG")), "debug");
        assert_eq!(log_filter(Some(""), Some("WARNING")), "warn");
    }
}
