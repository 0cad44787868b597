//! `metricol check` — validate a configuration without starting anything.

use std::path::Path;

use metricol_core::{Config, SampleQueue, registry};

/// One line per worker section: `ok`, `disabled`, or the error.
pub fn section_report(config: &Config) -> Vec<(String, Result<&'static str, String>)> {
    let queue = SampleQueue::new();
    config
        .worker_sections()
        .iter()
        .map(|section| {
            let outcome = match registry::is_enabled(section) {
                Ok(false) => Ok("disabled"),
                Ok(true) => registry::build_worker(section, &queue)
                    .map(|_| "ok")
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            (section.name().to_string(), outcome)
        })
        .collect()
}

/// Run the check command.
pub fn run(config_path: &Path, log_level: Option<&str>) {
    let config = super::load_config(config_path);
    super::init_logging(log_level, config.default_value("log_level"));

    let report = section_report(&config);
    let width = report.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut failed = 0;
    for (name, outcome) in &report {
        match outcome {
            Ok(status) => println!("  {name:<width$}  {status}"),
            Err(e) => {
                failed += 1;
                println!("  {name:<width$}  ERROR: {e}");
            }
        }
    }
    println!();
    println!("{} section(s), {failed} failed", report.len());
    if failed > 0 {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_report() {
        let config = Config::parse(
            "[DEFAULT]\nprefix = h.\n\n\
             [input:mem]\nplugin = meminfo\n\n\
             [input:off]\nplugin = meminfo\nenabled = false\n\n\
             [input:bad]\nplugin = load_info\nperiod = soon\n\n\
             [output:g]\nplugin = graphite\nhost = localhost\nport = 2003\n",
        )
        .unwrap();
        let report = section_report(&config);
        assert_eq!(report.len(), 4);
        assert_eq!(report[0], ("input:mem".to_string(), Ok("ok")));
        assert_eq!(report[1], ("input:off".to_string(), Ok("disabled")));
        assert!(report[2].1.is_err());
        assert_eq!(report[3].1, Ok("ok"));
    }
}
