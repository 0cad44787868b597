//! Shared helpers used by multiple input implementations.
//!
//! Keeps the subprocess and HTTP plumbing in one place so sources only
//! describe what to fetch and how to parse it.

use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HOST, HeaderMap, HeaderValue};

use crate::error::SourceError;

// ---------------------------------------------------------------------------
// Shared command utilities
// ---------------------------------------------------------------------------

/// Execute a prepared command and return its `Output` if it succeeds.
///
/// Non-empty stderr is logged at warning level even on success.
fn run_output(label: &str, command: &mut Command) -> Result<std::process::Output, SourceError> {
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SourceError::Command {
            command: label.to_string(),
            message: e.to_string(),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !output.status.success() {
        return Err(SourceError::Command {
            command: label.to_string(),
            message: format!("{}: {}", output.status, stderr),
        });
    }
    if !stderr.is_empty() {
        log::warn!("{label}: ERR: {stderr:?}");
    }
    Ok(output)
}

/// Run a subprocess and return its stdout as a `String`.
///
/// Fails if the command cannot be executed or exits with a non-zero status.
pub fn run_command(program: &str, args: &[&str]) -> Result<String, SourceError> {
    let output = run_output(program, Command::new(program).args(args))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Blocking client with a request timeout and an optional fixed `Host`
/// header (virtual-host status pages).
pub fn http_client(timeout: Duration, host_header: Option<&str>) -> Result<Client, SourceError> {
    let mut headers = HeaderMap::new();
    if let Some(host) = host_header.filter(|h| !h.is_empty()) {
        let value = HeaderValue::from_str(host)
            .map_err(|e| SourceError::Malformed(format!("bad Host header {host:?}: {e}")))?;
        headers.insert(HOST, value);
    }
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

/// GET `url`; any status other than 200 is an error.
pub fn http_get(client: &Client, url: &str) -> Result<reqwest::blocking::Response, SourceError> {
    let resp = client.get(url).send()?;
    if resp.status() != reqwest::StatusCode::OK {
        return Err(SourceError::Status(resp.status().as_u16()));
    }
    Ok(resp)
}

/// `scheme://host:port/uri` from the usual section keys.
pub fn build_url(scheme: &str, host: &str, port: &str, uri: &str) -> String {
    format!("{scheme}://{host}:{port}{uri}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        assert_eq!(
            build_url("http", "127.0.0.1", "8080", "/nginx_status"),
            "http://127.0.0.1:8080/nginx_status"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_captures_stdout() {
        let out = run_command("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_failure() {
        assert!(matches!(
            run_command("false", &[]),
            Err(SourceError::Command { .. })
        ));
        assert!(matches!(
            run_command("/nonexistent/metricol-cmd", &[]),
            Err(SourceError::Command { .. })
        ));
    }

    #[test]
    fn test_http_client_rejects_bad_host_header() {
        assert!(http_client(Duration::from_secs(1), Some("bad\nhost")).is_err());
        assert!(http_client(Duration::from_secs(1), Some("status.local")).is_ok());
    }
}
