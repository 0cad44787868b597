//! HTTP(S) gateway transport.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_ENCODING, HOST, HeaderMap, HeaderValue};
use reqwest::{Certificate, Identity, StatusCode};

use crate::config::SectionConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::helpers::build_url;

use super::{DEFAULT_TIMEOUT, GRAPHITE_GW_INFO, Payload, Transport};

/// POSTs each batch to `scheme://host:port/uri`.
#[derive(Debug)]
pub struct HttpTransport {
    url: String,
    hostname: String,
    gzip_level: u32,
    cafile: Option<PathBuf>,
    client_cert: Option<(PathBuf, PathBuf)>,
    timeout: Duration,
    client: Option<Client>,
}

impl HttpTransport {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(GRAPHITE_GW_INFO.required)?;

        let gzip_level: u32 = section.parse_value("gzip_level", 0)?;
        if gzip_level > 9 {
            return Err(section.invalid("gzip_level", "must be between 0 and 9".to_string()));
        }

        let path = |key: &str| section.get(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let client_cert = match (path("cli_certfile"), path("cli_keyfile")) {
            (Some(cert), Some(key)) => Some((cert, key)),
            (None, None) => None,
            _ => {
                return Err(section.invalid(
                    "cli_certfile",
                    "cli_certfile and cli_keyfile must be set together".to_string(),
                ));
            }
        };

        Ok(Self {
            url: build_url(
                section.require("scheme")?,
                section.require("host")?,
                section.require("port")?,
                section.require("uri")?,
            ),
            hostname: section.require("hostname")?.to_string(),
            gzip_level,
            cafile: path("cafile"),
            client_cert,
            timeout: section.timeout(DEFAULT_TIMEOUT)?,
            client: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_client(&self) -> Result<Client, DeliveryError> {
        let mut headers = HeaderMap::new();
        let host = HeaderValue::from_str(&self.hostname)
            .map_err(|e| DeliveryError::NotReady(format!("bad hostname {:?}: {e}", self.hostname)))?;
        headers.insert(HOST, host);
        if self.gzip_level > 0 {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        }

        let mut builder = Client::builder().timeout(self.timeout).default_headers(headers);
        if let Some(cafile) = &self.cafile {
            let pem = std::fs::read(cafile)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }
        if let Some((cert, key)) = &self.client_cert {
            let mut pem = std::fs::read(cert)?;
            pem.push(b'\n');
            pem.extend(std::fs::read(key)?);
            builder = builder.identity(Identity::from_pem(&pem)?);
        }
        Ok(builder.build()?)
    }

    fn client(&mut self) -> Result<&Client, DeliveryError> {
        if self.client.is_none() {
            self.client = Some(self.build_client()?);
        }
        self.client
            .as_ref()
            .ok_or_else(|| DeliveryError::NotReady("http client".into()))
    }
}

impl Transport for HttpTransport {
    fn prepare(&mut self) -> Result<(), DeliveryError> {
        self.client().map(|_| ())
    }

    fn deliver(&mut self, lines: &[String]) -> Result<(), DeliveryError> {
        let payload = Payload::encode(lines, self.gzip_level, false)?;
        let url = self.url.clone();
        let resp = self.client()?.post(&url).body(payload.body).send()?;
        if resp.status() != StatusCode::OK {
            return Err(DeliveryError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}
