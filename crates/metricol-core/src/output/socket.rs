//! Graphite plaintext transport over TCP.
//!
//! Every flush opens a fresh connection; a failed connect or write is
//! retried from scratch up to `attempts` times, then the batch is dropped.

use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::SectionConfig;
use crate::error::{ConfigError, DeliveryError};

use super::{DEFAULT_TIMEOUT, GRAPHITE_INFO, Payload, Transport};

const DEFAULT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    attempts: u32,
    timeout: Duration,
}

impl TcpTransport {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(GRAPHITE_INFO.required)?;
        let port: u16 = section
            .require("port")?
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| section.invalid("port", e.to_string()))?;
        let attempts: u32 = section.parse_value("attempts", DEFAULT_ATTEMPTS)?;
        if attempts == 0 {
            return Err(section.invalid("attempts", "must be at least 1".to_string()));
        }
        Ok(Self {
            addr: format!("{}:{port}", section.require("host")?.trim()),
            attempts,
            timeout: section.timeout(DEFAULT_TIMEOUT)?,
        })
    }

    fn resolve(&self) -> Result<SocketAddr, DeliveryError> {
        self.addr.to_socket_addrs()?.next().ok_or_else(|| {
            DeliveryError::NotReady(format!("{} resolved to no address", self.addr))
        })
    }

    fn send_once(&self, body: &[u8]) -> Result<(), DeliveryError> {
        let addr = self.resolve()?;
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.write_all(body)?;
        stream.flush()?;
        Ok(())
    }
}

impl Transport for TcpTransport {
    fn deliver(&mut self, lines: &[String]) -> Result<(), DeliveryError> {
        let payload = Payload::encode(lines, 0, true)?;
        for attempt in 1..=self.attempts {
            match self.send_once(&payload.body) {
                Ok(()) => return Ok(()),
                Err(e) => log::warn!(
                    "{}: attempt {attempt}/{} failed: {e}",
                    self.addr,
                    self.attempts
                ),
            }
        }
        Err(DeliveryError::Exhausted(self.attempts))
    }
}
