//! statsd/statsite transport over UDP.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::SectionConfig;
use crate::error::{ConfigError, DeliveryError};

use super::{STATSITE_INFO, Transport};

/// Largest datagram sent; lines are packed up to this size.
pub const MAX_DATAGRAM: usize = 1024;

#[derive(Debug)]
pub struct UdpTransport {
    addr: String,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn from_section(section: &SectionConfig) -> Result<Self, ConfigError> {
        section.require_all(STATSITE_INFO.required)?;
        let port: u16 = section
            .require("port")?
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| section.invalid("port", e.to_string()))?;
        Ok(Self {
            addr: format!("{}:{port}", section.require("host")?.trim()),
            socket: None,
        })
    }

    fn socket(&mut self) -> Result<&UdpSocket, DeliveryError> {
        if self.socket.is_none() {
            let target: SocketAddr = self.addr.to_socket_addrs()?.next().ok_or_else(|| {
                DeliveryError::NotReady(format!("{} resolved to no address", self.addr))
            })?;
            let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local)?;
            socket.connect(target)?;
            self.socket = Some(socket);
        }
        self.socket
            .as_ref()
            .ok_or_else(|| DeliveryError::NotReady("udp socket".into()))
    }
}

/// Pack newline-joined lines into datagrams of at most `max` bytes. A line
/// longer than `max` travels alone.
pub fn pack_datagrams(lines: &[String], max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for line in lines {
        if !current.is_empty() && current.len() + 1 + line.len() > max {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

impl Transport for UdpTransport {
    fn prepare(&mut self) -> Result<(), DeliveryError> {
        self.socket().map(|_| ())
    }

    fn deliver(&mut self, lines: &[String]) -> Result<(), DeliveryError> {
        let datagrams = pack_datagrams(lines, MAX_DATAGRAM);
        let socket = self.socket()?;
        for datagram in &datagrams {
            socket.send(datagram.as_bytes())?;
        }
        Ok(())
    }
}
