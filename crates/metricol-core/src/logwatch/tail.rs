//! Follower subprocess with multiplexed stdout/stderr.
//!
//! The child's pipes are polled with `libc::poll`; each readable descriptor
//! is read once per poll and fed through a [`LineBuffer`], so partial lines
//! survive across reads and nothing appended between polls is lost.

use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Bytes read from one descriptor per readiness event.
const READ_CHUNK: usize = 64 * 1024;

/// Accumulates bytes and yields complete, trimmed, non-empty lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete
            .split(|&b| b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Flush a trailing line that never got its newline (stream closed).
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Lines gathered by one [`TailProcess::poll_lines`] call.
#[derive(Debug, Default)]
pub struct Polled {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl Polled {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    fn push(&mut self, kind: StreamKind, line: String) {
        match kind {
            StreamKind::Stdout => self.stdout.push(line),
            StreamKind::Stderr => self.stderr.push(line),
        }
    }
}

struct Stream {
    kind: StreamKind,
    file: Option<File>,
    buffer: LineBuffer,
}

impl Stream {
    fn new(kind: StreamKind, fd: OwnedFd) -> Self {
        Self {
            kind,
            file: Some(File::from(fd)),
            buffer: LineBuffer::new(),
        }
    }

    /// Drop the descriptor, returning any unterminated trailing line.
    fn close(&mut self) -> Option<String> {
        self.file = None;
        self.buffer.finish()
    }
}

/// Arguments for following `path` the way `tail -F` does, starting from
/// the last `lines` lines.
pub fn follow_args(path: &str, lines: u64) -> Vec<String> {
    vec![
        "--follow=name".to_string(),
        format!("--lines={lines}"),
        "--quiet".to_string(),
        "--retry".to_string(),
        path.to_string(),
    ]
}

/// A supervised follower subprocess.
pub struct TailProcess {
    child: Child,
    streams: [Stream; 2],
    killed: bool,
}

impl TailProcess {
    /// Launch `program args...` with both output streams piped.
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::other("child pipes unavailable"));
        };

        Ok(Self {
            child,
            streams: [
                Stream::new(StreamKind::Stdout, OwnedFd::from(stdout)),
                Stream::new(StreamKind::Stderr, OwnedFd::from(stderr)),
            ],
            killed: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Whether both streams reached EOF (or the process was killed).
    pub fn is_exhausted(&self) -> bool {
        self.streams.iter().all(|s| s.file.is_none())
    }

    /// Wait up to `timeout` for output and read what is ready.
    ///
    /// With no open descriptors this is a plain timed wait.
    pub fn poll_lines(&mut self, timeout: Duration) -> io::Result<Polled> {
        let mut polled = Polled::default();
        let open: Vec<usize> = (0..self.streams.len())
            .filter(|&i| self.streams[i].file.is_some())
            .collect();
        let mut fds: Vec<libc::pollfd> = open
            .iter()
            .filter_map(|&i| self.streams[i].file.as_ref())
            .map(|file| libc::pollfd {
                fd: file.as_raw_fd(),
                events: libc::POLLIN | libc::POLLPRI,
                revents: 0,
            })
            .collect();

        if poll_fds(&mut fds, timeout)? == 0 {
            return Ok(polled);
        }

        let ready_mask = libc::POLLIN | libc::POLLPRI | libc::POLLHUP | libc::POLLERR;
        let mut chunk = vec![0u8; READ_CHUNK];
        for (pfd, &idx) in fds.iter().zip(&open) {
            if pfd.revents & ready_mask == 0 {
                continue;
            }
            let stream = &mut self.streams[idx];
            let Some(file) = stream.file.as_mut() else {
                continue;
            };
            match file.read(&mut chunk) {
                Ok(0) => {
                    if let Some(line) = stream.close() {
                        polled.push(stream.kind, line);
                    }
                    log::debug!("follower {} closed {:?}", self.child.id(), stream.kind);
                }
                Ok(n) => {
                    for line in stream.buffer.push(&chunk[..n]) {
                        polled.push(stream.kind, line);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {}
                Err(e) => {
                    stream.close();
                    return Err(e);
                }
            }
        }
        Ok(polled)
    }

    /// Terminate and reap the child and release its descriptors.
    /// Safe to call repeatedly.
    pub fn kill(&mut self) {
        for stream in &mut self.streams {
            stream.file = None;
        }
        if self.killed {
            return;
        }
        self.killed = true;
        if let Err(e) = self.child.kill() {
            log::debug!("follower {}: kill: {e}", self.child.id());
        }
        if let Err(e) = self.child.wait() {
            log::warn!("follower {}: wait: {e}", self.child.id());
        }
    }
}

impl Drop for TailProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Sleep for `timeout` the way a poll over zero descriptors would.
pub fn idle_poll(timeout: Duration) {
    let _ = poll_fds(&mut [], timeout);
}

fn poll_fds(fds: &mut [libc::pollfd], timeout: Duration) -> io::Result<usize> {
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd structs
    // and its length is passed alongside; a zero length with a dangling
    // pointer is permitted by poll(2).
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }
    Ok(rc as usize)
}
