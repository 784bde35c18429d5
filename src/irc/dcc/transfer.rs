//! DCC SEND streaming in both directions.
//!
//! The receiver writes back a 4-byte big-endian running count after every
//! chunk (the legacy DCC acknowledgment). The count wraps past 4 GiB, as
//! legacy peers expect.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::pending::PendingSendOffer;
use super::{AckMode, DccConfig, DccError};
use crate::irc::ctcp::utils::sanitize_file_name;

/// Throttles progress reports: one per `step` points, plus 100%.
#[derive(Debug)]
pub struct ProgressTracker {
    size: u64,
    step: u8,
    last: u8,
}

impl ProgressTracker {
    pub fn new(size: u64, step: u8) -> Self {
        Self {
            size,
            step: step.max(1),
            last: 0,
        }
    }

    /// `None` when the size is unknown.
    pub fn percent(&self, done: u64) -> Option<u8> {
        if self.size == 0 {
            return None;
        }
        let pct = (u128::from(done) * 100 / u128::from(self.size)).min(100);
        Some(pct as u8)
    }

    /// Returns the percentage to report, if this update is worth one.
    pub fn observe(&mut self, done: u64) -> Option<u8> {
        let pct = self.percent(done)?;
        let reached_end = pct == 100 && self.last < 100;
        if reached_end || pct >= self.last.saturating_add(self.step) {
            self.last = pct;
            return Some(pct);
        }
        None
    }
}

/// Where an accepted file lands:
/// - nothing requested: `<download_dir>/<offered name>`
/// - a directory (existing, or ending in a separator): `<dir>/<offered name>`
/// - anything else: the path itself
pub fn resolve_destination(
    requested: Option<&str>,
    offered_name: &str,
    download_dir: &Path,
) -> PathBuf {
    let file_name = sanitize_file_name(offered_name);

    let requested = match requested.map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => r,
        None => return download_dir.join(file_name),
    };

    let path = expand_home(requested);
    if requested.ends_with('/') || requested.ends_with(MAIN_SEPARATOR) || path.is_dir() {
        return path.join(file_name);
    }
    path
}

pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// Creates the destination, refusing to overwrite anything.
pub fn create_destination(path: &Path) -> Result<File, DccError> {
    if path.exists() {
        return Err(DccError::Precondition(format!(
            "{} already exists",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                DccError::Precondition(format!("{} already exists", path.display()))
            }
            _ => DccError::Io(e),
        })
}

/// Sockets of transfers in flight, so shutdown can abandon them.
#[derive(Debug, Default)]
pub struct ActiveTransfers {
    next_id: AtomicU64,
    sockets: DashMap<u64, TcpStream>,
}

impl ActiveTransfers {
    pub fn track(&self, stream: &TcpStream) -> Option<u64> {
        let handle = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sockets.insert(id, handle);
        Some(id)
    }

    pub fn untrack(&self, id: Option<u64>) {
        if let Some(id) = id {
            self.sockets.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn abort_all(&self) {
        for entry in self.sockets.iter() {
            let _ = entry.value().shutdown(Shutdown::Both);
        }
        self.sockets.clear();
    }
}

pub fn connect(offer: &PendingSendOffer, config: &DccConfig) -> Result<TcpStream, DccError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(offer.host, offer.port));
    let stream =
        TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(DccError::from_io)?;
    stream.set_read_timeout(Some(config.io_timeout))?;
    stream.set_write_timeout(Some(config.io_timeout))?;
    Ok(stream)
}

/// Reads the offered file from `stream` into `file`, acknowledging every
/// chunk. Stops at the advertised size, or at end of stream when the size
/// is unknown. Returns the number of bytes received.
pub fn receive_stream<F>(
    stream: &mut TcpStream,
    file: &mut File,
    size: u64,
    config: &DccConfig,
    mut on_progress: F,
) -> Result<u64, DccError>
where
    F: FnMut(u8),
{
    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut tracker = ProgressTracker::new(size, config.progress_step);
    let mut received: u64 = 0;

    loop {
        let want = if size > 0 {
            let remaining = size - received;
            buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX))
        } else {
            buf.len()
        };

        let n = match stream.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DccError::from_io(e)),
        };

        file.write_all(&buf[..n])?;
        received += n as u64;

        if config.ack_mode == AckMode::Wrapping32 {
            stream
                .write_all(&ack_bytes(received))
                .map_err(DccError::from_io)?;
        }

        if let Some(pct) = tracker.observe(received) {
            on_progress(pct);
        }

        if size > 0 && received >= size {
            break;
        }
    }

    file.flush()?;
    file.sync_all()?;

    if size > 0 && received != size {
        return Err(DccError::ShortTransfer {
            received,
            expected: size,
        });
    }
    Ok(received)
}

/// Legacy acknowledgment: running count masked to 32 bits, big-endian.
pub fn ack_bytes(received: u64) -> [u8; 4] {
    ((received & 0xFFFF_FFFF) as u32).to_be_bytes()
}

/// Receives into `destination`, deleting it if anything goes wrong.
pub fn receive_to_file<F>(
    stream: &mut TcpStream,
    destination: &Path,
    size: u64,
    config: &DccConfig,
    on_progress: F,
) -> Result<u64, DccError>
where
    F: FnMut(u8),
{
    let mut file = create_destination(destination)?;
    let result = receive_stream(stream, &mut file, size, config, on_progress);
    drop(file);

    if result.is_err() {
        if let Err(e) = fs::remove_file(destination) {
            warn!(
                "[DCC - GET] Can't remove partial file {}: {}",
                destination.display(),
                e
            );
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
    result
}

/// Streams `source` to a peer that connected to our listener. Returns the
/// number of bytes sent.
pub fn send_stream<F>(
    stream: TcpStream,
    source: &Path,
    size: u64,
    config: &DccConfig,
    mut on_progress: F,
) -> Result<u64, DccError>
where
    F: FnMut(u8),
{
    let mut file = File::open(source)?;
    let mut stream = stream;
    stream.set_write_timeout(Some(config.io_timeout))?;
    stream.set_read_timeout(Some(config.io_timeout))?;

    let acked = Arc::new(AtomicU64::new(0));
    let drain = spawn_ack_drain(stream.try_clone()?, acked.clone());

    let mut buf = vec![0u8; config.chunk_size.max(1)];
    let mut tracker = ProgressTracker::new(size, config.progress_step);
    let mut sent: u64 = 0;

    let result = loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break Ok(sent),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => break Err(DccError::Io(e)),
        };

        if let Err(e) = stream.write_all(&buf[..n]) {
            break Err(DccError::from_io(e));
        }
        sent += n as u64;

        if let Some(pct) = tracker.observe(sent) {
            on_progress(pct);
        }
    };

    match result {
        Ok(sent) => {
            // Let the peer read to the end, then wait for it to hang up.
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Write);
            let _ = drain.join();
            debug!(
                "[DCC - SEND] Sent {} bytes, last ack {}",
                sent,
                acked.load(Ordering::SeqCst)
            );
            Ok(sent)
        }
        Err(e) => {
            let _ = stream.shutdown(Shutdown::Both);
            let _ = drain.join();
            Err(e)
        }
    }
}

/// Reads acknowledgments so the receiver never blocks on a full buffer.
fn spawn_ack_drain(mut stream: TcpStream, acked: Arc<AtomicU64>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut pending = Vec::with_capacity(8);
        let mut buf = [0u8; 512];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let whole = pending.len() / 4 * 4;
                    if whole >= 4 {
                        let last = &pending[whole - 4..whole];
                        let value = u32::from_be_bytes([last[0], last[1], last[2], last[3]]);
                        acked.store(u64::from(value), Ordering::SeqCst);
                        pending.drain(..whole);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
    })
}
