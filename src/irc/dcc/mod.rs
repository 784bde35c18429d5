//! Runtime side of DCC: listeners, pending offers, chat sessions and file
//! transfers, driven by the `/dcc` command router.
//!
//! Every blocking socket operation runs on its own thread. Shared state lives
//! in concurrent maps keyed by [`PeerKey`], and every mutation either replaces
//! an entry (closing whatever it displaced) or removes it only if it still
//! holds the value the caller owns.

use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub mod address;
pub mod listener;
pub mod pending;
pub mod router;
pub mod session;
pub mod status;
pub mod transfer;

pub use address::{AddressResolver, FixedResolver, InterfaceResolver};
pub use router::DccManager;
pub use status::{TransferKind, TransferState, TransferStatusEntry};

pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const IO_TIMEOUT: Duration = Duration::from_secs(30);
pub const CHUNK_SIZE: usize = 64 * 1024;
pub const PROGRESS_STEP: u8 = 10;

/// Identity of a peer on a given server. Nicks are case-folded so that
/// `Bob` and `bob` share offers, listeners and sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub server_id: String,
    pub nick: String,
}

impl PeerKey {
    pub fn new(server_id: &str, nick: &str) -> Self {
        Self {
            server_id: server_id.to_owned(),
            nick: fold_nick(nick),
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server_id, self.nick)
    }
}

/// RFC 1459 case mapping: `[]\~` are the upper case of `{}|^`.
pub fn fold_nick(nick: &str) -> String {
    nick.trim()
        .chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// What a listener is waiting for. A peer may have one chat and one file
/// offer outstanding at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Chat,
    Send,
}

#[derive(Debug, Error)]
pub enum DccError {
    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("Could not determine a local IPv4 address for DCC.")]
    NoLocalAddress,

    #[error("{0}")]
    Precondition(String),

    #[error("timed out")]
    Timeout,

    #[error("transfer ended early: received {received} of {expected} bytes")]
    ShortTransfer { received: u64, expected: u64 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl DccError {
    /// Folds socket timeouts into [`DccError::Timeout`].
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DccError::Timeout,
            _ => DccError::Io(e),
        }
    }
}

/// The IRC link the offers travel over.
pub trait IrcTransport: Send + Sync {
    fn is_connected(&self, server_id: &str) -> bool;

    /// Sends `payload` (already framed with 0x01) as a CTCP request to `nick`.
    fn send_ctcp(&self, server_id: &str, nick: &str, payload: &str) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiLine {
    Status(String),
    Error(String),
    /// A chat line received from the peer.
    Incoming(String),
    /// A chat line we sent to the peer.
    Outgoing(String),
}

/// Conversation views. `peer == None` targets the server status view.
pub trait UiSink: Send + Sync {
    fn ensure_conversation(&self, server_id: &str, peer: &str);

    fn append(&self, server_id: &str, peer: Option<&str>, line: UiLine);

    fn mark_unread(&self, server_id: &str, peer: &str);

    /// Asks the UI to show the per-server transfer list.
    fn show_transfers(&self, server_id: &str);
}

/// Projection of transfer state for the UI.
pub trait TransferSink: Send + Sync {
    fn upsert(&self, server_id: &str, entry: TransferStatusEntry);

    fn remove(&self, server_id: &str, entry_id: &str);

    fn clear(&self, server_id: &str);
}

/// How the receiver acknowledges bytes back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Legacy 4-byte big-endian running count, wrapping past 4 GiB.
    #[default]
    Wrapping32,
    /// Never write acknowledgments.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct DccConfig {
    pub download_dir: PathBuf,
    pub accept_timeout: Duration,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub chunk_size: usize,
    pub progress_step: u8,
    pub ack_mode: AckMode,
    /// Bypasses interface enumeration when set.
    pub advertise_ip: Option<Ipv4Addr>,
}

impl Default for DccConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            accept_timeout: ACCEPT_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
            io_timeout: IO_TIMEOUT,
            chunk_size: CHUNK_SIZE,
            progress_step: PROGRESS_STEP,
            ack_mode: AckMode::default(),
            advertise_ip: None,
        }
    }
}

pub fn default_download_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Downloads")
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn peer_keys_fold_case() {
        assert_eq!(PeerKey::new("net", "Bob"), PeerKey::new("net", "bob"));
        assert_eq!(PeerKey::new("net", "[Zed]"), PeerKey::new("net", "{zed}"));
        assert_ne!(PeerKey::new("net", "bob"), PeerKey::new("other", "bob"));
    }

    #[test]
    fn timeouts_fold_into_timeout_variant() {
        let e = DccError::from_io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(e, DccError::Timeout));

        let e = DccError::from_io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(matches!(e, DccError::Io(_)));
    }
}
