//! What the transfer list in the UI shows. Rebuilt on every state change,
//! never read back.

use std::fmt;
use std::path::PathBuf;

use super::fold_nick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    ChatOut,
    ChatIn,
    SendOut,
    SendIn,
    ChatActive,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::ChatOut => "chat-out",
            TransferKind::ChatIn => "chat-in",
            TransferKind::SendOut => "send-out",
            TransferKind::SendIn => "send-in",
            TransferKind::ChatActive => "chat-active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Waiting,
    Offered,
    Connecting,
    Active,
    Transferring,
    Completed,
    Failed,
    TimedOut,
    Closed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferState::Waiting => "Waiting for peer",
            TransferState::Offered => "Offered",
            TransferState::Connecting => "Connecting",
            TransferState::Active => "Active",
            TransferState::Transferring => "Transferring",
            TransferState::Completed => "Completed",
            TransferState::Failed => "Failed",
            TransferState::TimedOut => "Timed out",
            TransferState::Closed => "Closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatusEntry {
    pub entry_id: String,
    pub peer: String,
    pub kind: TransferKind,
    pub status: TransferState,
    pub detail: String,
    pub local_path: Option<PathBuf>,
    pub progress_percent: Option<u8>,
    pub action_hint: String,
}

/// One row per (kind, peer).
pub fn entry_id(kind: TransferKind, peer: &str) -> String {
    format!("{}:{}", kind.as_str(), fold_nick(peer))
}

impl TransferStatusEntry {
    pub fn new(kind: TransferKind, peer: &str, status: TransferState, detail: String) -> Self {
        Self {
            entry_id: entry_id(kind, peer),
            peer: peer.to_owned(),
            kind,
            status,
            detail,
            local_path: None,
            progress_percent: None,
            action_hint: String::new(),
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.local_path = Some(path);
        self
    }

    pub fn with_progress(mut self, percent: Option<u8>) -> Self {
        self.progress_percent = percent;
        self
    }

    pub fn with_hint(mut self, hint: String) -> Self {
        self.action_hint = hint;
        self
    }
}
