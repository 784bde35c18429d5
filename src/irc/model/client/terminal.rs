//! Prints conversations to stdout and keeps the transfer list in memory.

use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::irc::dcc::{TransferSink, TransferStatusEntry, UiLine, UiSink};

#[derive(Debug)]
pub struct TerminalUi {
    nickname: String,
    conversations: DashSet<(String, String)>,
    transfers: DashMap<(String, String), TransferStatusEntry>,
}

impl TerminalUi {
    pub fn new(nickname: &str) -> TerminalUi {
        TerminalUi {
            nickname: nickname.to_owned(),
            conversations: DashSet::new(),
            transfers: DashMap::new(),
        }
    }

    pub fn format_line(&self, server_id: &str, peer: Option<&str>, line: &UiLine) -> String {
        let view = peer.unwrap_or(server_id);
        match line {
            UiLine::Status(text) => format!("[{}] {}", view, text),
            UiLine::Error(text) => format!("[{}] ! {}", view, text),
            UiLine::Incoming(text) => format!("[{}] <{}> {}", view, view, text),
            UiLine::Outgoing(text) => format!("[{}] <{}> {}", view, self.nickname, text),
        }
    }

    /// One row per transfer, sorted by entry id.
    pub fn render_transfers(&self, server_id: &str) -> Vec<String> {
        let mut entries: Vec<TransferStatusEntry> = self
            .transfers
            .iter()
            .filter(|e| e.key().0 == server_id)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));

        entries
            .iter()
            .map(|e| {
                let mut row = format!("{:<12} {:<16} {}", e.kind.as_str(), e.peer, e.status);
                if let Some(pct) = e.progress_percent {
                    row.push_str(&format!(" {}%", pct));
                }
                if !e.detail.is_empty() {
                    row.push_str(&format!(" - {}", e.detail));
                }
                if let Some(path) = &e.local_path {
                    row.push_str(&format!(" [{}]", path.display()));
                }
                if !e.action_hint.is_empty() {
                    row.push_str(&format!(" ({})", e.action_hint));
                }
                row
            })
            .collect()
    }
}

impl UiSink for TerminalUi {
    fn ensure_conversation(&self, server_id: &str, peer: &str) {
        if self
            .conversations
            .insert((server_id.to_owned(), peer.to_owned()))
        {
            debug!("[CLIENT - UI] Opened conversation with {}", peer);
        }
    }

    fn append(&self, server_id: &str, peer: Option<&str>, line: UiLine) {
        println!("{}", self.format_line(server_id, peer, &line));
    }

    fn mark_unread(&self, _server_id: &str, peer: &str) {
        debug!("[CLIENT - UI] Unread activity from {}", peer);
    }

    fn show_transfers(&self, server_id: &str) {
        let rows = self.render_transfers(server_id);
        if rows.is_empty() {
            println!("[{}] No DCC transfers.", server_id);
        }
        for row in rows {
            println!("[{}] {}", server_id, row);
        }
    }
}

impl TransferSink for TerminalUi {
    fn upsert(&self, server_id: &str, entry: TransferStatusEntry) {
        self.transfers
            .insert((server_id.to_owned(), entry.entry_id.clone()), entry);
    }

    fn remove(&self, server_id: &str, entry_id: &str) {
        self.transfers
            .remove(&(server_id.to_owned(), entry_id.to_owned()));
    }

    fn clear(&self, server_id: &str) {
        self.transfers.retain(|key, _| key.0 != server_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::irc::dcc::{TransferKind, TransferState};

    fn entry(kind: TransferKind, peer: &str, progress: Option<u8>) -> TransferStatusEntry {
        TransferStatusEntry::new(kind, peer, TransferState::Transferring, "notes.txt".to_owned())
            .with_progress(progress)
    }

    #[test]
    fn lines_name_their_view() {
        let ui = TerminalUi::new("bob");

        assert_eq!(
            ui.format_line("net", None, &UiLine::Status("hi".to_owned())),
            "[net] hi"
        );
        assert_eq!(
            ui.format_line("net", Some("alice"), &UiLine::Incoming("hey".to_owned())),
            "[alice] <alice> hey"
        );
        assert_eq!(
            ui.format_line("net", Some("alice"), &UiLine::Outgoing("yo".to_owned())),
            "[alice] <bob> yo"
        );
    }

    #[test]
    fn upsert_replaces_the_row() {
        let ui = TerminalUi::new("bob");
        ui.upsert("net", entry(TransferKind::SendIn, "alice", Some(10)));
        ui.upsert("net", entry(TransferKind::SendIn, "Alice", Some(60)));
        ui.upsert("other", entry(TransferKind::SendIn, "alice", Some(10)));

        let rows = ui.render_transfers("net");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].contains("60%"));
        assert!(rows[0].starts_with("send-in"));
    }

    #[test]
    fn remove_and_clear_are_per_server() {
        let ui = TerminalUi::new("bob");
        ui.upsert("net", entry(TransferKind::SendIn, "alice", None));
        ui.upsert("net", entry(TransferKind::ChatIn, "alice", None));
        ui.upsert("other", entry(TransferKind::ChatIn, "alice", None));

        ui.remove("net", "chat-in:alice");
        assert_eq!(ui.render_transfers("net").len(), 1);

        ui.clear("net");
        assert!(ui.render_transfers("net").is_empty());
        assert_eq!(ui.render_transfers("other").len(), 1);
    }
}
