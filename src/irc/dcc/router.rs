//! The `/dcc` command surface and inbound offer handling.
//!
//! `DccManager` owns every registry. Commands validate their preconditions
//! on the caller's thread and hand socket work to a spawned thread; those
//! threads report back through the UI and transfer sinks and never panic
//! or leak a socket.

use std::fs::{self, File};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::SystemTime;

use dashmap::DashSet;
use tracing::{debug, info, warn};

use super::address::{AddressResolver, FixedResolver, InterfaceResolver};
use super::listener::{DccListener, ListenerRegistry};
use super::pending::{PendingChatOffer, PendingOffers, PendingSendOffer};
use super::session::{ChatSession, SessionEnd, SessionRegistry};
use super::status::{TransferKind, TransferState, TransferStatusEntry};
use super::transfer::{self, ActiveTransfers};
use super::{
    DccConfig, DccError, Direction, IrcTransport, PeerKey, TransferSink, UiLine, UiSink,
};
use crate::irc::ctcp::message::{decode, encode_chat_offer, encode_send_offer, is_dcc, DccOffer};
use crate::irc::ctcp::utils::{human_size, sanitize_file_name};

const USAGE: [&str; 9] = [
    "Usage: /dcc <subcommand> [args...]",
    "  /dcc chat <nick>             offer a DCC CHAT",
    "  /dcc send <nick> <path>      offer a file",
    "  /dcc accept <nick>           accept a pending DCC CHAT",
    "  /dcc get <nick> [savePath]   accept a pending file (aliases: recv, receive)",
    "  /dcc msg <nick> <text>       send a line over DCC CHAT",
    "  /dcc close <nick>            close a DCC CHAT",
    "  /dcc list                    show sessions and pending offers",
    "  /dcc panel                   show the transfer list",
];

#[derive(Debug, PartialEq, Eq)]
pub enum DccCommand {
    Chat(String),
    Send(String, String),
    Accept(String),
    Get(String, Option<String>),
    Msg(String, String),
    Close(String),
    List,
    Panel,
    Help,
}

impl DccCommand {
    /// Parses what follows `/dcc`. `None` means "print usage".
    pub fn parse(args: &str) -> Option<Self> {
        let (sub, rest) = next_token(args);
        let sub = sub?.to_ascii_lowercase();
        let (nick, rest) = next_token(rest);
        let rest = rest.trim();
        let tail = (!rest.is_empty()).then(|| rest.to_owned());

        match sub.as_str() {
            "chat" => Some(DccCommand::Chat(nick?.to_owned())),
            "send" => Some(DccCommand::Send(nick?.to_owned(), unquote(&tail?))),
            "accept" => Some(DccCommand::Accept(nick?.to_owned())),
            "get" | "recv" | "receive" => Some(DccCommand::Get(
                nick?.to_owned(),
                tail.map(|t| unquote(&t)),
            )),
            "msg" => Some(DccCommand::Msg(nick?.to_owned(), tail?)),
            "close" => Some(DccCommand::Close(nick?.to_owned())),
            "list" => Some(DccCommand::List),
            "panel" => Some(DccCommand::Panel),
            "help" => Some(DccCommand::Help),
            _ => None,
        }
    }

    /// Commands that talk to the peer through the IRC link. An established
    /// chat and the local views keep working while the link is down.
    fn needs_irc(&self) -> bool {
        matches!(
            self,
            DccCommand::Chat(_)
                | DccCommand::Send(..)
                | DccCommand::Accept(_)
                | DccCommand::Get(..)
        )
    }
}

fn next_token(input: &str) -> (Option<&str>, &str) {
    let input = input.trim_start();
    if input.is_empty() {
        return (None, input);
    }
    match input.find(char::is_whitespace) {
        Some(end) => (Some(&input[..end]), &input[end..]),
        None => (Some(input), ""),
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
        .to_owned()
}

#[derive(Clone)]
pub struct DccManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: DccConfig,
    transport: Arc<dyn IrcTransport>,
    ui: Arc<dyn UiSink>,
    transfers: Arc<dyn TransferSink>,
    resolver: Box<dyn AddressResolver>,
    pending: PendingOffers,
    listeners: ListenerRegistry,
    sessions: SessionRegistry,
    active: ActiveTransfers,
    servers: DashSet<String>,
    shutting_down: AtomicBool,
}

impl DccManager {
    pub fn new(
        config: DccConfig,
        transport: Arc<dyn IrcTransport>,
        ui: Arc<dyn UiSink>,
        transfers: Arc<dyn TransferSink>,
    ) -> Self {
        let resolver: Box<dyn AddressResolver> = match config.advertise_ip {
            Some(ip) => Box::new(FixedResolver(Some(ip))),
            None => Box::new(InterfaceResolver),
        };
        Self::with_resolver(config, transport, ui, transfers, resolver)
    }

    pub fn with_resolver(
        config: DccConfig,
        transport: Arc<dyn IrcTransport>,
        ui: Arc<dyn UiSink>,
        transfers: Arc<dyn TransferSink>,
        resolver: Box<dyn AddressResolver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                ui,
                transfers,
                resolver,
                pending: PendingOffers::default(),
                listeners: ListenerRegistry::default(),
                sessions: SessionRegistry::default(),
                active: ActiveTransfers::default(),
                servers: DashSet::new(),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Runs `/dcc <args>` in the context of `server_id`.
    pub fn handle_command(&self, server_id: Option<&str>, args: &str) {
        let command = match DccCommand::parse(args) {
            Some(DccCommand::Help) | None => {
                self.usage(server_id.unwrap_or_default());
                return;
            }
            Some(c) => c,
        };

        let server_id = match server_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => {
                self.inner.ui.append(
                    "",
                    None,
                    UiLine::Error("DCC needs an active server.".to_owned()),
                );
                return;
            }
        };

        if command.needs_irc() && !self.inner.transport.is_connected(server_id) {
            self.error(
                server_id,
                None,
                DccError::NotConnected(server_id.to_owned()).to_string(),
            );
            return;
        }

        match command {
            DccCommand::Chat(nick) => self.offer_chat(server_id, &nick),
            DccCommand::Send(nick, path) => self.offer_file(server_id, &nick, &path),
            DccCommand::Accept(nick) => self.accept_chat(server_id, &nick),
            DccCommand::Get(nick, path) => self.get_file(server_id, &nick, path.as_deref()),
            DccCommand::Msg(nick, text) => self.send_line(server_id, &nick, &text),
            DccCommand::Close(nick) => self.close_chat(server_id, &nick),
            DccCommand::List => self.list(server_id),
            DccCommand::Panel => self.inner.ui.show_transfers(server_id),
            DccCommand::Help => self.usage(server_id),
        }
    }

    /// Handles a CTCP request from `from`. Returns false when the payload is
    /// not a DCC request.
    pub fn handle_ctcp(&self, server_id: &str, from: &str, ctcp_body: &str) -> bool {
        if !is_dcc(ctcp_body) {
            return false;
        }
        let inner = &self.inner;
        inner.ui.ensure_conversation(server_id, from);

        match decode(ctcp_body) {
            Err(e) => {
                warn!("[DCC - CTCP] Malformed offer from {}: {}", from, e);
                self.error(
                    server_id,
                    Some(from),
                    format!("Ignoring malformed DCC offer from {}: {}", from, e),
                );
            }
            Ok(DccOffer::Chat(chat)) => {
                let offer = PendingChatOffer {
                    server_id: server_id.to_owned(),
                    peer_nick: from.to_owned(),
                    host: chat.host,
                    port: chat.port,
                    offered_at: SystemTime::now(),
                };
                if inner.pending.put_chat(offer).is_some() {
                    debug!("[DCC - CTCP] Chat offer from {} replaced", from);
                }
                self.status(
                    server_id,
                    Some(from),
                    format!(
                        "{} offers a DCC CHAT ({}:{}). Type /dcc accept {} to connect.",
                        from, chat.host, chat.port, from
                    ),
                );
                self.upsert(
                    server_id,
                    TransferStatusEntry::new(
                        TransferKind::ChatIn,
                        from,
                        TransferState::Offered,
                        format!("{}:{}", chat.host, chat.port),
                    )
                    .with_hint(format!("/dcc accept {}", from)),
                );
                inner.ui.mark_unread(server_id, from);
            }
            Ok(DccOffer::Send(send)) => {
                let offer = PendingSendOffer {
                    server_id: server_id.to_owned(),
                    peer_nick: from.to_owned(),
                    file_name: send.file_name.clone(),
                    host: send.host,
                    port: send.port,
                    size: send.size,
                    offered_at: SystemTime::now(),
                };
                if inner.pending.put_send(offer).is_some() {
                    debug!("[DCC - CTCP] File offer from {} replaced", from);
                }
                self.status(
                    server_id,
                    Some(from),
                    format!(
                        "{} offers {} ({}) from {}:{}. Type /dcc get {} [path] to download.",
                        from,
                        send.file_name,
                        size_label(send.size),
                        send.host,
                        send.port,
                        from
                    ),
                );
                self.upsert(
                    server_id,
                    TransferStatusEntry::new(
                        TransferKind::SendIn,
                        from,
                        TransferState::Offered,
                        format!("{} ({})", send.file_name, size_label(send.size)),
                    )
                    .with_hint(format!("/dcc get {}", from)),
                );
                inner.ui.mark_unread(server_id, from);
            }
            Ok(DccOffer::Unsupported(verb)) => {
                self.status(
                    server_id,
                    Some(from),
                    format!("DCC {} from {} is not supported.", verb, from),
                );
            }
        }
        true
    }

    /// Closes every listener, session and transfer socket and forgets all
    /// offers. Transfers in flight are abandoned.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        inner.shutting_down.store(true, Ordering::SeqCst);
        inner.listeners.close_all();
        inner.sessions.close_all();
        inner.active.abort_all();
        inner.pending.clear();
        for server in inner.servers.iter() {
            inner.transfers.clear(server.key());
        }
        info!("[DCC] Shut down");
    }

    fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

// Reporting
impl DccManager {
    fn status(&self, server_id: &str, peer: Option<&str>, text: String) {
        self.inner.ui.append(server_id, peer, UiLine::Status(text));
    }

    fn error(&self, server_id: &str, peer: Option<&str>, text: String) {
        self.inner.ui.append(server_id, peer, UiLine::Error(text));
    }

    fn upsert(&self, server_id: &str, entry: TransferStatusEntry) {
        self.inner.servers.insert(server_id.to_owned());
        self.inner.transfers.upsert(server_id, entry);
    }

    fn remove_entry(&self, server_id: &str, kind: TransferKind, peer: &str) {
        self.inner
            .transfers
            .remove(server_id, &super::status::entry_id(kind, peer));
    }

    fn usage(&self, server_id: &str) {
        for line in USAGE {
            self.inner
                .ui
                .append(server_id, None, UiLine::Status(line.to_owned()));
        }
    }

    fn advertisable_ip(&self, server_id: &str, nick: &str) -> Option<Ipv4Addr> {
        let ip = self.inner.resolver.resolve();
        if ip.is_none() {
            self.error(server_id, Some(nick), DccError::NoLocalAddress.to_string());
        }
        ip
    }
}

// DCC CHAT
impl DccManager {
    fn offer_chat(&self, server_id: &str, nick: &str) {
        let inner = &self.inner;
        inner.ui.ensure_conversation(server_id, nick);
        let ip = match self.advertisable_ip(server_id, nick) {
            Some(ip) => ip,
            None => return,
        };

        let key = PeerKey::new(server_id, nick);
        let listener =
            match inner
                .listeners
                .open_listener(Direction::Chat, &key, inner.config.accept_timeout)
            {
                Ok(l) => l,
                Err(e) => {
                    self.error(
                        server_id,
                        Some(nick),
                        format!("Could not open a DCC listener: {}", e),
                    );
                    return;
                }
            };

        let payload = encode_chat_offer(ip, listener.port());
        if let Err(e) = inner.transport.send_ctcp(server_id, nick, &payload) {
            inner.listeners.release(Direction::Chat, &key, &listener);
            self.error(
                server_id,
                Some(nick),
                format!("Could not send DCC CHAT offer to {}: {}", nick, e),
            );
            return;
        }

        self.status(
            server_id,
            Some(nick),
            format!(
                "DCC CHAT offer sent to {} ({}:{}). Waiting for connection...",
                nick,
                ip,
                listener.port()
            ),
        );
        self.upsert(
            server_id,
            TransferStatusEntry::new(
                TransferKind::ChatOut,
                nick,
                TransferState::Waiting,
                format!("{}:{}", ip, listener.port()),
            ),
        );

        let manager = self.clone();
        let (server_id, nick) = (server_id.to_owned(), nick.to_owned());
        thread::spawn(move || manager.await_chat_peer(&server_id, &nick, key, listener));
    }

    fn await_chat_peer(&self, server_id: &str, nick: &str, key: PeerKey, listener: Arc<DccListener>) {
        let accepted = listener.accept();
        self.inner.listeners.release(Direction::Chat, &key, &listener);

        match accepted {
            Ok((stream, addr)) => {
                info!("[DCC - CHAT] {} connected from {}", nick, addr);
                self.start_session(server_id, nick, stream, TransferKind::ChatOut);
            }
            Err(DccError::Cancelled) => {
                debug!("[DCC - CHAT] Offer to {} superseded", nick);
            }
            Err(DccError::Timeout) => {
                self.status(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT offer to {} timed out.", nick),
                );
                self.upsert(
                    server_id,
                    TransferStatusEntry::new(
                        TransferKind::ChatOut,
                        nick,
                        TransferState::TimedOut,
                        "No connection".to_owned(),
                    )
                    .with_hint(format!("/dcc chat {}", nick)),
                );
            }
            Err(e) => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT offer to {} failed: {}", nick, e),
                );
                self.upsert(
                    server_id,
                    TransferStatusEntry::new(
                        TransferKind::ChatOut,
                        nick,
                        TransferState::Failed,
                        e.to_string(),
                    ),
                );
            }
        }
    }

    fn accept_chat(&self, server_id: &str, nick: &str) {
        let inner = &self.inner;
        inner.ui.ensure_conversation(server_id, nick);
        let key = PeerKey::new(server_id, nick);

        let offer = match inner.pending.remove_chat(&key) {
            Some(o) => o,
            None => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("No pending DCC CHAT offer from {}.", nick),
                );
                return;
            }
        };

        self.status(
            server_id,
            Some(nick),
            format!(
                "Connecting to {} ({}:{}) for DCC CHAT...",
                offer.peer_nick, offer.host, offer.port
            ),
        );
        self.upsert(
            server_id,
            TransferStatusEntry::new(
                TransferKind::ChatIn,
                nick,
                TransferState::Connecting,
                format!("{}:{}", offer.host, offer.port),
            ),
        );

        let manager = self.clone();
        thread::spawn(move || {
            let addr = SocketAddr::V4(SocketAddrV4::new(offer.host, offer.port));
            let timeout = manager.inner.config.connect_timeout;
            match TcpStream::connect_timeout(&addr, timeout).map_err(DccError::from_io) {
                Ok(stream) => manager.start_session(
                    &offer.server_id,
                    &offer.peer_nick,
                    stream,
                    TransferKind::ChatIn,
                ),
                Err(e) => {
                    let state = match e {
                        DccError::Timeout => TransferState::TimedOut,
                        _ => TransferState::Failed,
                    };
                    manager.error(
                        &offer.server_id,
                        Some(&offer.peer_nick),
                        format!("DCC CHAT connection to {} failed: {}", offer.peer_nick, e),
                    );
                    manager.upsert(
                        &offer.server_id,
                        TransferStatusEntry::new(
                            TransferKind::ChatIn,
                            &offer.peer_nick,
                            state,
                            e.to_string(),
                        ),
                    );
                }
            }
        });
    }

    fn start_session(&self, server_id: &str, nick: &str, stream: TcpStream, from: TransferKind) {
        let inner = &self.inner;
        let (session, reader) =
            match ChatSession::start(server_id, nick, stream, inner.config.io_timeout) {
                Ok(s) => s,
                Err(e) => {
                    self.error(
                        server_id,
                        Some(nick),
                        format!("DCC CHAT with {} could not start: {}", nick, e),
                    );
                    return;
                }
            };

        inner.sessions.replace(session.clone());
        self.remove_entry(server_id, from, nick);
        self.upsert(
            server_id,
            TransferStatusEntry::new(
                TransferKind::ChatActive,
                nick,
                TransferState::Active,
                String::new(),
            )
            .with_hint(format!("/dcc msg {} <text>", nick)),
        );
        self.status(
            server_id,
            Some(nick),
            format!("DCC CHAT session established with {}.", nick),
        );

        let manager = self.clone();
        thread::spawn(move || manager.read_session(session, reader));
    }

    fn read_session(&self, session: Arc<ChatSession>, reader: TcpStream) {
        let (server_id, nick) = (session.server_id.as_str(), session.peer_nick.as_str());
        let ui = &self.inner.ui;

        let end = session.read_lines(reader, |line| {
            ui.append(server_id, Some(nick), UiLine::Incoming(line));
            ui.mark_unread(server_id, nick);
        });
        self.inner.sessions.remove_if_same(&session);
        debug!("[DCC - CHAT] Session {} ended: {:?}", session.id, end);

        let (state, detail) = match end {
            SessionEnd::LocalClose => return,
            SessionEnd::PeerClosed => {
                self.status(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT with {}: peer closed.", nick),
                );
                (TransferState::Closed, "Peer closed".to_owned())
            }
            SessionEnd::Lost(e) => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT with {}: connection lost ({}).", nick, e),
                );
                (TransferState::Failed, e.to_string())
            }
        };
        self.upsert(
            server_id,
            TransferStatusEntry::new(TransferKind::ChatActive, nick, state, detail)
                .with_hint(format!("/dcc chat {}", nick)),
        );
    }

    fn send_line(&self, server_id: &str, nick: &str, text: &str) {
        let key = PeerKey::new(server_id, nick);
        let session = match self.inner.sessions.get(&key) {
            Some(s) => s,
            None => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("No active DCC CHAT with {}.", nick),
                );
                return;
            }
        };

        match session.write_line(text) {
            Ok(()) => self
                .inner
                .ui
                .append(server_id, Some(nick), UiLine::Outgoing(text.to_owned())),
            Err(e) => {
                self.inner.sessions.remove_if_same(&session);
                session.close();
                self.error(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT write to {} failed: {}", nick, e),
                );
                self.upsert(
                    server_id,
                    TransferStatusEntry::new(
                        TransferKind::ChatActive,
                        nick,
                        TransferState::Failed,
                        e.to_string(),
                    ),
                );
            }
        }
    }

    fn close_chat(&self, server_id: &str, nick: &str) {
        let key = PeerKey::new(server_id, nick);
        match self.inner.sessions.remove(&key) {
            Some(session) => {
                session.close();
                self.remove_entry(server_id, TransferKind::ChatActive, nick);
                self.status(
                    server_id,
                    Some(nick),
                    format!("DCC CHAT with {} closed.", nick),
                );
            }
            None => self.error(
                server_id,
                Some(nick),
                format!("No active DCC CHAT with {}.", nick),
            ),
        }
    }
}

// DCC SEND
impl DccManager {
    fn offer_file(&self, server_id: &str, nick: &str, path: &str) {
        let inner = &self.inner;
        inner.ui.ensure_conversation(server_id, nick);

        let source = transfer::expand_home(path);
        let size = match readable_file_size(&source) {
            Ok(size) => size,
            Err(reason) => {
                self.error(server_id, Some(nick), reason);
                return;
            }
        };
        let file_name = sanitize_file_name(
            &source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let ip = match self.advertisable_ip(server_id, nick) {
            Some(ip) => ip,
            None => return,
        };

        let key = PeerKey::new(server_id, nick);
        let listener =
            match inner
                .listeners
                .open_listener(Direction::Send, &key, inner.config.accept_timeout)
            {
                Ok(l) => l,
                Err(e) => {
                    self.error(
                        server_id,
                        Some(nick),
                        format!("Could not open a DCC listener: {}", e),
                    );
                    return;
                }
            };

        let payload = encode_send_offer(&file_name, ip, listener.port(), size);
        if let Err(e) = inner.transport.send_ctcp(server_id, nick, &payload) {
            inner.listeners.release(Direction::Send, &key, &listener);
            self.error(
                server_id,
                Some(nick),
                format!("Could not send DCC SEND offer to {}: {}", nick, e),
            );
            return;
        }

        self.status(
            server_id,
            Some(nick),
            format!(
                "DCC SEND offer sent to {}: {} ({}) via {}:{}. Waiting for connection...",
                nick,
                file_name,
                human_size(size),
                ip,
                listener.port()
            ),
        );
        self.upsert(
            server_id,
            TransferStatusEntry::new(
                TransferKind::SendOut,
                nick,
                TransferState::Waiting,
                format!("{} ({})", file_name, human_size(size)),
            )
            .with_path(source.clone())
            .with_progress(Some(0)),
        );

        let manager = self.clone();
        let (server_id, nick) = (server_id.to_owned(), nick.to_owned());
        thread::spawn(move || {
            manager.serve_file(&server_id, &nick, key, listener, &source, &file_name, size)
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn serve_file(
        &self,
        server_id: &str,
        nick: &str,
        key: PeerKey,
        listener: Arc<DccListener>,
        source: &Path,
        file_name: &str,
        size: u64,
    ) {
        let accepted = listener.accept();
        self.inner.listeners.release(Direction::Send, &key, &listener);

        let entry = |state: TransferState, detail: String, progress: Option<u8>| {
            TransferStatusEntry::new(TransferKind::SendOut, nick, state, detail)
                .with_path(source.to_path_buf())
                .with_progress(progress)
        };

        let stream = match accepted {
            Ok((stream, addr)) => {
                info!("[DCC - SEND] {} connected from {}", nick, addr);
                stream
            }
            Err(DccError::Cancelled) => {
                debug!("[DCC - SEND] Offer of {} to {} superseded", file_name, nick);
                return;
            }
            Err(DccError::Timeout) => {
                self.status(
                    server_id,
                    Some(nick),
                    format!("DCC SEND offer of {} to {} timed out.", file_name, nick),
                );
                self.upsert(
                    server_id,
                    entry(TransferState::TimedOut, file_name.to_owned(), None),
                );
                return;
            }
            Err(e) => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("DCC SEND to {} failed: {}", nick, e),
                );
                self.upsert(server_id, entry(TransferState::Failed, e.to_string(), None));
                return;
            }
        };

        let tracked = self.inner.active.track(&stream);
        self.upsert(
            server_id,
            entry(TransferState::Transferring, file_name.to_owned(), Some(0)),
        );

        let result = transfer::send_stream(stream, source, size, &self.inner.config, |pct| {
            self.upsert(
                server_id,
                entry(TransferState::Transferring, file_name.to_owned(), Some(pct)),
            )
        });
        self.inner.active.untrack(tracked);

        match result {
            Ok(sent) => {
                self.status(
                    server_id,
                    Some(nick),
                    format!("DCC SEND complete: {} ({})", file_name, human_size(sent)),
                );
                self.upsert(
                    server_id,
                    entry(TransferState::Completed, human_size(sent), Some(100)),
                );
            }
            Err(e) => {
                if self.is_shutting_down() {
                    return;
                }
                self.error(
                    server_id,
                    Some(nick),
                    format!("DCC SEND of {} to {} failed: {}", file_name, nick, e),
                );
                self.upsert(server_id, entry(TransferState::Failed, e.to_string(), None));
            }
        }
    }

    fn get_file(&self, server_id: &str, nick: &str, requested: Option<&str>) {
        let inner = &self.inner;
        inner.ui.ensure_conversation(server_id, nick);
        let key = PeerKey::new(server_id, nick);

        let offer = match inner.pending.get_send(&key) {
            Some(o) => o,
            None => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("No pending DCC SEND offer from {}.", nick),
                );
                return;
            }
        };

        let destination =
            transfer::resolve_destination(requested, &offer.file_name, &inner.config.download_dir);
        if destination.exists() {
            self.error(
                server_id,
                Some(nick),
                format!(
                    "Refusing to overwrite existing file: {}",
                    destination.display()
                ),
            );
            return;
        }

        let offer = match inner.pending.remove_send(&key) {
            Some(o) => o,
            None => {
                self.error(
                    server_id,
                    Some(nick),
                    format!("No pending DCC SEND offer from {}.", nick),
                );
                return;
            }
        };

        self.status(
            server_id,
            Some(nick),
            format!(
                "Receiving {} from {} into {}...",
                offer.file_name,
                offer.peer_nick,
                destination.display()
            ),
        );
        self.upsert(
            server_id,
            TransferStatusEntry::new(
                TransferKind::SendIn,
                nick,
                TransferState::Connecting,
                offer.file_name.clone(),
            )
            .with_path(destination.clone())
            .with_progress(Some(0)),
        );

        let manager = self.clone();
        thread::spawn(move || manager.receive_offer(offer, destination));
    }

    fn receive_offer(&self, offer: PendingSendOffer, destination: PathBuf) {
        let (server_id, nick) = (offer.server_id.as_str(), offer.peer_nick.as_str());
        let entry = |state: TransferState, detail: String, progress: Option<u8>| {
            TransferStatusEntry::new(TransferKind::SendIn, nick, state, detail)
                .with_path(destination.clone())
                .with_progress(progress)
        };

        let result = transfer::connect(&offer, &self.inner.config).and_then(|mut stream| {
            let tracked = self.inner.active.track(&stream);
            self.upsert(
                server_id,
                entry(TransferState::Transferring, offer.file_name.clone(), Some(0)),
            );
            let received = transfer::receive_to_file(
                &mut stream,
                &destination,
                offer.size,
                &self.inner.config,
                |pct| {
                    self.upsert(
                        server_id,
                        entry(TransferState::Transferring, offer.file_name.clone(), Some(pct)),
                    )
                },
            );
            self.inner.active.untrack(tracked);
            received
        });

        match result {
            Ok(received) => {
                self.status(
                    server_id,
                    Some(nick),
                    format!(
                        "DCC GET complete: {} ({})",
                        offer.file_name,
                        human_size(received)
                    ),
                );
                self.upsert(
                    server_id,
                    entry(TransferState::Completed, human_size(received), Some(100)),
                );
            }
            Err(e) => {
                if self.is_shutting_down() {
                    return;
                }
                let state = match e {
                    DccError::Timeout => TransferState::TimedOut,
                    _ => TransferState::Failed,
                };
                self.error(
                    server_id,
                    Some(nick),
                    format!(
                        "DCC GET of {} from {} failed: {}. Type /dcc get {} to retry.",
                        offer.file_name, nick, e, nick
                    ),
                );
                self.upsert(
                    server_id,
                    entry(state, e.to_string(), None).with_hint(format!("/dcc get {}", nick)),
                );
                let file_name = offer.file_name.clone();
                if !self.inner.pending.restore_send(offer) {
                    debug!(
                        "[DCC - GET] Newer offer already pending, {} not restored",
                        file_name
                    );
                }
            }
        }
    }
}

// Listing
impl DccManager {
    fn list(&self, server_id: &str) {
        let inner = &self.inner;
        let sessions = inner.sessions.for_server(server_id);
        let listeners = inner.listeners.for_server(server_id);
        let chats = inner.pending.chats_for(server_id);
        let sends = inner.pending.sends_for(server_id);

        self.status(
            server_id,
            None,
            format!(
                "DCC: {} active chat(s), {} waiting offer(s), {} pending chat offer(s), {} pending file offer(s).",
                sessions.len(),
                listeners.len(),
                chats.len(),
                sends.len()
            ),
        );
        for session in sessions {
            self.status(
                server_id,
                None,
                format!("  chat with {}", session.peer_nick),
            );
        }
        for (direction, nick, port) in listeners {
            let what = match direction {
                Direction::Chat => "chat",
                Direction::Send => "file",
            };
            self.status(
                server_id,
                None,
                format!("  {} offer to {} waiting on port {}", what, nick, port),
            );
        }
        for offer in chats {
            self.status(
                server_id,
                None,
                format!(
                    "  chat offer from {} ({}:{})",
                    offer.peer_nick, offer.host, offer.port
                ),
            );
        }
        for offer in sends {
            self.status(
                server_id,
                None,
                format!(
                    "  file offer from {}: {} ({}) ({}:{})",
                    offer.peer_nick,
                    offer.file_name,
                    size_label(offer.size),
                    offer.host,
                    offer.port
                ),
            );
        }
    }
}

fn size_label(size: u64) -> String {
    match size {
        0 => "unknown size".to_owned(),
        s => human_size(s),
    }
}

/// Size of a regular file we are able to open, or a user-facing reason.
fn readable_file_size(path: &Path) -> Result<u64, String> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return Err(format!("File not found: {}", path.display())),
    };
    if !metadata.is_file() {
        return Err(format!("Not a regular file: {}", path.display()));
    }
    if let Err(e) = File::open(path) {
        return Err(format!("Cannot read {}: {}", path.display(), e));
    }
    Ok(metadata.len())
}
