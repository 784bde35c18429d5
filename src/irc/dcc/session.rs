//! Live DCC CHAT connections, one per peer.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use super::{DccError, PeerKey};
use crate::try_lock;

#[derive(Debug)]
pub struct ChatSession {
    /// Tells replaced sessions apart in logs.
    pub id: usize,
    pub server_id: String,
    pub peer_nick: String,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    closing: AtomicBool,
}

/// Why a read loop stopped.
#[derive(Debug)]
pub enum SessionEnd {
    LocalClose,
    PeerClosed,
    Lost(io::Error),
}

impl ChatSession {
    /// Wraps an established connection. Returns the session and the stream
    /// half reserved for the read loop.
    pub fn start(
        server_id: &str,
        peer_nick: &str,
        stream: TcpStream,
        write_timeout: Duration,
    ) -> Result<(Arc<Self>, TcpStream), DccError> {
        stream.set_write_timeout(Some(write_timeout))?;
        stream.set_read_timeout(None)?;
        let _ = stream.set_nodelay(true);

        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;

        let session = Arc::new(Self {
            id: rand::random::<usize>(),
            server_id: server_id.to_owned(),
            peer_nick: peer_nick.to_owned(),
            writer: Mutex::new(stream),
            control,
            closing: AtomicBool::new(false),
        });
        Ok((session, reader))
    }

    pub fn key(&self) -> PeerKey {
        PeerKey::new(&self.server_id, &self.peer_nick)
    }

    /// Writes one `\r\n`-terminated line. Lines never interleave.
    pub fn write_line(&self, text: &str) -> Result<(), DccError> {
        let line = format!("{}\r\n", text.trim_end_matches(['\r', '\n']));
        let mut writer = try_lock!(self.writer);
        writer.write_all(line.as_bytes()).map_err(DccError::from_io)?;
        writer.flush().map_err(DccError::from_io)?;
        Ok(())
    }

    /// Marks the session as closed by us, then shuts the socket down so the
    /// read loop wakes up without reporting a failure.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(
            "[DCC - CHAT] Closing session {} with {}",
            self.id, self.peer_nick
        );
        let _ = self.control.shutdown(Shutdown::Both);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Forwards every received line (CR and LF stripped) until the stream
    /// ends.
    pub fn read_lines<F>(&self, reader: TcpStream, mut on_line: F) -> SessionEnd
    where
        F: FnMut(String),
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        let end = loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break SessionEnd::PeerClosed,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    on_line(String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break SessionEnd::Lost(e),
            }
        };

        if self.is_closing() {
            return SessionEnd::LocalClose;
        }
        end
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<PeerKey, Arc<ChatSession>>,
}

impl SessionRegistry {
    /// Registers `session`, closing the one it replaces.
    pub fn replace(&self, session: Arc<ChatSession>) {
        if let Some(previous) = self.sessions.insert(session.key(), session) {
            previous.close();
        }
    }

    pub fn get(&self, key: &PeerKey) -> Option<Arc<ChatSession>> {
        self.sessions.get(key).map(|s| s.value().clone())
    }

    pub fn remove(&self, key: &PeerKey) -> Option<Arc<ChatSession>> {
        self.sessions.remove(key).map(|(_, s)| s)
    }

    /// Unregisters `session` only if it has not been replaced.
    pub fn remove_if_same(&self, session: &Arc<ChatSession>) -> bool {
        self.sessions
            .remove_if(&session.key(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    pub fn for_server(&self, server_id: &str) -> Vec<Arc<ChatSession>> {
        self.sessions
            .iter()
            .filter(|e| e.key().server_id == server_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
        self.sessions.clear();
    }
}
