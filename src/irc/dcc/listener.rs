//! Listening sockets for our own offers.
//!
//! At most one listener is registered per (direction, peer). Registering a new
//! one closes the one it displaces, and a waiting task only unregisters the
//! listener it owns, so a late timeout never removes a newer offer.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::{DccError, Direction, PeerKey};
use crate::try_lock;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub type ListenerKey = (Direction, PeerKey);

#[derive(Debug)]
pub struct DccListener {
    /// `None` once closed: the socket is dropped right away.
    listener: Mutex<Option<TcpListener>>,
    port: u16,
    deadline: Instant,
    closed: AtomicBool,
}

impl DccListener {
    /// Binds an ephemeral port on every interface.
    pub fn open(accept_timeout: Duration) -> Result<Arc<Self>, DccError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();

        Ok(Arc::new(Self {
            listener: Mutex::new(Some(listener)),
            port,
            deadline: Instant::now() + accept_timeout,
            closed: AtomicBool::new(false),
        }))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            drop(try_lock!(self.listener).take());
            debug!("[DCC - LISTENER] Closed listener on port {}", self.port);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for one peer until the accept deadline. Fails with
    /// [`DccError::Cancelled`] once the listener has been closed.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), DccError> {
        loop {
            let accepted = match try_lock!(self.listener).as_ref() {
                Some(listener) => listener.accept(),
                None => return Err(DccError::Cancelled),
            };

            match accepted {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(false)?;
                    return Ok((stream, addr));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= self.deadline {
                        return Err(DccError::Timeout);
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(DccError::Io(e)),
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerKey, Arc<DccListener>>,
}

impl ListenerRegistry {
    /// Opens a listener and registers it for `key`, closing any previous one.
    pub fn open_listener(
        &self,
        direction: Direction,
        key: &PeerKey,
        accept_timeout: Duration,
    ) -> Result<Arc<DccListener>, DccError> {
        let listener = DccListener::open(accept_timeout)?;
        self.replace(direction, key, listener.clone());
        Ok(listener)
    }

    pub fn replace(&self, direction: Direction, key: &PeerKey, listener: Arc<DccListener>) {
        if let Some(previous) = self.listeners.insert((direction, key.clone()), listener) {
            previous.close();
        }
    }

    /// Unregisters `listener` only if it is still the registered one, then
    /// closes it either way.
    pub fn release(&self, direction: Direction, key: &PeerKey, listener: &Arc<DccListener>) {
        self.listeners
            .remove_if(&(direction, key.clone()), |_, current| {
                Arc::ptr_eq(current, listener)
            });
        listener.close();
    }

    pub fn get(&self, direction: Direction, key: &PeerKey) -> Option<Arc<DccListener>> {
        self.listeners
            .get(&(direction, key.clone()))
            .map(|entry| entry.value().clone())
    }

    pub fn for_server(&self, server_id: &str) -> Vec<(Direction, String, u16)> {
        self.listeners
            .iter()
            .filter(|entry| entry.key().1.server_id == server_id)
            .map(|entry| (entry.key().0, entry.key().1.nick.clone(), entry.value().port()))
            .collect()
    }

    pub fn close_all(&self) {
        for entry in self.listeners.iter() {
            entry.value().close();
        }
        self.listeners.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(nick: &str) -> PeerKey {
        PeerKey::new("net", nick)
    }

    #[test]
    fn replacing_closes_the_previous_listener() {
        let registry = ListenerRegistry::default();
        let first = registry
            .open_listener(Direction::Chat, &key("bob"), Duration::from_secs(5))
            .unwrap();
        let second = registry
            .open_listener(Direction::Chat, &key("Bob"), Duration::from_secs(5))
            .unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert!(Arc::ptr_eq(
            &registry.get(Direction::Chat, &key("bob")).unwrap(),
            &second
        ));
    }

    #[test]
    fn replaced_listener_stops_taking_connections() {
        let registry = ListenerRegistry::default();
        let first = registry
            .open_listener(Direction::Send, &key("bob"), Duration::from_secs(5))
            .unwrap();
        let old_port = first.port();
        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, old_port)).is_ok());

        registry
            .open_listener(Direction::Send, &key("bob"), Duration::from_secs(5))
            .unwrap();

        assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, old_port)).is_err());
        assert!(matches!(first.accept(), Err(DccError::Cancelled)));
    }

    #[test]
    fn directions_are_independent() {
        let registry = ListenerRegistry::default();
        let chat = registry
            .open_listener(Direction::Chat, &key("bob"), Duration::from_secs(5))
            .unwrap();
        let send = registry
            .open_listener(Direction::Send, &key("bob"), Duration::from_secs(5))
            .unwrap();

        assert!(!chat.is_closed());
        assert!(!send.is_closed());
        assert_eq!(registry.for_server("net").len(), 2);
    }

    #[test]
    fn release_of_superseded_listener_keeps_the_newer_one() {
        let registry = ListenerRegistry::default();
        let old = registry
            .open_listener(Direction::Send, &key("bob"), Duration::from_secs(5))
            .unwrap();
        let new = registry
            .open_listener(Direction::Send, &key("bob"), Duration::from_secs(5))
            .unwrap();

        registry.release(Direction::Send, &key("bob"), &old);

        assert!(Arc::ptr_eq(
            &registry.get(Direction::Send, &key("bob")).unwrap(),
            &new
        ));
        assert!(!new.is_closed());

        registry.release(Direction::Send, &key("bob"), &new);
        assert!(registry.get(Direction::Send, &key("bob")).is_none());
        assert!(new.is_closed());
    }

    #[test]
    fn accept_times_out() {
        let listener = DccListener::open(Duration::from_millis(150)).unwrap();

        assert!(matches!(listener.accept(), Err(DccError::Timeout)));
    }

    #[test]
    fn closing_interrupts_accept() {
        let listener = DccListener::open(Duration::from_secs(30)).unwrap();
        let waiting = listener.clone();
        let handle = thread::spawn(move || waiting.accept());

        listener.close();

        assert!(matches!(handle.join().unwrap(), Err(DccError::Cancelled)));
    }

    #[test]
    fn accept_hands_back_a_blocking_stream() {
        let listener = DccListener::open(Duration::from_secs(5)).unwrap();
        let port = listener.port();
        let client = thread::spawn(move || TcpStream::connect((Ipv4Addr::LOCALHOST, port)));

        let (stream, _) = listener.accept().unwrap();

        assert!(client.join().unwrap().is_ok());
        assert!(stream.set_read_timeout(Some(Duration::from_millis(10))).is_ok());
    }

    #[test]
    fn close_all_empties_the_registry() {
        let registry = ListenerRegistry::default();
        let l = registry
            .open_listener(Direction::Chat, &key("bob"), Duration::from_secs(5))
            .unwrap();

        registry.close_all();

        assert!(l.is_closed());
        assert!(registry.for_server("net").is_empty());
    }
}
