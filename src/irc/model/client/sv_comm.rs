use std::io::{self, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::irc::dcc::IrcTransport;
use crate::try_lock;

/// Write half of the server connection, shared with the DCC subsystem.
#[derive(Debug)]
pub struct ServerLink {
    server_id: String,
    stream: Mutex<TcpStream>,
    connected: AtomicBool,
}

impl ServerLink {
    pub fn new(server_id: &str, stream: TcpStream) -> ServerLink {
        ServerLink {
            server_id: server_id.to_owned(),
            stream: Mutex::new(stream),
            connected: AtomicBool::new(true),
        }
    }

    pub fn write_to_sv(&self, line: &str) -> io::Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected to the server",
            ));
        }
        debug!("[CLIENT] -> {}", line);
        let mut stream = try_lock!(self.stream);
        let result = stream
            .write_all(format!("{}\r\n", line).as_bytes())
            .and_then(|_| stream.flush());
        if result.is_err() {
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = try_lock!(self.stream).shutdown(Shutdown::Both);
        }
    }
}

impl IrcTransport for ServerLink {
    fn is_connected(&self, server_id: &str) -> bool {
        server_id == self.server_id && self.connected.load(Ordering::SeqCst)
    }

    fn send_ctcp(&self, _server_id: &str, nick: &str, payload: &str) -> io::Result<()> {
        self.write_to_sv(&format!("PRIVMSG {} :{}", nick, payload))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::{Ipv4Addr, TcpListener};

    fn linked() -> (ServerLink, BufReader<TcpStream>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        let (server, _) = listener.accept().unwrap();
        (ServerLink::new("net", client), BufReader::new(server))
    }

    #[test]
    fn ctcp_goes_out_as_privmsg() {
        let (link, mut server) = linked();

        link.send_ctcp("net", "alice", "\u{1}DCC CHAT chat 2130706433 4000\u{1}")
            .unwrap();

        let mut line = String::new();
        server.read_line(&mut line).unwrap();
        assert_eq!(
            line,
            "PRIVMSG alice :\u{1}DCC CHAT chat 2130706433 4000\u{1}\r\n"
        );
    }

    #[test]
    fn disconnected_link_refuses_writes() {
        let (link, _server) = linked();
        assert!(link.is_connected("net"));
        assert!(!link.is_connected("elsewhere"));

        link.disconnect();

        assert!(!link.is_connected("net"));
        assert!(link.write_to_sv("PING :x").is_err());
    }
}
