use std::io::{BufRead, BufReader};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::sv_comm::ServerLink;
use super::terminal::TerminalUi;
use super::Client;
use crate::irc::ctcp::utils::get_ctcp_body;
use crate::irc::dcc::DccManager;
use crate::irc::model::line::IrcLine;
use crate::irc::model::ConnectionError;

/// What a line typed by the user asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Dcc(String),
    Msg(String, String),
    Quit(Option<String>),
    Raw(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Input {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let command = match line.strip_prefix('/') {
            Some(c) => c,
            None => return Input::Raw(line.to_owned()),
        };

        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        let rest = rest.trim();
        match verb.to_ascii_lowercase().as_str() {
            "dcc" => Input::Dcc(rest.to_owned()),
            "quit" => Input::Quit((!rest.is_empty()).then(|| rest.to_owned())),
            "msg" => match rest.split_once(' ') {
                Some((nick, text)) if !text.trim().is_empty() => {
                    Input::Msg(nick.to_owned(), text.trim().to_owned())
                }
                _ => Input::Raw(command.to_owned()),
            },
            _ => Input::Raw(command.to_owned()),
        }
    }
}

/// What a line from the server needs from us.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Ping(String),
    Ctcp { from: String, body: String },
    Print,
}

impl Inbound {
    pub fn classify(line: &IrcLine) -> Inbound {
        match line.command.as_str() {
            "PING" => Inbound::Ping(line.trailing().unwrap_or_default().to_owned()),
            "PRIVMSG" | "NOTICE" => {
                let ctcp = line.trailing().and_then(get_ctcp_body);
                match (line.sender_nick(), ctcp) {
                    (Some(from), Some(body)) => Inbound::Ctcp {
                        from: from.to_owned(),
                        body: body.to_owned(),
                    },
                    _ => Inbound::Print,
                }
            }
            _ => Inbound::Print,
        }
    }
}

impl Client {
    pub fn client_run<R: BufRead>(self, input: R) -> Result<(), ConnectionError> {
        self.register()?;

        let ui = Arc::new(TerminalUi::new(&self.nickname));
        let manager = DccManager::new(
            self.dcc.clone(),
            self.link.clone(),
            ui.clone(),
            ui.clone(),
        );
        let listener = self.client_listen(manager.clone())?;

        for line in input.lines().map_while(Result::ok) {
            let outcome = match Input::parse(&line) {
                Input::Empty => Ok(()),
                Input::Dcc(args) => {
                    manager.handle_command(Some(&self.server_id), &args);
                    Ok(())
                }
                Input::Msg(nick, text) => {
                    self.link.write_to_sv(&format!("PRIVMSG {} :{}", nick, text))
                }
                Input::Raw(raw) => self.link.write_to_sv(&raw),
                Input::Quit(reason) => {
                    let reason = reason.unwrap_or_else(|| "Leaving".to_owned());
                    let _ = self.link.write_to_sv(&format!("QUIT :{}", reason));
                    break;
                }
            };
            if let Err(e) = outcome {
                warn!("[CLIENT] Can't write to server: {}", e);
                break;
            }
        }

        manager.shutdown();
        self.link.disconnect();
        let tid = listener.thread().id();
        if listener.join().is_err() {
            warn!("[CLIENT - THREAD MANAGEMENT] Couldn't clean thread {:?}", tid);
        }
        Ok(())
    }

    fn register(&self) -> Result<(), ConnectionError> {
        if let Some(pass) = &self.pass {
            self.link.write_to_sv(&format!("PASS {}", pass))?;
        }
        self.link.write_to_sv(&format!("NICK {}", self.nickname))?;
        self.link.write_to_sv(&format!(
            "USER {} 0 * :{}",
            self.username, self.realname
        ))?;
        info!("[CLIENT] Registering as {}", self.nickname);
        Ok(())
    }

    fn client_listen(&self, manager: DccManager) -> Result<JoinHandle<()>, ConnectionError> {
        let stream = self.take_reader()?;
        let link = self.link.clone();
        let server_id = self.server_id.clone();

        Ok(thread::spawn(move || {
            read_server(stream, &server_id, &link, &manager);
            link.disconnect();
        }))
    }
}

fn read_server(stream: TcpStream, server_id: &str, link: &ServerLink, manager: &DccManager) {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                debug!("[CLIENT] Read from server failed: {}", e);
                break;
            }
        };
        let parsed = match IrcLine::parse(&line) {
            Some(p) => p,
            None => continue,
        };

        match Inbound::classify(&parsed) {
            Inbound::Ping(token) => {
                if let Err(e) = link.write_to_sv(&format!("PONG :{}", token)) {
                    warn!("[CLIENT] Can't answer PING: {}", e);
                }
            }
            Inbound::Ctcp { from, body } => {
                if !manager.handle_ctcp(server_id, &from, &body) {
                    println!("[{}] CTCP {} from {}", server_id, body, from);
                }
            }
            Inbound::Print => println!("{}", line),
        }
    }
    println!("Disconnected from the server. Terminating");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dcc_lines_go_to_the_router() {
        assert_eq!(
            Input::parse("/dcc send bob ~/notes.txt"),
            Input::Dcc("send bob ~/notes.txt".to_owned())
        );
        assert_eq!(Input::parse("/DCC"), Input::Dcc(String::new()));
    }

    #[test]
    fn other_input() {
        assert_eq!(Input::parse("   "), Input::Empty);
        assert_eq!(
            Input::parse("/msg alice hello there"),
            Input::Msg("alice".to_owned(), "hello there".to_owned())
        );
        assert_eq!(Input::parse("/quit"), Input::Quit(None));
        assert_eq!(
            Input::parse("/join #rust"),
            Input::Raw("join #rust".to_owned())
        );
        assert_eq!(
            Input::parse("JOIN #rust"),
            Input::Raw("JOIN #rust".to_owned())
        );
    }

    #[test]
    fn ctcp_privmsg_is_picked_out() {
        let line =
            IrcLine::parse(":alice!a@h PRIVMSG bob :\u{1}DCC SEND notes.txt 3232235521 51000 12\u{1}")
                .unwrap();

        assert_eq!(
            Inbound::classify(&line),
            Inbound::Ctcp {
                from: "alice".to_owned(),
                body: "DCC SEND notes.txt 3232235521 51000 12".to_owned(),
            }
        );
    }

    #[test]
    fn ping_and_plain_traffic() {
        let ping = IrcLine::parse("PING :irc.example.net").unwrap();
        assert_eq!(
            Inbound::classify(&ping),
            Inbound::Ping("irc.example.net".to_owned())
        );

        let chat = IrcLine::parse(":alice!a@h PRIVMSG bob :hello").unwrap();
        assert_eq!(Inbound::classify(&chat), Inbound::Print);
    }
}
