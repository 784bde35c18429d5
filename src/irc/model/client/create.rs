use std::net::{Ipv4Addr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::sv_comm::ServerLink;
use super::Client;
use crate::irc::dcc::DccConfig;
use crate::irc::model::{ConnectionError, CLIENT_ARGS, CLIENT_IP_POS, CLIENT_PORT_POS};

/// `client <host> <port> [--nick N] [--pass P] [--download-dir DIR] [--advertise-ip A.B.C.D]`
#[derive(Debug, PartialEq, Eq)]
pub struct ClientArgs {
    pub host: String,
    pub port: u16,
    pub nick: Option<String>,
    pub pass: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub advertise_ip: Option<Ipv4Addr>,
}

impl ClientArgs {
    pub fn parse(argv: &[String]) -> Result<ClientArgs, ConnectionError> {
        if argv.len() < CLIENT_ARGS {
            return Err(ConnectionError::InvalidArguments(
                "expected client <host> <port>".to_owned(),
            ));
        }

        let port = argv[CLIENT_PORT_POS].parse::<u16>().map_err(|_| {
            ConnectionError::InvalidArguments(format!("bad port {}", argv[CLIENT_PORT_POS]))
        })?;
        let mut args = ClientArgs {
            host: argv[CLIENT_IP_POS].clone(),
            port,
            nick: None,
            pass: None,
            download_dir: None,
            advertise_ip: None,
        };

        let mut rest = argv[CLIENT_ARGS..].iter();
        while let Some(flag) = rest.next() {
            let value = rest.next().ok_or_else(|| {
                ConnectionError::InvalidArguments(format!("{} needs a value", flag))
            })?;
            match flag.as_str() {
                "--nick" => args.nick = Some(value.clone()),
                "--pass" => args.pass = Some(value.clone()),
                "--download-dir" => args.download_dir = Some(PathBuf::from(value)),
                "--advertise-ip" => {
                    args.advertise_ip = Some(value.parse().map_err(|_| {
                        ConnectionError::InvalidArguments(format!("bad IPv4 address {}", value))
                    })?)
                }
                other => {
                    return Err(ConnectionError::InvalidArguments(format!(
                        "unknown option {}",
                        other
                    )))
                }
            }
        }
        Ok(args)
    }

    pub fn dcc_config(&self) -> DccConfig {
        let mut config = DccConfig::default();
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        config.advertise_ip = self.advertise_ip;
        config
    }
}

impl Client {
    pub fn create_fromargs(argv: Vec<String>) -> Result<Client, ConnectionError> {
        let args = ClientArgs::parse(&argv)?;
        let stream = TcpStream::connect((args.host.as_str(), args.port))?;
        info!("[CLIENT] Connected to {}:{}", args.host, args.port);

        let nickname = args.nick.clone().unwrap_or_else(Client::random_nick);
        Client::create_fromtcp(stream, &args, nickname)
    }

    pub fn create_fromtcp(
        tcp: TcpStream,
        args: &ClientArgs,
        nickname: String,
    ) -> Result<Client, ConnectionError> {
        let server_id = format!("{}:{}", args.host, args.port);
        let reader = tcp.try_clone()?;

        Ok(Client {
            link: Arc::new(ServerLink::new(&server_id, tcp)),
            server_id,
            username: nickname.clone(),
            realname: nickname.clone(),
            nickname,
            pass: args.pass.clone(),
            dcc: args.dcc_config(),
            reader,
        })
    }

    pub fn random_nick() -> String {
        format!("guest{}", rand::random::<u16>())
    }

    pub(super) fn take_reader(&self) -> std::io::Result<TcpStream> {
        self.reader.try_clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn argv(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn host_and_port_are_enough() {
        let args = ClientArgs::parse(&argv(&["irc-dcc", "client", "irc.example.net", "6667"]))
            .unwrap();

        assert_eq!(args.host, "irc.example.net");
        assert_eq!(args.port, 6667);
        assert_eq!(args.nick, None);
        assert_eq!(args.dcc_config().advertise_ip, None);
    }

    #[test]
    fn options_fill_the_dcc_config() {
        let args = ClientArgs::parse(&argv(&[
            "irc-dcc",
            "client",
            "127.0.0.1",
            "6667",
            "--nick",
            "bob",
            "--download-dir",
            "/tmp/in",
            "--advertise-ip",
            "203.0.113.7",
        ]))
        .unwrap();

        let config = args.dcc_config();
        assert_eq!(args.nick.as_deref(), Some("bob"));
        assert_eq!(config.download_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.advertise_ip, Some(Ipv4Addr::new(203, 0, 113, 7)));
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(ClientArgs::parse(&argv(&["irc-dcc", "client", "host"])).is_err());
        assert!(ClientArgs::parse(&argv(&["irc-dcc", "client", "host", "port"])).is_err());
        assert!(
            ClientArgs::parse(&argv(&["irc-dcc", "client", "host", "1", "--nick"])).is_err()
        );
        assert!(ClientArgs::parse(&argv(&[
            "irc-dcc",
            "client",
            "host",
            "1",
            "--advertise-ip",
            "::1"
        ]))
        .is_err());
    }
}
