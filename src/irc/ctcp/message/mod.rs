use std::net::Ipv4Addr;

use super::constants::{ACCEPT_VERB, CHAT_VERB, DCC, RESUME_VERB, SEND_VERB};
use super::utils::split_quoted;
use super::{CodecError, DccMessage};

use self::chat::DccChat;
use self::send::DccSend;

pub mod chat;
pub mod send;

/// A decoded DCC request.
#[derive(Debug, PartialEq, Eq)]
pub enum DccOffer {
    Chat(DccChat),
    Send(DccSend),
    /// RESUME, ACCEPT or any other verb this client does not implement.
    Unsupported(String),
}

/// Decodes a CTCP body such as `DCC SEND "a b.txt" 3232235521 5000 12`.
/// The leading `DCC` word is optional.
pub fn decode(ctcp_body: &str) -> Result<DccOffer, CodecError> {
    let mut tokens = split_quoted(ctcp_body);
    if tokens.is_empty() {
        return Err(CodecError::NotDcc);
    }
    if tokens[0].eq_ignore_ascii_case(DCC) {
        tokens.remove(0);
    }

    let verb = match tokens.first() {
        Some(v) => v.to_ascii_uppercase(),
        None => return Err(CodecError::NeedMoreParams),
    };
    let params = &tokens[1..];

    match verb.as_str() {
        CHAT_VERB => Ok(DccOffer::Chat(DccChat::parse(params)?)),
        SEND_VERB => Ok(DccOffer::Send(DccSend::parse(params)?)),
        RESUME_VERB | ACCEPT_VERB => Ok(DccOffer::Unsupported(verb)),
        _ => {
            tracing::debug!("[DCC - CODEC] Unknown DCC verb {}", verb);
            Ok(DccOffer::Unsupported(verb))
        }
    }
}

/// Returns true if the CTCP body is addressed to the DCC subsystem.
pub fn is_dcc(ctcp_body: &str) -> bool {
    ctcp_body
        .split_whitespace()
        .next()
        .map(|first| first.eq_ignore_ascii_case(DCC))
        .unwrap_or(false)
}

pub fn encode_chat_offer(ip: Ipv4Addr, port: u16) -> String {
    DccChat { host: ip, port }.to_ctcp()
}

pub fn encode_send_offer(file_name: &str, ip: Ipv4Addr, port: u16, size: u64) -> String {
    DccSend {
        file_name: file_name.to_owned(),
        host: ip,
        port,
        size,
    }
    .to_ctcp()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::irc::ctcp::utils::get_ctcp_body;

    fn decode_framed(framed: &str) -> DccOffer {
        decode(get_ctcp_body(framed).unwrap()).unwrap()
    }

    #[test]
    fn chat_offer_survives_the_wire() {
        let cases = [
            (Ipv4Addr::UNSPECIFIED, 1),
            (Ipv4Addr::new(192, 168, 0, 1), 6667),
            (Ipv4Addr::BROADCAST, 65535),
        ];

        for (ip, port) in cases {
            let offer = decode_framed(&encode_chat_offer(ip, port));
            assert_eq!(offer, DccOffer::Chat(DccChat { host: ip, port }));
        }
    }

    #[test]
    fn send_offer_survives_the_wire() {
        let cases = [
            ("notes.txt", Ipv4Addr::new(10, 1, 2, 3), 6667, 12),
            ("holiday photos.zip", Ipv4Addr::BROADCAST, 65535, 0),
            ("a", Ipv4Addr::UNSPECIFIED, 1, u64::from(u32::MAX) + 10),
        ];

        for (name, ip, port, size) in cases {
            let offer = decode_framed(&encode_send_offer(name, ip, port, size));
            assert_eq!(
                offer,
                DccOffer::Send(DccSend {
                    file_name: name.to_owned(),
                    host: ip,
                    port,
                    size,
                })
            );
        }
    }

    #[test]
    fn chat_wire_format() {
        let encoded = encode_chat_offer(Ipv4Addr::new(192, 168, 0, 1), 51000);

        assert_eq!(encoded, "\u{1}DCC CHAT chat 3232235521 51000\u{1}");
    }

    #[test]
    fn send_wire_format_quotes_spaces() {
        let encoded = encode_send_offer("my notes.txt", Ipv4Addr::new(127, 0, 0, 1), 4000, 12);

        assert_eq!(
            encoded,
            "\u{1}DCC SEND \"my notes.txt\" 2130706433 4000 12\u{1}"
        );
    }

    #[test]
    fn resume_and_accept_are_unsupported() {
        assert_eq!(
            decode("DCC RESUME file.txt 5000 100").unwrap(),
            DccOffer::Unsupported("RESUME".to_owned())
        );
        assert_eq!(
            decode("DCC accept file.txt 5000 100").unwrap(),
            DccOffer::Unsupported("ACCEPT".to_owned())
        );
        assert_eq!(
            decode("DCC TSEND x 1 2 3").unwrap(),
            DccOffer::Unsupported("TSEND".to_owned())
        );
    }

    #[test]
    fn embedded_quote_does_not_vanish_on_the_wire() {
        let offer = decode_framed(&encode_send_offer("a\"b.txt", Ipv4Addr::LOCALHOST, 4000, 3));

        match offer {
            DccOffer::Send(send) => assert_eq!(send.file_name, "a_b.txt"),
            other => panic!("unexpected offer {:?}", other),
        }
    }

    #[test]
    fn passive_send_is_rejected() {
        assert_eq!(
            decode("DCC SEND notes.txt 3232235521 0 12 77"),
            Err(CodecError::TooManyParams)
        );
        assert_eq!(
            decode("DCC SEND \"my notes.txt\" 3232235521 0 12 77"),
            Err(CodecError::TooManyParams)
        );
    }

    #[test]
    fn verbs_are_case_insensitive() {
        let offer = decode("dcc chat chat 2130706433 4000").unwrap();

        assert_eq!(
            offer,
            DccOffer::Chat(DccChat {
                host: Ipv4Addr::LOCALHOST,
                port: 4000
            })
        );
    }

    #[test]
    fn empty_payloads() {
        assert_eq!(decode(""), Err(CodecError::NotDcc));
        assert_eq!(decode("DCC"), Err(CodecError::NeedMoreParams));
    }

    #[test]
    fn is_dcc_checks_first_word() {
        assert!(is_dcc("DCC SEND a 1 2 3"));
        assert!(is_dcc("dcc chat"));
        assert!(!is_dcc("VERSION"));
        assert!(!is_dcc(""));
    }
}
