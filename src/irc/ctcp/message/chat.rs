use std::net::Ipv4Addr;

use crate::irc::ctcp::constants::{CHAT_PROTOCOL, CHAT_VERB, DCC};
use crate::irc::ctcp::utils::{ip_to_u32, validate_host, validate_port};
use crate::irc::ctcp::{CodecError, DccMessage};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DccChat {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl DccChat {
    /// Parses the parameters after `CHAT`: `chat <host> <port>` or just
    /// `<host> <port>`.
    pub fn parse(params: &[String]) -> Result<Self, CodecError> {
        let rest = match params.len() {
            0 | 1 => return Err(CodecError::NeedMoreParams),
            2 => params,
            3 => {
                validate_protocol(&params[0])?;
                &params[1..]
            }
            _ => return Err(CodecError::TooManyParams),
        };

        let host = validate_host(rest.first().map(String::as_str))?;
        let port = validate_port(rest.get(1).map(String::as_str))?;

        Ok(Self { host, port })
    }
}

impl DccMessage for DccChat {
    fn body(&self) -> String {
        format!(
            "{} {} {} {} {}",
            DCC,
            CHAT_VERB,
            CHAT_PROTOCOL,
            ip_to_u32(self.host),
            self.port
        )
    }
}

fn validate_protocol(protocol: &str) -> Result<(), CodecError> {
    if !protocol.eq_ignore_ascii_case(CHAT_PROTOCOL) {
        return Err(CodecError::InvalidProtocol(protocol.to_owned()));
    }
    Ok(())
}
