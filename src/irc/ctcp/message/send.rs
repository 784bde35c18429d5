use std::net::Ipv4Addr;

use crate::irc::ctcp::constants::{DCC, SEND_VERB};
use crate::irc::ctcp::utils::{
    ip_to_u32, quote_file_name, sanitize_file_name, validate_host, validate_port, validate_size,
};
use crate::irc::ctcp::{CodecError, DccMessage};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DccSend {
    /// Already sanitized: never holds directory components.
    pub file_name: String,
    pub host: Ipv4Addr,
    pub port: u16,
    /// Advertised length, 0 when the sender did not know it.
    pub size: u64,
}

impl DccSend {
    /// Parses the parameters after `SEND`: `<filename> <host> <port> <size>`.
    ///
    /// Unquoted names with spaces are tolerated: everything before the last
    /// three parameters is taken as the file name. Offers carrying a trailing
    /// token after `<host> <port> <size>` (passive DCC) are refused.
    pub fn parse(params: &[String]) -> Result<Self, CodecError> {
        if params.len() < 4 {
            return Err(CodecError::NeedMoreParams);
        }
        if params.len() > 4 && has_trailing_token(params) {
            return Err(CodecError::TooManyParams);
        }

        let split = params.len() - 3;
        let file_name = sanitize_file_name(&params[..split].join(" "));
        let host = validate_host(params.get(split).map(String::as_str))?;
        let port = validate_port(params.get(split + 1).map(String::as_str))?;
        let size = validate_size(params.get(split + 2).map(String::as_str))?;

        Ok(Self {
            file_name,
            host,
            port,
            size,
        })
    }
}

/// True when `<host> <port>` sit one slot earlier than expected, which means
/// a token follows the size.
fn has_trailing_token(params: &[String]) -> bool {
    let n = params.len();
    validate_host(Some(&params[n - 4])).is_ok() && params[n - 3].parse::<u16>().is_ok()
}

impl DccMessage for DccSend {
    fn body(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            DCC,
            SEND_VERB,
            quote_file_name(&self.file_name),
            ip_to_u32(self.host),
            self.port,
            self.size
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::irc::ctcp::utils::split_quoted;

    #[test]
    fn test_send_no_params_error() {
        let err = DccSend::parse(&split_quoted("")).unwrap_err();

        assert_eq!(err, CodecError::NeedMoreParams);
    }

    #[test]
    fn test_send_less_needed_params_error() {
        let err = DccSend::parse(&split_quoted("file_name 2130706433 4000")).unwrap_err();

        assert_eq!(err, CodecError::NeedMoreParams);
    }

    #[test]
    fn test_send_all_params_ok() {
        let send = DccSend::parse(&split_quoted("\"notes.txt\" 3232235521 51000 12")).unwrap();

        assert_eq!(send.file_name, "notes.txt");
        assert_eq!(send.host, Ipv4Addr::new(192, 168, 0, 1));
        assert_eq!(send.port, 51000);
        assert_eq!(send.size, 12);
    }

    #[test]
    fn test_send_quoted_name_with_spaces() {
        let send = DccSend::parse(&split_quoted("\"my notes.txt\" 1.2.3.4 9290 32")).unwrap();

        assert_eq!(send.file_name, "my notes.txt");
    }

    #[test]
    fn test_send_unquoted_name_with_spaces() {
        let send = DccSend::parse(&split_quoted("my notes.txt 1.2.3.4 9290 32")).unwrap();

        assert_eq!(send.file_name, "my notes.txt");
        assert_eq!(send.size, 32);
    }

    #[test]
    fn test_send_passive_form_error() {
        let err = DccSend::parse(&split_quoted("notes.txt 3232235521 0 12 77")).unwrap_err();

        assert_eq!(err, CodecError::TooManyParams);
    }

    #[test]
    fn test_send_name_is_sanitized() {
        let send = DccSend::parse(&split_quoted("../../.bashrc 1.2.3.4 9290 32")).unwrap();

        assert_eq!(send.file_name, ".bashrc");
    }

    #[test]
    fn test_send_invalid_ip_error() {
        let err = DccSend::parse(&split_quoted("fileName .1.2.3.5 9290 64")).unwrap_err();

        assert_eq!(err, CodecError::InvalidHost(".1.2.3.5".to_owned()));
    }

    #[test]
    fn test_send_invalid_port_error() {
        let err = DccSend::parse(&split_quoted("fileName 1.2.3.5 0 64")).unwrap_err();

        assert_eq!(err, CodecError::InvalidPort("0".to_owned()));
    }

    #[test]
    fn test_send_negative_size_error() {
        let err = DccSend::parse(&split_quoted("fileName 1.2.3.5 9290 -64")).unwrap_err();

        assert_eq!(err, CodecError::InvalidSize("-64".to_owned()));
    }
}
