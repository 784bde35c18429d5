use std::net::Ipv4Addr;
use std::str::FromStr;

use super::constants::{
    CTCP_DELIMITER, DEFAULT_FILE_NAME, MAX_PORT, MIN_PORT, QUOTE, QUOTE_REPLACEMENT,
};
use super::CodecError;

pub fn form_ctcp_cmd(body: &str) -> String {
    format!("{}{}{}", CTCP_DELIMITER, body, CTCP_DELIMITER)
}

/// Returns the text between the CTCP delimiters. The closing delimiter is
/// optional, some clients drop it.
pub fn get_ctcp_body(text: &str) -> Option<&str> {
    let inner = text.trim_end_matches(['\r', '\n']).strip_prefix(CTCP_DELIMITER)?;
    Some(inner.strip_suffix(CTCP_DELIMITER).unwrap_or(inner))
}

/// Splits on whitespace, keeping double-quoted segments together (quotes
/// removed). An unterminated quote runs to the end of the input.
pub fn split_quoted(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            QUOTE => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        tokens.push(current);
    }
    tokens
}

pub fn ip_to_u32(ip: Ipv4Addr) -> u32 {
    u32::from(ip)
}

/// Accepts a dotted literal or the legacy big-endian decimal form.
pub fn validate_host(h: Option<&str>) -> Result<Ipv4Addr, CodecError> {
    let host = h.ok_or(CodecError::NeedMoreParams)?;

    if let Ok(ip) = Ipv4Addr::from_str(host) {
        return Ok(ip);
    }

    match host.parse::<u32>() {
        Ok(packed) => Ok(Ipv4Addr::from(packed)),
        Err(_) => Err(CodecError::InvalidHost(host.to_owned())),
    }
}

pub fn validate_port(p: Option<&str>) -> Result<u16, CodecError> {
    let raw = p.ok_or(CodecError::NeedMoreParams)?;
    let port = raw
        .parse::<u32>()
        .map_err(|_| CodecError::InvalidPort(raw.to_owned()))?;

    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err(CodecError::InvalidPort(raw.to_owned()));
    }

    Ok(port as u16)
}

pub fn validate_size(s: Option<&str>) -> Result<u64, CodecError> {
    let raw = s.ok_or(CodecError::NeedMoreParams)?;
    raw.parse::<u64>()
        .map_err(|_| CodecError::InvalidSize(raw.to_owned()))
}

/// Keeps only the last path component, drops control characters and falls
/// back to `download.bin` when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return DEFAULT_FILE_NAME.to_owned();
    }
    cleaned.to_owned()
}

/// Sanitizes, replaces embedded quotes and, when the name holds whitespace,
/// wraps it in quotes.
pub fn quote_file_name(name: &str) -> String {
    let name = sanitize_file_name(name).replace(QUOTE, &QUOTE_REPLACEMENT.to_string());
    if !name.chars().any(char::is_whitespace) {
        return name;
    }
    format!("{}{}{}", QUOTE, name, QUOTE)
}

/// `12 B`, `1.5 KiB`, `3.0 MiB`...
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod test {

    mod test_ctcp_framing {
        use crate::irc::ctcp::utils::{form_ctcp_cmd, get_ctcp_body};

        #[test]
        fn body_between_delimiters() {
            let framed = form_ctcp_cmd("DCC CHAT chat 1 2");

            assert_eq!(get_ctcp_body(&framed), Some("DCC CHAT chat 1 2"));
            assert_eq!(get_ctcp_body("\u{1}VERSION"), Some("VERSION"));
            assert_eq!(get_ctcp_body("\u{1}PING 1\u{1}\r\n"), Some("PING 1"));
        }

        #[test]
        fn plain_text_is_not_ctcp() {
            assert!(get_ctcp_body("hello there").is_none());
            assert!(get_ctcp_body("").is_none());
        }
    }

    mod test_split_quoted {
        use crate::irc::ctcp::utils::split_quoted;

        #[test]
        fn quoted_segment_is_one_token() {
            let tokens = split_quoted("SEND \"my file.txt\" 1 2 3");

            assert_eq!(tokens, vec!["SEND", "my file.txt", "1", "2", "3"]);
        }

        #[test]
        fn repeated_whitespace_is_collapsed() {
            let tokens = split_quoted("  CHAT   chat\t1  2 ");

            assert_eq!(tokens, vec!["CHAT", "chat", "1", "2"]);
        }

        #[test]
        fn unterminated_quote_runs_to_end() {
            let tokens = split_quoted("SEND \"a b c");

            assert_eq!(tokens, vec!["SEND", "a b c"]);
        }

        #[test]
        fn empty_quotes_are_a_token() {
            assert_eq!(split_quoted("SEND \"\" 1"), vec!["SEND", "", "1"]);
        }
    }

    mod test_validate_host {
        use crate::irc::ctcp::utils::{ip_to_u32, validate_host};
        use crate::irc::ctcp::CodecError;
        use std::net::Ipv4Addr;

        #[test]
        fn packed_decimal_is_big_endian() {
            assert_eq!(
                validate_host(Some("3232235521")).unwrap(),
                Ipv4Addr::new(192, 168, 0, 1)
            );
            assert_eq!(ip_to_u32(Ipv4Addr::new(1, 2, 3, 4)), 0x01020304);
        }

        #[test]
        fn packing_edges() {
            assert_eq!(validate_host(Some("0")).unwrap(), Ipv4Addr::UNSPECIFIED);
            assert_eq!(
                validate_host(Some("4294967295")).unwrap(),
                Ipv4Addr::BROADCAST
            );
        }

        #[test]
        fn dotted_literal_is_accepted() {
            assert_eq!(
                validate_host(Some("10.0.0.7")).unwrap(),
                Ipv4Addr::new(10, 0, 0, 7)
            );
        }

        #[test]
        fn invalid_hosts() {
            assert_eq!(
                validate_host(Some("4294967296")),
                Err(CodecError::InvalidHost("4294967296".to_owned()))
            );
            assert!(validate_host(Some("1.2.3.")).is_err());
            assert!(validate_host(Some("::1")).is_err());
            assert_eq!(validate_host(None), Err(CodecError::NeedMoreParams));
        }
    }

    mod test_validate_port_and_size {
        use crate::irc::ctcp::utils::{validate_port, validate_size};
        use crate::irc::ctcp::CodecError;

        #[test]
        fn port_bounds() {
            assert_eq!(validate_port(Some("1")).unwrap(), 1);
            assert_eq!(validate_port(Some("65535")).unwrap(), 65535);
            assert_eq!(
                validate_port(Some("0")),
                Err(CodecError::InvalidPort("0".to_owned()))
            );
            assert!(validate_port(Some("65536")).is_err());
            assert!(validate_port(Some("port")).is_err());
        }

        #[test]
        fn size_must_be_non_negative() {
            assert_eq!(validate_size(Some("0")).unwrap(), 0);
            assert_eq!(validate_size(Some("12")).unwrap(), 12);
            assert_eq!(
                validate_size(Some("-1")),
                Err(CodecError::InvalidSize("-1".to_owned()))
            );
        }
    }

    mod test_file_names {
        use crate::irc::ctcp::utils::{quote_file_name, sanitize_file_name};

        #[test]
        fn directory_components_are_stripped() {
            assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
            assert_eq!(sanitize_file_name("C:\\Users\\me\\notes.txt"), "notes.txt");
        }

        #[test]
        fn control_characters_are_stripped() {
            assert_eq!(sanitize_file_name("bad\u{7}na\u{0}me.txt"), "badname.txt");
        }

        #[test]
        fn empty_falls_back_to_default() {
            assert_eq!(sanitize_file_name(""), "download.bin");
            assert_eq!(sanitize_file_name("dir/"), "download.bin");
            assert_eq!(sanitize_file_name(".."), "download.bin");
        }

        #[test]
        fn whitespace_names_are_quoted() {
            assert_eq!(quote_file_name("notes.txt"), "notes.txt");
            assert_eq!(quote_file_name("my notes.txt"), "\"my notes.txt\"");
            assert_eq!(quote_file_name("say \"hi\" now"), "\"say _hi_ now\"");
            assert_eq!(quote_file_name("a\"b.txt"), "a_b.txt");
        }
    }

    mod test_human_size {
        use crate::irc::ctcp::utils::human_size;

        #[test]
        fn units() {
            assert_eq!(human_size(12), "12 B");
            assert_eq!(human_size(1536), "1.5 KiB");
            assert_eq!(human_size(3 * 1024 * 1024), "3.0 MiB");
        }
    }
}
