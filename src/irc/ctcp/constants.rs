pub const CTCP_DELIMITER: char = '\u{1}';

pub const DCC: &str = "DCC";
pub const CHAT_VERB: &str = "CHAT";
pub const SEND_VERB: &str = "SEND";
pub const RESUME_VERB: &str = "RESUME";
pub const ACCEPT_VERB: &str = "ACCEPT";

// Redundant sub-token that follows CHAT on the wire.
pub const CHAT_PROTOCOL: &str = "chat";

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 65535;

pub const DEFAULT_FILE_NAME: &str = "download.bin";
pub const QUOTE: char = '"';
pub const QUOTE_REPLACEMENT: char = '_';
