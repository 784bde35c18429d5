//! CTCP framing and the DCC offer codec.
//!
//! Only the DCC payload is handled here: the surrounding IRC message
//! (`PRIVMSG nick :\x01...\x01`) belongs to the IRC link.

use thiserror::Error;

pub mod constants;
pub mod message;
pub mod utils;

pub use message::{decode, encode_chat_offer, encode_send_offer, DccOffer};

/// Reasons an inbound CTCP payload is not a usable DCC offer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The payload does not start with the `DCC` word.
    #[error("not a DCC request")]
    NotDcc,

    #[error("missing parameters")]
    NeedMoreParams,

    #[error("too many parameters")]
    TooManyParams,

    #[error("invalid chat protocol: {0}")]
    InvalidProtocol(String),

    #[error("invalid host: {0}")]
    InvalidHost(String),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),
}

/// A DCC request that can be put on the wire.
pub trait DccMessage {
    /// The CTCP body, without the 0x01 delimiters.
    fn body(&self) -> String;

    fn to_ctcp(&self) -> String {
        utils::form_ctcp_cmd(&self.body())
    }
}
