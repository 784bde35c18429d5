//! Terminal IRC client that carries DCC offers over its server link.

use std::io;

use thiserror::Error;

pub mod client;
pub mod line;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("connection failed: {0}")]
    Io(#[from] io::Error),
}

pub const WHAT_TO_RUN_POS: usize = 1;

static CLIENT_ARGS: usize = 4; // Junk + WHAT TO RUN + Host + Port
pub const CLIENT_IP_POS: usize = 2;
pub const CLIENT_PORT_POS: usize = 3;
