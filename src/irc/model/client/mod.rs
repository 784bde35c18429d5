//! The terminal client: one server link, stdin for commands, stdout for
//! everything the server and the DCC subsystem have to say.

use std::net::TcpStream;
use std::sync::Arc;

use crate::irc::dcc::DccConfig;

use self::sv_comm::ServerLink;

pub mod create;
pub mod no_gui_runtime;
pub mod sv_comm;
pub mod terminal;

#[derive(Debug)]
pub struct Client {
    /// `host:port` of the server, used to key DCC state.
    pub server_id: String,
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub pass: Option<String>,
    pub link: Arc<ServerLink>,
    pub dcc: DccConfig,
    reader: TcpStream,
}
