//! Direct Client-to-Client (DCC) chat and file transfer for an IRC client.
//!
//! Offers travel as CTCP payloads over the IRC link (see [`irc::ctcp`]); once
//! accepted, chat lines and file bytes flow over a raw TCP connection between
//! the two peers (see [`irc::dcc`]).

pub mod irc;
