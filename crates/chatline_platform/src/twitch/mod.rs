#![forbid(unsafe_code)]

mod helix;
mod irc_transport;

#[cfg(test)]
mod helix_tests;

pub use helix::{HelixClient, HelixUser, TokenValidation, validate_user_token};
pub use irc_transport::{IrcConfig, IrcTransport, IrcTransportFactory};
