#![forbid(unsafe_code)]

mod irc;
mod message;


use async_trait::async_trait;
use chatline_domain::ChannelName;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::Credential;

pub(crate) use irc::escape_tag_value;
pub use irc::{IrcMessage, IrcParseError};
pub use message::{EmoteSpan, PrivateMessage};

/// Errors surfaced by chat transports.
#[derive(Debug, Error)]
pub enum ChatError {
	#[error("connect failed: {0}")]
	Connect(String),

	#[error("authentication rejected: {0}")]
	Auth(String),

	#[error("not connected")]
	NotConnected,

	#[error("connection closed")]
	Closed,

	#[error("send failed: {0}")]
	Send(String),

	#[error("websocket error: {0}")]
	WebSocket(#[from] tungstenite::Error),

	#[error("timed out waiting for {0}")]
	Timeout(&'static str),

	#[error("invalid channel name {0:?}")]
	InvalidChannel(String),
}

/// Inbound events from a transport, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
	Connected,
	Message(Box<PrivateMessage>),
	Join { channel: ChannelName, user: String },
	Part { channel: ChannelName, user: String },
	Disconnected { reason: String },
}

pub type ChatEventTx = mpsc::Sender<ChatEvent>;
pub type ChatEventRx = mpsc::Receiver<ChatEvent>;

/// Extra attributes for an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SayAttributes {
	/// Message id to reply to.
	pub reply_to: Option<String>,
}

impl SayAttributes {
	pub fn reply(parent_id: impl Into<String>) -> Self {
		Self {
			reply_to: Some(parent_id.into()),
		}
	}
}

/// A single chat connection.
///
/// `join`/`part` never block: joins issued before `connect` completes are queued
/// and sent once the session is up.
#[async_trait]
pub trait ChatTransport: Send {
	async fn connect(&mut self) -> Result<(), ChatError>;

	fn join(&mut self, channel: &ChannelName) -> Result<(), ChatError>;

	fn part(&mut self, channel: &ChannelName) -> Result<(), ChatError>;

	async fn say(&mut self, channel: &ChannelName, text: &str, attrs: &SayAttributes) -> Result<(), ChatError>;

	/// The event stream. Yields `Some` exactly once.
	fn take_events(&mut self) -> Option<ChatEventRx>;

	async fn close(&mut self);
}

/// Builds transports for a credential; `None` means anonymous read-only.
pub trait TransportFactory: Send + Sync {
	fn create(&self, credential: Option<&Credential>) -> Box<dyn ChatTransport>;
}
