#![forbid(unsafe_code)]

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chatline_domain::ChannelName;
use chatline_platform::chat::{ChatError, ChatEvent, ChatEventRx, ChatTransport, PrivateMessage, SayAttributes, TransportFactory};
use chatline_platform::{Credential, SharedCredential};
use tracing::{debug, info, warn};

use crate::credential::CredentialRotator;

/// Receives `(text, raw message)` for a subscribed channel.
pub type MessageHandler = Box<dyn FnMut(&str, &PrivateMessage) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxConfig {
	/// Re-join every subscribed channel on the new connection after a credential change.
	pub rejoin_on_credential_change: bool,
}

/// The live connection. Join state belongs to it and dies with it.
struct Connection {
	transport: Box<dyn ChatTransport>,
	joined: HashSet<ChannelName>,
}

impl Connection {
	fn new(transport: Box<dyn ChatTransport>) -> Self {
		Self {
			transport,
			joined: HashSet::new(),
		}
	}
}

/// Routes inbound chat messages to per-channel handlers over one connection.
///
/// Joining and subscribing are tracked separately: a channel stays joined after
/// `unsubscribe`, and messages for it are dropped until it is subscribed again.
/// After [`ChatMultiplexer::set_credential`] the subscription bookkeeping is kept
/// but the new connection has joined nothing (unless `rejoin_on_credential_change`
/// is set); calling `subscribe` again re-joins.
pub struct ChatMultiplexer {
	cfg: MuxConfig,
	rotator: CredentialRotator,
	conn: Connection,
	events: Option<ChatEventRx>,
	joined: HashSet<ChannelName>,
	subscribed: HashSet<ChannelName>,
	handlers: HashMap<ChannelName, MessageHandler>,
}

impl ChatMultiplexer {
	/// Connect with the credential currently held in `credential`.
	pub async fn start(
		factory: Arc<dyn TransportFactory>,
		credential: SharedCredential,
		cfg: MuxConfig,
	) -> Result<Self, ChatError> {
		let rotator = CredentialRotator::new(factory, credential);
		let active = rotator.credential();
		let mut transport = rotator.open(active.as_ref()).await?;
		let events = transport.take_events();
		info!(authenticated = active.is_some(), "chat connection established");

		Ok(Self {
			cfg,
			rotator,
			conn: Connection::new(transport),
			events,
			joined: HashSet::new(),
			subscribed: HashSet::new(),
			handlers: HashMap::new(),
		})
	}

	/// Join `channel` if this connection has not, then deliver its messages to `handler`.
	///
	/// A second call replaces the handler without issuing another join.
	pub fn subscribe(&mut self, channel: &str, handler: MessageHandler) -> Result<(), ChatError> {
		let channel = ChannelName::new(channel);
		if channel.as_str().is_empty() {
			return Err(ChatError::InvalidChannel(channel.into_string()));
		}

		if !self.conn.joined.contains(&channel) {
			self.conn.transport.join(&channel)?;
			self.conn.joined.insert(channel.clone());
			self.joined.insert(channel.clone());
			debug!(channel = %channel, "join issued");
		}

		self.subscribed.insert(channel.clone());
		self.handlers.insert(channel.clone(), handler);
		debug!(channel = %channel, "subscribed");
		Ok(())
	}

	/// Stop delivering messages for `channel`. The channel stays joined and the
	/// handler stays installed.
	pub fn unsubscribe(&mut self, channel: &str) {
		let channel = ChannelName::new(channel);
		if self.subscribed.remove(&channel) {
			debug!(channel = %channel, "unsubscribed");
		}
	}

	/// Deliver one inbound message. Returns whether a handler ran.
	pub fn dispatch(&mut self, channel: &str, user: &str, text: &str, raw: &PrivateMessage) -> bool {
		let channel = ChannelName::new(channel);

		if !self.subscribed.contains(&channel) {
			debug!(channel = %channel, user, "dropping message for unsubscribed channel");
			metrics::counter!("chatline_messages_dropped_total", "reason" => "unsubscribed").increment(1);
			return false;
		}

		let Some(handler) = self.handlers.get_mut(&channel) else {
			warn!(channel = %channel, user, "subscribed channel has no handler; dropping message");
			metrics::counter!("chatline_messages_dropped_total", "reason" => "no_handler").increment(1);
			return false;
		};

		handler(text, raw);
		metrics::counter!("chatline_messages_dispatched_total").increment(1);
		true
	}

	/// Replace the connection with one built for `credential`.
	///
	/// The new connection is brought up first; on failure the error is returned
	/// and the current connection and all bookkeeping are left untouched.
	pub async fn set_credential(&mut self, credential: Option<Credential>) -> Result<(), ChatError> {
		let rejoin = self.cfg.rejoin_on_credential_change;
		self.replace_connection(credential.clone(), rejoin).await?;
		self.rotator.commit(credential);
		info!(rejoined = rejoin, "credential rotated");
		Ok(())
	}

	/// Rebuild the connection with the active credential and re-join subscribed channels.
	pub async fn reconnect(&mut self) -> Result<(), ChatError> {
		let credential = self.rotator.credential();
		self.replace_connection(credential, true).await?;
		info!("chat connection re-established");
		Ok(())
	}

	async fn replace_connection(&mut self, credential: Option<Credential>, rejoin: bool) -> Result<(), ChatError> {
		let mut transport = self.rotator.open(credential.as_ref()).await?;
		let events = transport.take_events();

		let mut old = std::mem::replace(&mut self.conn, Connection::new(transport));
		self.events = events;
		old.transport.close().await;

		if rejoin {
			let mut channels: Vec<ChannelName> = self.subscribed.iter().cloned().collect();
			channels.sort();
			for channel in channels {
				match self.conn.transport.join(&channel) {
					Ok(()) => {
						self.conn.joined.insert(channel.clone());
						self.joined.insert(channel);
					}
					Err(e) => warn!(channel = %channel, error = %e, "re-join failed"),
				}
			}
		}
		Ok(())
	}

	/// Send a message on the current connection. No retries.
	pub async fn say(&mut self, channel: &str, text: &str, attrs: &SayAttributes) -> Result<(), ChatError> {
		let channel = ChannelName::new(channel);
		self.conn.transport.say(&channel, text, attrs).await
	}

	/// Next event from the current connection; `None` once it is gone.
	pub async fn next_event(&mut self) -> Option<ChatEvent> {
		match self.events.as_mut() {
			Some(rx) => rx.recv().await,
			None => None,
		}
	}

	pub fn handle_event(&mut self, event: &ChatEvent) {
		match event {
			ChatEvent::Connected => info!("chat connected"),
			ChatEvent::Message(msg) => {
				self.dispatch(msg.channel.as_str(), &msg.login, &msg.text, msg);
			}
			ChatEvent::Join { channel, user } => debug!(channel = %channel, user = %user, "join"),
			ChatEvent::Part { channel, user } => debug!(channel = %channel, user = %user, "part"),
			ChatEvent::Disconnected { reason } => {
				warn!(reason = %reason, "chat disconnected");
				self.events = None;
			}
		}
	}

	/// Receive and handle one event.
	pub async fn run_once(&mut self) -> Option<ChatEvent> {
		let event = self.next_event().await?;
		self.handle_event(&event);
		Some(event)
	}

	/// Whether `subscribe` has ever joined the channel. May be stale after a
	/// credential change; see [`ChatMultiplexer::is_joined_on_connection`].
	pub fn is_joined(&self, channel: &str) -> bool {
		self.joined.contains(&ChannelName::new(channel))
	}

	pub fn is_joined_on_connection(&self, channel: &str) -> bool {
		self.conn.joined.contains(&ChannelName::new(channel))
	}

	pub fn is_subscribed(&self, channel: &str) -> bool {
		self.subscribed.contains(&ChannelName::new(channel))
	}

	pub fn has_handler(&self, channel: &str) -> bool {
		self.handlers.contains_key(&ChannelName::new(channel))
	}

	/// Subscribed channels, sorted.
	pub fn subscribed(&self) -> Vec<ChannelName> {
		let mut out: Vec<ChannelName> = self.subscribed.iter().cloned().collect();
		out.sort();
		out
	}

	pub fn credential(&self) -> Option<Credential> {
		self.rotator.credential()
	}

	pub async fn close(&mut self) {
		self.conn.transport.close().await;
		self.events = None;
	}
}
