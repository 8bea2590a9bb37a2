#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use chatline_domain::ChannelName;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::chat::{
	ChatError, ChatEvent, ChatEventRx, ChatEventTx, ChatTransport, IrcMessage, PrivateMessage, SayAttributes,
	TransportFactory, escape_tag_value,
};
use crate::{Credential, new_session_id};

use super::helix::validate_user_token;

pub(crate) type IrcWs = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

const CAPABILITIES: &str = "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership";
const LOGIN_FAILURES: [&str; 2] = ["Login authentication failed", "Login unsuccessful"];

/// Twitch IRC-over-WebSocket settings.
#[derive(Debug, Clone)]
pub struct IrcConfig {
	pub ws_url: String,
	pub connect_timeout: Duration,
	pub event_capacity: usize,
}

impl Default for IrcConfig {
	fn default() -> Self {
		Self {
			ws_url: "wss://irc-ws.chat.twitch.tv:443".to_string(),
			connect_timeout: Duration::from_secs(10),
			event_capacity: 1024,
		}
	}
}

enum State {
	Idle,
	Connected {
		outgoing: mpsc::UnboundedSender<Message>,
		task: JoinHandle<()>,
	},
	Closed,
}

/// One Twitch chat session.
pub struct IrcTransport {
	cfg: IrcConfig,
	credential: Option<Credential>,
	session_id: String,
	state: State,
	events_tx: ChatEventTx,
	events_rx: Option<ChatEventRx>,
	pending_joins: Vec<ChannelName>,
	nick: Option<String>,
}

impl IrcTransport {
	pub fn new(cfg: IrcConfig, credential: Option<Credential>) -> Self {
		let (events_tx, events_rx) = mpsc::channel(cfg.event_capacity.max(1));
		Self {
			cfg,
			credential: credential.filter(Credential::is_complete),
			session_id: new_session_id(),
			state: State::Idle,
			events_tx,
			events_rx: Some(events_rx),
			pending_joins: Vec::new(),
			nick: None,
		}
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Nick used for the session, known once connected.
	pub fn nick(&self) -> Option<&str> {
		self.nick.as_deref()
	}

	fn is_anonymous(&self) -> bool {
		self.credential.is_none()
	}

	async fn resolve_nick(&self) -> Result<String, ChatError> {
		let Some(credential) = &self.credential else {
			let n: u32 = rand::rng().random_range(10_000..100_000);
			return Ok(format!("justinfan{n}"));
		};

		if let Some(login) = credential.login.as_deref().filter(|l| !l.is_empty()) {
			return Ok(login.to_string());
		}

		validate_user_token(credential.access_token.expose())
			.await
			.map(|v| v.login.to_lowercase())
			.map_err(|e| ChatError::Auth(format!("{e:#}")))
	}

	async fn open(&self, nick: &str) -> Result<IrcWs, ChatError> {
		let (mut ws, _resp) = tokio_tungstenite::connect_async(self.cfg.ws_url.as_str())
			.await
			.map_err(|e| ChatError::Connect(e.to_string()))?;

		let token = self.credential.as_ref().map(|c| c.access_token.expose());
		handshake(&mut ws, token, nick).await?;
		Ok(ws)
	}

	fn send_line(&self, line: String) -> Result<(), ChatError> {
		match &self.state {
			State::Connected { outgoing, .. } => outgoing.send(Message::text(line)).map_err(|_| ChatError::Closed),
			State::Idle => Err(ChatError::NotConnected),
			State::Closed => Err(ChatError::Closed),
		}
	}
}

#[async_trait]
impl ChatTransport for IrcTransport {
	async fn connect(&mut self) -> Result<(), ChatError> {
		match self.state {
			State::Connected { .. } => return Ok(()),
			State::Closed => return Err(ChatError::Closed),
			State::Idle => {}
		}

		let nick = self.resolve_nick().await?;
		let ws = tokio::time::timeout(self.cfg.connect_timeout, self.open(&nick))
			.await
			.map_err(|_| ChatError::Timeout("irc handshake"))??;

		let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(run_session(
			ws,
			outgoing_rx,
			self.events_tx.clone(),
			self.session_id.clone(),
		));
		self.state = State::Connected { outgoing, task };
		info!(session_id = %self.session_id, nick = %nick, anonymous = self.is_anonymous(), "irc connected");
		self.nick = Some(nick);

		for channel in std::mem::take(&mut self.pending_joins) {
			self.send_line(format!("JOIN {}", channel.irc()))?;
		}

		if self.events_tx.try_send(ChatEvent::Connected).is_err() {
			debug!(session_id = %self.session_id, "connected event dropped");
		}
		Ok(())
	}

	fn join(&mut self, channel: &ChannelName) -> Result<(), ChatError> {
		match self.state {
			State::Idle => {
				if !self.pending_joins.contains(channel) {
					self.pending_joins.push(channel.clone());
				}
				Ok(())
			}
			_ => self.send_line(format!("JOIN {}", channel.irc())),
		}
	}

	fn part(&mut self, channel: &ChannelName) -> Result<(), ChatError> {
		match self.state {
			State::Idle => {
				self.pending_joins.retain(|c| c != channel);
				Ok(())
			}
			_ => self.send_line(format!("PART {}", channel.irc())),
		}
	}

	async fn say(&mut self, channel: &ChannelName, text: &str, attrs: &SayAttributes) -> Result<(), ChatError> {
		if self.is_anonymous() {
			return Err(ChatError::Auth("anonymous sessions cannot send".to_string()));
		}
		let text = text.replace(['\r', '\n'], " ");
		if text.trim().is_empty() {
			return Err(ChatError::Send("empty message".to_string()));
		}

		self.send_line(privmsg_line(channel, &text, attrs))
	}

	fn take_events(&mut self) -> Option<ChatEventRx> {
		self.events_rx.take()
	}

	async fn close(&mut self) {
		if let State::Connected { outgoing, mut task } = std::mem::replace(&mut self.state, State::Closed) {
			drop(outgoing);
			if tokio::time::timeout(Duration::from_secs(2), &mut task).await.is_err() {
				warn!(session_id = %self.session_id, "irc session did not shut down in time");
				task.abort();
			}
			info!(session_id = %self.session_id, "irc closed");
		}
	}
}

pub(crate) fn privmsg_line(channel: &ChannelName, text: &str, attrs: &SayAttributes) -> String {
	match attrs.reply_to.as_deref().filter(|id| !id.is_empty()) {
		Some(parent) => format!(
			"@reply-parent-msg-id={} PRIVMSG {} :{text}",
			escape_tag_value(parent),
			channel.irc()
		),
		None => format!("PRIVMSG {} :{text}", channel.irc()),
	}
}

fn is_login_failure(msg: &IrcMessage) -> bool {
	msg.command == "NOTICE" && msg.trailing().is_some_and(|t| LOGIN_FAILURES.iter().any(|f| t.contains(f)))
}

fn pong(msg: &IrcMessage) -> Message {
	Message::text(format!("PONG :{}", msg.trailing().unwrap_or("tmi.twitch.tv")))
}

/// CAP, PASS, NICK, then wait for `001`.
async fn handshake(ws: &mut IrcWs, token: Option<&str>, nick: &str) -> Result<(), ChatError> {
	ws.send(Message::text(CAPABILITIES)).await?;
	if let Some(token) = token {
		ws.send(Message::text(format!("PASS oauth:{token}"))).await?;
	}
	ws.send(Message::text(format!("NICK {nick}"))).await?;

	while let Some(frame) = ws.next().await {
		let Message::Text(text) = frame? else {
			continue;
		};
		for line in text.as_str().lines() {
			let Ok(msg) = IrcMessage::parse(line) else {
				continue;
			};
			if msg.command == "001" {
				return Ok(());
			}
			if msg.command == "PING" {
				ws.send(pong(&msg)).await?;
			} else if is_login_failure(&msg) {
				return Err(ChatError::Auth(msg.trailing().unwrap_or_default().to_string()));
			}
		}
	}

	Err(ChatError::Closed)
}

enum Inbound {
	Event(ChatEvent),
	Reply(Message),
	Reconnect,
	Ignore,
}

fn classify(line: &str) -> Inbound {
	let msg = match IrcMessage::parse(line) {
		Ok(msg) => msg,
		Err(e) => {
			debug!(error = %e, "unparseable irc line");
			return Inbound::Ignore;
		}
	};

	match msg.command.as_str() {
		"PING" => Inbound::Reply(pong(&msg)),
		"PRIVMSG" => match PrivateMessage::from_irc(&msg, line) {
			Some(pm) => Inbound::Event(ChatEvent::Message(Box::new(pm))),
			None => Inbound::Ignore,
		},
		"JOIN" | "PART" => {
			let (Some(channel), Some(user)) = (msg.param(0), msg.nick()) else {
				return Inbound::Ignore;
			};
			let channel = ChannelName::new(channel);
			let user = user.to_string();
			if msg.command == "JOIN" {
				Inbound::Event(ChatEvent::Join { channel, user })
			} else {
				Inbound::Event(ChatEvent::Part { channel, user })
			}
		}
		"RECONNECT" => Inbound::Reconnect,
		_ => Inbound::Ignore,
	}
}

async fn run_session(
	mut ws: IrcWs,
	mut outgoing: mpsc::UnboundedReceiver<Message>,
	events: ChatEventTx,
	session_id: String,
) {
	let reason = loop {
		tokio::select! {
			out = outgoing.recv() => match out {
				Some(msg) => {
					if let Err(e) = ws.send(msg).await {
						break format!("send failed: {e}");
					}
				}
				None => {
					let _ = ws.close(None).await;
					debug!(session_id = %session_id, "irc session closed locally");
					return;
				}
			},
			frame = ws.next() => match frame {
				Some(Ok(Message::Text(text))) => {
					let mut stop = None;
					for line in text.as_str().lines() {
						match classify(line) {
							Inbound::Event(ev) => {
								if let ChatEvent::Join { channel, user } | ChatEvent::Part { channel, user } = &ev {
									debug!(session_id = %session_id, channel = %channel, user = %user, "membership echo");
								}
								if events.send(ev).await.is_err() {
									stop = Some("event receiver dropped".to_string());
									break;
								}
							}
							Inbound::Reply(msg) => {
								if let Err(e) = ws.send(msg).await {
									stop = Some(format!("pong failed: {e}"));
									break;
								}
							}
							Inbound::Reconnect => {
								stop = Some("server requested reconnect".to_string());
								break;
							}
							Inbound::Ignore => {}
						}
					}
					if let Some(reason) = stop {
						break reason;
					}
				}
				Some(Ok(Message::Close(frame))) => {
					break frame.map_or_else(|| "closed by server".to_string(), |f| format!("closed by server: {}", f.reason.as_str()));
				}
				Some(Ok(_)) => {}
				Some(Err(e)) => break format!("websocket error: {e}"),
				None => break "stream ended".to_string(),
			},
		}
	};

	info!(session_id = %session_id, reason = %reason, "irc disconnected");
	let _ = events.send(ChatEvent::Disconnected { reason }).await;
}

/// Builds [`IrcTransport`]s sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct IrcTransportFactory {
	cfg: IrcConfig,
}

impl IrcTransportFactory {
	pub fn new(cfg: IrcConfig) -> Self {
		Self { cfg }
	}
}

impl TransportFactory for IrcTransportFactory {
	fn create(&self, credential: Option<&Credential>) -> Box<dyn ChatTransport> {
		Box::new(IrcTransport::new(self.cfg.clone(), credential.cloned()))
	}
}
