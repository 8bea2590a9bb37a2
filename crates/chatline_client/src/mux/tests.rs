#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chatline_domain::ChannelName;
use chatline_platform::chat::{ChatError, ChatEvent, ChatEventRx, ChatTransport, PrivateMessage, SayAttributes, TransportFactory};
use chatline_platform::{Credential, SharedCredential};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::{ChatMultiplexer, MessageHandler, MuxConfig};

struct Record {
	token: Option<String>,
	joins: Vec<String>,
	says: Vec<(String, String, SayAttributes)>,
	closed: bool,
	events: mpsc::Sender<ChatEvent>,
}

#[derive(Default)]
struct Wire {
	transports: Vec<Record>,
	reject_token: Option<String>,
}

#[derive(Clone, Default)]
struct FakeFactory {
	wire: Arc<Mutex<Wire>>,
}

impl FakeFactory {
	fn rejecting(token: &str) -> Self {
		let factory = Self::default();
		factory.wire.lock().expect("wire").reject_token = Some(token.to_string());
		factory
	}

	fn count(&self) -> usize {
		self.wire.lock().expect("wire").transports.len()
	}

	fn joins(&self, idx: usize) -> Vec<String> {
		self.wire.lock().expect("wire").transports[idx].joins.clone()
	}

	fn closed(&self, idx: usize) -> bool {
		self.wire.lock().expect("wire").transports[idx].closed
	}

	fn token(&self, idx: usize) -> Option<String> {
		self.wire.lock().expect("wire").transports[idx].token.clone()
	}

	fn says(&self, idx: usize) -> Vec<(String, String, SayAttributes)> {
		self.wire.lock().expect("wire").transports[idx].says.clone()
	}

	fn sender(&self, idx: usize) -> mpsc::Sender<ChatEvent> {
		self.wire.lock().expect("wire").transports[idx].events.clone()
	}
}

struct FakeTransport {
	idx: usize,
	wire: Arc<Mutex<Wire>>,
	events: Option<ChatEventRx>,
	authenticated: bool,
}

impl TransportFactory for FakeFactory {
	fn create(&self, credential: Option<&Credential>) -> Box<dyn ChatTransport> {
		let (tx, rx) = mpsc::channel(16);
		let mut wire = self.wire.lock().expect("wire");
		wire.transports.push(Record {
			token: credential.map(|c| c.access_token.expose().to_string()),
			joins: Vec::new(),
			says: Vec::new(),
			closed: false,
			events: tx,
		});
		Box::new(FakeTransport {
			idx: wire.transports.len() - 1,
			wire: self.wire.clone(),
			events: Some(rx),
			authenticated: credential.is_some(),
		})
	}
}

#[async_trait]
impl ChatTransport for FakeTransport {
	async fn connect(&mut self) -> Result<(), ChatError> {
		let wire = self.wire.lock().expect("wire");
		let token = wire.transports[self.idx].token.clone();
		if token.is_some() && token == wire.reject_token {
			return Err(ChatError::Auth("Login authentication failed".to_string()));
		}
		Ok(())
	}

	fn join(&mut self, channel: &ChannelName) -> Result<(), ChatError> {
		self.wire.lock().expect("wire").transports[self.idx]
			.joins
			.push(channel.as_str().to_string());
		Ok(())
	}

	fn part(&mut self, _channel: &ChannelName) -> Result<(), ChatError> {
		Ok(())
	}

	async fn say(&mut self, channel: &ChannelName, text: &str, attrs: &SayAttributes) -> Result<(), ChatError> {
		if !self.authenticated {
			return Err(ChatError::Auth("anonymous connections are read-only".to_string()));
		}
		self.wire.lock().expect("wire").transports[self.idx].says.push((
			channel.as_str().to_string(),
			text.to_string(),
			attrs.clone(),
		));
		Ok(())
	}

	fn take_events(&mut self) -> Option<ChatEventRx> {
		self.events.take()
	}

	async fn close(&mut self) {
		self.wire.lock().expect("wire").transports[self.idx].closed = true;
	}
}

type Seen = Arc<Mutex<Vec<(String, String)>>>;

/// Handler that records `(tag, text)` per call.
fn recorder(tag: &'static str, seen: &Seen) -> MessageHandler {
	let seen = seen.clone();
	Box::new(move |text: &str, raw: &PrivateMessage| {
		assert_eq!(raw.text, text);
		seen.lock().expect("seen").push((tag.to_string(), text.to_string()));
	})
}

fn seen_count(seen: &Seen) -> usize {
	seen.lock().expect("seen").len()
}

fn cred(token: &str) -> Credential {
	Credential::new("cid", token).with_login("me")
}

async fn start(factory: &FakeFactory, credential: Option<Credential>, cfg: MuxConfig) -> ChatMultiplexer {
	ChatMultiplexer::start(Arc::new(factory.clone()), SharedCredential::new(credential), cfg)
		.await
		.expect("start")
}

#[tokio::test]
async fn dispatch_is_gated_on_subscription() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	let seen = Seen::default();
	let raw = PrivateMessage::new("foo", "bob", "hi");

	assert!(!mux.dispatch("foo", "bob", "hi", &raw));
	assert_eq!(seen_count(&seen), 0);

	mux.subscribe("#Foo", recorder("h", &seen)).expect("subscribe");
	assert!(mux.dispatch("FOO", "bob", "hi", &raw));
	assert_eq!(*seen.lock().expect("seen"), vec![("h".to_string(), "hi".to_string())]);

	mux.unsubscribe("foo");
	assert!(!mux.dispatch("foo", "bob", "hi", &raw));
	assert_eq!(seen_count(&seen), 1);

	assert!(mux.has_handler("foo"), "handler stays installed");
	assert!(mux.is_joined("foo"), "unsubscribe does not part");
	assert!(!mux.is_subscribed("foo"));
}

#[tokio::test]
async fn repeated_subscribe_joins_once_and_replaces_handler() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	let seen = Seen::default();

	mux.subscribe("foo", recorder("h1", &seen)).expect("first");
	mux.subscribe("#FOO", recorder("h2", &seen)).expect("second");
	assert_eq!(factory.joins(0), vec!["foo".to_string()]);

	let raw = PrivateMessage::new("foo", "bob", "yo");
	assert!(mux.dispatch("foo", "bob", "yo", &raw));
	assert_eq!(*seen.lock().expect("seen"), vec![("h2".to_string(), "yo".to_string())]);
}

#[tokio::test]
async fn resubscribe_after_unsubscribe_does_not_rejoin() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	let seen = Seen::default();

	mux.subscribe("foo", recorder("h", &seen)).expect("subscribe");
	mux.unsubscribe("foo");
	mux.subscribe("foo", recorder("h", &seen)).expect("resubscribe");
	assert_eq!(factory.joins(0).len(), 1);
	assert_eq!(mux.subscribed(), vec![ChannelName::new("foo")]);
}

#[tokio::test]
async fn empty_channel_is_rejected() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	let err = mux.subscribe("#", recorder("h", &Seen::default())).expect_err("empty");
	assert!(matches!(err, ChatError::InvalidChannel(_)));
	assert!(factory.joins(0).is_empty());
}

#[tokio::test]
async fn missing_handler_drops_message() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	mux.subscribe("foo", recorder("h", &Seen::default())).expect("subscribe");
	mux.handlers.remove(&ChannelName::new("foo"));

	let raw = PrivateMessage::new("foo", "bob", "hi");
	assert!(!mux.dispatch("foo", "bob", "hi", &raw));
}

#[tokio::test]
async fn rotation_keeps_bookkeeping_without_rejoining() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, Some(cred("old")), MuxConfig::default()).await;
	let seen = Seen::default();
	mux.subscribe("foo", recorder("h", &seen)).expect("subscribe");

	mux.set_credential(Some(cred("new"))).await.expect("rotate");

	assert_eq!(factory.count(), 2);
	assert!(factory.closed(0), "old connection discarded");
	assert_eq!(factory.token(1).as_deref(), Some("new"));
	assert!(factory.joins(1).is_empty(), "joins are not replayed");
	assert_eq!(mux.credential().map(|c| c.access_token.expose().to_string()), Some("new".to_string()));

	assert!(mux.is_subscribed("foo"));
	assert!(mux.has_handler("foo"));
	assert!(mux.is_joined("foo"), "multiplexer-level join state is stale");
	assert!(!mux.is_joined_on_connection("foo"));

	// The new connection never joined, so nothing arrives until the caller resubscribes.
	let pending = timeout(Duration::from_millis(50), mux.run_once()).await;
	assert!(pending.is_err());
	assert_eq!(seen_count(&seen), 0);

	mux.subscribe("foo", recorder("h", &seen)).expect("resubscribe");
	assert_eq!(factory.joins(1), vec!["foo".to_string()]);
	assert!(mux.is_joined_on_connection("foo"));
}

#[tokio::test]
async fn rotation_can_replay_joins() {
	let factory = FakeFactory::default();
	let cfg = MuxConfig {
		rejoin_on_credential_change: true,
	};
	let mut mux = start(&factory, None, cfg).await;
	mux.subscribe("foo", recorder("a", &Seen::default())).expect("foo");
	mux.subscribe("bar", recorder("b", &Seen::default())).expect("bar");
	mux.subscribe("baz", recorder("c", &Seen::default())).expect("baz");
	mux.unsubscribe("baz");

	mux.set_credential(Some(cred("tok"))).await.expect("rotate");
	assert_eq!(factory.joins(1), vec!["bar".to_string(), "foo".to_string()]);
}

#[tokio::test]
async fn failed_rotation_keeps_previous_connection() {
	let factory = FakeFactory::rejecting("bad");
	let mut mux = start(&factory, Some(cred("good")), MuxConfig::default()).await;
	mux.subscribe("foo", recorder("h", &Seen::default())).expect("subscribe");

	let err = mux.set_credential(Some(cred("bad"))).await.expect_err("rejected");
	assert!(matches!(err, ChatError::Auth(_)));

	assert!(!factory.closed(0));
	assert_eq!(mux.credential().map(|c| c.access_token.expose().to_string()), Some("good".to_string()));
	assert!(mux.is_subscribed("foo"));
	assert!(mux.is_joined_on_connection("foo"));

	mux.say("foo", "still here", &SayAttributes::default()).await.expect("say on old connection");
	assert_eq!(factory.says(0).len(), 1);

	mux.set_credential(Some(cred("better"))).await.expect("retry succeeds");
	assert!(mux.is_subscribed("foo"));
}

#[tokio::test]
async fn rotation_updates_shared_credential() {
	let factory = FakeFactory::default();
	let shared = SharedCredential::default();
	let mut mux = ChatMultiplexer::start(Arc::new(factory.clone()), shared.clone(), MuxConfig::default())
		.await
		.expect("start");
	assert!(shared.get().is_none());

	mux.set_credential(Some(cred("tok"))).await.expect("rotate");
	assert_eq!(shared.get().map(|c| c.client_id), Some("cid".to_string()));
}

#[tokio::test]
async fn say_forwards_and_surfaces_failure() {
	let factory = FakeFactory::default();
	let mut anon = start(&factory, None, MuxConfig::default()).await;
	let err = anon
		.say("foo", "hi", &SayAttributes::default())
		.await
		.expect_err("anonymous");
	assert!(matches!(err, ChatError::Auth(_)));

	let factory = FakeFactory::default();
	let mut mux = start(&factory, Some(cred("tok")), MuxConfig::default()).await;
	mux.say("#Foo", "hello", &SayAttributes::reply("parent-1")).await.expect("say");
	assert_eq!(
		factory.says(0),
		vec![("foo".to_string(), "hello".to_string(), SayAttributes::reply("parent-1"))]
	);
}

#[tokio::test]
async fn events_are_routed_in_order() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, None, MuxConfig::default()).await;
	let seen = Seen::default();
	mux.subscribe("foo", recorder("foo", &seen)).expect("subscribe");
	mux.subscribe("bar", recorder("bar", &seen)).expect("subscribe");
	mux.unsubscribe("bar");

	let tx = factory.sender(0);
	tx.send(ChatEvent::Connected).await.expect("send");
	for (chan, text) in [("foo", "one"), ("bar", "skip"), ("foo", "two")] {
		let msg = PrivateMessage::new(chan, "bob", text);
		tx.send(ChatEvent::Message(Box::new(msg))).await.expect("send");
	}
	tx.send(ChatEvent::Disconnected {
		reason: "server requested reconnect".to_string(),
	})
	.await
	.expect("send");

	for _ in 0..5 {
		timeout(Duration::from_secs(1), mux.run_once())
			.await
			.expect("event")
			.expect("open");
	}
	assert_eq!(
		*seen.lock().expect("seen"),
		vec![("foo".to_string(), "one".to_string()), ("foo".to_string(), "two".to_string())]
	);

	assert!(mux.next_event().await.is_none(), "stream ends after disconnect");
}

#[tokio::test]
async fn reconnect_rejoins_subscribed_channels() {
	let factory = FakeFactory::default();
	let mut mux = start(&factory, Some(cred("tok")), MuxConfig::default()).await;
	mux.subscribe("foo", recorder("h", &Seen::default())).expect("subscribe");

	mux.reconnect().await.expect("reconnect");
	assert_eq!(factory.count(), 2);
	assert_eq!(factory.token(1).as_deref(), Some("tok"));
	assert_eq!(factory.joins(1), vec!["foo".to_string()]);
	assert!(factory.closed(0));
}
