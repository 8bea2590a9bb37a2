#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatline_client::config::{ClientConfig, default_config_path, load_client_config_from_path};
use chatline_client::render::render_line;
use chatline_client::store::channel_list;
use chatline_client::{ChatMultiplexer, FileBackend, MessageHandler, MessageLog, Persisted};
use chatline_domain::{ChannelName, Scope};
use chatline_platform::assets::{badge_providers, emote_providers, load_channel, load_global};
use chatline_platform::chat::{ChatEvent, PrivateMessage, SayAttributes};
use chatline_platform::twitch::{HelixClient, IrcTransportFactory};
use chatline_platform::{Badge, BadgeCache, CatalogProvider, Credential, Emote, EmoteCache, LoadReport, SharedCredential};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

type SharedLog = Arc<Mutex<MessageLog<PrivateMessage>>>;

const RECONNECT_MIN_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: chatline [--config path] [channel]...\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.chatline/config.toml)\n\
\t--help    Show this help\n\
\n\
Commands (stdin):\n\
\t/join <channel>\n\
\t/leave <channel>\n\
\t/say <channel> <text>\n\
\t/reply <channel> <message-id> <text>\n\
\t/token <oauth-token>\n\
\t/history <channel> [count]\n\
\t/quit\n"
	);
	std::process::exit(2)
}

struct Args {
	config: Option<PathBuf>,
	channels: Vec<String>,
}

fn parse_args() -> Args {
	let mut args = Args {
		config: None,
		channels: Vec::new(),
	};

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				args.config = Some(PathBuf::from(v));
			}
			other if other.starts_with("--") => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
			channel => args.channels.push(channel.to_string()),
		}
	}

	args
}

fn init_rustls_crypto_provider() {
	let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,chatline_client=debug".to_string());
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

/// Emote and badge catalogs plus the fetchers that fill them.
struct Catalog {
	helix: HelixClient,
	emotes: EmoteCache,
	badges: BadgeCache,
	emote_providers: Vec<Arc<dyn CatalogProvider<Emote>>>,
	badge_providers: Vec<Arc<dyn CatalogProvider<Badge>>>,
}

impl Catalog {
	fn new(cfg: &ClientConfig, credential: SharedCredential) -> anyhow::Result<Self> {
		let helix = HelixClient::new(&cfg.twitch.helix_base_url, credential)?;
		Ok(Self {
			emote_providers: emote_providers(&cfg.catalog_endpoints(), helix.clone())?,
			badge_providers: badge_providers(helix.clone()),
			helix,
			emotes: EmoteCache::new(),
			badges: BadgeCache::new(),
		})
	}

	async fn load_global(&self) {
		let emotes = load_global(&self.emotes, &self.emote_providers).await;
		let badges = load_global(&self.badges, &self.badge_providers).await;
		log_report("global emotes", &emotes);
		log_report("global badges", &badges);
	}

	/// Fetch a channel's catalogs unless they are already cached.
	async fn load_channel(&self, channel: &ChannelName) {
		if self.emotes.has_scope(channel) && self.badges.has_scope(channel) {
			debug!(channel = %channel, "channel catalogs already cached");
			return;
		}

		let channel_ref = match self.helix.resolve_channel(channel).await {
			Ok(r) => r,
			Err(e) => {
				warn!(channel = %channel, error = %e, "cannot resolve channel; channel emotes unavailable");
				return;
			}
		};

		if !self.emotes.has_scope(channel) {
			let report = load_channel(&channel_ref, &self.emotes, &self.emote_providers).await;
			log_report("channel emotes", &report);
		}
		if !self.badges.has_scope(channel) {
			let report = load_channel(&channel_ref, &self.badges, &self.badge_providers).await;
			log_report("channel badges", &report);
		}
	}

	fn handler(&self, history: &SharedLog) -> MessageHandler {
		let emotes = self.emotes.clone();
		let badges = self.badges.clone();
		let history = history.clone();
		Box::new(move |text: &str, raw: &PrivateMessage| {
			println!("{}", render_line(&emotes, &badges, text, raw));
			if let Ok(mut log) = history.lock() {
				log.push(&raw.channel, raw.clone());
			}
		})
	}
}

fn log_report(what: &str, report: &LoadReport) {
	if report.is_complete() {
		info!(what, records = report.total(), "catalog ready");
	} else {
		warn!(
			what,
			records = report.total(),
			failed = report.failures.len(),
			"catalog partially loaded"
		);
	}
}

struct App {
	mux: ChatMultiplexer,
	catalog: Catalog,
	history: SharedLog,
	channels: Persisted<BTreeSet<ChannelName>>,
	client_id: Option<String>,
}

impl App {
	async fn join(&mut self, raw: &str) -> anyhow::Result<()> {
		let channel = ChannelName::new(raw.trim());
		self.catalog.load_channel(&channel).await;
		self.mux.subscribe(channel.as_str(), self.catalog.handler(&self.history))?;
		if !self.channels.get().contains(&channel) {
			self.channels.update(|set| set.insert(channel.clone()))?;
		}
		info!(
			channel = %channel,
			emotes = self.catalog.emotes.scope_len(&Scope::from(&channel)),
			"subscribed"
		);
		Ok(())
	}

	fn leave(&mut self, raw: &str) -> anyhow::Result<()> {
		let channel = ChannelName::new(raw.trim());
		self.mux.unsubscribe(channel.as_str());
		self.channels.update(|set| set.remove(&channel))?;
		info!(channel = %channel, "unsubscribed");
		Ok(())
	}

	/// Rotate to a new token, then re-subscribe so the new connection joins.
	async fn rotate(&mut self, token: &str) -> anyhow::Result<()> {
		let client_id = self
			.mux
			.credential()
			.map(|c| c.client_id)
			.or_else(|| self.client_id.clone())
			.ok_or_else(|| anyhow::anyhow!("no twitch client_id configured"))?;

		let credential = Credential::new(client_id, token);
		if !credential.is_valid().await {
			warn!("token did not validate; trying it anyway");
		}

		self.mux.set_credential(Some(credential)).await?;
		for channel in self.mux.subscribed() {
			if !self.mux.is_joined_on_connection(channel.as_str()) {
				self.mux.subscribe(channel.as_str(), self.catalog.handler(&self.history))?;
			}
		}
		info!(channels = self.mux.subscribed().len(), "credential updated");
		Ok(())
	}

	fn print_history(&self, channel: &str, count: usize) {
		let channel = ChannelName::new(channel.trim());
		let Ok(log) = self.history.lock() else {
			return;
		};
		for msg in log.recent(&channel, count) {
			println!("{}", render_line(&self.catalog.emotes, &self.catalog.badges, &msg.text, msg));
		}
	}

	/// Returns `false` when the user asked to quit.
	async fn command(&mut self, line: &str) -> bool {
		let line = line.trim();
		if line.is_empty() {
			return true;
		}

		let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
		let rest = rest.trim();

		let outcome = match cmd {
			"/quit" | "/exit" => return false,
			"/join" if !rest.is_empty() => self.join(rest).await,
			"/leave" if !rest.is_empty() => self.leave(rest),
			"/say" => match rest.split_once(' ') {
				Some((channel, text)) => self
					.mux
					.say(channel, text.trim(), &SayAttributes::default())
					.await
					.map_err(Into::into),
				None => Err(anyhow::anyhow!("usage: /say <channel> <text>")),
			},
			"/reply" => match rest.splitn(3, ' ').collect::<Vec<_>>().as_slice() {
				[channel, parent, text] => self
					.mux
					.say(channel, text.trim(), &SayAttributes::reply(*parent))
					.await
					.map_err(Into::into),
				_ => Err(anyhow::anyhow!("usage: /reply <channel> <message-id> <text>")),
			},
			"/token" if !rest.is_empty() => self.rotate(rest).await,
			"/history" => {
				let mut parts = rest.split_whitespace();
				match parts.next() {
					Some(channel) => {
						let count = parts.next().and_then(|n| n.parse().ok()).unwrap_or(20);
						self.print_history(channel, count);
						Ok(())
					}
					None => Err(anyhow::anyhow!("usage: /history <channel> [count]")),
				}
			}
			other => Err(anyhow::anyhow!("unknown command {other:?} (try /join, /leave, /say, /reply, /token, /history, /quit)")),
		};

		if let Err(e) = outcome {
			eprintln!("error: {e:#}");
		}
		true
	}

	async fn reconnect(&mut self, delay: &mut Duration) {
		tokio::time::sleep(*delay).await;
		match self.mux.reconnect().await {
			Ok(()) => *delay = RECONNECT_MIN_DELAY,
			Err(e) => {
				let next = (*delay * 2).min(RECONNECT_MAX_DELAY);
				warn!(error = %e, retry_in = ?next, "reconnect failed");
				*delay = next;
			}
		}
	}
}

enum Step {
	Event(Option<ChatEvent>),
	Input(std::io::Result<Option<String>>),
	Interrupt,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_rustls_crypto_provider();
	init_tracing();

	let args = parse_args();

	let config_path = match args.config {
		Some(path) => path,
		None => default_config_path()?,
	};
	let cfg = load_client_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded client config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let credential = SharedCredential::new(cfg.credential());
	let catalog = Catalog::new(&cfg, credential.clone())?;
	catalog.load_global().await;

	let channels = channel_list(Arc::new(FileBackend::new(&cfg.state_dir)))?;
	let history: SharedLog = Arc::new(Mutex::new(MessageLog::new(cfg.chat.history_limit)));

	let factory = Arc::new(IrcTransportFactory::new(cfg.irc_config()));
	let mux = ChatMultiplexer::start(factory, credential, cfg.mux_config()).await?;

	let mut initial: Vec<String> = cfg.chat.channels.iter().map(|c| c.as_str().to_string()).collect();
	initial.extend(channels.get().iter().map(|c| c.as_str().to_string()));
	initial.extend(args.channels);

	let mut app = App {
		mux,
		catalog,
		history,
		channels,
		client_id: cfg.twitch.client_id.clone(),
	};

	for channel in initial {
		if app.mux.is_subscribed(&channel) {
			continue;
		}
		if let Err(e) = app.join(&channel).await {
			warn!(channel = %channel, error = %e, "failed to subscribe");
		}
	}

	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	let mut reconnect_delay = RECONNECT_MIN_DELAY;

	loop {
		let step = tokio::select! {
			event = app.mux.next_event() => Step::Event(event),
			line = lines.next_line() => Step::Input(line),
			_ = tokio::signal::ctrl_c() => Step::Interrupt,
		};

		match step {
			Step::Event(Some(event)) => app.mux.handle_event(&event),
			Step::Event(None) => app.reconnect(&mut reconnect_delay).await,
			Step::Input(Ok(Some(line))) => {
				if !app.command(&line).await {
					break;
				}
			}
			Step::Input(Ok(None)) => {
				info!("stdin closed");
				break;
			}
			Step::Input(Err(e)) => {
				warn!(error = %e, "stdin read failed");
				break;
			}
			Step::Interrupt => break,
		}
	}

	app.mux.close().await;
	info!("bye");
	Ok(())
}
