#![forbid(unsafe_code)]


use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use chatline_domain::ChannelName;
use chatline_platform::assets::CatalogEndpoints;
use chatline_platform::twitch::IrcConfig;
use chatline_platform::{Credential, SecretString};
use serde::Deserialize;
use tracing::{info, warn};

use crate::mux::MuxConfig;

pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Default config path: `~/.chatline/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".chatline").join("config.toml"))
}

/// Load the client config from TOML and env overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
	let path = default_config_path()?;
	load_client_config_from_path(&path)
}

/// Same as `load_client_config` but with an explicit config path.
pub fn load_client_config_from_path(path: &Path) -> anyhow::Result<ClientConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ClientConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());

	Ok(cfg)
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub twitch: TwitchSettings,
	pub chat: ChatSettings,
	pub catalog: CatalogSettings,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Directory for persisted client state.
	pub state_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TwitchSettings {
	pub client_id: Option<String>,
	/// User access token; `oauth:` prefix accepted.
	pub oauth_token: Option<SecretString>,
	/// Chat login. Resolved through token validation when unset.
	pub login: Option<String>,
	pub irc_ws_url: String,
	pub helix_base_url: String,
	pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
	/// Channels subscribed at startup.
	pub channels: Vec<ChannelName>,
	/// Messages kept per channel; 0 keeps everything.
	pub history_limit: usize,
	pub rejoin_on_credential_change: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSettings {
	pub bttv_base_url: Option<String>,
	pub ffz_base_url: Option<String>,
	pub seventv_base_url: Option<String>,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			twitch: TwitchSettings::default(),
			chat: ChatSettings::default(),
			catalog: CatalogSettings::default(),
			metrics_bind: None,
			state_dir: PathBuf::from(".chatline"),
		}
	}
}

impl Default for TwitchSettings {
	fn default() -> Self {
		let irc = IrcConfig::default();
		Self {
			client_id: None,
			oauth_token: None,
			login: None,
			irc_ws_url: irc.ws_url,
			helix_base_url: CatalogEndpoints::default().helix_base_url,
			connect_timeout: irc.connect_timeout,
		}
	}
}

impl Default for ChatSettings {
	fn default() -> Self {
		Self {
			channels: Vec::new(),
			history_limit: DEFAULT_HISTORY_LIMIT,
			rejoin_on_credential_change: false,
		}
	}
}

impl ClientConfig {
	/// The configured credential, if both client id and token are set.
	pub fn credential(&self) -> Option<Credential> {
		let client_id = self.twitch.client_id.as_deref()?;
		let token = self.twitch.oauth_token.as_ref()?;
		let credential = Credential::new(client_id, token.expose());
		Some(match self.twitch.login.as_deref() {
			Some(login) => credential.with_login(login),
			None => credential,
		})
	}

	pub fn irc_config(&self) -> IrcConfig {
		IrcConfig {
			ws_url: self.twitch.irc_ws_url.clone(),
			connect_timeout: self.twitch.connect_timeout,
			..IrcConfig::default()
		}
	}

	pub fn catalog_endpoints(&self) -> CatalogEndpoints {
		let defaults = CatalogEndpoints::default();
		CatalogEndpoints {
			helix_base_url: self.twitch.helix_base_url.clone(),
			bttv_base_url: self.catalog.bttv_base_url.clone().unwrap_or(defaults.bttv_base_url),
			ffz_base_url: self.catalog.ffz_base_url.clone().unwrap_or(defaults.ffz_base_url),
			seventv_base_url: self.catalog.seventv_base_url.clone().unwrap_or(defaults.seventv_base_url),
		}
	}

	pub fn mux_config(&self) -> MuxConfig {
		MuxConfig {
			rejoin_on_credential_change: self.chat.rejoin_on_credential_change,
		}
	}

	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let defaults = ClientConfig::default();

		let twitch = TwitchSettings {
			client_id: non_blank(file.twitch.client_id),
			oauth_token: non_blank(file.twitch.oauth_token).map(SecretString::new),
			login: non_blank(file.twitch.login),
			irc_ws_url: non_blank(file.twitch.irc_ws_url).unwrap_or(defaults.twitch.irc_ws_url),
			helix_base_url: non_blank(file.twitch.helix_base_url).unwrap_or(defaults.twitch.helix_base_url),
			connect_timeout: file
				.twitch
				.connect_timeout_ms
				.filter(|ms| *ms > 0)
				.map(Duration::from_millis)
				.unwrap_or(defaults.twitch.connect_timeout),
		};

		let chat = ChatSettings {
			channels: parse_channels(file.chat.channels.iter().map(String::as_str)),
			history_limit: file.chat.history_limit.map(history_limit).unwrap_or(DEFAULT_HISTORY_LIMIT),
			rejoin_on_credential_change: file.chat.rejoin_on_credential_change.unwrap_or(false),
		};

		let catalog = CatalogSettings {
			bttv_base_url: non_blank(file.catalog.bttv_base_url),
			ffz_base_url: non_blank(file.catalog.ffz_base_url),
			seventv_base_url: non_blank(file.catalog.seventv_base_url),
		};

		let state_dir = match non_blank(file.state_dir) {
			Some(dir) => PathBuf::from(dir),
			None => default_state_dir()?,
		};

		Ok(Self {
			twitch,
			chat,
			catalog,
			metrics_bind: non_blank(file.metrics_bind),
			state_dir,
		})
	}
}

fn default_state_dir() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".chatline").join("state"))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	metrics_bind: Option<String>,
	state_dir: Option<String>,

	#[serde(default)]
	twitch: FileTwitchSettings,

	#[serde(default)]
	chat: FileChatSettings,

	#[serde(default)]
	catalog: FileCatalogSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileTwitchSettings {
	client_id: Option<String>,
	oauth_token: Option<String>,
	login: Option<String>,
	irc_ws_url: Option<String>,
	helix_base_url: Option<String>,
	connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileChatSettings {
	#[serde(default)]
	channels: Vec<String>,
	history_limit: Option<i64>,
	rejoin_on_credential_change: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileCatalogSettings {
	bttv_base_url: Option<String>,
	ffz_base_url: Option<String>,
	seventv_base_url: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
	v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Non-positive limits mean unbounded.
fn history_limit(v: i64) -> usize {
	usize::try_from(v).unwrap_or(0)
}

/// Sanitize and dedupe, keeping first-seen order.
fn parse_channels<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<ChannelName> {
	let mut out: Vec<ChannelName> = Vec::new();
	for r in raw {
		let name = ChannelName::new(r.trim());
		if name.as_str().is_empty() || out.contains(&name) {
			continue;
		}
		out.push(name);
	}
	out
}

fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ClientConfig, env: impl Fn(&str) -> Option<String>) {
	let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(v) = var("CHATLINE_TWITCH_CLIENT_ID") {
		cfg.twitch.client_id = Some(v);
		info!("twitch config: client_id overridden by env");
	}

	if let Some(v) = var("CHATLINE_TWITCH_OAUTH_TOKEN") {
		cfg.twitch.oauth_token = Some(SecretString::new(v));
		info!("twitch config: oauth_token overridden by env");
	}

	if let Some(v) = var("CHATLINE_TWITCH_LOGIN") {
		cfg.twitch.login = Some(v);
		info!("twitch config: login overridden by env");
	}

	if let Some(v) = var("CHATLINE_IRC_WS_URL") {
		cfg.twitch.irc_ws_url = v;
		info!("twitch config: irc_ws_url overridden by env");
	}

	if let Some(v) = var("CHATLINE_HELIX_BASE_URL") {
		cfg.twitch.helix_base_url = v;
		info!("twitch config: helix_base_url overridden by env");
	}

	if let Some(v) = var("CHATLINE_CONNECT_TIMEOUT_MS")
		&& let Ok(ms) = v.parse::<u64>()
		&& ms > 0
	{
		cfg.twitch.connect_timeout = Duration::from_millis(ms);
		info!(ms, "twitch config: connect_timeout overridden by env");
	}

	if let Some(v) = var("CHATLINE_CHANNELS") {
		cfg.chat.channels = parse_channels(v.split(','));
		info!(count = cfg.chat.channels.len(), "chat config: channels overridden by env");
	}

	if let Some(v) = var("CHATLINE_HISTORY_LIMIT") {
		match v.parse::<i64>() {
			Ok(limit) => {
				cfg.chat.history_limit = history_limit(limit);
				info!(limit, "chat config: history_limit overridden by env");
			}
			Err(_) => warn!(value = %v, "ignoring invalid CHATLINE_HISTORY_LIMIT"),
		}
	}

	if let Some(v) = var("CHATLINE_REJOIN_ON_CREDENTIAL_CHANGE")
		&& let Some(b) = parse_env_bool(&v)
	{
		cfg.chat.rejoin_on_credential_change = b;
		info!(enabled = b, "chat config: rejoin_on_credential_change overridden by env");
	}

	if let Some(v) = var("CHATLINE_BTTV_BASE_URL") {
		cfg.catalog.bttv_base_url = Some(v);
		info!("catalog config: bttv_base_url overridden by env");
	}

	if let Some(v) = var("CHATLINE_FFZ_BASE_URL") {
		cfg.catalog.ffz_base_url = Some(v);
		info!("catalog config: ffz_base_url overridden by env");
	}

	if let Some(v) = var("CHATLINE_SEVENTV_BASE_URL") {
		cfg.catalog.seventv_base_url = Some(v);
		info!("catalog config: seventv_base_url overridden by env");
	}

	if let Some(v) = var("CHATLINE_METRICS_BIND") {
		cfg.metrics_bind = Some(v);
		info!("metrics_bind overridden by env");
	}

	if let Some(v) = var("CHATLINE_STATE_DIR") {
		cfg.state_dir = PathBuf::from(v);
		info!("state_dir overridden by env");
	}
}
