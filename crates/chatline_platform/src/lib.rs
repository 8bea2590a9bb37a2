#![forbid(unsafe_code)]

pub mod assets;
pub mod chat;
pub mod twitch;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use assets::{
	AssetCache, Badge, BadgeCache, BadgeSource, CachedAsset, CatalogProvider, Emote, EmoteCache, EmoteSource, INVALID_ID,
	LoadReport, ProviderFailure,
};
pub use chat::{ChatError, ChatEvent, ChatEventRx, ChatTransport, PrivateMessage, SayAttributes, TransportFactory};

/// Wrapper that redacts in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl serde::Serialize for SecretString {
	fn serialize<S>(&self, serializer: S) -> Result<<S as serde::Serializer>::Ok, <S as serde::Serializer>::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str("")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

/// Twitch authentication material.
///
/// Opaque to the chat layer: it is handed to transports and Helix requests as-is.
/// Validity is not checked before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	pub client_id: String,
	pub access_token: SecretString,
	/// Chat login; resolved through token validation when absent.
	#[serde(default)]
	pub login: Option<String>,
}

impl Credential {
	/// Build a credential. A leading `oauth:` on the token is dropped.
	pub fn new(client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
		let token: String = access_token.into();
		let token = token.trim();
		let token = token.strip_prefix("oauth:").unwrap_or(token);
		Self {
			client_id: client_id.into().trim().to_string(),
			access_token: SecretString::new(token),
			login: None,
		}
	}

	pub fn with_login(mut self, login: impl Into<String>) -> Self {
		let login = chatline_domain::sanitize(&login.into());
		self.login = if login.is_empty() { None } else { Some(login) };
		self
	}

	/// Whether both the client id and the token are present.
	pub fn is_complete(&self) -> bool {
		!self.client_id.trim().is_empty() && !self.access_token.is_empty()
	}

	/// Ask Twitch whether the token is currently valid (HTTP 200).
	pub async fn is_valid(&self) -> bool {
		twitch::validate_user_token(self.access_token.expose()).await.is_ok()
	}
}

/// The active credential, shared between the chat layer and catalog fetchers.
#[derive(Debug, Clone, Default)]
pub struct SharedCredential(Arc<RwLock<Option<Credential>>>);

impl SharedCredential {
	pub fn new(credential: Option<Credential>) -> Self {
		Self(Arc::new(RwLock::new(credential)))
	}

	pub fn get(&self) -> Option<Credential> {
		self.0.read().clone()
	}

	pub fn set(&self, credential: Option<Credential>) {
		*self.0.write() = credential;
	}
}

/// Generate an opaque session id.
pub fn new_session_id() -> String {
	Uuid::new_v4().to_string()
}
