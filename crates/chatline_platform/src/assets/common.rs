#![forbid(unsafe_code)]

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub(crate) const HELIX_BASE_URL: &str = "https://api.twitch.tv";
pub(crate) const BTTV_BASE_URL: &str = "https://api.betterttv.net/3";
pub(crate) const FFZ_BASE_URL: &str = "https://api.frankerfacez.com/v1";
pub(crate) const SEVENTV_BASE_URL: &str = "https://7tv.io/v3";

/// Base URLs for every catalog source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEndpoints {
	pub helix_base_url: String,
	pub bttv_base_url: String,
	pub ffz_base_url: String,
	pub seventv_base_url: String,
}

impl Default for CatalogEndpoints {
	fn default() -> Self {
		Self {
			helix_base_url: HELIX_BASE_URL.to_string(),
			bttv_base_url: BTTV_BASE_URL.to_string(),
			ffz_base_url: FFZ_BASE_URL.to_string(),
			seventv_base_url: SEVENTV_BASE_URL.to_string(),
		}
	}
}

impl CatalogEndpoints {
	pub(crate) fn join(base: &str, path: &str) -> String {
		format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
	}
}

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
	reqwest::Client::builder()
		.user_agent("chatline/0.x (catalog)")
		.build()
		.context("build reqwest client")
}

/// Send, check status, decode. Each stage gets its own context label.
pub(crate) async fn fetch_json<T: DeserializeOwned>(req: reqwest::RequestBuilder, label: &'static str) -> anyhow::Result<T> {
	let resp = req
		.send()
		.await
		.with_context(|| format!("{label} request"))?
		.error_for_status()
		.with_context(|| format!("{label} status"))?;

	resp.json().await.with_context(|| format!("{label} json"))
}

/// Accept ids sent either as JSON strings or numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Raw {
		Str(String),
		Int(i64),
		Float(f64),
	}

	Ok(match Raw::deserialize(deserializer)? {
		Raw::Str(s) => s,
		Raw::Int(n) => n.to_string(),
		Raw::Float(n) => n.to_string(),
	})
}

/// Decode a JSON array entry by entry, dropping the entries that do not fit `T`.
///
/// Providers return placeholders for deleted or unavailable emotes; one of
/// those must not take the rest of the set with it.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
	D: Deserializer<'de>,
	T: DeserializeOwned,
{
	let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
	Ok(raw
		.into_iter()
		.filter_map(|entry| match serde_json::from_value(entry) {
			Ok(v) => Some(v),
			Err(e) => {
				tracing::debug!(error = %e, "skipping malformed catalog entry");
				None
			}
		})
		.collect())
}
