#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use chatline_domain::{ChannelName, ChannelRef};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::SharedCredential;

const USERS_PATH: &str = "/helix/users";
const TOKEN_VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

fn retry_delay_from_headers(headers: &HeaderMap) -> Option<Duration> {
	if let Some(v) = headers.get(RETRY_AFTER)
		&& let Ok(s) = v.to_str()
		&& let Ok(secs) = s.trim().parse::<u64>()
	{
		return Some(Duration::from_secs(secs));
	}

	if let Some(v) = headers.get("Ratelimit-Reset")
		&& let Ok(s) = v.to_str()
		&& let Ok(reset_unix) = s.trim().parse::<u64>()
	{
		let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
		if reset_unix > now {
			return Some(Duration::from_secs(reset_unix - now));
		}
	}

	None
}

/// One retry on 429 (honouring the reset headers) or 5xx. Auth failures are reported immediately.
async fn send_with_retry(req: reqwest::RequestBuilder, label: &str) -> anyhow::Result<reqwest::Response> {
	let retry_builder = req.try_clone();
	let resp = req.send().await.with_context(|| format!("helix {label} send"))?;
	let status = resp.status();

	if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
		let body = resp.text().await.unwrap_or_default();
		anyhow::bail!("helix auth failed (status={status}) body={body}");
	}

	if status == StatusCode::TOO_MANY_REQUESTS
		&& let Some(delay) = retry_delay_from_headers(resp.headers())
		&& let Some(retry) = retry_builder
	{
		tokio::time::sleep(delay).await;
		return retry.send().await.with_context(|| format!("helix {label} retry send"));
	}

	if status.is_server_error()
		&& let Some(retry) = retry_builder
	{
		tokio::time::sleep(Duration::from_millis(250)).await;
		return retry.send().await.with_context(|| format!("helix {label} retry send"));
	}

	Ok(resp)
}

/// Response of the OAuth validation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenValidation {
	pub client_id: String,
	pub login: String,
	pub user_id: String,
	pub expires_in: u64,
	#[serde(default)]
	pub scopes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HelixUsersResponse {
	data: Vec<HelixUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixUser {
	pub id: String,
	pub login: String,
	#[serde(default)]
	pub display_name: Option<String>,
}

/// Authenticated Helix client. Reads the active credential on every request,
/// so a rotation is picked up without rebuilding the client.
#[derive(Clone, Debug)]
pub struct HelixClient {
	http: reqwest::Client,
	base_url: Url,
	credential: SharedCredential,
}

impl HelixClient {
	pub fn new(base_url: &str, credential: SharedCredential) -> anyhow::Result<Self> {
		let http = reqwest::Client::builder()
			.user_agent("chatline/0.x (helix)")
			.build()
			.context("build reqwest client")?;
		// A trailing slash keeps any path prefix of the base when joining.
		let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
			.with_context(|| format!("parse helix base url {base_url}"))?;

		Ok(Self {
			http,
			base_url,
			credential,
		})
	}

	fn authed(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::RequestBuilder> {
		let credential = self.credential.get().context("helix request without a credential")?;
		Ok(req
			.header("Client-Id", &credential.client_id)
			.header("Authorization", format!("Bearer {}", credential.access_token.expose())))
	}

	fn url(&self, path_and_query: &str) -> anyhow::Result<Url> {
		self.base_url
			.join(path_and_query.trim_start_matches('/'))
			.context("join helix url")
	}

	/// Authenticated `GET` decoded as JSON.
	pub async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str, label: &str) -> anyhow::Result<T> {
		let url = self.url(path_and_query)?;
		let req = self.authed(self.http.get(url))?;

		let resp = send_with_retry(req, label).await?;
		let status = resp.status();
		let body = resp.text().await.with_context(|| format!("helix {label} read body"))?;

		if !status.is_success() {
			anyhow::bail!("helix {label} failed: status={status} body={body}");
		}

		serde_json::from_str(&body).with_context(|| format!("helix {label} parse json"))
	}

	pub async fn get_user_by_login(&self, login: &str) -> anyhow::Result<Option<HelixUser>> {
		let path = format!("{USERS_PATH}?login={}", urlencoding::encode(login));
		let parsed: HelixUsersResponse = self.get_json(&path, "GET /helix/users").await?;
		Ok(parsed.data.into_iter().next())
	}

	/// Resolve the broadcaster id for a channel so both identifier spaces can be handed to loaders.
	pub async fn resolve_channel(&self, channel: &ChannelName) -> anyhow::Result<ChannelRef> {
		let user = self
			.get_user_by_login(channel.as_str())
			.await?
			.with_context(|| format!("unknown twitch channel {channel}"))?;

		ChannelRef::new(user.id, channel.as_str()).context("helix returned an empty user id")
	}
}

/// Validate a user access token. HTTP 200 means valid.
pub async fn validate_user_token(access_token: &str) -> anyhow::Result<TokenValidation> {
	validate_user_token_at(TOKEN_VALIDATE_URL, access_token).await
}

pub(crate) async fn validate_user_token_at(url: &str, access_token: &str) -> anyhow::Result<TokenValidation> {
	let http = reqwest::Client::builder()
		.user_agent("chatline/0.x (oauth-validate)")
		.build()
		.context("build reqwest client")?;

	let resp = http
		.get(url)
		.header("Authorization", format!("OAuth {access_token}"))
		.send()
		.await
		.context("twitch validate token request")?;

	let status = resp.status();
	let body = resp.text().await.context("twitch validate token read body")?;

	if !status.is_success() {
		anyhow::bail!("twitch validate token failed: status={status} body={body}");
	}

	serde_json::from_str(&body).context("twitch validate token parse json")
}
