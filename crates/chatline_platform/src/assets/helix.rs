#![forbid(unsafe_code)]

use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor};
use serde::{Deserialize, Serialize};

use super::loader::CatalogProvider;
use super::record::{Badge, BadgeSource, Emote, EmoteSource};
use crate::twitch::HelixClient;

/// CDN template used when a response carries none.
pub const EMOTE_URL_TEMPLATE: &str = "https://static-cdn.jtvnw.net/emoticons/v2/{{id}}/{{format}}/{{theme_mode}}/{{scale}}";

const WANT_FORMAT: &str = "static";
const WANT_THEME: &str = "dark";
const WANT_SCALE: &str = "3.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelixImages {
	#[serde(default)]
	pub url_1x: String,
	#[serde(default)]
	pub url_2x: String,
	#[serde(default)]
	pub url_4x: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelixEmote {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub images: HelixImages,
	#[serde(default)]
	pub format: Vec<String>,
	#[serde(default)]
	pub scale: Vec<String>,
	#[serde(default)]
	pub theme_mode: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub emote_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub emote_set_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tier: Option<String>,
}

impl HelixEmote {
	/// Expand the CDN template for the given variant, if the emote advertises all three axes.
	pub fn image_url(&self, template: &str, format: &str, theme: &str, scale: &str) -> Option<String> {
		let has = |list: &[String], want: &str| list.iter().any(|v| v == want);
		if !(has(&self.format, format) && has(&self.theme_mode, theme) && has(&self.scale, scale)) {
			return None;
		}

		Some(
			template
				.replace("{{id}}", &self.id)
				.replace("{{format}}", format)
				.replace("{{theme_mode}}", theme)
				.replace("{{scale}}", scale),
		)
	}
}

/// A single badge version, tagged with the set it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelixBadgeVersion {
	#[serde(default)]
	pub set_id: String,
	pub id: String,
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub image_url_1x: String,
	#[serde(default)]
	pub image_url_2x: String,
	#[serde(default)]
	pub image_url_4x: String,
}

#[derive(Debug, Deserialize)]
struct HelixEmotesResponse {
	data: Vec<HelixEmote>,
	#[serde(default)]
	template: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HelixBadgesResponse {
	data: Vec<HelixBadgeSet>,
}

#[derive(Debug, Deserialize)]
struct HelixBadgeSet {
	set_id: String,
	versions: Vec<HelixBadgeVersion>,
}

/// Map a Helix emote. The url is the static dark 3.0 image, or empty when not offered.
pub fn emote_from_helix(emote: HelixEmote, template: &str) -> Emote {
	let url = emote
		.image_url(template, WANT_FORMAT, WANT_THEME, WANT_SCALE)
		.unwrap_or_default();

	Emote {
		id: emote.id.clone(),
		name: emote.name.clone(),
		url,
		source: Some(EmoteSource::Helix(emote)),
	}
}

/// Map a badge version. The id is `set/version`, matching the chat `badges` tag.
pub fn badge_from_helix(badge: HelixBadgeVersion) -> Badge {
	let id = format!("{}/{}", badge.set_id, badge.id);
	let name = badge
		.title
		.clone()
		.filter(|t| !t.trim().is_empty())
		.unwrap_or_else(|| id.clone());
	let url = [&badge.image_url_4x, &badge.image_url_2x, &badge.image_url_1x]
		.into_iter()
		.find(|u| !u.is_empty())
		.cloned()
		.unwrap_or_default();

	Badge {
		id,
		name,
		url,
		source: Some(BadgeSource::Helix(badge)),
	}
}

fn emotes_from_response(body: HelixEmotesResponse) -> Vec<Emote> {
	let template = body
		.template
		.filter(|t| !t.trim().is_empty())
		.unwrap_or_else(|| EMOTE_URL_TEMPLATE.to_string());
	body.data.into_iter().map(|e| emote_from_helix(e, &template)).collect()
}

fn badges_from_response(body: HelixBadgesResponse) -> Vec<Badge> {
	let mut badges = Vec::new();
	for set in body.data {
		for mut version in set.versions {
			version.set_id = set.set_id.clone();
			badges.push(badge_from_helix(version));
		}
	}
	badges
}

/// Global and broadcaster emotes from Helix.
pub struct HelixEmotes {
	client: HelixClient,
}

impl HelixEmotes {
	pub fn new(client: HelixClient) -> Self {
		Self { client }
	}
}

#[async_trait]
impl CatalogProvider<Emote> for HelixEmotes {
	fn flavor(&self) -> Flavor {
		Flavor::Helix
	}

	async fn fetch_global(&self) -> anyhow::Result<Vec<Emote>> {
		let body: HelixEmotesResponse = self
			.client
			.get_json("/helix/chat/emotes/global", "GET /helix/chat/emotes/global")
			.await?;
		Ok(emotes_from_response(body))
	}

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Emote>> {
		let path = format!("/helix/chat/emotes?broadcaster_id={}", urlencoding::encode(&channel.id));
		let body: HelixEmotesResponse = self.client.get_json(&path, "GET /helix/chat/emotes").await?;
		Ok(emotes_from_response(body))
	}
}

/// Global and broadcaster chat badges from Helix.
pub struct HelixBadges {
	client: HelixClient,
}

impl HelixBadges {
	pub fn new(client: HelixClient) -> Self {
		Self { client }
	}
}

#[async_trait]
impl CatalogProvider<Badge> for HelixBadges {
	fn flavor(&self) -> Flavor {
		Flavor::Helix
	}

	async fn fetch_global(&self) -> anyhow::Result<Vec<Badge>> {
		let body: HelixBadgesResponse = self
			.client
			.get_json("/helix/chat/badges/global", "GET /helix/chat/badges/global")
			.await?;
		Ok(badges_from_response(body))
	}

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Badge>> {
		let path = format!("/helix/chat/badges?broadcaster_id={}", urlencoding::encode(&channel.id));
		let body: HelixBadgesResponse = self.client.get_json(&path, "GET /helix/chat/badges").await?;
		Ok(badges_from_response(body))
	}
}
