#![forbid(unsafe_code)]

use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor};
use serde::{Deserialize, Serialize};

use super::common::{CatalogEndpoints, fetch_json};
use super::loader::CatalogProvider;
use super::record::{Emote, EmoteSource};

const BTTV_CDN_URL: &str = "https://cdn.betterttv.net/emote";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BttvEmote {
	pub id: String,
	pub code: String,
	#[serde(default)]
	pub image_type: String,
	#[serde(default)]
	pub animated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BttvUserResponse {
	#[serde(default)]
	channel_emotes: Vec<BttvEmote>,
	#[serde(default)]
	shared_emotes: Vec<BttvEmote>,
}

/// Map a BTTV emote. `code` is the inline name.
pub fn emote_from_bttv(emote: BttvEmote) -> Emote {
	let url = format!("{BTTV_CDN_URL}/{}/3x.{}", emote.id, emote.image_type);
	Emote {
		id: emote.id.clone(),
		name: emote.code.clone(),
		url,
		source: Some(EmoteSource::Bttv(emote)),
	}
}

pub struct BttvEmotes {
	http: reqwest::Client,
	base_url: String,
}

impl BttvEmotes {
	pub fn new(http: reqwest::Client, endpoints: &CatalogEndpoints) -> Self {
		Self {
			http,
			base_url: endpoints.bttv_base_url.clone(),
		}
	}
}

#[async_trait]
impl CatalogProvider<Emote> for BttvEmotes {
	fn flavor(&self) -> Flavor {
		Flavor::Bttv
	}

	async fn fetch_global(&self) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(&self.base_url, "cached/emotes/global");
		let body: Vec<BttvEmote> = fetch_json(self.http.get(url), "bttv global emotes").await?;
		Ok(body.into_iter().map(emote_from_bttv).collect())
	}

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(
			&self.base_url,
			&format!("cached/users/twitch/{}", urlencoding::encode(&channel.id)),
		);
		let body: BttvUserResponse = fetch_json(self.http.get(url), "bttv user").await?;

		// Channel emotes win over shared ones with the same id.
		let mut emotes: Vec<Emote> = body.shared_emotes.into_iter().map(emote_from_bttv).collect();
		emotes.extend(body.channel_emotes.into_iter().map(emote_from_bttv));
		Ok(emotes)
	}
}
