#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor};
use serde::{Deserialize, Serialize};

use super::common::{CatalogEndpoints, fetch_json, lenient_list, string_or_number};
use super::loader::CatalogProvider;
use super::record::{Emote, EmoteSource};

/// Size keys, largest first.
const URL_SIZES: [&str; 3] = ["4", "2", "1"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfzEmote {
	#[serde(deserialize_with = "string_or_number")]
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub width: Option<f64>,
	#[serde(default)]
	pub height: Option<f64>,
	#[serde(default)]
	pub urls: BTreeMap<String, String>,
	#[serde(default)]
	pub animated: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FfzEmoteSet {
	#[serde(default, deserialize_with = "lenient_list")]
	pub(crate) emoticons: Vec<FfzEmote>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FfzGlobalResponse {
	#[serde(default)]
	pub(crate) default_sets: Vec<u64>,
	pub(crate) sets: BTreeMap<String, FfzEmoteSet>,
}

#[derive(Debug, Deserialize)]
struct FfzRoomResponse {
	room: FfzRoom,
	sets: BTreeMap<String, FfzEmoteSet>,
}

#[derive(Debug, Deserialize)]
struct FfzRoom {
	#[serde(deserialize_with = "string_or_number")]
	set: String,
}

fn absolute(url: &str) -> String {
	if url.starts_with("//") {
		format!("https:{url}")
	} else {
		url.to_string()
	}
}

/// Map an FFZ emote. The url is the largest size variant on offer.
pub fn emote_from_ffz(emote: FfzEmote) -> Emote {
	let url = URL_SIZES
		.iter()
		.find_map(|size| emote.urls.get(*size).filter(|u| !u.is_empty()))
		.map(|u| absolute(u))
		.unwrap_or_default();

	Emote {
		id: emote.id.clone(),
		name: emote.name.clone(),
		url,
		source: Some(EmoteSource::Ffz(emote)),
	}
}

pub struct FfzEmotes {
	http: reqwest::Client,
	base_url: String,
}

impl FfzEmotes {
	pub fn new(http: reqwest::Client, endpoints: &CatalogEndpoints) -> Self {
		Self {
			http,
			base_url: endpoints.ffz_base_url.clone(),
		}
	}
}

#[async_trait]
impl CatalogProvider<Emote> for FfzEmotes {
	fn flavor(&self) -> Flavor {
		Flavor::Ffz
	}

	/// Only the `default_sets` are available everywhere; the rest are opt-in.
	async fn fetch_global(&self) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(&self.base_url, "set/global");
		let mut body: FfzGlobalResponse = fetch_json(self.http.get(url), "ffz global set").await?;

		let mut emotes = Vec::new();
		for set_id in body.default_sets {
			if let Some(set) = body.sets.remove(&set_id.to_string()) {
				emotes.extend(set.emoticons.into_iter().map(emote_from_ffz));
			}
		}
		Ok(emotes)
	}

	/// FFZ keys rooms by login, not by broadcaster id.
	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(
			&self.base_url,
			&format!("room/{}", urlencoding::encode(channel.login.as_str())),
		);
		let mut body: FfzRoomResponse = fetch_json(self.http.get(url), "ffz room").await?;

		let set = body
			.sets
			.remove(&body.room.set)
			.with_context(|| format!("ffz set {} not found", body.room.set))?;
		Ok(set.emoticons.into_iter().map(emote_from_ffz).collect())
	}
}
