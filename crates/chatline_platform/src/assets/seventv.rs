#![forbid(unsafe_code)]

use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor};
use serde::{Deserialize, Serialize};

use super::common::{CatalogEndpoints, fetch_json, lenient_list};
use super::loader::CatalogProvider;
use super::record::{Emote, EmoteSource};

const WEBP_FORMAT: &str = "WEBP";
const LARGEST_WEBP: &str = "4x.webp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SevenTvEmote {
	pub id: String,
	pub name: String,
	pub data: SevenTvEmoteData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SevenTvEmoteData {
	#[serde(default)]
	pub animated: bool,
	#[serde(default)]
	pub host: SevenTvHost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SevenTvHost {
	/// Protocol-relative, e.g. `//cdn.7tv.app/emote/<id>`.
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub files: Vec<SevenTvFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SevenTvFile {
	pub name: String,
	#[serde(default)]
	pub format: String,
	#[serde(default)]
	pub width: u32,
	#[serde(default)]
	pub height: u32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SevenTvEmoteSet {
	/// Deleted emotes come back with `data: null` and are skipped.
	#[serde(default, deserialize_with = "lenient_list")]
	pub(crate) emotes: Vec<SevenTvEmote>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SevenTvUserResponse {
	#[serde(default)]
	pub(crate) emote_set: Option<SevenTvEmoteSet>,
}

fn pick_file(files: &[SevenTvFile]) -> Option<&SevenTvFile> {
	let is_webp = |f: &&SevenTvFile| f.format.eq_ignore_ascii_case(WEBP_FORMAT);

	files
		.iter()
		.find(|f| is_webp(f) && f.name == LARGEST_WEBP)
		.or_else(|| files.iter().filter(is_webp).max_by_key(|f| f.width))
		.or_else(|| files.last())
}

/// Map a 7TV emote. Never fails: without a usable file the url degrades to the 4x webp guess.
pub fn emote_from_seventv(emote: SevenTvEmote) -> Emote {
	let host = &emote.data.host;
	let file_name = pick_file(&host.files).map_or(LARGEST_WEBP, |f| f.name.as_str());
	let url = format!("https:{}/{}", host.url, file_name);

	Emote {
		id: emote.id.clone(),
		name: emote.name.clone(),
		url,
		source: Some(EmoteSource::SevenTv(emote)),
	}
}

pub struct SevenTvEmotes {
	http: reqwest::Client,
	base_url: String,
}

impl SevenTvEmotes {
	pub fn new(http: reqwest::Client, endpoints: &CatalogEndpoints) -> Self {
		Self {
			http,
			base_url: endpoints.seventv_base_url.clone(),
		}
	}
}

#[async_trait]
impl CatalogProvider<Emote> for SevenTvEmotes {
	fn flavor(&self) -> Flavor {
		Flavor::SevenTv
	}

	async fn fetch_global(&self) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(&self.base_url, "emote-sets/global");
		let body: SevenTvEmoteSet = fetch_json(self.http.get(url), "7tv global set").await?;
		Ok(body.emotes.into_iter().map(emote_from_seventv).collect())
	}

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Emote>> {
		let url = CatalogEndpoints::join(
			&self.base_url,
			&format!("users/twitch/{}", urlencoding::encode(&channel.id)),
		);
		let body: SevenTvUserResponse = fetch_json(self.http.get(url), "7tv user").await?;
		Ok(body
			.emote_set
			.map(|set| set.emotes.into_iter().map(emote_from_seventv).collect())
			.unwrap_or_default())
	}
}
