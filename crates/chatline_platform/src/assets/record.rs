#![forbid(unsafe_code)]

use chatline_domain::Flavor;
use serde::{Deserialize, Serialize};

use super::bttv::BttvEmote;
use super::ffz::FfzEmote;
use super::helix::{HelixBadgeVersion, HelixEmote};
use super::seventv::SevenTvEmote;

/// Id and name carried by the miss sentinel.
pub const INVALID_ID: &str = "invalid";

/// A record the cache can index by id and by name.
pub trait CachedAsset: Clone + Send + Sync + 'static {
	fn id(&self) -> &str;

	/// Display/match key used for inline substitution.
	fn name(&self) -> &str;

	/// Placeholder returned on lookup miss.
	fn invalid() -> Self;

	fn is_invalid(&self) -> bool;
}

/// Provider payload an emote was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flavor", content = "payload", rename_all = "snake_case")]
pub enum EmoteSource {
	Helix(HelixEmote),
	Bttv(BttvEmote),
	Ffz(FfzEmote),
	#[serde(rename = "seventv")]
	SevenTv(SevenTvEmote),
}

impl EmoteSource {
	pub fn flavor(&self) -> Flavor {
		match self {
			Self::Helix(_) => Flavor::Helix,
			Self::Bttv(_) => Flavor::Bttv,
			Self::Ffz(_) => Flavor::Ffz,
			Self::SevenTv(_) => Flavor::SevenTv,
		}
	}

	/// Whether the provider marks the emote as animated.
	pub fn is_animated(&self) -> bool {
		match self {
			Self::Helix(e) => e.format.iter().any(|f| f == "animated"),
			Self::Bttv(e) => e.animated || e.image_type.eq_ignore_ascii_case("gif"),
			Self::Ffz(e) => e.animated.is_some(),
			Self::SevenTv(e) => e.data.animated,
		}
	}
}

/// Normalized emote. Values are computed once by the provider adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emote {
	pub id: String,
	pub name: String,
	pub url: String,
	/// `None` only for the miss sentinel.
	pub source: Option<EmoteSource>,
}

impl Emote {
	pub fn flavor(&self) -> Option<Flavor> {
		self.source.as_ref().map(EmoteSource::flavor)
	}
}

impl CachedAsset for Emote {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn invalid() -> Self {
		Self {
			id: INVALID_ID.to_string(),
			name: INVALID_ID.to_string(),
			url: String::new(),
			source: None,
		}
	}

	fn is_invalid(&self) -> bool {
		self.source.is_none() && self.id == INVALID_ID
	}
}

/// Provider payload a badge was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flavor", content = "payload", rename_all = "snake_case")]
pub enum BadgeSource {
	Helix(HelixBadgeVersion),
}

impl BadgeSource {
	pub fn flavor(&self) -> Flavor {
		match self {
			Self::Helix(_) => Flavor::Helix,
		}
	}
}

/// Normalized chat badge. Ids use the chat tag form `set/version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
	pub id: String,
	pub name: String,
	pub url: String,
	pub source: Option<BadgeSource>,
}

impl Badge {
	pub fn flavor(&self) -> Option<Flavor> {
		self.source.as_ref().map(BadgeSource::flavor)
	}
}

impl CachedAsset for Badge {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn invalid() -> Self {
		Self {
			id: INVALID_ID.to_string(),
			name: INVALID_ID.to_string(),
			url: String::new(),
			source: None,
		}
	}

	fn is_invalid(&self) -> bool {
		self.source.is_none() && self.id == INVALID_ID
	}
}
