#![forbid(unsafe_code)]

pub mod bttv;
mod cache;
mod common;
pub mod ffz;
pub mod helix;
mod loader;
mod record;
pub mod seventv;

#[cfg(test)]
mod cache_tests;
#[cfg(test)]
mod loader_tests;

pub use cache::{AssetCache, BadgeCache, EmoteCache};
pub use common::CatalogEndpoints;
pub use loader::{
	CatalogProvider, LoadReport, ProviderFailure, badge_providers, emote_providers, load_channel, load_global,
};
pub use record::{Badge, BadgeSource, CachedAsset, Emote, EmoteSource, INVALID_ID};
