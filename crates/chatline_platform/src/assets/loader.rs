#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor, Scope};
use futures::future::join_all;
use tracing::{info, warn};

use super::bttv::BttvEmotes;
use super::cache::AssetCache;
use super::common::{CatalogEndpoints, http_client};
use super::ffz::FfzEmotes;
use super::helix::{HelixBadges, HelixEmotes};
use super::record::{Badge, CachedAsset, Emote};
use super::seventv::SevenTvEmotes;
use crate::twitch::HelixClient;

/// Fetches one provider's global or per-channel catalog, already mapped to records.
///
/// A fetch either returns the whole catalog or fails; loaders commit the result
/// in one batch so readers never see half of a provider's records.
#[async_trait]
pub trait CatalogProvider<T: CachedAsset>: Send + Sync {
	fn flavor(&self) -> Flavor;

	async fn fetch_global(&self) -> anyhow::Result<Vec<T>>;

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<T>>;
}

/// A provider fetch that failed; its part of the catalog is simply absent.
#[derive(Debug)]
pub struct ProviderFailure {
	pub flavor: Flavor,
	pub scope: Scope,
	pub error: anyhow::Error,
}

/// Outcome of one loader invocation.
#[derive(Debug, Default)]
pub struct LoadReport {
	/// Records committed per provider, in provider order.
	pub loaded: Vec<(Flavor, usize)>,
	pub failures: Vec<ProviderFailure>,
}

impl LoadReport {
	pub fn is_complete(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn total(&self) -> usize {
		self.loaded.iter().map(|(_, n)| n).sum()
	}
}

/// Populate the global store from every provider. Providers are fetched concurrently
/// and failures are isolated: a failing provider never prevents the others from committing.
pub async fn load_global<T: CachedAsset>(cache: &AssetCache<T>, providers: &[Arc<dyn CatalogProvider<T>>]) -> LoadReport {
	load_scope(cache, Scope::Global, None, providers).await
}

/// Populate one channel's store. The scope key is the channel login; providers pick
/// whichever identifier (id or login) their endpoint expects.
pub async fn load_channel<T: CachedAsset>(
	channel: &ChannelRef,
	cache: &AssetCache<T>,
	providers: &[Arc<dyn CatalogProvider<T>>],
) -> LoadReport {
	load_scope(cache, Scope::from(&channel.login), Some(channel), providers).await
}

async fn load_scope<T: CachedAsset>(
	cache: &AssetCache<T>,
	scope: Scope,
	channel: Option<&ChannelRef>,
	providers: &[Arc<dyn CatalogProvider<T>>],
) -> LoadReport {
	let scope = &scope;
	let fetches = providers.iter().map(|provider| async move {
		let flavor = provider.flavor();
		let result = match channel {
			None => provider.fetch_global().await,
			Some(channel) => provider.fetch_channel(channel).await,
		};

		match result {
			Ok(records) => {
				let count = cache.extend(scope, records);
				metrics::counter!("chatline_catalog_loads_total", "flavor" => flavor.as_str(), "scope" => scope.label())
					.increment(1);
				info!(flavor = %flavor, scope = %scope, count, "catalog loaded");
				Ok((flavor, count))
			}
			Err(error) => {
				metrics::counter!("chatline_catalog_failures_total", "flavor" => flavor.as_str(), "scope" => scope.label())
					.increment(1);
				warn!(flavor = %flavor, scope = %scope, error = ?error, "catalog fetch failed");
				Err(ProviderFailure {
					flavor,
					scope: scope.clone(),
					error,
				})
			}
		}
	});

	let mut report = LoadReport::default();
	for outcome in join_all(fetches).await {
		match outcome {
			Ok(loaded) => report.loaded.push(loaded),
			Err(failure) => report.failures.push(failure),
		}
	}
	report
}

/// Helix, BTTV, FFZ and 7TV emote fetchers.
pub fn emote_providers(endpoints: &CatalogEndpoints, helix: HelixClient) -> anyhow::Result<Vec<Arc<dyn CatalogProvider<Emote>>>> {
	let http = http_client()?;
	let providers: Vec<Arc<dyn CatalogProvider<Emote>>> = vec![
		Arc::new(HelixEmotes::new(helix)),
		Arc::new(BttvEmotes::new(http.clone(), endpoints)),
		Arc::new(FfzEmotes::new(http.clone(), endpoints)),
		Arc::new(SevenTvEmotes::new(http, endpoints)),
	];
	Ok(providers)
}

pub fn badge_providers(helix: HelixClient) -> Vec<Arc<dyn CatalogProvider<Badge>>> {
	vec![Arc::new(HelixBadges::new(helix))]
}
