#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatline_domain::{ChannelRef, Flavor, Scope};

use super::bttv::{BttvEmote, emote_from_bttv};
use super::{CatalogProvider, Emote, EmoteCache, load_channel, load_global};

fn emote(id: &str, name: &str) -> Emote {
	emote_from_bttv(BttvEmote {
		id: id.to_string(),
		code: name.to_string(),
		image_type: "png".to_string(),
		animated: false,
	})
}

struct FakeProvider {
	flavor: Flavor,
	global: Vec<Emote>,
	channel: Vec<Emote>,
	fail: bool,
	delay: Duration,
	seen: Arc<parking_lot::Mutex<Vec<ChannelRef>>>,
}

impl FakeProvider {
	fn ok(flavor: Flavor, global: Vec<Emote>, channel: Vec<Emote>) -> Self {
		Self {
			flavor,
			global,
			channel,
			fail: false,
			delay: Duration::ZERO,
			seen: Arc::default(),
		}
	}

	fn failing(flavor: Flavor) -> Self {
		Self {
			fail: true,
			..Self::ok(flavor, Vec::new(), Vec::new())
		}
	}
}

#[async_trait]
impl CatalogProvider<Emote> for FakeProvider {
	fn flavor(&self) -> Flavor {
		self.flavor
	}

	async fn fetch_global(&self) -> anyhow::Result<Vec<Emote>> {
		tokio::time::sleep(self.delay).await;
		if self.fail {
			anyhow::bail!("{} global unavailable", self.flavor);
		}
		Ok(self.global.clone())
	}

	async fn fetch_channel(&self, channel: &ChannelRef) -> anyhow::Result<Vec<Emote>> {
		self.seen.lock().push(channel.clone());
		tokio::time::sleep(self.delay).await;
		if self.fail {
			anyhow::bail!("{} channel unavailable", self.flavor);
		}
		Ok(self.channel.clone())
	}
}

#[tokio::test]
async fn global_load_isolates_provider_failures() {
	let cache = EmoteCache::new();
	let providers: Vec<Arc<dyn CatalogProvider<Emote>>> = vec![
		Arc::new(FakeProvider::ok(Flavor::Helix, vec![emote("25", "Kappa")], Vec::new())),
		Arc::new(FakeProvider::failing(Flavor::Bttv)),
		Arc::new(FakeProvider::ok(Flavor::Ffz, vec![emote("9", "LilZ")], Vec::new())),
	];

	let report = load_global(&cache, &providers).await;

	assert!(!report.is_complete());
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].flavor, Flavor::Bttv);
	assert_eq!(report.failures[0].scope, Scope::Global);
	assert!(report.failures[0].error.to_string().contains("unavailable"));
	assert_eq!(report.loaded, vec![(Flavor::Helix, 1), (Flavor::Ffz, 1)]);
	assert_eq!(report.total(), 2);

	assert_eq!(cache.get_by_name(&Scope::Global, "Kappa").id, "25");
	assert_eq!(cache.get_by_name(&Scope::Global, "LilZ").id, "9");
}

#[tokio::test]
async fn global_load_is_idempotent() {
	let cache = EmoteCache::new();
	let providers: Vec<Arc<dyn CatalogProvider<Emote>>> = vec![Arc::new(FakeProvider::ok(
		Flavor::SevenTv,
		vec![emote("a", "A"), emote("b", "B")],
		Vec::new(),
	))];

	load_global(&cache, &providers).await;
	let report = load_global(&cache, &providers).await;

	assert!(report.is_complete());
	assert_eq!(cache.scope_len(&Scope::Global), 2);
}

#[tokio::test]
async fn channel_load_threads_both_identifiers() {
	let cache = EmoteCache::new();
	let provider = Arc::new(FakeProvider::ok(Flavor::Ffz, Vec::new(), vec![emote("c1", "ChanEmote")]));
	let seen = Arc::clone(&provider.seen);
	let providers: Vec<Arc<dyn CatalogProvider<Emote>>> = vec![provider as Arc<dyn CatalogProvider<Emote>>];

	let channel = ChannelRef::new("12345", "#SomeStreamer").expect("channel ref");
	let report = load_channel(&channel, &cache, &providers).await;

	assert!(report.is_complete());
	let seen = seen.lock();
	assert_eq!(seen.len(), 1);
	assert_eq!(seen[0].id, "12345");
	assert_eq!(seen[0].login.as_str(), "somestreamer");

	let scope = Scope::channel("somestreamer");
	assert_eq!(cache.get(&scope, "c1").name, "ChanEmote");
	assert!(!cache.has(&Scope::Global, "c1"));
	assert!(cache.has_scope(&channel.login));
}

#[tokio::test]
async fn failed_channel_load_leaves_scope_untouched() {
	let cache = EmoteCache::new();
	let providers: Vec<Arc<dyn CatalogProvider<Emote>>> = vec![Arc::new(FakeProvider::failing(Flavor::SevenTv))];

	let channel = ChannelRef::new("1", "quiet").expect("channel ref");
	let report = load_channel(&channel, &cache, &providers).await;

	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].scope, Scope::channel("quiet"));
	assert!(!cache.has_scope(&channel.login));
}

#[tokio::test]
async fn providers_are_fetched_concurrently() {
	let cache = EmoteCache::new();
	let delay = Duration::from_millis(200);
	let slow = |flavor, id: &str| {
		let mut p = FakeProvider::ok(flavor, vec![emote(id, id)], Vec::new());
		p.delay = delay;
		Arc::new(p) as Arc<dyn CatalogProvider<Emote>>
	};
	let providers = vec![slow(Flavor::Helix, "h"), slow(Flavor::Bttv, "b"), slow(Flavor::Ffz, "f")];

	let started = tokio::time::Instant::now();
	let report = load_global(&cache, &providers).await;

	assert!(report.is_complete());
	assert!(started.elapsed() < delay * 3, "fetches ran sequentially");
	assert_eq!(cache.scope_len(&Scope::Global), 3);
}
