#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chatline_domain::{ChannelName, Scope};
use parking_lot::RwLock;
use tracing::debug;

use super::record::{Badge, CachedAsset, Emote};

pub type EmoteCache = AssetCache<Emote>;
pub type BadgeCache = AssetCache<Badge>;

/// Forward (id -> record) and reverse (name -> id) index for one scope.
#[derive(Debug)]
struct ScopeStore<T> {
	by_id: HashMap<String, T>,
	id_by_name: HashMap<String, String>,
}

impl<T> Default for ScopeStore<T> {
	fn default() -> Self {
		Self {
			by_id: HashMap::new(),
			id_by_name: HashMap::new(),
		}
	}
}

impl<T: CachedAsset> ScopeStore<T> {
	fn insert(&mut self, scope: &Scope, id: String, record: T) {
		if let Some(prev) = self.by_id.get(&id)
			&& prev.name() != record.name()
			&& self.id_by_name.get(prev.name()) == Some(&id)
		{
			self.id_by_name.remove(prev.name());
		}

		if let Some(other) = self.id_by_name.get(record.name())
			&& *other != id
		{
			debug!(scope = %scope, name = %record.name(), old_id = %other, new_id = %id, "asset name collision; last write wins");
		}

		self.id_by_name.insert(record.name().to_string(), id.clone());
		self.by_id.insert(id, record);
	}

	fn lookup_name(&self, name: &str) -> Option<&T> {
		self.id_by_name.get(name).and_then(|id| self.by_id.get(id))
	}
}

#[derive(Debug)]
struct CacheInner<T> {
	global: ScopeStore<T>,
	channels: HashMap<ChannelName, ScopeStore<T>>,
}

impl<T> Default for CacheInner<T> {
	fn default() -> Self {
		Self {
			global: ScopeStore::default(),
			channels: HashMap::new(),
		}
	}
}

impl<T: CachedAsset> CacheInner<T> {
	fn store(&self, scope: &Scope) -> Option<&ScopeStore<T>> {
		match scope {
			Scope::Global => Some(&self.global),
			Scope::Channel(channel) => self.channels.get(channel),
		}
	}

	fn store_mut(&mut self, scope: &Scope) -> &mut ScopeStore<T> {
		match scope {
			Scope::Global => &mut self.global,
			Scope::Channel(channel) => self.channels.entry(channel.clone()).or_default(),
		}
	}

	fn channel_store(&self, scope: &Scope) -> Option<&ScopeStore<T>> {
		scope.as_channel().and_then(|c| self.channels.get(c))
	}
}

/// Global + per-channel asset lookup with channel-then-global fallback.
///
/// Scoped stores are created on first write and never merged into the global one;
/// the two are independent id spaces. Clones share the same storage.
pub struct AssetCache<T> {
	inner: Arc<RwLock<CacheInner<T>>>,
}

impl<T> Clone for AssetCache<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Default for AssetCache<T> {
	fn default() -> Self {
		Self {
			inner: Arc::new(RwLock::new(CacheInner::default())),
		}
	}
}

impl<T: CachedAsset> AssetCache<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Upsert one record. Both indices change under the same lock.
	pub fn set(&self, scope: &Scope, id: impl Into<String>, record: T) {
		let mut inner = self.inner.write();
		inner.store_mut(scope).insert(scope, id.into(), record);
	}

	/// Commit a whole batch under one write lock, keyed by each record's id.
	///
	/// The scope store is created even for an empty batch, so a successful load
	/// of an empty catalog still counts for [`AssetCache::has_scope`].
	pub fn extend(&self, scope: &Scope, records: impl IntoIterator<Item = T>) -> usize {
		let mut inner = self.inner.write();
		let store = inner.store_mut(scope);
		let mut count = 0;
		for record in records {
			let id = record.id().to_string();
			store.insert(scope, id, record);
			count += 1;
		}
		count
	}

	/// Scope-strict: does not fall back to the global store.
	pub fn has(&self, scope: &Scope, id: &str) -> bool {
		self.inner.read().store(scope).is_some_and(|s| s.by_id.contains_key(id))
	}

	/// Scope-strict: does not fall back to the global store.
	pub fn has_name(&self, scope: &Scope, name: &str) -> bool {
		self.inner.read().store(scope).is_some_and(|s| s.id_by_name.contains_key(name))
	}

	/// Channel record, then global record, then the invalid sentinel.
	pub fn get(&self, scope: &Scope, id: &str) -> T {
		let inner = self.inner.read();
		inner
			.channel_store(scope)
			.and_then(|s| s.by_id.get(id))
			.or_else(|| inner.global.by_id.get(id))
			.cloned()
			.unwrap_or_else(T::invalid)
	}

	/// Name lookup with the same fallback as [`AssetCache::get`]. The id is resolved
	/// in the store that owns the name.
	pub fn get_by_name(&self, scope: &Scope, name: &str) -> T {
		let inner = self.inner.read();
		inner
			.channel_store(scope)
			.and_then(|s| s.lookup_name(name))
			.or_else(|| inner.global.lookup_name(name))
			.cloned()
			.unwrap_or_else(T::invalid)
	}

	/// True once anything has been written for the channel.
	pub fn has_scope(&self, channel: &ChannelName) -> bool {
		self.inner.read().channels.contains_key(channel)
	}

	pub fn scope_len(&self, scope: &Scope) -> usize {
		self.inner.read().store(scope).map_or(0, |s| s.by_id.len())
	}

	pub fn channels(&self) -> Vec<ChannelName> {
		let mut channels: Vec<ChannelName> = self.inner.read().channels.keys().cloned().collect();
		channels.sort();
		channels
	}
}
