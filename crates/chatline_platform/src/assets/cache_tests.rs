#![forbid(unsafe_code)]

use chatline_domain::{ChannelName, Scope};

use super::bttv::{BttvEmote, emote_from_bttv};
use super::{CachedAsset, Emote, EmoteCache, INVALID_ID};

fn emote(id: &str, name: &str) -> Emote {
	emote_from_bttv(BttvEmote {
		id: id.to_string(),
		code: name.to_string(),
		image_type: "png".to_string(),
		animated: false,
	})
}

#[test]
fn miss_returns_invalid_sentinel() {
	let cache = EmoteCache::new();

	for scope in [Scope::Global, Scope::channel("foo")] {
		let rec = cache.get(&scope, "nonexistent");
		assert_eq!(rec.id, INVALID_ID);
		assert_eq!(rec.name, INVALID_ID);
		assert_eq!(rec.url, "");
		assert!(rec.is_invalid());
		assert!(cache.get_by_name(&scope, "nonexistent").is_invalid());
	}
}

#[test]
fn channel_lookup_falls_back_to_global() {
	let cache = EmoteCache::new();
	let g = emote("g1", "Kappa");
	cache.set(&Scope::Global, "g1", g.clone());

	let chan = Scope::channel("#Foo");
	assert_eq!(cache.get(&chan, "g1"), g);
	assert_eq!(cache.get(&Scope::Global, "g1"), g);
	assert_eq!(cache.get_by_name(&chan, "Kappa"), g);
}

#[test]
fn channel_record_shadows_global() {
	let cache = EmoteCache::new();
	let r1 = emote("x", "Chan");
	let r2 = emote("x", "Glob");
	cache.set(&Scope::Global, "x", r2.clone());
	cache.set(&Scope::channel("c"), "x", r1.clone());

	assert_eq!(cache.get(&Scope::channel("c"), "x"), r1);
	assert_eq!(cache.get(&Scope::Global, "x"), r2);
	assert_eq!(cache.get(&Scope::channel("other"), "x"), r2);
}

#[test]
fn scope_keys_are_sanitized() {
	let cache = EmoteCache::new();
	let r = emote("1", "a");
	cache.set(&Scope::channel("#FOO"), "1", r.clone());

	assert_eq!(cache.get(&Scope::channel("foo"), "1"), r);
	assert!(cache.has(&Scope::channel("Foo"), "1"));
	assert!(cache.has_scope(&ChannelName::new("#foo")));
}

#[test]
fn has_is_scope_strict() {
	let cache = EmoteCache::new();
	cache.set(&Scope::Global, "g", emote("g", "G"));

	let chan = Scope::channel("c");
	assert!(cache.has(&Scope::Global, "g"));
	assert!(cache.has_name(&Scope::Global, "G"));
	assert!(!cache.has(&chan, "g"));
	assert!(!cache.has_name(&chan, "G"));
	assert!(!cache.get(&chan, "g").is_invalid());
}

#[test]
fn reverse_index_matches_forward_index() {
	let cache = EmoteCache::new();
	let chan = Scope::channel("c");
	for (id, name) in [("1", "a"), ("2", "b"), ("3", "c")] {
		cache.set(&chan, id, emote(id, name));
		assert_eq!(cache.get_by_name(&chan, name), cache.get(&chan, id));
	}
}

#[test]
fn has_scope_only_after_a_scoped_write() {
	let cache = EmoteCache::new();
	let foo = ChannelName::new("foo");
	assert!(!cache.has_scope(&foo));

	cache.set(&Scope::Global, "1", emote("1", "a"));
	assert!(!cache.has_scope(&foo));

	cache.extend(&Scope::from(&foo), Vec::new());
	assert!(cache.has_scope(&foo));
	assert_eq!(cache.channels(), vec![foo]);
}

#[test]
fn set_is_idempotent_upsert() {
	let cache = EmoteCache::new();
	cache.set(&Scope::Global, "1", emote("1", "a"));
	cache.set(&Scope::Global, "1", emote("1", "a"));
	assert_eq!(cache.scope_len(&Scope::Global), 1);
}

#[test]
fn rename_drops_stale_reverse_entry() {
	let cache = EmoteCache::new();
	cache.set(&Scope::Global, "1", emote("1", "old"));
	cache.set(&Scope::Global, "1", emote("1", "new"));

	assert!(!cache.has_name(&Scope::Global, "old"));
	assert!(cache.get_by_name(&Scope::Global, "old").is_invalid());
	assert_eq!(cache.get_by_name(&Scope::Global, "new").id, "1");
}

#[test]
fn name_collision_is_last_write_wins() {
	let cache = EmoteCache::new();
	cache.set(&Scope::Global, "a", emote("a", "dup"));
	cache.set(&Scope::Global, "b", emote("b", "dup"));

	assert_eq!(cache.get_by_name(&Scope::Global, "dup").id, "b");
	// Shadowed record stays reachable by id.
	assert_eq!(cache.get(&Scope::Global, "a").name, "dup");

	// Renaming the shadowed id must not remove the winner's name.
	cache.set(&Scope::Global, "a", emote("a", "other"));
	assert_eq!(cache.get_by_name(&Scope::Global, "dup").id, "b");
}

#[test]
fn name_resolves_in_the_store_that_owns_it() {
	let cache = EmoteCache::new();
	let chan = Scope::channel("c");
	// Same id in both scopes, different records.
	cache.set(&Scope::Global, "42", emote("42", "GlobalName"));
	cache.set(&chan, "42", emote("42", "ChanName"));

	assert_eq!(cache.get_by_name(&chan, "GlobalName").name, "GlobalName");
	assert_eq!(cache.get_by_name(&chan, "ChanName").name, "ChanName");
}

#[test]
fn clones_share_storage() {
	let cache = EmoteCache::new();
	let clone = cache.clone();
	clone.extend(&Scope::Global, [emote("1", "a"), emote("2", "b")]);
	assert_eq!(cache.scope_len(&Scope::Global), 2);
	assert_eq!(cache.scope_len(&Scope::channel("nope")), 0);
}
