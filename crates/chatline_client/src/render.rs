#![forbid(unsafe_code)]

use chatline_domain::{Flavor, Scope};
use chatline_platform::chat::{EmoteSpan, PrivateMessage};
use chatline_platform::{BadgeCache, CachedAsset, EmoteCache};

/// One terminal line for a chat message: time, channel, badges, author, text.
///
/// Twitch emotes come from the message's own position tags, so they render even
/// when the catalog does not hold them. Other words that name a known emote in
/// the channel (or globally) are shown as `<flavor:Name>` too.
pub fn render_line(emotes: &EmoteCache, badges: &BadgeCache, text: &str, raw: &PrivateMessage) -> String {
	let scope = Scope::from(&raw.channel);

	let badge_tags: String = raw
		.badge_ids()
		.map(|id| badges.get(&scope, &id))
		.filter(|b| !b.is_invalid())
		.map(|b| format!("[{}]", b.name))
		.collect();

	// Spans index the delivered text; a rewritten text cannot use them.
	let body = if text == raw.text {
		render_with_spans(emotes, &scope, text, &raw.emotes)
	} else {
		render_words(emotes, &scope, text)
	};

	let sep = if raw.action { " " } else { ": " };
	format!(
		"{} #{} {}{}{sep}{body}",
		raw.timestamp.format("%H:%M:%S"),
		raw.channel,
		badge_tags,
		raw.author()
	)
}

fn render_with_spans(emotes: &EmoteCache, scope: &Scope, text: &str, spans: &[EmoteSpan]) -> String {
	let chars: Vec<char> = text.chars().collect();
	let mut out = String::with_capacity(text.len());
	let mut pos = 0;

	for span in spans {
		// Overlapping or out of range spans are ignored.
		if span.start < pos || span.end < span.start || span.end >= chars.len() {
			continue;
		}

		let before: String = chars[pos..span.start].iter().collect();
		out.push_str(&render_words(emotes, scope, &before));

		let cached = emotes.get(scope, &span.id);
		let name = if cached.is_invalid() {
			chars[span.start..=span.end].iter().collect()
		} else {
			cached.name
		};
		out.push_str(&format!("<{}:{name}>", Flavor::Helix.as_str()));
		pos = span.end + 1;
	}

	let rest: String = chars[pos..].iter().collect();
	out.push_str(&render_words(emotes, scope, &rest));
	out
}

fn render_words(emotes: &EmoteCache, scope: &Scope, text: &str) -> String {
	text.split(' ')
		.map(|word| {
			let emote = emotes.get_by_name(scope, word);
			if word.is_empty() || emote.is_invalid() {
				word.to_string()
			} else {
				format!("<{}:{}>", emote.flavor().map_or("?", Flavor::as_str), emote.name)
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}
