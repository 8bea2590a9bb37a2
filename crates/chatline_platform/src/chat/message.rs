#![forbid(unsafe_code)]

use chatline_domain::ChannelName;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::irc::IrcMessage;

const ACTION_PREFIX: &str = "\u{1}ACTION ";
const ACTION_SUFFIX: char = '\u{1}';

/// Position of a Twitch emote inside the message text, in chars, end inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteSpan {
	pub id: String,
	pub start: usize,
	pub end: usize,
}

/// A chat message as delivered by the transport, with its tags decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateMessage {
	pub id: Option<String>,
	pub channel: ChannelName,
	pub login: String,
	pub display_name: Option<String>,
	pub user_id: Option<String>,
	pub color: Option<String>,
	/// `(set, version)` pairs from the `badges` tag.
	pub badges: Vec<(String, String)>,
	pub emotes: Vec<EmoteSpan>,
	/// Sent with `/me`.
	pub action: bool,
	pub text: String,
	pub timestamp: DateTime<Utc>,
	/// The line as received.
	pub raw: String,
}

impl PrivateMessage {
	/// Minimal message without tags.
	pub fn new(channel: &str, login: &str, text: &str) -> Self {
		Self {
			id: None,
			channel: ChannelName::new(channel),
			login: login.to_string(),
			display_name: None,
			user_id: None,
			color: None,
			badges: Vec::new(),
			emotes: Vec::new(),
			action: false,
			text: text.to_string(),
			timestamp: Utc::now(),
			raw: String::new(),
		}
	}

	/// Decode a `PRIVMSG`. Other commands yield `None`.
	pub fn from_irc(msg: &IrcMessage, raw: &str) -> Option<Self> {
		if msg.command != "PRIVMSG" {
			return None;
		}

		let channel = ChannelName::new(msg.param(0)?);
		let body = msg.param(1).unwrap_or_default();
		let (text, action) = match body.strip_prefix(ACTION_PREFIX) {
			Some(inner) => (inner.strip_suffix(ACTION_SUFFIX).unwrap_or(inner), true),
			None => (body, false),
		};

		let login = msg.nick().unwrap_or_default().to_string();
		let timestamp = msg
			.tag_nonempty("tmi-sent-ts")
			.and_then(|ts| ts.parse::<i64>().ok())
			.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
			.unwrap_or_else(Utc::now);

		Some(Self {
			id: msg.tag_nonempty("id").map(str::to_string),
			channel,
			login,
			display_name: msg.tag_nonempty("display-name").map(str::to_string),
			user_id: msg.tag_nonempty("user-id").map(str::to_string),
			color: msg.tag_nonempty("color").map(str::to_string),
			badges: msg.tag_nonempty("badges").map(parse_badges).unwrap_or_default(),
			emotes: msg.tag_nonempty("emotes").map(parse_emotes).unwrap_or_default(),
			action,
			text: text.to_string(),
			timestamp,
			raw: raw.to_string(),
		})
	}

	/// Display name when set, login otherwise.
	pub fn author(&self) -> &str {
		self.display_name.as_deref().unwrap_or(&self.login)
	}

	/// Badge ids in `set/version` form.
	pub fn badge_ids(&self) -> impl Iterator<Item = String> + '_ {
		self.badges.iter().map(|(set, version)| format!("{set}/{version}"))
	}
}

/// `subscriber/12,premium/1`
fn parse_badges(raw: &str) -> Vec<(String, String)> {
	raw.split(',')
		.filter_map(|b| b.split_once('/'))
		.map(|(set, version)| (set.to_string(), version.to_string()))
		.collect()
}

/// `25:0-4,12-16/1902:6-10`
fn parse_emotes(raw: &str) -> Vec<EmoteSpan> {
	let mut spans = Vec::new();
	for entry in raw.split('/') {
		let Some((id, ranges)) = entry.split_once(':') else {
			continue;
		};
		for range in ranges.split(',') {
			let Some((start, end)) = range.split_once('-') else {
				continue;
			};
			if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
				spans.push(EmoteSpan {
					id: id.to_string(),
					start,
					end,
				});
			}
		}
	}
	spans.sort_by_key(|s| s.start);
	spans
}
