#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emote/badge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
	Helix,
	Bttv,
	Ffz,
	#[serde(rename = "seventv")]
	SevenTv,
}

impl Flavor {
	pub const ALL: [Flavor; 4] = [Flavor::Helix, Flavor::Bttv, Flavor::Ffz, Flavor::SevenTv];

	/// Stable string identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			Flavor::Helix => "helix",
			Flavor::Bttv => "bttv",
			Flavor::Ffz => "ffz",
			Flavor::SevenTv => "seventv",
		}
	}
}

impl fmt::Display for Flavor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown flavor: {0}")]
	UnknownFlavor(String),
}

impl FromStr for Flavor {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"helix" | "twitch" => Ok(Flavor::Helix),
			"bttv" | "betterttv" => Ok(Flavor::Bttv),
			"ffz" | "frankerfacez" => Ok(Flavor::Ffz),
			"seventv" | "7tv" => Ok(Flavor::SevenTv),
			other => Err(ParseIdError::UnknownFlavor(other.to_string())),
		}
	}
}

/// Normalize a channel identifier: lowercase, no leading `#`.
///
/// Never fails. `"#Foo"`, `"foo"` and `"FOO"` all map to `"foo"`. Every leading
/// `#` is stripped so that the result is a fixed point.
pub fn sanitize(raw: &str) -> String {
	raw.to_lowercase().trim_start_matches('#').to_string()
}

/// Sanitized channel login. The only way to build one is through [`sanitize`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
	pub fn new(raw: &str) -> Self {
		Self(sanitize(raw))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// IRC form (`#login`).
	pub fn irc(&self) -> String {
		format!("#{}", self.0)
	}
}

impl fmt::Display for ChannelName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ChannelName {
	fn from(raw: &str) -> Self {
		Self::new(raw)
	}
}

impl From<String> for ChannelName {
	fn from(raw: String) -> Self {
		Self::new(&raw)
	}
}

impl From<ChannelName> for String {
	fn from(name: ChannelName) -> Self {
		name.0
	}
}

/// A channel addressed by both of its identifier spaces.
///
/// Helix/BTTV/7TV key channels by numeric broadcaster id, FFZ and chat key them
/// by login. The two are not interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
	pub id: String,
	pub login: ChannelName,
}

impl ChannelRef {
	/// Create a `ChannelRef` with a non-empty id and login.
	pub fn new(id: impl Into<String>, login: &str) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		let login = ChannelName::new(login);
		if login.is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self {
			id: id.trim().to_string(),
			login,
		})
	}
}

impl fmt::Display for ChannelRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.login, self.id)
	}
}

/// Cache namespace: the global catalog or one channel's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
	Global,
	Channel(ChannelName),
}

impl Scope {
	/// Channel scope from an unsanitized name.
	pub fn channel(raw: &str) -> Self {
		Scope::Channel(ChannelName::new(raw))
	}

	pub fn as_channel(&self) -> Option<&ChannelName> {
		match self {
			Scope::Global => None,
			Scope::Channel(name) => Some(name),
		}
	}

	/// Short label for logs and metrics.
	pub fn label(&self) -> &'static str {
		match self {
			Scope::Global => "global",
			Scope::Channel(_) => "channel",
		}
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Scope::Global => f.write_str("global"),
			Scope::Channel(name) => write!(f, "channel:{name}"),
		}
	}
}

impl From<&ChannelName> for Scope {
	fn from(name: &ChannelName) -> Self {
		Scope::Channel(name.clone())
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn flavor_parse_and_display() {
		assert_eq!("bttv".parse::<Flavor>().unwrap(), Flavor::Bttv);
		assert_eq!("7TV".parse::<Flavor>().unwrap(), Flavor::SevenTv);
		assert_eq!(Flavor::Helix.to_string(), "helix");
		assert!("".parse::<Flavor>().is_err());
		assert!(matches!("kick".parse::<Flavor>(), Err(ParseIdError::UnknownFlavor(_))));
	}

	#[test]
	fn sanitize_normalizes_case_and_hash() {
		assert_eq!(sanitize("#Foo"), "foo");
		assert_eq!(sanitize("foo"), "foo");
		assert_eq!(sanitize("FOO"), "foo");
		assert_eq!(sanitize(""), "");
		assert_eq!(sanitize("#"), "");
		assert_eq!(ChannelName::new("#Foo"), ChannelName::new("FOO"));
	}

	#[test]
	fn sanitize_strips_every_leading_hash() {
		assert_eq!(sanitize("##foo"), "foo");
		assert_eq!(sanitize("##foo"), sanitize(&sanitize("##foo")));
		assert_eq!(sanitize("f#oo"), "f#oo");
	}

	#[test]
	fn channel_name_irc_form() {
		assert_eq!(ChannelName::new("#Shroud").irc(), "#shroud");
	}

	#[test]
	fn channel_name_deserializes_sanitized() {
		let names: Vec<ChannelName> = serde_json::from_str(r##"["#Foo","bar"]"##).unwrap();
		assert_eq!(names, vec![ChannelName::new("foo"), ChannelName::new("bar")]);
	}

	#[test]
	fn channel_ref_rejects_empty_parts() {
		assert!(ChannelRef::new("", "foo").is_err());
		assert!(ChannelRef::new("123", "#").is_err());

		let r = ChannelRef::new(" 123 ", "#Foo").unwrap();
		assert_eq!(r.id, "123");
		assert_eq!(r.login.as_str(), "foo");
	}

	#[test]
	fn scope_channel_sanitizes() {
		assert_eq!(Scope::channel("#Foo"), Scope::Channel(ChannelName::new("foo")));
		assert_eq!(Scope::Global.label(), "global");
		assert_eq!(Scope::channel("x").to_string(), "channel:x");
	}

	proptest! {
		#[test]
		fn sanitize_is_idempotent(raw in "#{0,3}[A-Za-z0-9_]{0,25}") {
			let once = sanitize(&raw);
			prop_assert_eq!(sanitize(&once), once);
		}

		#[test]
		fn sanitize_ignores_case_and_prefix(login in "[a-z0-9_]{1,25}") {
			let upper = login.to_uppercase();
			prop_assert_eq!(sanitize(&format!("#{upper}")), login.clone());
			prop_assert_eq!(sanitize(&upper), login);
		}
	}
}
