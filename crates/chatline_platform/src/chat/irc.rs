#![forbid(unsafe_code)]

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrcParseError {
	#[error("empty line")]
	Empty,

	#[error("missing command")]
	MissingCommand,
}

/// One IRCv3 line: `[@tags] [:prefix] COMMAND [params] [:trailing]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
	pub tags: HashMap<String, String>,
	pub prefix: Option<String>,
	pub command: String,
	pub params: Vec<String>,
}

impl IrcMessage {
	pub fn parse(line: &str) -> Result<Self, IrcParseError> {
		let mut rest = line.trim_end_matches(['\r', '\n']);
		if rest.trim().is_empty() {
			return Err(IrcParseError::Empty);
		}

		let mut tags = HashMap::new();
		if let Some(stripped) = rest.strip_prefix('@') {
			let (raw_tags, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
			for pair in raw_tags.split(';').filter(|p| !p.is_empty()) {
				let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
				tags.insert(key.to_string(), unescape_tag_value(value));
			}
			rest = tail.trim_start_matches(' ');
		}

		let mut prefix = None;
		if let Some(stripped) = rest.strip_prefix(':') {
			let (p, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
			prefix = Some(p.to_string());
			rest = tail.trim_start_matches(' ');
		}

		let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
		if command.is_empty() {
			return Err(IrcParseError::MissingCommand);
		}

		let mut params = Vec::new();
		loop {
			rest = rest.trim_start_matches(' ');
			if rest.is_empty() {
				break;
			}
			if let Some(trailing) = rest.strip_prefix(':') {
				params.push(trailing.to_string());
				break;
			}
			let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
			params.push(param.to_string());
			rest = tail;
		}

		Ok(Self {
			tags,
			prefix,
			command: command.to_ascii_uppercase(),
			params,
		})
	}

	pub fn tag(&self, key: &str) -> Option<&str> {
		self.tags.get(key).map(String::as_str)
	}

	/// Tag value, with empty values treated as absent.
	pub fn tag_nonempty(&self, key: &str) -> Option<&str> {
		self.tag(key).filter(|v| !v.is_empty())
	}

	pub fn param(&self, index: usize) -> Option<&str> {
		self.params.get(index).map(String::as_str)
	}

	/// Last parameter (the trailing text for PRIVMSG/NOTICE).
	pub fn trailing(&self) -> Option<&str> {
		self.params.last().map(String::as_str)
	}

	/// Nick part of a `nick!user@host` prefix.
	pub fn nick(&self) -> Option<&str> {
		let prefix = self.prefix.as_deref()?;
		let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
		(!nick.is_empty()).then_some(nick)
	}
}

/// Undo IRCv3 tag escaping. A dangling backslash is dropped.
pub(crate) fn unescape_tag_value(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	let mut chars = value.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some(':') => out.push(';'),
			Some('s') => out.push(' '),
			Some('\\') => out.push('\\'),
			Some('r') => out.push('\r'),
			Some('n') => out.push('\n'),
			Some(other) => out.push(other),
			None => {}
		}
	}
	out
}

pub(crate) fn escape_tag_value(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			';' => out.push_str("\\:"),
			' ' => out.push_str("\\s"),
			'\\' => out.push_str("\\\\"),
			'\r' => out.push_str("\\r"),
			'\n' => out.push_str("\\n"),
			c => out.push(c),
		}
	}
	out
}
