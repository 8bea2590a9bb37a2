#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use chatline_domain::ChannelName;

/// Recent messages per channel, oldest evicted first.
#[derive(Debug, Clone)]
pub struct MessageLog<T> {
	/// 0 keeps everything.
	limit: usize,
	channels: HashMap<ChannelName, VecDeque<T>>,
}

impl<T> MessageLog<T> {
	pub fn new(limit: usize) -> Self {
		Self {
			limit,
			channels: HashMap::new(),
		}
	}

	pub fn limit(&self) -> usize {
		self.limit
	}

	pub fn push(&mut self, channel: &ChannelName, item: T) {
		let ring = self.channels.entry(channel.clone()).or_default();
		ring.push_back(item);
		if self.limit > 0 {
			while ring.len() > self.limit {
				ring.pop_front();
			}
		}
	}

	/// The newest `n` entries of a channel, oldest first.
	pub fn recent(&self, channel: &ChannelName, n: usize) -> impl Iterator<Item = &T> {
		let ring = self.channels.get(channel);
		let len = ring.map_or(0, VecDeque::len);
		ring.into_iter().flat_map(|r| r.iter()).skip(len.saturating_sub(n))
	}

	pub fn len(&self, channel: &ChannelName) -> usize {
		self.channels.get(channel).map_or(0, VecDeque::len)
	}

	pub fn is_empty(&self, channel: &ChannelName) -> bool {
		self.len(channel) == 0
	}

	pub fn clear(&mut self, channel: &ChannelName) {
		self.channels.remove(channel);
	}
}
