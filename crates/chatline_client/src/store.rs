#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chatline_domain::ChannelName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub const CHANNELS_KEY: &str = "channels";

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage io: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage json: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid storage key {0:?}")]
	InvalidKey(String),

	#[error("storage backend poisoned")]
	Poisoned,
}

/// Raw key/value storage for persisted client state.
pub trait StorageBackend: Send + Sync {
	fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

	fn write(&self, key: &str, raw: &Value) -> Result<(), StoreError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
	dir: PathBuf,
}

impl FileBackend {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
		let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
		if !valid {
			return Err(StoreError::InvalidKey(key.to_string()));
		}
		Ok(self.dir.join(format!("{key}.json")))
	}
}

impl StorageBackend for FileBackend {
	fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
		let path = self.path_for(key)?;
		match fs::read_to_string(&path) {
			Ok(s) => match serde_json::from_str(&s) {
				Ok(v) => Ok(Some(v)),
				Err(e) => {
					warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
					Ok(None)
				}
			},
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn write(&self, key: &str, raw: &Value) -> Result<(), StoreError> {
		let path = self.path_for(key)?;
		fs::create_dir_all(&self.dir)?;
		let tmp = path.with_extension("json.tmp");
		fs::write(&tmp, serde_json::to_vec_pretty(raw)?)?;
		fs::rename(&tmp, &path)?;
		debug!(path = %path.display(), "state written");
		Ok(())
	}
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
	values: Mutex<HashMap<String, Value>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}
}

impl StorageBackend for MemoryBackend {
	fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
		let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
		Ok(values.get(key).cloned())
	}

	fn write(&self, key: &str, raw: &Value) -> Result<(), StoreError> {
		let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
		values.insert(key.to_string(), raw.clone());
		Ok(())
	}
}

pub type Decode<T> = Box<dyn Fn(Value) -> Result<T, StoreError> + Send + Sync>;
pub type Encode<T> = Box<dyn Fn(&T) -> Result<Value, StoreError> + Send + Sync>;

/// A value read once on load and written back on every change.
pub struct Persisted<T> {
	key: String,
	value: T,
	backend: Arc<dyn StorageBackend>,
	encode: Encode<T>,
}

impl<T> Persisted<T>
where
	T: Serialize + DeserializeOwned + Default + 'static,
{
	/// Load with the plain serde mapping in both directions.
	pub fn load(backend: Arc<dyn StorageBackend>, key: &str) -> Result<Self, StoreError> {
		Self::load_with(
			backend,
			key,
			T::default(),
			Box::new(|raw: Value| -> Result<T, StoreError> { Ok(serde_json::from_value(raw)?) }),
			Box::new(|v: &T| -> Result<Value, StoreError> { Ok(serde_json::to_value(v)?) }),
		)
	}
}

impl<T> Persisted<T> {
	/// Load through explicit hooks; `default` is used when nothing is stored yet.
	pub fn load_with(
		backend: Arc<dyn StorageBackend>,
		key: &str,
		default: T,
		decode: Decode<T>,
		encode: Encode<T>,
	) -> Result<Self, StoreError> {
		let value = match backend.read(key)? {
			Some(raw) => decode(raw)?,
			None => default,
		};
		Ok(Self {
			key: key.to_string(),
			value,
			backend,
			encode,
		})
	}

	pub fn key(&self) -> &str {
		&self.key
	}

	pub fn get(&self) -> &T {
		&self.value
	}

	pub fn set(&mut self, value: T) -> Result<(), StoreError> {
		self.value = value;
		self.flush()
	}

	/// Mutate in place, then write.
	pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
		let out = f(&mut self.value);
		self.flush()?;
		Ok(out)
	}

	fn flush(&self) -> Result<(), StoreError> {
		let raw = (self.encode)(&self.value)?;
		self.backend.write(&self.key, &raw)
	}
}

/// Non-arrays decode to an empty set; non-string entries are skipped.
pub fn decode_channels(raw: Value) -> Result<BTreeSet<ChannelName>, StoreError> {
	let Value::Array(items) = raw else {
		return Ok(BTreeSet::new());
	};
	Ok(items
		.iter()
		.filter_map(Value::as_str)
		.map(ChannelName::new)
		.filter(|c| !c.as_str().is_empty())
		.collect())
}

pub fn encode_channels(channels: &BTreeSet<ChannelName>) -> Result<Value, StoreError> {
	Ok(Value::Array(
		channels.iter().map(|c| Value::String(c.as_str().to_string())).collect(),
	))
}

/// The persisted set of channels the user has joined.
pub fn channel_list(backend: Arc<dyn StorageBackend>) -> Result<Persisted<BTreeSet<ChannelName>>, StoreError> {
	Persisted::load_with(
		backend,
		CHANNELS_KEY,
		BTreeSet::new(),
		Box::new(decode_channels),
		Box::new(encode_channels),
	)
}
