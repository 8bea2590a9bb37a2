#![forbid(unsafe_code)]

pub mod config;
pub mod credential;
pub mod history;
pub mod mux;
pub mod render;
pub mod store;

pub use credential::CredentialRotator;
pub use history::MessageLog;
pub use mux::{ChatMultiplexer, MessageHandler, MuxConfig};
pub use store::{FileBackend, MemoryBackend, Persisted, StorageBackend, StoreError};
