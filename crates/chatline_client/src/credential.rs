#![forbid(unsafe_code)]

use std::sync::Arc;

use chatline_platform::chat::{ChatError, ChatTransport, TransportFactory};
use chatline_platform::{Credential, SharedCredential};
use tracing::debug;

/// Holds the active credential and builds connections for candidates.
///
/// A candidate only becomes active through [`CredentialRotator::commit`], after
/// its connection is up. Clones of the shared slot (Helix clients, catalog
/// fetchers) see the commit immediately.
pub struct CredentialRotator {
	factory: Arc<dyn TransportFactory>,
	active: SharedCredential,
}

impl CredentialRotator {
	pub fn new(factory: Arc<dyn TransportFactory>, active: SharedCredential) -> Self {
		Self { factory, active }
	}

	pub fn credential(&self) -> Option<Credential> {
		self.active.get()
	}

	pub fn shared(&self) -> SharedCredential {
		self.active.clone()
	}

	/// Build and connect a transport for `credential` without touching the active one.
	pub async fn open(&self, credential: Option<&Credential>) -> Result<Box<dyn ChatTransport>, ChatError> {
		let mut transport = self.factory.create(credential);
		transport.connect().await?;
		debug!(authenticated = credential.is_some(), "transport connected");
		Ok(transport)
	}

	pub fn commit(&self, credential: Option<Credential>) {
		self.active.set(credential);
		metrics::counter!("chatline_credential_rotations_total").increment(1);
	}
}
