//! Read-only certificate pin snapshots, keyed by pin type.
//!
//! Pins are published by an external source (the attestation backend's dynamic configuration)
//! and consumed by the host's TLS layer. The mediator only stores and hands out immutable
//! [`PinSet`] snapshots; verifying a certificate chain is left to the transport.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, error::ConfigError};

/// Label selecting one family of pins (for example `public-key-sha256`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PinType(String);
impl PinType {
	/// Pin type used for base64 SHA-256 hashes of a certificate's SubjectPublicKeyInfo.
	pub const PUBLIC_KEY_SHA256: &'static str = "public-key-sha256";

	/// Creates a pin type, rejecting empty labels.
	pub fn new(label: impl Into<String>) -> Result<Self, ConfigError> {
		let label = label.into();

		if label.trim().is_empty() {
			return Err(ConfigError::EmptyPinType);
		}

		Ok(Self(label))
	}

	/// SPKI SHA-256 pin type.
	pub fn public_key_sha256() -> Self {
		Self(Self::PUBLIC_KEY_SHA256.into())
	}

	/// Returns the label.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl TryFrom<String> for PinType {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<PinType> for String {
	fn from(value: PinType) -> Self {
		value.0
	}
}
impl Display for PinType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Host to acceptable-pins mapping for a single pin type.
///
/// Hosts are matched case-insensitively. A host that is absent, or present with no pins, is not
/// pinned: any certificate is acceptable for it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSet {
	pins: BTreeMap<String, BTreeSet<String>>,
}
impl PinSet {
	/// Adds pins for `host`, merging with any already present.
	pub fn with_host<I, S>(mut self, host: impl AsRef<str>, pins: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.pins
			.entry(host.as_ref().to_ascii_lowercase())
			.or_default()
			.extend(pins.into_iter().map(Into::into));

		self
	}

	/// Pins configured for `host`.
	pub fn pins_for(&self, host: &str) -> Option<&BTreeSet<String>> {
		self.pins.get(&host.to_ascii_lowercase())
	}

	/// Returns true if `host` has at least one pin.
	pub fn is_pinned(&self, host: &str) -> bool {
		self.pins_for(host).is_some_and(|pins| !pins.is_empty())
	}

	/// Returns true if `pin` is acceptable for `host`.
	pub fn allows(&self, host: &str, pin: &str) -> bool {
		match self.pins_for(host) {
			Some(pins) if !pins.is_empty() => pins.contains(pin),
			_ => true,
		}
	}

	/// Iterates over `(host, pins)` pairs in host order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
		self.pins.iter().map(|(host, pins)| (host.as_str(), pins))
	}

	/// Number of hosts in the set.
	pub fn len(&self) -> usize {
		self.pins.len()
	}

	/// Returns true if no host is listed.
	pub fn is_empty(&self) -> bool {
		self.pins.is_empty()
	}
}

/// Computes the `public-key-sha256` pin of a DER-encoded SubjectPublicKeyInfo.
pub fn spki_sha256_pin(spki_der: &[u8]) -> String {
	STANDARD.encode(Sha256::digest(spki_der))
}

/// Latest pin snapshots per pin type.
#[derive(Debug, Default)]
pub struct PinStore(RwLock<HashMap<PinType, (Arc<PinSet>, OffsetDateTime)>>);
impl PinStore {
	/// Publishes a new snapshot for `pin_type`, returning the previous one.
	pub fn replace(&self, pin_type: PinType, pins: PinSet) -> Option<Arc<PinSet>> {
		self.0
			.write()
			.insert(pin_type, (Arc::new(pins), OffsetDateTime::now_utc()))
			.map(|(previous, _)| previous)
	}

	/// Current snapshot for `pin_type`.
	pub fn get(&self, pin_type: &PinType) -> Option<Arc<PinSet>> {
		self.0.read().get(pin_type).map(|(pins, _)| pins.clone())
	}

	/// When the snapshot for `pin_type` was last replaced.
	pub fn updated_at(&self, pin_type: &PinType) -> Option<OffsetDateTime> {
		self.0.read().get(pin_type).map(|(_, updated_at)| *updated_at)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn unknown_and_empty_hosts_are_unpinned() {
		let pins = PinSet::default()
			.with_host("API.example.com", ["pin-a", "pin-b"])
			.with_host("open.example.com", Vec::<String>::new());

		assert!(pins.is_pinned("api.example.com"));
		assert!(pins.allows("api.EXAMPLE.com", "pin-b"));
		assert!(!pins.allows("api.example.com", "pin-c"));
		assert!(!pins.is_pinned("open.example.com"));
		assert!(pins.allows("open.example.com", "anything"));
		assert!(pins.allows("other.example.com", "anything"));
	}

	#[test]
	fn empty_pin_type_is_rejected() {
		assert!(matches!(PinType::new("  "), Err(ConfigError::EmptyPinType)));
		assert_eq!(PinType::public_key_sha256().as_str(), "public-key-sha256");
	}

	#[test]
	fn spki_pin_is_padded_base64_sha256() {
		let pin = spki_sha256_pin(b"spki");

		assert_eq!(pin.len(), 44);
		assert!(pin.ends_with('='));
	}

	#[test]
	fn replace_returns_previous_snapshot() {
		let store = PinStore::default();
		let pin_type = PinType::public_key_sha256();

		assert!(store.replace(pin_type.clone(), PinSet::default()).is_none());

		let previous = store
			.replace(pin_type.clone(), PinSet::default().with_host("a.example.com", ["p"]))
			.expect("First snapshot should be returned.");

		assert!(previous.is_empty());
		assert!(store.get(&pin_type).is_some_and(|pins| pins.is_pinned("a.example.com")));
		assert!(store.updated_at(&pin_type).is_some());
	}
}
