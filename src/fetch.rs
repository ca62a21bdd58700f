//! Boundary to the attestation backend.
//!
//! The module exposes [`TokenFetcher`], the only component allowed to talk to the backend,
//! together with the [`FetchRequest`] it receives and the [`FetchOutcome`] it returns. A fetcher
//! performs exactly one attempt per call; retrying is the decision engine's job. Implementations
//! must be `Send + Sync + 'static` so a single instance can serve every concurrent mediation,
//! and the futures they return must be `Send` so intercepted requests can hop executors.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, error::AttestationFailure};

/// Boxed future returned by [`TokenFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = FetchOutcome> + 'a + Send>>;

/// Single-attempt gateway to the attestation backend.
///
/// Only [`fetch`](Self::fetch) is required; the remaining hooks default to "accept" or
/// "unsupported" so a test double can script outcomes without modelling a full backend.
pub trait TokenFetcher
where
	Self: 'static + Send + Sync,
{
	/// Performs one attestation attempt.
	///
	/// The call may block on I/O and may time out; a timeout must be reported as a `Retry` or
	/// `Fail` outcome, never as a panic.
	fn fetch<'a>(&'a self, request: &'a FetchRequest) -> FetchFuture<'a>;

	/// Hands the opaque configuration string to the backend.
	fn initialize(&self, config: &str) -> Result<(), AttestationFailure> {
		let _ = config;

		Ok(())
	}

	/// Returns the backend's device identifier.
	fn device_id(&self) -> Result<String, AttestationFailure> {
		Err(AttestationFailure::unsupported("device ID lookup"))
	}

	/// Signs `message` with the key bound to the current attestation.
	fn message_signature(&self, message: &str) -> Result<String, AttestationFailure> {
		let _ = message;

		Err(AttestationFailure::unsupported("message signing"))
	}
}

/// What a fetch asks the backend for.
#[derive(Clone, PartialEq, Eq)]
pub enum FetchKind {
	/// Attestation token for requests to `url`.
	Token {
		/// Target URL.
		url: Url,
	},
	/// Secure string stored under `key`, optionally redefining it first.
	SecureString {
		/// Secure string key (or placeholder value for substitutions).
		key: String,
		/// Replacement definition to store before reading.
		new_definition: Option<String>,
	},
	/// Backend-signed JWT wrapping a caller-supplied JSON payload.
	CustomJwt {
		/// JSON object to embed.
		payload: String,
	},
}
impl FetchKind {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Token { .. } => "token",
			Self::SecureString { .. } => "secure_string",
			Self::CustomJwt { .. } => "custom_jwt",
		}
	}
}
impl Debug for FetchKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Token { url } => f.debug_struct("Token").field("url", &url.as_str()).finish(),
			Self::SecureString { new_definition, .. } => f
				.debug_struct("SecureString")
				.field("key", &"<redacted>")
				.field("new_definition_set", &new_definition.is_some())
				.finish(),
			Self::CustomJwt { .. } =>
				f.debug_struct("CustomJwt").field("payload", &"<redacted>").finish(),
		}
	}
}

/// Immutable context handed to [`TokenFetcher::fetch`].
///
/// Every retry within one decision sequence reuses the same request, so the fingerprint stays
/// stable across attempts.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchRequest {
	/// What is being fetched.
	pub kind: FetchKind,
	/// Value of the configured binding header, if present on the request.
	pub binding: Option<String>,
	/// Extra data hash to include in the token.
	pub data_hash: Option<String>,
	/// Instant the mediator built the request.
	pub requested_at: OffsetDateTime,
}
impl FetchRequest {
	/// Creates a request for an arbitrary fetch kind.
	pub fn new(kind: FetchKind) -> Self {
		Self { kind, binding: None, data_hash: None, requested_at: OffsetDateTime::now_utc() }
	}

	/// Token fetch for `url`.
	pub fn token(url: Url) -> Self {
		Self::new(FetchKind::Token { url })
	}

	/// Secure string lookup.
	pub fn secure_string(key: impl Into<String>, new_definition: Option<String>) -> Self {
		Self::new(FetchKind::SecureString { key: key.into(), new_definition })
	}

	/// Custom JWT issuance.
	pub fn custom_jwt(payload: impl Into<String>) -> Self {
		Self::new(FetchKind::CustomJwt { payload: payload.into() })
	}

	/// Sets the binding value.
	pub fn with_binding(mut self, binding: Option<String>) -> Self {
		self.binding = binding;

		self
	}

	/// Sets the data hash.
	pub fn with_data_hash(mut self, data_hash: Option<String>) -> Self {
		self.data_hash = data_hash;

		self
	}

	/// Stable fingerprint of the request contents.
	///
	/// A base64 (no padding) SHA-256 digest over the kind, its target, the binding value, and
	/// the data hash. The timestamp is excluded so equal requests share a fingerprint.
	pub fn fingerprint(&self) -> String {
		let mut hasher = Sha256::new();

		hasher.update(self.kind.as_str().as_bytes());
		hasher.update([0]);

		match &self.kind {
			FetchKind::Token { url } => hasher.update(url.as_str().as_bytes()),
			FetchKind::SecureString { key, new_definition } => {
				hasher.update(key.as_bytes());
				hasher.update([0]);
				hasher.update(new_definition.as_deref().unwrap_or_default().as_bytes());
			},
			FetchKind::CustomJwt { payload } => hasher.update(payload.as_bytes()),
		}

		for part in [&self.binding, &self.data_hash] {
			hasher.update([0]);

			if let Some(value) = part {
				hasher.update(value.as_bytes());
			}
		}

		STANDARD_NO_PAD.encode(hasher.finalize())
	}
}
impl Debug for FetchRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FetchRequest")
			.field("kind", &self.kind)
			.field("binding_set", &self.binding.is_some())
			.field("data_hash_set", &self.data_hash.is_some())
			.field("requested_at", &self.requested_at)
			.finish()
	}
}

/// Backend hint telling the decision engine what to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	/// Use the result.
	Proceed,
	/// Try again with the same request.
	Retry,
	/// Stop; inspect the structured failure.
	Fail,
}
impl Decision {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Proceed => "proceed",
			Self::Retry => "retry",
			Self::Fail => "fail",
		}
	}
}
impl Display for Decision {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Result of one fetch attempt. Produced once by the fetcher, consumed once by the engine.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchOutcome {
	/// Token, secure string, or JWT; `None` when the backend has nothing for this request.
	pub token: Option<String>,
	/// Backend's decision hint.
	pub decision: Decision,
	/// Human-readable backend status.
	pub diagnostic: String,
	/// Structured failure, expected when `decision` is `Fail`.
	pub failure: Option<AttestationFailure>,
}
impl FetchOutcome {
	/// Successful outcome carrying a value.
	pub fn proceed(token: impl Into<String>) -> Self {
		Self {
			token: Some(token.into()),
			decision: Decision::Proceed,
			diagnostic: "success".into(),
			failure: None,
		}
	}

	/// Successful outcome without a value (unprotected URL, unknown secure string key).
	pub fn proceed_empty(diagnostic: impl Into<String>) -> Self {
		Self { token: None, decision: Decision::Proceed, diagnostic: diagnostic.into(), failure: None }
	}

	/// Transient outcome asking for another attempt.
	pub fn retry(diagnostic: impl Into<String>) -> Self {
		Self { token: None, decision: Decision::Retry, diagnostic: diagnostic.into(), failure: None }
	}

	/// Terminal outcome carrying a structured failure.
	pub fn fail(failure: AttestationFailure) -> Self {
		Self {
			token: None,
			decision: Decision::Fail,
			diagnostic: failure.sdk_message.clone(),
			failure: Some(failure),
		}
	}

	/// Overrides the diagnostic message.
	pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
		self.diagnostic = diagnostic.into();

		self
	}
}
impl Debug for FetchOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FetchOutcome")
			.field("token", &self.token.as_ref().map(|_| "<redacted>"))
			.field("decision", &self.decision)
			.field("diagnostic", &self.diagnostic)
			.field("failure", &self.failure)
			.finish()
	}
}
