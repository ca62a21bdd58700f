//! Mediator-level error types shared by the decision engine, the request mediator, and the
//! secrets facade.
//!
//! Every public entry point returns [`Error`]. [`Error::report`] flattens any variant into the
//! [`ErrorReport`] shape (code, message, backend message, rejection reasons, architecture,
//! retryable) so host applications can surface a single structure regardless of where the
//! failure originated.

// self
use crate::_prelude::*;

/// Mediator-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical mediator error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem (uninitialized service, malformed settings or rules).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Outbound request could not be represented or rewritten.
	#[error(transparent)]
	Request(#[from] RequestError),

	/// The attestation backend could not be reached.
	#[error("Attestation backend is unreachable: {0}.")]
	NetworkUnavailable(AttestationFailure),
	/// The backend explicitly rejected the attestation; never retried.
	#[error("Attestation was rejected: {0}.")]
	AttestationRejected(AttestationFailure),
	/// The backend failed for a reason outside the network/rejection classes.
	#[error("Attestation backend failed: {0}.")]
	Backend(AttestationFailure),
	/// The backend kept asking for a retry until the attempt budget ran out.
	#[error("Attestation fetch still undecided after {attempts} attempts: {diagnostic}.")]
	RetriesExhausted {
		/// Number of fetch attempts issued.
		attempts: u32,
		/// Diagnostic attached to the last `Retry` outcome.
		diagnostic: String,
	},
	/// A secret substitution could not be resolved while fail-closed substitutions are enabled.
	#[error("Substitution lookup failed for {target}.")]
	SubstitutionLookupFailed {
		/// Human-readable substitution target (`header Authorization`, `query api_key`).
		target: String,
		/// Failure raised by the lookup.
		#[source]
		source: Box<Error>,
	},
	/// The caller cancelled the operation before it completed.
	#[error("Attestation was cancelled before it completed.")]
	Cancelled,
}
impl Error {
	/// Stable error code used in [`ErrorReport`].
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Config(_) => ErrorCode::Configuration,
			Self::Request(_) => ErrorCode::InvalidRequest,
			Self::NetworkUnavailable(_) => ErrorCode::NetworkUnavailable,
			Self::AttestationRejected(_) => ErrorCode::AttestationRejected,
			Self::Backend(_) => ErrorCode::Backend,
			Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
			Self::SubstitutionLookupFailed { .. } => ErrorCode::SubstitutionLookupFailed,
			Self::Cancelled => ErrorCode::Cancelled,
		}
	}

	/// Whether retrying the whole operation later may succeed.
	///
	/// Backend failures surface the backend's own `retryable` flag untouched.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Config(_) | Self::Request(_) | Self::Cancelled => false,
			Self::NetworkUnavailable(failure)
			| Self::AttestationRejected(failure)
			| Self::Backend(failure) => failure.retryable,
			Self::RetriesExhausted { .. } => true,
			Self::SubstitutionLookupFailed { source, .. } => source.is_retryable(),
		}
	}

	/// Structured backend failure carried by this error, if any.
	pub fn failure(&self) -> Option<&AttestationFailure> {
		match self {
			Self::NetworkUnavailable(failure)
			| Self::AttestationRejected(failure)
			| Self::Backend(failure) => Some(failure),
			Self::Config(ConfigError::BackendRefused(failure)) => Some(failure),
			Self::SubstitutionLookupFailed { source, .. } => source.failure(),
			_ => None,
		}
	}

	/// Flattens the error into the wire-level [`ErrorReport`].
	pub fn report(&self) -> ErrorReport {
		let failure = self.failure();

		ErrorReport {
			code: self.code(),
			message: self.to_string(),
			sdk_message: failure.map(|f| f.sdk_message.clone()).unwrap_or_default(),
			rejection_reasons: failure.map(|f| f.rejection_reasons.clone()).unwrap_or_default(),
			architecture: failure.and_then(|f| f.architecture.clone()),
			retryable: self.is_retryable(),
		}
	}
}

/// Stable, serializable error codes shared by every public error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	/// Service not initialized or configuration invalid.
	Configuration,
	/// Request could not be converted or rewritten.
	InvalidRequest,
	/// Backend unreachable.
	NetworkUnavailable,
	/// Backend rejected the attestation.
	AttestationRejected,
	/// Other backend failure.
	Backend,
	/// Retry budget exhausted.
	RetriesExhausted,
	/// A single secret substitution failed.
	SubstitutionLookupFailed,
	/// The caller abandoned the operation.
	Cancelled,
}
impl ErrorCode {
	/// Returns a stable label suitable for logs and reports.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Configuration => "configuration",
			Self::InvalidRequest => "invalid_request",
			Self::NetworkUnavailable => "network_unavailable",
			Self::AttestationRejected => "attestation_rejected",
			Self::Backend => "backend",
			Self::RetriesExhausted => "retries_exhausted",
			Self::SubstitutionLookupFailed => "substitution_lookup_failed",
			Self::Cancelled => "cancelled",
		}
	}
}
impl Display for ErrorCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Wire-level error structure returned to host applications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
	/// Stable error code.
	pub code: ErrorCode,
	/// User-facing message.
	pub message: String,
	/// Message reported by the attestation backend, empty when the failure is local.
	pub sdk_message: String,
	/// Reasons the backend gave for rejecting the attestation.
	pub rejection_reasons: Vec<String>,
	/// Architecture/diagnostic string reported by the backend.
	pub architecture: Option<String>,
	/// Whether the caller may retry the whole operation.
	pub retryable: bool,
}

/// Failure class reported by the attestation backend for a single fetch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// No or poor network connectivity (including detected interception).
	NetworkUnavailable,
	/// The backend judged the app or device untrustworthy.
	Rejected,
	/// The backend refused the configuration or the request shape.
	Misconfigured,
	/// Anything else (unexpected status, missing capability).
	Internal,
}

/// Structured failure produced by the attestation backend.
///
/// Carried verbatim through the decision engine so callers see the backend's own diagnosis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationFailure {
	/// Failure class.
	pub kind: FailureKind,
	/// Backend-provided message.
	pub sdk_message: String,
	/// Reasons for a rejection, when the backend reports them.
	pub rejection_reasons: Vec<String>,
	/// Architecture or device diagnostic string.
	pub architecture: Option<String>,
	/// Whether the backend considers the failure transient.
	pub retryable: bool,
}
impl AttestationFailure {
	/// Creates a failure with an explicit class and retry hint.
	pub fn new(kind: FailureKind, sdk_message: impl Into<String>, retryable: bool) -> Self {
		Self {
			kind,
			sdk_message: sdk_message.into(),
			rejection_reasons: Vec::new(),
			architecture: None,
			retryable,
		}
	}

	/// Network-unavailable failure (retryable).
	pub fn network(sdk_message: impl Into<String>) -> Self {
		Self::new(FailureKind::NetworkUnavailable, sdk_message, true)
	}

	/// Backend rejection (never retryable).
	pub fn rejected(sdk_message: impl Into<String>) -> Self {
		Self::new(FailureKind::Rejected, sdk_message, false)
	}

	/// Configuration refusal (never retryable).
	pub fn misconfigured(sdk_message: impl Into<String>) -> Self {
		Self::new(FailureKind::Misconfigured, sdk_message, false)
	}

	/// Generic backend failure.
	pub fn internal(sdk_message: impl Into<String>, retryable: bool) -> Self {
		Self::new(FailureKind::Internal, sdk_message, retryable)
	}

	/// Failure for a capability the backend does not provide.
	pub fn unsupported(capability: &str) -> Self {
		Self::internal(format!("{capability} is not supported by this attestation backend"), false)
	}

	/// Attaches rejection reasons.
	pub fn with_rejection_reasons<I, S>(mut self, reasons: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.rejection_reasons = reasons.into_iter().map(Into::into).collect();

		self
	}

	/// Attaches the architecture/diagnostic string.
	pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
		self.architecture = Some(architecture.into());

		self
	}
}
impl Display for AttestationFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.sdk_message)?;

		if !self.rejection_reasons.is_empty() {
			write!(f, " (reasons: {})", self.rejection_reasons.join(", "))?;
		}

		Ok(())
	}
}

/// Configuration and validation failures raised by the mediator.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// An operation ran before [`initialize`](crate::service::AttestationService::initialize).
	#[error("Attestation service has not been initialized.")]
	NotInitialized,
	/// `initialize` was called again with a different configuration string.
	#[error("Attestation service is already initialized with a different configuration.")]
	AlreadyInitialized,
	/// The configuration string was empty.
	#[error("Configuration string is empty.")]
	EmptyConfigString,
	/// The attestation backend refused the configuration string.
	#[error("Attestation backend refused the configuration: {0}.")]
	BackendRefused(AttestationFailure),
	/// Settings JSON could not be parsed.
	#[error("Settings are malformed.")]
	SettingsParse {
		/// Structured parsing failure, including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A header name setting was empty.
	#[error("The {field} must not be empty.")]
	EmptyHeaderName {
		/// Setting or rule that carried the header name.
		field: &'static str,
	},
	/// A header name contained characters outside the HTTP token set.
	#[error("The {field} `{name}` is not a valid HTTP header name.")]
	InvalidHeaderName {
		/// Setting or rule that carried the header name.
		field: &'static str,
		/// Offending header name.
		name: String,
	},
	/// A substitution query parameter key was empty.
	#[error("Substitution query parameter keys must not be empty.")]
	EmptyQueryParam,
	/// An exclusion pattern is not a valid regular expression.
	#[error("Exclusion pattern `{pattern}` is invalid.")]
	InvalidExclusionPattern {
		/// Offending pattern.
		pattern: String,
		/// Regex compilation failure.
		#[source]
		source: regex::Error,
	},
	/// The fetch attempt budget is outside the supported range.
	#[error("The fetch attempt budget must be between 1 and {max}, got {value}.")]
	FetchAttemptsOutOfRange {
		/// Requested attempt budget.
		value: u32,
		/// Largest accepted attempt budget.
		max: u32,
	},
	/// A URL argument could not be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A custom JWT payload was not a JSON object.
	#[error("Custom JWT payload must be a JSON object.")]
	InvalidJwtPayload {
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// A pin type label was empty.
	#[error("Pin type must not be empty.")]
	EmptyPinType,
}

/// Failures converting or rewriting outbound requests.
#[derive(Debug, ThisError)]
pub enum RequestError {
	/// A header value could not be read as visible ASCII/UTF-8.
	#[error("Header `{name}` carries a non-UTF-8 value.")]
	NonUtf8Header {
		/// Header name.
		name: String,
	},
	/// A rewritten header name could not be encoded.
	#[error("Header name `{name}` cannot be encoded.")]
	InvalidHeaderName {
		/// Header name.
		name: String,
	},
	/// A rewritten header value could not be encoded.
	#[error("Header `{name}` received a value that cannot be encoded.")]
	InvalidHeaderValue {
		/// Header name.
		name: String,
	},
}
