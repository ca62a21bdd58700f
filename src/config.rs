//! Mediator settings: header names, token prefix, binding header, and failure policies.
//!
//! [`Settings`] is a plain value. The service keeps the live copy behind a copy-on-write
//! snapshot so mediations in flight keep the settings they started with.

// self
use crate::{_prelude::*, error::ConfigError};

/// Process-wide mediator settings.
///
/// Every field has a default, so a JSON document only needs the keys it overrides:
///
/// ```
/// use attestation_mediator::config::Settings;
///
/// let settings = Settings::from_json(r#"{ "token_prefix": "Bearer " }"#).unwrap();
///
/// assert_eq!(settings.token_header, "Attestation-Token");
/// assert_eq!(settings.token_prefix, "Bearer ");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
	/// Header that carries the attestation token.
	pub token_header: String,
	/// Prefix written before the token value (for example `Bearer `).
	pub token_prefix: String,
	/// Header whose value is bound into the token, if any.
	pub binding_header: Option<String>,
	/// Lets requests proceed without a token when the backend is unreachable.
	pub proceed_on_network_failure: bool,
	/// Extra data hash forwarded to the backend for inclusion in the token.
	pub data_hash: Option<String>,
	/// Total fetch attempts allowed while the backend keeps answering `Retry`.
	pub max_fetch_attempts: u32,
	/// Fails the whole mediation when a single secret substitution cannot be resolved.
	pub fail_closed_substitutions: bool,
}
impl Settings {
	/// Default attestation token header.
	pub const DEFAULT_TOKEN_HEADER: &str = "Attestation-Token";
	/// Default fetch attempt budget.
	pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;
	/// Largest accepted fetch attempt budget.
	pub const MAX_FETCH_ATTEMPTS: u32 = 5;

	/// Parses and validates settings from JSON.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);
		let settings: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::SettingsParse { source })?;

		settings.validate()?;

		Ok(settings)
	}

	/// Checks header names and the attempt budget.
	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_header_name("attestation token header", &self.token_header)?;

		if let Some(binding) = &self.binding_header {
			validate_header_name("binding header", binding)?;
		}

		validate_fetch_attempts(self.max_fetch_attempts)
	}
}
impl Default for Settings {
	fn default() -> Self {
		Self {
			token_header: Self::DEFAULT_TOKEN_HEADER.into(),
			token_prefix: String::new(),
			binding_header: None,
			proceed_on_network_failure: false,
			data_hash: None,
			max_fetch_attempts: Self::DEFAULT_MAX_FETCH_ATTEMPTS,
			fail_closed_substitutions: false,
		}
	}
}

/// Validates an HTTP header name against the RFC 9110 token grammar.
pub(crate) fn validate_header_name(field: &'static str, name: &str) -> Result<(), ConfigError> {
	if name.is_empty() {
		return Err(ConfigError::EmptyHeaderName { field });
	}
	if !name.bytes().all(is_token_byte) {
		return Err(ConfigError::InvalidHeaderName { field, name: name.to_owned() });
	}

	Ok(())
}

pub(crate) fn validate_fetch_attempts(value: u32) -> Result<(), ConfigError> {
	if (1..=Settings::MAX_FETCH_ATTEMPTS).contains(&value) {
		Ok(())
	} else {
		Err(ConfigError::FetchAttemptsOutOfRange { value, max: Settings::MAX_FETCH_ATTEMPTS })
	}
}

fn is_token_byte(byte: u8) -> bool {
	byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}
