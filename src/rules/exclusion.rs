//! URL exclusion patterns.

// crates.io
use regex::Regex;
// self
use crate::{_prelude::*, error::ConfigError};

/// Compiled URL regex; requests whose full URL matches bypass mediation entirely.
///
/// Patterns are unanchored unless they say otherwise (`^https://auth\.example\.com/`), and
/// equality compares the source text.
#[derive(Clone)]
pub struct ExclusionPattern(Regex);
impl ExclusionPattern {
	/// Compiles a pattern.
	pub fn new(pattern: impl Into<String>) -> Result<Self, ConfigError> {
		let pattern = pattern.into();

		Regex::new(&pattern)
			.map(Self)
			.map_err(|source| ConfigError::InvalidExclusionPattern { pattern, source })
	}

	/// Returns the source text.
	pub fn as_str(&self) -> &str {
		self.0.as_str()
	}

	/// Returns true if the pattern matches the serialized URL.
	pub fn matches(&self, url: &Url) -> bool {
		self.0.is_match(url.as_str())
	}
}
impl PartialEq for ExclusionPattern {
	fn eq(&self, other: &Self) -> bool {
		self.as_str() == other.as_str()
	}
}
impl Eq for ExclusionPattern {}
impl Debug for ExclusionPattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ExclusionPattern").field(&self.as_str()).finish()
	}
}
impl Display for ExclusionPattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
