//! Substitution and exclusion rules shared by every mediation.
//!
//! [`RuleSet`] keeps the live rules behind a copy-on-write [`RuleSnapshot`]. Mutators clone the
//! snapshot only while readers still hold the previous one, so a mediation that grabbed a
//! snapshot keeps seeing exactly that rule set until it finishes.

pub mod exclusion;
pub mod substitution;

pub use exclusion::*;
pub use substitution::*;

// self
use crate::{
	_prelude::*,
	config::validate_header_name,
	error::ConfigError,
	request::HttpRequest,
};

/// Header substitution rule: a header whose value starts with `required_prefix` gets the part
/// after the prefix swapped for a securely fetched secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRule {
	/// Header name as configured (matched case-insensitively).
	pub header: String,
	/// Prefix the current value must start with; empty matches any value.
	pub required_prefix: String,
}
impl HeaderRule {
	/// Returns the lookup key carried by `value`, if the value is eligible.
	pub fn lookup_key<'v>(&self, value: &'v str) -> Option<&'v str> {
		value.strip_prefix(self.required_prefix.as_str()).filter(|key| !key.is_empty())
	}
}

/// Immutable view of the rules at one point in time.
#[derive(Clone, Debug, Default)]
pub struct RuleSnapshot {
	headers: BTreeMap<String, HeaderRule>,
	query_params: BTreeSet<String>,
	exclusions: Vec<ExclusionPattern>,
}
impl RuleSnapshot {
	/// Header substitution rules, ordered by lowercase header name.
	pub fn header_rules(&self) -> impl Iterator<Item = &HeaderRule> {
		self.headers.values()
	}

	/// Header rule for `name`, matched case-insensitively.
	pub fn header_rule(&self, name: &str) -> Option<&HeaderRule> {
		self.headers.get(&name.to_ascii_lowercase())
	}

	/// Query parameter keys eligible for substitution.
	pub fn query_params(&self) -> impl Iterator<Item = &str> {
		self.query_params.iter().map(String::as_str)
	}

	/// Exclusion patterns in insertion order.
	pub fn exclusions(&self) -> &[ExclusionPattern] {
		&self.exclusions
	}

	/// Returns true if any exclusion pattern matches `url`.
	pub fn is_excluded(&self, url: &Url) -> bool {
		self.exclusions.iter().any(|pattern| pattern.matches(url))
	}

	/// Lists the substitutions that apply to `request`, in header-then-query order.
	pub fn plan_substitutions(&self, request: &HttpRequest) -> Vec<Substitution> {
		substitution::plan(self, request)
	}
}

/// Concurrency-safe, mutable rule set.
#[derive(Debug, Default)]
pub struct RuleSet(RwLock<Arc<RuleSnapshot>>);
impl RuleSet {
	/// Returns the current snapshot.
	pub fn snapshot(&self) -> Arc<RuleSnapshot> {
		self.0.read().clone()
	}

	/// Adds (or replaces the prefix of) a header substitution rule.
	pub fn add_substitution_header(
		&self,
		header: impl Into<String>,
		required_prefix: impl Into<String>,
	) -> Result<(), ConfigError> {
		let header = header.into();

		validate_header_name("substitution header", &header)?;

		let rule = HeaderRule { header, required_prefix: required_prefix.into() };

		self.update(|rules| {
			rules.headers.insert(rule.header.to_ascii_lowercase(), rule);
		});

		Ok(())
	}

	/// Removes a header substitution rule, returning whether one existed.
	pub fn remove_substitution_header(&self, header: &str) -> bool {
		self.update(|rules| rules.headers.remove(&header.to_ascii_lowercase()).is_some())
	}

	/// Adds a query parameter key eligible for substitution.
	pub fn add_substitution_query_param(&self, key: impl Into<String>) -> Result<(), ConfigError> {
		let key = key.into();

		if key.is_empty() {
			return Err(ConfigError::EmptyQueryParam);
		}

		self.update(|rules| {
			rules.query_params.insert(key);
		});

		Ok(())
	}

	/// Removes a query parameter key, returning whether it was present.
	pub fn remove_substitution_query_param(&self, key: &str) -> bool {
		self.update(|rules| rules.query_params.remove(key))
	}

	/// Adds a URL exclusion regex. Adding the same pattern twice keeps a single entry.
	pub fn add_exclusion_pattern(&self, pattern: impl Into<String>) -> Result<(), ConfigError> {
		let pattern = ExclusionPattern::new(pattern)?;

		self.update(|rules| {
			if !rules.exclusions.contains(&pattern) {
				rules.exclusions.push(pattern);
			}
		});

		Ok(())
	}

	/// Removes a URL exclusion regex by its source text, returning whether it was present.
	pub fn remove_exclusion_pattern(&self, pattern: &str) -> bool {
		self.update(|rules| {
			let before = rules.exclusions.len();

			rules.exclusions.retain(|existing| existing.as_str() != pattern);

			before != rules.exclusions.len()
		})
	}

	/// Returns true if the current rules exclude `url`.
	pub fn is_excluded(&self, url: &Url) -> bool {
		self.snapshot().is_excluded(url)
	}

	fn update<R>(&self, f: impl FnOnce(&mut RuleSnapshot) -> R) -> R {
		let mut guard = self.0.write();

		f(Arc::make_mut(&mut *guard))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Test URL should parse.")
	}

	#[test]
	fn adding_same_header_twice_keeps_one_rule() {
		let rules = RuleSet::default();

		rules.add_substitution_header("X", "").expect("Header rule should be accepted.");
		rules.add_substitution_header("X", "").expect("Duplicate header rule should be accepted.");
		rules.add_substitution_header("x", "").expect("Case variant should be accepted.");

		assert_eq!(rules.snapshot().header_rules().count(), 1);
		assert!(rules.remove_substitution_header("X"));
		assert!(!rules.remove_substitution_header("X"));
	}

	#[test]
	fn re_adding_header_replaces_prefix() {
		let rules = RuleSet::default();

		rules.add_substitution_header("Authorization", "Basic ").expect("Rule should be added.");
		rules.add_substitution_header("authorization", "Bearer ").expect("Rule should be added.");

		let snapshot = rules.snapshot();
		let rule = snapshot.header_rule("AUTHORIZATION").expect("Rule should be present.");

		assert_eq!(rule.required_prefix, "Bearer ");
		assert_eq!(rule.lookup_key("Bearer abc"), Some("abc"));
		assert_eq!(rule.lookup_key("Basic abc"), None);
		assert_eq!(rule.lookup_key("Bearer "), None);
	}

	#[test]
	fn invalid_inputs_are_rejected() {
		let rules = RuleSet::default();

		assert!(matches!(
			rules.add_substitution_header("", "x"),
			Err(ConfigError::EmptyHeaderName { .. })
		));
		assert!(matches!(rules.add_substitution_query_param(""), Err(ConfigError::EmptyQueryParam)));
		assert!(matches!(
			rules.add_exclusion_pattern("(unclosed"),
			Err(ConfigError::InvalidExclusionPattern { .. })
		));
		assert!(rules.snapshot().exclusions().is_empty());
	}

	#[test]
	fn exclusion_patterns_match_any() {
		let rules = RuleSet::default();

		rules
			.add_exclusion_pattern(r"^https://auth\.example\.com/.*")
			.expect("Exclusion should compile.");
		rules.add_exclusion_pattern(r"/health$").expect("Exclusion should compile.");
		rules.add_exclusion_pattern(r"/health$").expect("Duplicate exclusion should be accepted.");

		assert_eq!(rules.snapshot().exclusions().len(), 2);
		assert!(rules.is_excluded(&url("https://auth.example.com/login")));
		assert!(rules.is_excluded(&url("https://api.example.com/health")));
		assert!(!rules.is_excluded(&url("https://api.example.com/data")));
		assert!(rules.remove_exclusion_pattern("/health$"));
		assert!(!rules.is_excluded(&url("https://api.example.com/health")));
	}

	#[test]
	fn snapshots_are_isolated_from_later_mutations() {
		let rules = RuleSet::default();

		rules.add_substitution_query_param("api_key").expect("Query rule should be added.");

		let before = rules.snapshot();

		rules.add_substitution_query_param("token").expect("Query rule should be added.");
		rules.remove_substitution_query_param("api_key");

		assert_eq!(before.query_params().collect::<Vec<_>>(), ["api_key"]);
		assert_eq!(rules.snapshot().query_params().collect::<Vec<_>>(), ["token"]);
	}
}
