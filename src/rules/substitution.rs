//! Substitution planning: which header values and query parameters carry placeholder secrets.
//!
//! Planning is pure. The mediator resolves each [`Substitution`] through the backend and then
//! calls [`Substitution::apply`] on its private copy of the request.

// std
use std::borrow::Cow;
// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, request::HttpRequest, rules::RuleSnapshot};

/// Location of a value eligible for substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubstitutionTarget {
	/// Header entry at `position` in the request's header list.
	Header {
		/// Index into the header list.
		position: usize,
		/// Header name as it appears on the request.
		name: String,
		/// Prefix kept in front of the replacement.
		prefix: String,
	},
	/// Query pair at `position` in the URL's query string.
	Query {
		/// Index into the raw `&`-separated query segments.
		position: usize,
		/// Parameter key.
		key: String,
	},
}
impl Display for SubstitutionTarget {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Header { name, .. } => write!(f, "header {name}"),
			Self::Query { key, .. } => write!(f, "query {key}"),
		}
	}
}

/// A single planned substitution.
#[derive(Clone, PartialEq, Eq)]
pub struct Substitution {
	/// Where the value lives.
	pub target: SubstitutionTarget,
	/// Placeholder that keys the secure-string lookup.
	pub lookup_key: String,
}
impl Substitution {
	/// Writes `secret` into `request` at the planned location.
	///
	/// Header entries keep their prefix. Query rewrites touch only the target pair's value; every
	/// other byte of the query string is kept as sent.
	pub fn apply(&self, request: &mut HttpRequest, secret: &str) {
		match &self.target {
			SubstitutionTarget::Header { position, prefix, .. } =>
				request.headers.replace_at(*position, format!("{prefix}{secret}")),
			SubstitutionTarget::Query { position, .. } => {
				let Some(query) = request.url.query() else { return };
				let rewritten = query
					.split('&')
					.enumerate()
					.map(|(idx, segment)| {
						if idx != *position {
							return Cow::Borrowed(segment);
						}

						let raw_key = segment.split_once('=').map_or(segment, |(key, _)| key);
						let value =
							form_urlencoded::byte_serialize(secret.as_bytes()).collect::<String>();

						Cow::Owned(format!("{raw_key}={value}"))
					})
					.collect::<Vec<_>>()
					.join("&");

				request.url.set_query(Some(&rewritten));
			},
		}
	}
}
impl Debug for Substitution {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Substitution")
			.field("target", &self.target)
			.field("lookup_key", &"<redacted>")
			.finish()
	}
}

pub(crate) fn plan(rules: &RuleSnapshot, request: &HttpRequest) -> Vec<Substitution> {
	let mut planned = Vec::new();

	for position in 0..request.headers.len() {
		let Some((name, value)) = request.headers.entry(position) else { continue };
		let Some(rule) = rules.header_rule(name) else { continue };
		let Some(key) = rule.lookup_key(value) else { continue };

		planned.push(Substitution {
			target: SubstitutionTarget::Header {
				position,
				name: name.to_owned(),
				prefix: rule.required_prefix.clone(),
			},
			lookup_key: key.to_owned(),
		});
	}

	let keys = rules.query_params().collect::<BTreeSet<_>>();

	if let Some(query) = request.url.query().filter(|_| !keys.is_empty()) {
		// Positions index the raw `&`-separated segments so `apply` can leave the rest untouched.
		for (position, segment) in query.split('&').enumerate() {
			let Some((key, value)) = form_urlencoded::parse(segment.as_bytes()).next() else {
				continue;
			};

			if value.is_empty() || !keys.contains(&*key) {
				continue;
			}

			planned.push(Substitution {
				target: SubstitutionTarget::Query { position, key: key.into_owned() },
				lookup_key: value.into_owned(),
			});
		}
	}

	planned
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::rules::RuleSet;

	fn request(url: &str) -> HttpRequest {
		HttpRequest::get(Url::parse(url).expect("Test URL should parse."))
	}

	#[test]
	fn plans_headers_with_matching_prefix_only() {
		let rules = RuleSet::default();

		rules.add_substitution_header("Authorization", "Bearer ").expect("Rule should be added.");
		rules.add_substitution_header("X-Api-Key", "").expect("Rule should be added.");

		let request = request("https://api.example.com/data")
			.with_header("authorization", "Bearer shared-secret")
			.with_header("Accept", "*/*")
			.with_header("X-Api-Key", "placeholder")
			.with_header("Authorization", "Basic other");
		let plan = rules.snapshot().plan_substitutions(&request);

		assert_eq!(plan.len(), 2);
		assert_eq!(plan[0].lookup_key, "shared-secret");
		assert_eq!(plan[0].target.to_string(), "header authorization");
		assert_eq!(plan[1].lookup_key, "placeholder");
	}

	#[test]
	fn applies_header_and_query_replacements() {
		let rules = RuleSet::default();

		rules.add_substitution_header("Authorization", "Bearer ").expect("Rule should be added.");
		rules.add_substitution_query_param("api_key").expect("Rule should be added.");

		let mut request = request("https://api.example.com/data?page=2&api_key=shared&q=a%20b")
			.with_header("Authorization", "Bearer shared-secret");
		let plan = rules.snapshot().plan_substitutions(&request);

		assert_eq!(plan.len(), 2);

		plan[0].apply(&mut request, "real-secret");
		plan[1].apply(&mut request, "real-key");

		assert_eq!(request.headers.get("authorization"), Some("Bearer real-secret"));

		let pairs = request.url.query_pairs().into_owned().collect::<Vec<_>>();

		assert_eq!(
			pairs,
			[
				("page".to_owned(), "2".to_owned()),
				("api_key".to_owned(), "real-key".to_owned()),
				("q".to_owned(), "a b".to_owned()),
			]
		);
	}

	#[test]
	fn query_rewrite_keeps_untouched_pairs_byte_for_byte() {
		let rules = RuleSet::default();

		rules.add_substitution_query_param("api_key").expect("Rule should be added.");

		let mut request =
			request("https://api.example.com/q?flag&q=a%20b&path=%2Fx&&api_key=placeholder&z=1+2");
		let plan = rules.snapshot().plan_substitutions(&request);

		assert_eq!(plan.len(), 1);
		assert_eq!(plan[0].lookup_key, "placeholder");

		plan[0].apply(&mut request, "real key&more");

		assert_eq!(
			request.url.query(),
			Some("flag&q=a%20b&path=%2Fx&&api_key=real+key%26more&z=1+2")
		);
	}

	#[test]
	fn ignores_requests_without_targets() {
		let rules = RuleSet::default();

		rules.add_substitution_query_param("api_key").expect("Rule should be added.");

		let plan = rules.snapshot().plan_substitutions(&request("https://api.example.com/?x=1"));

		assert!(plan.is_empty());
		assert!(format!("{:?}", Substitution {
			target: SubstitutionTarget::Query { position: 0, key: "api_key".into() },
			lookup_key: "secret".into(),
		})
		.contains("<redacted>"));
	}
}
