//! Transport-neutral request model consumed and produced by the mediator.
//!
//! Headers keep their original order and casing; lookups are case-insensitive. The mediator
//! only ever edits a clone, so the caller's request stays untouched on failure.

// self
use crate::_prelude::*;

/// Outbound HTTP request as seen by the mediator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// HTTP method (`GET`, `POST`, ...).
	pub method: String,
	/// Absolute request URL.
	pub url: Url,
	/// Ordered header list.
	pub headers: Headers,
	/// Opaque body bytes; never inspected.
	pub body: Vec<u8>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: impl Into<String>, url: Url) -> Self {
		Self { method: method.into(), url, headers: Headers::default(), body: Vec::new() }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new("GET", url)
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}
}

/// Ordered, case-insensitive header multimap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);
impl Headers {
	/// Number of header entries (repeated names count separately).
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no headers are present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// First value for `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
	}

	/// All values for `name`, in order.
	pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
		self.0
			.iter()
			.filter(move |(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// Returns true if at least one entry named `name` exists.
	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Appends an entry, keeping any existing ones.
	pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.0.push((name.into(), value.into()));
	}

	/// Leaves exactly one entry named `name` holding `value`.
	///
	/// The first existing entry is overwritten in place so header order is preserved; later
	/// duplicates are dropped. Missing headers are appended.
	pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
		let name = name.into();
		let value = value.into();
		let mut slot = None;
		let mut idx = 0;

		self.0.retain(|(key, _)| {
			let keep = !key.eq_ignore_ascii_case(&name) || slot.is_none();

			if key.eq_ignore_ascii_case(&name) && slot.is_none() {
				slot = Some(idx);
			}

			idx += 1;

			keep
		});

		match slot {
			Some(position) => self.0[position].1 = value,
			None => self.0.push((name, value)),
		}
	}

	/// Removes every entry named `name`, returning how many were dropped.
	pub fn remove(&mut self, name: &str) -> usize {
		let before = self.0.len();

		self.0.retain(|(key, _)| !key.eq_ignore_ascii_case(name));

		before - self.0.len()
	}

	/// Iterator over `(name, value)` pairs in order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
	}

	pub(crate) fn entry(&self, position: usize) -> Option<(&str, &str)> {
		self.0.get(position).map(|(key, value)| (key.as_str(), value.as_str()))
	}

	pub(crate) fn replace_at(&mut self, position: usize, value: String) {
		if let Some(entry) = self.0.get_mut(position) {
			entry.1 = value;
		}
	}
}
impl<N, V> FromIterator<(N, V)> for Headers
where
	N: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn headers() -> Headers {
		Headers::from_iter([
			("Accept", "application/json"),
			("X-Token", "old-1"),
			("User-Agent", "mediator-test"),
			("x-token", "old-2"),
		])
	}

	#[test]
	fn lookups_ignore_case() {
		let headers = headers();

		assert_eq!(headers.get("x-TOKEN"), Some("old-1"));
		assert_eq!(headers.get_all("X-Token").collect::<Vec<_>>(), ["old-1", "old-2"]);
		assert!(!headers.contains("Authorization"));
	}

	#[test]
	fn set_collapses_duplicates_in_place() {
		let mut headers = headers();

		headers.set("X-TOKEN", "new");

		assert_eq!(
			headers.iter().collect::<Vec<_>>(),
			[("Accept", "application/json"), ("X-Token", "new"), ("User-Agent", "mediator-test")]
		);

		headers.set("Attestation-Token", "abc");

		assert_eq!(headers.len(), 4);
		assert_eq!(headers.get("attestation-token"), Some("abc"));
	}

	#[test]
	fn remove_reports_count() {
		let mut headers = headers();

		assert_eq!(headers.remove("x-token"), 2);
		assert_eq!(headers.remove("x-token"), 0);
		assert_eq!(headers.len(), 2);
	}
}
