//! `reqwest` integration: convert outbound [`ReqwestRequest`]s and mediate them in place.
//!
//! Header values must be UTF-8 unless the URL is excluded. Conversion back to reqwest types
//! happens on a fresh header map, so a request is either fully rewritten or left exactly as it was.

// crates.io
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
// self
use crate::{
	_prelude::*,
	error::RequestError,
	request::{Headers, HttpRequest},
	service::{AttestationService, MediatedRequest},
};

impl HttpRequest {
	/// Copies method, URL, headers, and a buffered body out of a reqwest request.
	///
	/// Streaming bodies are not buffered and show up as empty; the mediator never reads the body.
	pub fn from_reqwest(request: &ReqwestRequest) -> Result<Self, RequestError> {
		let mut headers = Headers::default();

		for (name, value) in request.headers() {
			let value = value
				.to_str()
				.map_err(|_| RequestError::NonUtf8Header { name: name.as_str().to_owned() })?;

			headers.append(name.as_str(), value);
		}

		let body =
			request.body().and_then(|body| body.as_bytes()).map(<[u8]>::to_vec).unwrap_or_default();

		Ok(Self {
			method: request.method().as_str().to_owned(),
			url: request.url().clone(),
			headers,
			body,
		})
	}
}

impl AttestationService {
	/// Mediates a reqwest request, rewriting its headers and URL when the pipeline changed them.
	///
	/// Excluded URLs are checked before conversion, so they pass even with headers the mediator
	/// cannot represent; the returned snapshot then carries the method and URL only. Excluded and
	/// degraded requests, as well as failed mediations, leave `request` exactly as it was. When
	/// headers are rewritten, the attestation token header and every header the caller marked
	/// sensitive are marked sensitive so reqwest and hyper keep them out of debug output.
	pub async fn mediate_reqwest(&self, request: &mut ReqwestRequest) -> Result<MediatedRequest> {
		if self.rules.is_excluded(request.url()) {
			return self.mediate_excluded(HttpRequest::new(
				request.method().as_str(),
				request.url().clone(),
			));
		}

		let snapshot = HttpRequest::from_reqwest(request)?;
		let mediated = self.mediate(&snapshot).await?;

		if mediated.is_passthrough() {
			return Ok(mediated);
		}

		let mut sensitive = request
			.headers()
			.iter()
			.filter(|(_, value)| value.is_sensitive())
			.map(|(name, _)| name.as_str().to_owned())
			.collect::<BTreeSet<_>>();

		if let Some(token_header) = &mediated.token_header {
			sensitive.insert(token_header.to_ascii_lowercase());
		}

		let headers = header_map(&mediated.request.headers, &sensitive)?;

		*request.headers_mut() = headers;
		*request.url_mut() = mediated.request.url.clone();

		Ok(mediated)
	}
}

// `sensitive` holds lowercase header names.
fn header_map(headers: &Headers, sensitive: &BTreeSet<String>) -> Result<HeaderMap, RequestError> {
	let mut map = HeaderMap::with_capacity(headers.len());

	for (name, value) in headers.iter() {
		let header_name = HeaderName::from_bytes(name.as_bytes())
			.map_err(|_| RequestError::InvalidHeaderName { name: name.to_owned() })?;
		let mut header_value = HeaderValue::from_str(value)
			.map_err(|_| RequestError::InvalidHeaderValue { name: name.to_owned() })?;

		if sensitive.contains(header_name.as_str()) {
			header_value.set_sensitive(true);
		}

		map.append(header_name, header_value);
	}

	Ok(map)
}

#[cfg(test)]
mod tests {
	// crates.io
	use reqwest::Client as ReqwestClient;
	// self
	use super::*;

	#[test]
	fn from_reqwest_copies_headers_and_body() {
		let request = ReqwestClient::new()
			.post("https://api.example.com/upload?id=7")
			.header("Authorization", "Bearer shared-secret")
			.header("X-Trace", "a")
			.header("x-trace", "b")
			.body("payload")
			.build()
			.expect("Request should build.");
		let converted = HttpRequest::from_reqwest(&request).expect("Headers are UTF-8.");

		assert_eq!(converted.method, "POST");
		assert_eq!(converted.url.as_str(), "https://api.example.com/upload?id=7");
		assert_eq!(converted.headers.get("authorization"), Some("Bearer shared-secret"));
		assert_eq!(converted.headers.get_all("x-trace").collect::<Vec<_>>(), ["a", "b"]);
		assert_eq!(converted.body, b"payload");
	}

	#[test]
	fn non_utf8_header_is_rejected() {
		let mut request = ReqwestClient::new()
			.get("https://api.example.com/")
			.build()
			.expect("Request should build.");

		request.headers_mut().insert(
			"x-binary",
			HeaderValue::from_bytes(&[0xFF, 0xFE]).expect("Opaque bytes are valid header values."),
		);

		assert!(matches!(
			HttpRequest::from_reqwest(&request),
			Err(RequestError::NonUtf8Header { ref name }) if name == "x-binary"
		));
	}

	#[test]
	fn header_map_marks_token_sensitive() {
		let headers =
			Headers::from_iter([("Attestation-Token", "tok"), ("Accept", "application/json")]);
		let sensitive = BTreeSet::from(["attestation-token".to_owned()]);
		let map = header_map(&headers, &sensitive).expect("Headers should encode.");

		assert!(map.get("attestation-token").is_some_and(HeaderValue::is_sensitive));
		assert!(map.get("accept").is_some_and(|value| !value.is_sensitive()));
	}

	#[test]
	fn header_map_rejects_control_characters() {
		let headers = Headers::from_iter([("X-Bad", "line\nbreak")]);

		assert!(matches!(
			header_map(&headers, &BTreeSet::new()),
			Err(RequestError::InvalidHeaderValue { .. })
		));
	}
}
