//! Non-request entry points: tokens by URL, secure strings, custom JWTs, warm-up, and pins.
//!
//! These share the decision engine with mediation but always run fail-closed; there is no
//! request to let through when the backend is unreachable.

// self
use crate::{
	_prelude::*,
	decision::{NetworkPolicy, Resolution},
	error::{AttestationFailure, ConfigError},
	fetch::FetchRequest,
	obs::{self, OperationKind, OperationOutcome},
	pins::{PinSet, PinType},
	service::AttestationService,
};

const PRECHECK_KEY: &str = "attestation-mediator-precheck";
const PREFETCH_URL: &str = "https://prefetch.attestation.invalid/";

impl AttestationService {
	/// Fetches a token for `url` without attaching it anywhere.
	pub async fn fetch_token(&self, url: &str) -> Result<String> {
		self.observed(OperationKind::FetchToken, "fetch_token", async {
			self.ensure_initialized()?;

			let url = Url::parse(url)
				.map_err(|source| ConfigError::InvalidUrl { url: url.to_owned(), source })?;
			let settings = self.settings();
			let request = FetchRequest::token(url).with_data_hash(settings.data_hash.clone());

			self.resolve_value(&request).await?.ok_or_else(|| {
				Error::Backend(AttestationFailure::internal("backend issued no token", false))
			})
		})
		.await
	}

	/// Reads the secure string stored under `key`, optionally redefining it first.
	///
	/// Returns `Ok(None)` if the key is not defined.
	pub async fn fetch_secure_string(
		&self,
		key: &str,
		new_definition: Option<&str>,
	) -> Result<Option<String>> {
		self.observed(OperationKind::SecureString, "fetch_secure_string", async {
			self.ensure_initialized()?;

			let request = FetchRequest::secure_string(key, new_definition.map(str::to_owned));

			self.resolve_value(&request).await
		})
		.await
	}

	/// Issues a backend-signed JWT embedding `payload`, which must be a JSON object.
	pub async fn fetch_custom_jwt(&self, payload: &str) -> Result<String> {
		self.observed(OperationKind::CustomJwt, "fetch_custom_jwt", async {
			self.ensure_initialized()?;

			serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(payload)
				.map_err(|source| ConfigError::InvalidJwtPayload { source })?;

			let request = FetchRequest::custom_jwt(payload);

			self.resolve_value(&request).await?.ok_or_else(|| {
				Error::Backend(AttestationFailure::internal("backend issued no JWT", false))
			})
		})
		.await
	}

	/// Checks whether the app would currently pass attestation.
	///
	/// Performs a secure string lookup on a key that is never defined; any `Proceed` answer,
	/// with or without a value, counts as a pass.
	pub async fn precheck(&self) -> Result<()> {
		self.observed(OperationKind::Precheck, "precheck", async {
			self.ensure_initialized()?;
			self.resolve_value(&FetchRequest::secure_string(PRECHECK_KEY, None)).await.map(|_| ())
		})
		.await
	}

	/// Warms the backend so the first real mediation is fast.
	///
	/// Errors are logged and swallowed. Concurrent calls collapse onto the one already running.
	pub async fn prefetch(&self) {
		const KIND: OperationKind = OperationKind::Prefetch;

		let Some(_guard) = self.prefetch_guard.try_lock() else {
			return;
		};
		let result = self
			.observed(KIND, "prefetch", async {
				self.ensure_initialized()?;

				let url = Url::parse(PREFETCH_URL).map_err(|source| ConfigError::InvalidUrl {
					url: PREFETCH_URL.to_owned(),
					source,
				})?;

				self.resolve_value(&FetchRequest::token(url)).await
			})
			.await;

		if let Err(e) = result {
			obs::log_swallowed(KIND, &e);
		}
	}

	/// Backend device identifier.
	pub fn device_id(&self) -> Result<String> {
		const KIND: OperationKind = OperationKind::DeviceId;

		let _span = obs::OpSpan::new(KIND, "device_id").entered();

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = self
			.ensure_initialized()
			.map_err(Error::from)
			.and_then(|()| self.fetcher.device_id().map_err(Error::Backend));

		obs::record_operation_outcome(KIND, outcome_of(&result));

		result
	}

	/// Signs `message` with the key bound to the current attestation.
	pub fn message_signature(&self, message: &str) -> Result<String> {
		const KIND: OperationKind = OperationKind::MessageSignature;

		let _span = obs::OpSpan::new(KIND, "message_signature").entered();

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = self
			.ensure_initialized()
			.map_err(Error::from)
			.and_then(|()| self.fetcher.message_signature(message).map_err(Error::Backend));

		obs::record_operation_outcome(KIND, outcome_of(&result));

		result
	}

	/// Current pins for `pin_type`; an empty set if none were published.
	pub fn pins(&self, pin_type: &PinType) -> Result<Arc<PinSet>> {
		self.ensure_initialized()?;

		Ok(self.pins.get(pin_type).unwrap_or_default())
	}

	async fn resolve_value(&self, request: &FetchRequest) -> Result<Option<String>> {
		let settings = self.settings();
		let resolution = self
			.engine(&settings, NetworkPolicy::FailClosed)
			.resolve(request, &CancellationToken::new())
			.await?;

		match resolution {
			Resolution::Proceed { token, .. } => Ok(token),
			Resolution::Degraded { failure, .. } => Err(Error::NetworkUnavailable(failure)),
		}
	}
}

fn outcome_of<T>(result: &Result<T>) -> OperationOutcome {
	if result.is_ok() { OperationOutcome::Success } else { OperationOutcome::Failure }
}
