//! Shared mediation context: configuration lifecycle, settings, rules, and pins.
//!
//! [`AttestationService`] is the explicit, reference-counted replacement for a process-wide
//! singleton. Clones share the same state. Request mediation lives in [`mediate`] and the
//! non-request operations (secure strings, JWTs, precheck, prefetch, pins) in [`secrets`]; both
//! drive the same [`DecisionEngine`].

pub mod mediate;
pub mod metrics;
pub mod secrets;

pub use mediate::*;
pub use metrics::MediationMetrics;

// self
use crate::{
	_prelude::*,
	config::{self, Settings},
	decision::{DecisionEngine, NetworkPolicy},
	error::ConfigError,
	fetch::TokenFetcher,
	obs::{self, OperationKind, OperationOutcome, OpSpan},
	pins::PinStore,
	rules::RuleSet,
};

/// Coordinates attestation for every outbound request of a host application.
///
/// Lifecycle: build with [`new`](Self::new), call [`initialize`](Self::initialize) once, then
/// mediate from any number of tasks. Settings and rules may change at any time; each mediation
/// works on the snapshot it took when it started, and no lock is held while a fetch is
/// outstanding.
#[derive(Clone)]
pub struct AttestationService {
	/// Backend boundary used for every fetch.
	pub fetcher: Arc<dyn TokenFetcher>,
	/// Substitution and exclusion rules.
	pub rules: Arc<RuleSet>,
	/// Certificate pins published by the external pin source.
	pub pins: Arc<PinStore>,
	/// Counters for mediation outcomes.
	pub metrics: Arc<MediationMetrics>,
	settings: Arc<RwLock<Arc<Settings>>>,
	config: Arc<RwLock<Option<String>>>,
	prefetch_guard: Arc<AsyncMutex<()>>,
}
impl AttestationService {
	/// Creates an uninitialized service with default settings.
	pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
		Self {
			fetcher,
			rules: Default::default(),
			pins: Default::default(),
			metrics: Default::default(),
			settings: Default::default(),
			config: Default::default(),
			prefetch_guard: Default::default(),
		}
	}

	/// Replaces the settings after validating them.
	pub fn with_settings(self, settings: Settings) -> Result<Self, ConfigError> {
		settings.validate()?;

		*self.settings.write() = Arc::new(settings);

		Ok(self)
	}

	/// Shares an externally refreshed pin store.
	pub fn with_pin_store(mut self, pins: Arc<PinStore>) -> Self {
		self.pins = pins;

		self
	}

	/// Initializes the backend with the opaque configuration string.
	///
	/// Repeating the call with the same string is a no-op; a different string fails with
	/// [`ConfigError::AlreadyInitialized`] (use [`reconfigure`](Self::reconfigure)).
	pub fn initialize(&self, config: &str) -> Result<()> {
		self.install_config(config, false)
	}

	/// Re-initializes the backend with a new configuration string.
	pub fn reconfigure(&self, config: &str) -> Result<()> {
		self.install_config(config, true)
	}

	/// Returns true once [`initialize`](Self::initialize) succeeded.
	pub fn is_initialized(&self) -> bool {
		self.config.read().is_some()
	}

	/// Current settings snapshot.
	pub fn settings(&self) -> Arc<Settings> {
		self.settings.read().clone()
	}

	/// Sets the header whose value is bound into the token.
	pub fn set_binding_header(&self, header: impl Into<String>) -> Result<(), ConfigError> {
		let header = header.into();

		config::validate_header_name("binding header", &header)?;

		self.update_settings(|settings| settings.binding_header = Some(header));

		Ok(())
	}

	/// Stops binding tokens to a request header.
	pub fn clear_binding_header(&self) {
		self.update_settings(|settings| settings.binding_header = None);
	}

	/// Header bound into the token, if any.
	pub fn binding_header(&self) -> Option<String> {
		self.settings().binding_header.clone()
	}

	/// Sets the header that carries the attestation token.
	pub fn set_token_header(&self, header: impl Into<String>) -> Result<(), ConfigError> {
		let header = header.into();

		config::validate_header_name("attestation token header", &header)?;

		self.update_settings(|settings| settings.token_header = header);

		Ok(())
	}

	/// Header that carries the attestation token.
	pub fn token_header(&self) -> String {
		self.settings().token_header.clone()
	}

	/// Sets the prefix written before the token value.
	pub fn set_token_prefix(&self, prefix: impl Into<String>) {
		let prefix = prefix.into();

		self.update_settings(|settings| settings.token_prefix = prefix);
	}

	/// Prefix written before the token value.
	pub fn token_prefix(&self) -> String {
		self.settings().token_prefix.clone()
	}

	/// Switches between fail-open and fail-closed handling of network failures.
	pub fn set_proceed_on_network_failure(&self, proceed: bool) {
		self.update_settings(|settings| settings.proceed_on_network_failure = proceed);
	}

	/// Whether requests proceed without a token when the backend is unreachable.
	pub fn proceeds_on_network_failure(&self) -> bool {
		self.settings().proceed_on_network_failure
	}

	/// Sets (or clears) the data hash included in tokens.
	pub fn set_data_hash(&self, data_hash: Option<String>) {
		self.update_settings(|settings| settings.data_hash = data_hash);
	}

	/// Data hash included in tokens.
	pub fn data_hash(&self) -> Option<String> {
		self.settings().data_hash.clone()
	}

	/// Sets the total fetch attempts allowed per decision sequence.
	pub fn set_max_fetch_attempts(&self, attempts: u32) -> Result<(), ConfigError> {
		config::validate_fetch_attempts(attempts)?;

		self.update_settings(|settings| settings.max_fetch_attempts = attempts);

		Ok(())
	}

	/// Makes a failed secret substitution fail the whole mediation.
	pub fn set_fail_closed_substitutions(&self, fail_closed: bool) {
		self.update_settings(|settings| settings.fail_closed_substitutions = fail_closed);
	}

	/// Adds (or replaces the prefix of) a header substitution rule.
	pub fn add_substitution_header(
		&self,
		header: impl Into<String>,
		required_prefix: impl Into<String>,
	) -> Result<(), ConfigError> {
		self.rules.add_substitution_header(header, required_prefix)
	}

	/// Removes a header substitution rule.
	pub fn remove_substitution_header(&self, header: &str) -> bool {
		self.rules.remove_substitution_header(header)
	}

	/// Adds a query parameter key eligible for substitution.
	pub fn add_substitution_query_param(&self, key: impl Into<String>) -> Result<(), ConfigError> {
		self.rules.add_substitution_query_param(key)
	}

	/// Removes a query parameter key.
	pub fn remove_substitution_query_param(&self, key: &str) -> bool {
		self.rules.remove_substitution_query_param(key)
	}

	/// Adds a URL exclusion regex.
	pub fn add_exclusion_pattern(&self, pattern: impl Into<String>) -> Result<(), ConfigError> {
		self.rules.add_exclusion_pattern(pattern)
	}

	/// Removes a URL exclusion regex.
	pub fn remove_exclusion_pattern(&self, pattern: &str) -> bool {
		self.rules.remove_exclusion_pattern(pattern)
	}

	pub(crate) fn ensure_initialized(&self) -> Result<(), ConfigError> {
		if self.is_initialized() { Ok(()) } else { Err(ConfigError::NotInitialized) }
	}

	pub(crate) fn engine(&self, settings: &Settings, policy: NetworkPolicy) -> DecisionEngine<'_> {
		DecisionEngine::new(self.fetcher.as_ref(), settings.max_fetch_attempts, policy)
	}

	/// Wraps an operation with its span and outcome counters.
	pub(crate) async fn observed<T, Fut>(
		&self,
		kind: OperationKind,
		stage: &'static str,
		fut: Fut,
	) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		let span = OpSpan::new(kind, stage);

		obs::record_operation_outcome(kind, OperationOutcome::Attempt);

		let result = span.instrument(fut).await;

		match &result {
			Ok(_) => obs::record_operation_outcome(kind, OperationOutcome::Success),
			Err(_) => obs::record_operation_outcome(kind, OperationOutcome::Failure),
		}

		result
	}

	fn install_config(&self, config: &str, replace: bool) -> Result<()> {
		if config.trim().is_empty() {
			return Err(ConfigError::EmptyConfigString.into());
		}

		let mut current = self.config.write();

		match current.as_deref() {
			Some(existing) if existing == config => return Ok(()),
			Some(_) if !replace => return Err(ConfigError::AlreadyInitialized.into()),
			_ => {},
		}

		self.fetcher.initialize(config).map_err(ConfigError::BackendRefused)?;
		*current = Some(config.to_owned());

		Ok(())
	}

	fn update_settings(&self, f: impl FnOnce(&mut Settings)) {
		let mut guard = self.settings.write();

		f(Arc::make_mut(&mut *guard));
	}
}
impl Debug for AttestationService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AttestationService")
			.field("initialized", &self.is_initialized())
			.field("settings", &self.settings())
			.field("rules", &self.rules.snapshot())
			.finish()
	}
}
