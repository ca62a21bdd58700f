//! Request mediation: exclusion check, token attachment, and secret substitution.
//!
//! [`AttestationService::mediate`] evaluates exclusions first, fetches a token through the
//! decision engine, writes `<prefix><token>` under the configured header, and finally swaps
//! placeholder secrets for real ones. The caller's request is never touched; every change lands
//! on a private clone that is only returned once the whole pipeline succeeded.

// self
use crate::{
	_prelude::*,
	config::Settings,
	decision::{NetworkPolicy, Resolution},
	error::ErrorReport,
	fetch::FetchRequest,
	obs::{self, OperationKind, OperationOutcome, OpSpan},
	request::HttpRequest,
	rules::RuleSnapshot,
	service::AttestationService,
};

/// Boxed, spawnable future returned by [`AttestationService::intercept`].
pub type InterceptFuture = Pin<Box<dyn Future<Output = Result<MediatedRequest>> + 'static + Send>>;

const MEDIATE: OperationKind = OperationKind::Mediate;

/// How a successfully mediated request left the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
	/// Token attached (substitutions applied where configured).
	Attested,
	/// The backend does not protect this URL; no token, substitutions still applied.
	Unprotected,
	/// An exclusion pattern matched; returned unchanged.
	Excluded,
	/// Backend unreachable under the fail-open policy; returned unchanged.
	Degraded,
}
impl Disposition {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attested => "attested",
			Self::Unprotected => "unprotected",
			Self::Excluded => "excluded",
			Self::Degraded => "degraded",
		}
	}
}

/// Kind of non-fatal condition recorded during mediation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
	/// The backend proceeded without issuing a token.
	NoToken,
	/// The request proceeded without a token because the backend was unreachable.
	Degraded,
	/// A single secret substitution was skipped.
	SubstitutionSkipped,
}
impl DiagnosticKind {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NoToken => "no_token",
			Self::Degraded => "degraded",
			Self::SubstitutionSkipped => "substitution_skipped",
		}
	}
}

/// Non-fatal condition attached to a mediated request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
	/// Condition kind.
	pub kind: DiagnosticKind,
	/// Human-readable message.
	pub message: String,
	/// Structured error behind the condition, if any.
	pub report: Option<ErrorReport>,
}
impl Diagnostic {
	fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into(), report: None }
	}

	fn from_error(kind: DiagnosticKind, error: &Error) -> Self {
		Self { kind, message: error.to_string(), report: Some(error.report()) }
	}
}

/// Successful mediation result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediatedRequest {
	/// Request to send.
	pub request: HttpRequest,
	/// How the request left the pipeline.
	pub disposition: Disposition,
	/// Non-fatal conditions collected on the way.
	pub diagnostics: Vec<Diagnostic>,
	/// Header the token was written under, taken from the settings this mediation used.
	pub token_header: Option<String>,
}
impl MediatedRequest {
	fn passthrough(request: &HttpRequest, disposition: Disposition) -> Self {
		Self { request: request.clone(), disposition, diagnostics: Vec::new(), token_header: None }
	}

	/// Returns true if the request must be sent exactly as the caller built it.
	pub fn is_passthrough(&self) -> bool {
		matches!(self.disposition, Disposition::Excluded | Disposition::Degraded)
	}

	/// Consumes the result, returning the request to send.
	pub fn into_request(self) -> HttpRequest {
		self.request
	}

	/// Returns true if a token was attached.
	pub fn is_attested(&self) -> bool {
		matches!(self.disposition, Disposition::Attested)
	}
}

impl AttestationService {
	/// Starts mediating `request` as an independent, cancellable task.
	///
	/// The returned future owns everything it needs, so it can be spawned on any executor.
	/// Cancelling `cancel` aborts at the next fetch boundary with [`Error::Cancelled`] and never
	/// yields a partially mediated request.
	pub fn intercept(&self, request: HttpRequest, cancel: CancellationToken) -> InterceptFuture {
		let service = self.clone();

		Box::pin(async move { service.mediate_with(&request, &cancel).await })
	}

	/// Mediates `request` without external cancellation.
	pub async fn mediate(&self, request: &HttpRequest) -> Result<MediatedRequest> {
		self.mediate_with(request, &CancellationToken::new()).await
	}

	/// Blocking equivalent of [`mediate`](Self::mediate) for synchronous call sites.
	///
	/// Runs the pipeline on the calling thread; do not call it from inside an async executor.
	pub fn update_request(&self, request: &HttpRequest) -> Result<MediatedRequest> {
		futures::executor::block_on(self.mediate(request))
	}

	/// Mediates `request`, observing `cancel` between and during fetch attempts.
	pub async fn mediate_with(
		&self,
		request: &HttpRequest,
		cancel: &CancellationToken,
	) -> Result<MediatedRequest> {
		let span = OpSpan::new(MEDIATE, "mediate");

		self.begin_mediation();

		let result = span.instrument(self.run_mediation(request, cancel)).await;

		self.finish_mediation(&result);

		result
	}

	/// Records an excluded pass-through decided before the request was converted.
	///
	/// Used by transport adapters whose requests may carry headers the mediator cannot
	/// represent; excluded URLs pass regardless of their headers.
	pub(crate) fn mediate_excluded(&self, request: HttpRequest) -> Result<MediatedRequest> {
		let _span = OpSpan::new(MEDIATE, "mediate_excluded").entered();

		self.begin_mediation();

		let result = self
			.ensure_initialized()
			.map_err(Error::from)
			.map(|()| MediatedRequest::passthrough(&request, Disposition::Excluded));

		self.finish_mediation(&result);

		result
	}

	fn begin_mediation(&self) {
		obs::record_operation_outcome(MEDIATE, OperationOutcome::Attempt);
		self.metrics.record_attempt();
	}

	fn finish_mediation(&self, result: &Result<MediatedRequest>) {
		let mediated = match result {
			Ok(mediated) => mediated,
			Err(_) => {
				self.metrics.record_failure();
				obs::record_operation_outcome(MEDIATE, OperationOutcome::Failure);

				return;
			},
		};
		let outcome = match mediated.disposition {
			Disposition::Attested => {
				self.metrics.record_attested();

				OperationOutcome::Success
			},
			Disposition::Unprotected => {
				self.metrics.record_unprotected();

				OperationOutcome::Success
			},
			Disposition::Excluded => {
				self.metrics.record_excluded();

				OperationOutcome::Excluded
			},
			Disposition::Degraded => {
				self.metrics.record_degraded();

				OperationOutcome::Degraded
			},
		};

		for diagnostic in &mediated.diagnostics {
			obs::log_diagnostic(MEDIATE, diagnostic.kind.as_str(), &diagnostic.message);
		}

		obs::record_operation_outcome(MEDIATE, outcome);
	}

	async fn run_mediation(
		&self,
		request: &HttpRequest,
		cancel: &CancellationToken,
	) -> Result<MediatedRequest> {
		self.ensure_initialized()?;

		let settings = self.settings();
		let rules = self.rules.snapshot();

		if rules.is_excluded(&request.url) {
			return Ok(MediatedRequest::passthrough(request, Disposition::Excluded));
		}

		let binding = settings
			.binding_header
			.as_deref()
			.and_then(|name| request.headers.get(name))
			.map(str::to_owned);
		let fetch = FetchRequest::token(request.url.clone())
			.with_binding(binding)
			.with_data_hash(settings.data_hash.clone());
		let policy = NetworkPolicy::from_flag(settings.proceed_on_network_failure);
		let resolution = self.engine(&settings, policy).resolve(&fetch, cancel).await?;
		let mut mediated = request.clone();
		let mut diagnostics = Vec::new();
		let mut token_header = None;
		let disposition = match resolution {
			Resolution::Proceed { token: Some(token), .. } => {
				mediated
					.headers
					.set(settings.token_header.as_str(), format!("{}{token}", settings.token_prefix));
				token_header = Some(settings.token_header.clone());

				Disposition::Attested
			},
			Resolution::Proceed { token: None, diagnostic, .. } => {
				diagnostics.push(Diagnostic::new(DiagnosticKind::NoToken, diagnostic));

				Disposition::Unprotected
			},
			Resolution::Degraded { failure, .. } => {
				let mut degraded = MediatedRequest::passthrough(request, Disposition::Degraded);

				degraded.diagnostics.push(Diagnostic::from_error(
					DiagnosticKind::Degraded,
					&Error::NetworkUnavailable(failure),
				));

				return Ok(degraded);
			},
		};

		let tally = self.substitute(&rules, &settings, &mut mediated, &mut diagnostics, cancel).await?;

		self.metrics.record_substitutions(tally.applied, tally.skipped);

		Ok(MediatedRequest { request: mediated, disposition, diagnostics, token_header })
	}

	/// Resolves and applies every planned substitution on `request`.
	///
	/// Lookups never fail open: an unreachable backend either skips the substitution (leaving
	/// the placeholder in place) or, with fail-closed substitutions, fails the mediation.
	/// Rejections, cancellation, and configuration errors always abort.
	async fn substitute(
		&self,
		rules: &RuleSnapshot,
		settings: &Settings,
		request: &mut HttpRequest,
		diagnostics: &mut Vec<Diagnostic>,
		cancel: &CancellationToken,
	) -> Result<SubstitutionTally> {
		let plan = rules.plan_substitutions(request);
		let mut tally = SubstitutionTally::default();

		if plan.is_empty() {
			return Ok(tally);
		}

		let engine = self.engine(settings, NetworkPolicy::FailClosed);

		for substitution in plan {
			let lookup = FetchRequest::secure_string(substitution.lookup_key.clone(), None);

			match engine.resolve(&lookup, cancel).await {
				Ok(Resolution::Proceed { token: Some(secret), .. }) => {
					substitution.apply(request, &secret);
					tally.applied += 1;
				},
				// The placeholder is not a managed secret.
				Ok(_) => {},
				Err(err @ (Error::AttestationRejected(_) | Error::Cancelled | Error::Config(_))) =>
					return Err(err),
				Err(err) => {
					let failed = Error::SubstitutionLookupFailed {
						target: substitution.target.to_string(),
						source: Box::new(err),
					};

					if settings.fail_closed_substitutions {
						return Err(failed);
					}

					tally.skipped += 1;
					diagnostics
						.push(Diagnostic::from_error(DiagnosticKind::SubstitutionSkipped, &failed));
				},
			}
		}

		Ok(tally)
	}
}

// Counted only once the whole mediation succeeded.
#[derive(Debug, Default)]
struct SubstitutionTally {
	applied: u64,
	skipped: u64,
}
