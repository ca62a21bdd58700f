//! Proceed/Retry/Fail state machine driving the token fetcher.
//!
//! [`DecisionEngine::resolve`] issues fetches sequentially against a single [`FetchRequest`]
//! until the backend answers `Proceed` or `Fail`, or the attempt budget runs out. The engine keeps
//! no state between calls; the only side effects are the fetches themselves. Cancellation is
//! checked before every attempt and raced against the outstanding one.

// std
use std::pin::pin;
// crates.io
use futures::future::{self, Either};
// self
use crate::{
	_prelude::*,
	error::{AttestationFailure, ConfigError, FailureKind},
	fetch::{Decision, FetchOutcome, FetchRequest, TokenFetcher},
	obs,
};

/// What to do when the backend reports a network-unavailable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkPolicy {
	/// Surface [`Error::NetworkUnavailable`].
	FailClosed,
	/// Resolve to [`Resolution::Degraded`] so the request proceeds without a token.
	FailOpen,
}
impl NetworkPolicy {
	/// Maps the `proceed_on_network_failure` setting onto a policy.
	pub fn from_flag(proceed_on_network_failure: bool) -> Self {
		if proceed_on_network_failure { Self::FailOpen } else { Self::FailClosed }
	}
}

/// Successful end state of a decision sequence.
#[derive(Clone, PartialEq, Eq)]
pub enum Resolution {
	/// The backend answered `Proceed`.
	Proceed {
		/// Value returned by the backend, if any.
		token: Option<String>,
		/// Backend diagnostic of the final attempt.
		diagnostic: String,
		/// Number of fetches issued.
		attempts: u32,
	},
	/// The backend was unreachable and the fail-open policy let the caller continue.
	Degraded {
		/// Failure that triggered the degraded path.
		failure: AttestationFailure,
		/// Number of fetches issued.
		attempts: u32,
	},
}
impl Resolution {
	/// Number of fetches issued.
	pub fn attempts(&self) -> u32 {
		match self {
			Self::Proceed { attempts, .. } | Self::Degraded { attempts, .. } => *attempts,
		}
	}
}
impl Debug for Resolution {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Proceed { token, diagnostic, attempts } => f
				.debug_struct("Resolution::Proceed")
				.field("token", &token.as_ref().map(|_| "<redacted>"))
				.field("diagnostic", diagnostic)
				.field("attempts", attempts)
				.finish(),
			Self::Degraded { failure, attempts } => f
				.debug_struct("Resolution::Degraded")
				.field("failure", failure)
				.field("attempts", attempts)
				.finish(),
		}
	}
}

/// Bounded retry state machine around a [`TokenFetcher`].
pub struct DecisionEngine<'a> {
	fetcher: &'a dyn TokenFetcher,
	max_attempts: u32,
	network_policy: NetworkPolicy,
}
impl<'a> DecisionEngine<'a> {
	/// Creates an engine issuing at most `max_attempts` fetches (clamped to at least one).
	pub fn new(
		fetcher: &'a dyn TokenFetcher,
		max_attempts: u32,
		network_policy: NetworkPolicy,
	) -> Self {
		Self { fetcher, max_attempts: max_attempts.max(1), network_policy }
	}

	/// Attempt budget in effect.
	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	/// Runs the decision sequence for `request`.
	///
	/// - `Proceed` ends the sequence successfully.
	/// - `Retry` re-issues the same request until the budget runs out, then fails with
	///   [`Error::RetriesExhausted`].
	/// - `Fail` is classified by [`FailureKind`]; rejections are always terminal, and network
	///   failures only degrade under [`NetworkPolicy::FailOpen`].
	pub async fn resolve(
		&self,
		request: &FetchRequest,
		cancel: &CancellationToken,
	) -> Result<Resolution> {
		let mut last_diagnostic = String::new();

		for attempt in 1..=self.max_attempts {
			if cancel.is_cancelled() {
				return Err(Error::Cancelled);
			}

			let outcome = {
				let cancelled = pin!(cancel.cancelled());

				match future::select(self.fetcher.fetch(request), cancelled).await {
					Either::Left((outcome, _)) => outcome,
					Either::Right(_) => return Err(Error::Cancelled),
				}
			};

			obs::log_attempt(attempt, self.max_attempts, outcome.decision, &outcome.diagnostic);
			obs::record_fetch_decision(&request.kind, outcome.decision);

			match outcome.decision {
				Decision::Proceed =>
					return Ok(Resolution::Proceed {
						token: outcome.token,
						diagnostic: outcome.diagnostic,
						attempts: attempt,
					}),
				Decision::Retry => last_diagnostic = outcome.diagnostic,
				Decision::Fail => return self.classify_failure(outcome, attempt),
			}
		}

		Err(Error::RetriesExhausted { attempts: self.max_attempts, diagnostic: last_diagnostic })
	}

	fn classify_failure(&self, outcome: FetchOutcome, attempts: u32) -> Result<Resolution> {
		let failure = outcome
			.failure
			.unwrap_or_else(|| AttestationFailure::internal(outcome.diagnostic, false));

		match failure.kind {
			FailureKind::Rejected => Err(Error::AttestationRejected(failure)),
			FailureKind::NetworkUnavailable => match self.network_policy {
				NetworkPolicy::FailOpen => Ok(Resolution::Degraded { failure, attempts }),
				NetworkPolicy::FailClosed => Err(Error::NetworkUnavailable(failure)),
			},
			FailureKind::Misconfigured => Err(ConfigError::BackendRefused(failure).into()),
			FailureKind::Internal => Err(Error::Backend(failure)),
		}
	}
}
impl Debug for DecisionEngine<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DecisionEngine")
			.field("max_attempts", &self.max_attempts)
			.field("network_policy", &self.network_policy)
			.finish()
	}
}
