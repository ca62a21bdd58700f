//! Optional observability helpers for mediation and secrets operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `attestation_mediator.op` with the `op` and
//!   `stage` fields, plus `debug`/`warn` events for fetch attempts and diagnostics.
//! - Enable `metrics` to increment the `attestation_mediator_op_total` counter for every
//!   attempt/outcome, labeled by `op` + `outcome`, and the `attestation_mediator_fetch_total`
//!   counter for every backend answer, labeled by `fetch` + `decision`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the mediator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Request mediation (`intercept`, `mediate`, `update_request`).
	Mediate,
	/// Token fetch for an arbitrary URL.
	FetchToken,
	/// Secure string lookup (including substitution lookups).
	SecureString,
	/// Custom JWT issuance.
	CustomJwt,
	/// Dry-run attestation.
	Precheck,
	/// Best-effort warm-up.
	Prefetch,
	/// Device identifier lookup.
	DeviceId,
	/// Message signing.
	MessageSignature,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::Mediate => "mediate",
			OperationKind::FetchToken => "fetch_token",
			OperationKind::SecureString => "secure_string",
			OperationKind::CustomJwt => "custom_jwt",
			OperationKind::Precheck => "precheck",
			OperationKind::Prefetch => "prefetch",
			OperationKind::DeviceId => "device_id",
			OperationKind::MessageSignature => "message_signature",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Request passed through because an exclusion matched.
	Excluded,
	/// Request passed through without a token under the fail-open policy.
	Degraded,
	/// Failure propagated back to the caller.
	Failure,
}
impl OperationOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Excluded => "excluded",
			OperationOutcome::Degraded => "degraded",
			OperationOutcome::Failure => "failure",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
