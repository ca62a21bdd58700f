// self
use crate::{
	fetch::{Decision, FetchKind},
	obs::{OperationKind, OperationOutcome},
};

/// Counter incremented once per operation attempt and once per terminal outcome.
pub const OPERATION_COUNTER: &str = "attestation_mediator_op_total";
/// Counter incremented for every backend answer, labeled by what was fetched and the decision.
pub const FETCH_DECISION_COUNTER: &str = "attestation_mediator_fetch_total";

/// Records an operation outcome under [`OPERATION_COUNTER`], labeled `op` + `outcome`.
pub fn record_operation_outcome(kind: OperationKind, outcome: OperationOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(OPERATION_COUNTER, "op" => kind.as_str(), "outcome" => outcome.as_str())
		.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Records one backend answer under [`FETCH_DECISION_COUNTER`], labeled `fetch` + `decision`.
///
/// Retries show up as repeated `retry` samples, so the ratio of `retry` to `proceed` tracks how
/// hard the backend is to reach.
pub fn record_fetch_decision(kind: &FetchKind, decision: Decision) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		FETCH_DECISION_COUNTER,
		"fetch" => kind.as_str(),
		"decision" => decision.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (kind, decision);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn counters_share_the_crate_prefix() {
		for name in [OPERATION_COUNTER, FETCH_DECISION_COUNTER] {
			assert!(name.starts_with("attestation_mediator_"));
			assert!(name.ends_with("_total"));
		}

		assert_ne!(OPERATION_COUNTER, FETCH_DECISION_COUNTER);
	}

	#[test]
	fn recording_without_a_recorder_is_silent() {
		let kind = FetchKind::SecureString { key: "placeholder".into(), new_definition: None };

		record_operation_outcome(OperationKind::Mediate, OperationOutcome::Degraded);

		for decision in [Decision::Proceed, Decision::Retry, Decision::Fail] {
			record_fetch_decision(&kind, decision);
		}
	}
}
