//! Always-on counters describing how mediations ended.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for request mediation.
#[derive(Debug, Default)]
pub struct MediationMetrics {
	attempts: AtomicU64,
	attested: AtomicU64,
	unprotected: AtomicU64,
	excluded: AtomicU64,
	degraded: AtomicU64,
	failures: AtomicU64,
	substitutions: AtomicU64,
	skipped_substitutions: AtomicU64,
}
impl MediationMetrics {
	/// Returns the total number of mediation calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that received a token.
	pub fn attested(&self) -> u64 {
		self.attested.load(Ordering::Relaxed)
	}

	/// Returns the number of requests the backend chose not to protect.
	pub fn unprotected(&self) -> u64 {
		self.unprotected.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that matched an exclusion.
	pub fn excluded(&self) -> u64 {
		self.excluded.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that proceeded under the fail-open policy.
	pub fn degraded(&self) -> u64 {
		self.degraded.load(Ordering::Relaxed)
	}

	/// Returns the number of failed mediations.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Returns the number of secrets written into requests.
	pub fn substitutions(&self) -> u64 {
		self.substitutions.load(Ordering::Relaxed)
	}

	/// Returns the number of substitutions skipped after a failed lookup.
	pub fn skipped_substitutions(&self) -> u64 {
		self.skipped_substitutions.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_attested(&self) {
		self.attested.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_unprotected(&self) {
		self.unprotected.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_excluded(&self) {
		self.excluded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_degraded(&self) {
		self.degraded.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_substitutions(&self, applied: u64, skipped: u64) {
		self.substitutions.fetch_add(applied, Ordering::Relaxed);
		self.skipped_substitutions.fetch_add(skipped, Ordering::Relaxed);
	}
}
