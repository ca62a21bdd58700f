// self
use crate::{_prelude::*, fetch::Decision, obs::OperationKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by mediator operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OperationKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("attestation_mediator.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> OpSpanGuard {
		#[cfg(feature = "tracing")]
		{
			OpSpanGuard { guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			OpSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`OpSpan::entered`].
pub struct OpSpanGuard {
	#[cfg(feature = "tracing")]
	#[allow(dead_code)]
	guard: tracing::span::EnteredSpan,
}
impl Debug for OpSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("OpSpanGuard(..)")
	}
}

/// Logs a single fetch attempt and the backend's decision.
pub(crate) fn log_attempt(attempt: u32, budget: u32, decision: Decision, diagnostic: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(attempt, budget, decision = decision.as_str(), diagnostic, "fetch attempt");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, budget, decision, diagnostic);
	}
}

/// Logs a non-fatal condition attached to an otherwise successful operation.
pub(crate) fn log_diagnostic(kind: OperationKind, code: &str, message: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(op = kind.as_str(), code, message, "attestation diagnostic");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, code, message);
	}
}

/// Logs an error that is swallowed instead of surfaced (prefetch).
pub(crate) fn log_swallowed(kind: OperationKind, error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(op = kind.as_str(), code = error.code().as_str(), %error, "operation failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}
