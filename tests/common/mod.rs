//! Scripted attestation backend shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use attestation_mediator::{
	error::AttestationFailure,
	fetch::{FetchFuture, FetchKind, FetchOutcome, FetchRequest, TokenFetcher},
	service::AttestationService,
	url::Url,
};

pub const CONFIG: &str = "scripted-config-v1";

type Responder = dyn Fn(&FetchRequest) -> FetchOutcome + Send + Sync;

/// Test double answering fetches from a queue first, then from a responder closure.
pub struct ScriptedFetcher {
	queue: Mutex<VecDeque<FetchOutcome>>,
	responder: Box<Responder>,
	requests: Mutex<Vec<FetchRequest>>,
	configs: Mutex<Vec<String>>,
	calls: AtomicUsize,
	delay: Option<Duration>,
	hang: bool,
}
impl ScriptedFetcher {
	pub fn new(responder: impl Fn(&FetchRequest) -> FetchOutcome + Send + Sync + 'static) -> Self {
		Self {
			queue: Mutex::default(),
			responder: Box::new(responder),
			requests: Mutex::default(),
			configs: Mutex::default(),
			calls: AtomicUsize::new(0),
			delay: None,
			hang: false,
		}
	}

	/// Answers every fetch with a clone of `outcome`.
	pub fn always(outcome: FetchOutcome) -> Self {
		Self::new(move |_| outcome.clone())
	}

	/// Answers with `outcomes` in order, then keeps retrying.
	pub fn sequence(outcomes: impl IntoIterator<Item = FetchOutcome>) -> Self {
		let fetcher = Self::new(|_| FetchOutcome::retry("script exhausted"));

		fetcher.queue.lock().extend(outcomes);

		fetcher
	}

	/// Issues `token` for every URL and resolves secure strings from `secrets`.
	pub fn with_secrets(token: &str, secrets: &[(&str, &str)]) -> Self {
		let token = token.to_owned();
		let secrets = secrets
			.iter()
			.map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
			.collect::<HashMap<_, _>>();

		Self::new(move |request| match &request.kind {
			FetchKind::Token { .. } => FetchOutcome::proceed(token.clone()),
			FetchKind::SecureString { key, new_definition } => match new_definition {
				Some(definition) => FetchOutcome::proceed(definition.clone()),
				None => match secrets.get(key) {
					Some(secret) => FetchOutcome::proceed(secret.clone()),
					None => FetchOutcome::proceed_empty("secure string undefined"),
				},
			},
			FetchKind::CustomJwt { payload } => FetchOutcome::proceed(format!("jwt.{payload}")),
		})
	}

	/// Never resolves a fetch.
	pub fn hanging() -> Self {
		Self { hang: true, ..Self::always(FetchOutcome::retry("unreachable")) }
	}

	/// Delays every answer by `delay` (requires a tokio runtime).
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn requests(&self) -> Vec<FetchRequest> {
		self.requests.lock().clone()
	}

	pub fn token_calls(&self) -> usize {
		self.requests.lock().iter().filter(|r| matches!(r.kind, FetchKind::Token { .. })).count()
	}

	pub fn secure_string_keys(&self) -> Vec<String> {
		self.requests
			.lock()
			.iter()
			.filter_map(|r| match &r.kind {
				FetchKind::SecureString { key, .. } => Some(key.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn configs(&self) -> Vec<String> {
		self.configs.lock().clone()
	}
}
impl TokenFetcher for ScriptedFetcher {
	fn fetch<'a>(&'a self, request: &'a FetchRequest) -> FetchFuture<'a> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.requests.lock().push(request.clone());

		if self.hang {
			return Box::pin(futures::future::pending());
		}

		let outcome = self.queue.lock().pop_front().unwrap_or_else(|| (self.responder)(request));
		let delay = self.delay;

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			outcome
		})
	}

	fn initialize(&self, config: &str) -> Result<(), AttestationFailure> {
		if config.starts_with("refuse") {
			return Err(AttestationFailure::misconfigured("configuration string is malformed"));
		}

		self.configs.lock().push(config.to_owned());

		Ok(())
	}

	fn device_id(&self) -> Result<String, AttestationFailure> {
		Ok("device-0001".into())
	}

	fn message_signature(&self, message: &str) -> Result<String, AttestationFailure> {
		Ok(format!("sig({message})"))
	}
}

/// Builds an initialized service around `fetcher`.
pub fn service(fetcher: &Arc<ScriptedFetcher>) -> AttestationService {
	let service = AttestationService::new(fetcher.clone());

	service.initialize(CONFIG).expect("Scripted backend should accept the configuration.");

	service
}

pub fn url(value: &str) -> Url {
	Url::parse(value).expect("Test URL should parse.")
}
