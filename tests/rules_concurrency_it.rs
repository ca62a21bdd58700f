mod common;

// std
use std::sync::Arc;
// self
use attestation_mediator::{
	error::ConfigError,
	fetch::FetchOutcome,
	request::HttpRequest,
	service::Disposition,
};
use common::{ScriptedFetcher, service, url};

const PATTERN: &str = r"^https://api\.example\.com/internal/";

#[test]
fn duplicate_rules_collapse() {
	let fetcher = Arc::new(ScriptedFetcher::always(FetchOutcome::proceed("tok")));
	let service = service(&fetcher);

	service.add_substitution_header("X-Api-Key", "").expect("Rule should be accepted.");
	service.add_substitution_header("x-api-key", "").expect("Rule should be accepted.");
	service.add_exclusion_pattern(PATTERN).expect("Pattern should compile.");
	service.add_exclusion_pattern(PATTERN).expect("Pattern should compile.");

	let rules = service.rules.snapshot();

	assert_eq!(rules.header_rules().count(), 1);
	assert_eq!(rules.exclusions().len(), 1);
	assert!(service.remove_exclusion_pattern(PATTERN));
	assert!(!service.remove_exclusion_pattern(PATTERN));
	assert!(matches!(
		service.add_exclusion_pattern("(unclosed"),
		Err(ConfigError::InvalidExclusionPattern { .. })
	));
	assert!(matches!(
		service.add_substitution_query_param(""),
		Err(ConfigError::EmptyQueryParam)
	));
}

#[test]
fn snapshots_are_not_affected_by_later_mutations() {
	let fetcher = Arc::new(ScriptedFetcher::always(FetchOutcome::proceed("tok")));
	let service = service(&fetcher);

	service.add_substitution_query_param("api_key").expect("Key should be accepted.");

	let before = service.rules.snapshot();

	service.remove_substitution_query_param("api_key");
	service.add_exclusion_pattern(PATTERN).expect("Pattern should compile.");

	assert_eq!(before.query_params().collect::<Vec<_>>(), ["api_key"]);
	assert!(before.exclusions().is_empty());
	assert_eq!(service.rules.snapshot().query_params().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mediations_see_whole_rule_sets() {
	let fetcher = Arc::new(ScriptedFetcher::with_secrets("tok", &[("placeholder", "secret")]));
	let service = service(&fetcher);
	let request = HttpRequest::get(url("https://api.example.com/internal/report"))
		.with_header("X-Api-Key", "placeholder");
	let mutator = {
		let service = service.clone();

		tokio::spawn(async move {
			for round in 0..200 {
				if round % 2 == 0 {
					service.add_exclusion_pattern(PATTERN).expect("Pattern should compile.");
					service.set_token_prefix("A:");
					service
						.add_substitution_header("X-Api-Key", "")
						.expect("Rule should be accepted.");
				} else {
					service.remove_exclusion_pattern(PATTERN);
					service.set_token_prefix("B:");
					service.remove_substitution_header("X-Api-Key");
				}

				tokio::task::yield_now().await;
			}
		})
	};
	let workers = (0..8)
		.map(|_| {
			let service = service.clone();
			let request = request.clone();

			tokio::spawn(async move {
				let mut results = Vec::new();

				for _ in 0..50 {
					results.push(service.mediate(&request).await.expect("Mediation should succeed."));
				}

				results
			})
		})
		.collect::<Vec<_>>();

	mutator.await.expect("Mutator should not panic.");

	let mut attested = 0;

	for worker in workers {
		for mediated in worker.await.expect("Worker should not panic.") {
			match mediated.disposition {
				Disposition::Excluded => assert_eq!(mediated.request, request),
				Disposition::Attested => {
					attested += 1;

					let token = mediated
						.request
						.headers
						.get("Attestation-Token")
						.expect("Attested requests carry a token.");

					assert!(token == "A:tok" || token == "B:tok", "torn prefix: {token}");

					let key = mediated.request.headers.get("X-Api-Key");

					assert!(key == Some("placeholder") || key == Some("secret"));
				},
				other => panic!("unexpected disposition {other:?}"),
			}
		}
	}

	assert_eq!(service.metrics.attempts(), 400);
	assert_eq!(fetcher.token_calls(), attested);
}
