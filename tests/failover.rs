//! End-to-end failover behavior against a scripted provider stack.

mod support;

use palisade::config::{Config, ConfigSource, StaticConfigSource};
use palisade::llm::{
    BackendFactory, CallFailure, CompletionClient, CompletionRequest, ProviderId,
};
use std::sync::Arc;
use support::{MockFactory, test_config};

struct Harness {
    client: CompletionClient,
    factory: Arc<MockFactory>,
    source: Arc<StaticConfigSource>,
}

fn harness(config: Config) -> Harness {
    let factory = Arc::new(MockFactory::new());
    let source = Arc::new(StaticConfigSource::new(config));
    let client = CompletionClient::new(
        Arc::clone(&source) as Arc<dyn ConfigSource>,
        Arc::clone(&factory) as Arc<dyn BackendFactory>,
    );
    Harness {
        client,
        factory,
        source,
    }
}

#[tokio::test]
async fn no_credentials_degrades_to_simulation() {
    let h = harness(test_config(&[]));
    h.client.initialize().await;

    assert!(h.client.list_available_providers().is_empty());

    let result = h.client.generate(CompletionRequest::new("hello")).await;
    assert_eq!(result.provider_used, "simulation");
    assert_eq!(result.model_used, "fallback");
    assert!(result.text.contains("unconfigured"));
}

#[tokio::test]
async fn malformed_credential_is_excluded_from_available() {
    let h = harness(test_config(&[
        (ProviderId::Openai, "valid-key-1"),
        (ProviderId::Anthropic, "bogus-key"),
    ]));
    let errors = h.client.initialize().await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ProviderId::Anthropic);

    let diag = h.client.diagnostics();
    assert_eq!(diag.available_providers, vec!["openai"]);
    let anthropic = &diag.providers["anthropic"];
    assert!(anthropic.configured);
    assert!(!anthropic.credential_valid);
    assert!(!anthropic.live);
    assert!(!diag.rebuild_in_progress);
    assert!(
        diag.initialization_errors
            .iter()
            .any(|e| e.provider == "anthropic")
    );
}

#[tokio::test]
async fn breaker_opens_after_five_consecutive_failures() {
    let mut config = test_config(&[
        (ProviderId::Openai, "valid-key-1"),
        (ProviderId::Anthropic, "valid-key-2"),
    ]);
    config.default_provider = Some("openai".into());

    let h = harness(config);
    h.client.initialize().await;

    let openai = h.factory.script(ProviderId::Openai);
    openai.fail_next(5, &CallFailure::connection("connection refused"));

    for _ in 0..5 {
        let result = h.client.generate(CompletionRequest::new("hi")).await;
        // openai fails first, anthropic picks it up.
        assert_eq!(result.provider_used, "anthropic");
    }
    assert_eq!(openai.call_count(), 5);
    assert_eq!(
        h.client.diagnostics().providers["openai"].consecutive_failures,
        5
    );

    // Sixth call: breaker open, openai is skipped outright.
    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "anthropic");
    assert_eq!(openai.call_count(), 5);
}

#[tokio::test]
async fn forced_reinit_recovers_a_fixed_credential() {
    let h = harness(test_config(&[(ProviderId::Openai, "bogus-key")]));
    h.client.initialize().await;
    assert!(h.client.list_available_providers().is_empty());

    // Operator fixes the key; validity-wise this is a change, but it sits
    // inside the debounce window, so only the explicit reinit picks it up.
    h.source
        .store(test_config(&[(ProviderId::Openai, "valid-rotated")]));

    let outcome = h.client.force_reinitialize(ProviderId::Openai).await;
    assert!(outcome.success);
    assert!(outcome.tested);

    let diag = h.client.diagnostics();
    assert_eq!(diag.available_providers, vec!["openai"]);
    assert_eq!(diag.providers["openai"].consecutive_failures, 0);
}

#[tokio::test]
async fn auth_failure_clamps_the_counter() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let openai = h.factory.script(ProviderId::Openai);
    openai.fail_next(3, &CallFailure::connection("connection refused"));
    openai.fail_next(1, &CallFailure::auth("401 Unauthorized"));

    for _ in 0..3 {
        let result = h.client.generate(CompletionRequest::new("hi")).await;
        assert_eq!(result.provider_used, "simulation");
    }
    assert_eq!(
        h.client.diagnostics().providers["openai"].consecutive_failures,
        3
    );

    // The auth failure would push the count to 4; the clamp lands it at 2.
    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "simulation");
    assert!(result.text.contains("Last error"));
    assert_eq!(
        h.client.diagnostics().providers["openai"].consecutive_failures,
        2
    );
}

#[tokio::test]
async fn preferred_provider_is_tried_first() {
    let mut config = test_config(&[
        (ProviderId::Openai, "valid-key-1"),
        (ProviderId::Anthropic, "valid-key-2"),
    ]);
    config.default_provider = Some("openai".into());

    let h = harness(config);
    h.client.initialize().await;

    let result = h
        .client
        .generate(CompletionRequest::new("hi").preferring(ProviderId::Anthropic))
        .await;
    assert_eq!(result.provider_used, "anthropic");
    assert_eq!(h.factory.script(ProviderId::Openai).call_count(), 0);
}

#[tokio::test]
async fn empty_prompt_returns_validation_flavored_fallback() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let result = h.client.generate(CompletionRequest::new("   \n\t")).await;
    assert_eq!(result.provider_used, "simulation");
    assert!(result.text.contains("empty"));
    // No provider was consulted for an invalid request.
    assert_eq!(h.factory.script(ProviderId::Openai).call_count(), 0);
}

#[tokio::test]
async fn generate_never_panics_on_hostile_input() {
    let h = harness(test_config(&[]));
    // Deliberately no initialize: the first generate bootstraps itself.
    let hostile = "\u{0}\u{202e}🦀".repeat(5000);
    let result = h
        .client
        .generate(CompletionRequest::new(hostile.clone()).with_context(hostile))
        .await;
    assert_eq!(result.provider_used, "simulation");
    assert!(!result.text.is_empty());
}

#[tokio::test]
async fn config_reads_within_debounce_window_do_not_rebuild() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let openai = h.factory.script(ProviderId::Openai);
    assert_eq!(openai.construct_count(), 1);

    // Even a real content change is ignored while the debounce window is
    // open; the live set from the initial build keeps serving.
    h.source.store(test_config(&[]));
    for _ in 0..2 {
        let result = h.client.generate(CompletionRequest::new("hi")).await;
        assert_eq!(result.provider_used, "openai");
    }
    assert_eq!(openai.construct_count(), 1);
}

#[tokio::test]
async fn credential_change_rebuilds_once_debounce_allows() {
    let mut config = test_config(&[(ProviderId::Openai, "bogus-key")]);
    config.reliability.debounce_secs = 0;

    let h = harness(config);
    h.client.initialize().await;
    assert!(h.client.list_available_providers().is_empty());

    let mut fixed = test_config(&[(ProviderId::Openai, "valid-rotated")]);
    fixed.reliability.debounce_secs = 0;
    h.source.store(fixed);

    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "openai");
    assert_eq!(h.factory.script(ProviderId::Openai).construct_count(), 1);
}

#[tokio::test]
async fn healthier_providers_are_tried_before_failing_ones() {
    let h = harness(test_config(&[
        (ProviderId::Openai, "valid-key-1"),
        (ProviderId::Anthropic, "valid-key-2"),
        (ProviderId::Gemini, "valid-key-3"),
    ]));
    h.client.initialize().await;

    let openai = h.factory.script(ProviderId::Openai);
    openai.fail_next(1, &CallFailure::api("500 Internal Server Error"));

    // First call walks the default order, fails openai, lands on
    // anthropic.
    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "anthropic");
    assert_eq!(openai.call_count(), 1);

    // Second call reorders by failure count: openai drops behind its
    // healthy peers and is never consulted.
    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "anthropic");
    assert_eq!(openai.call_count(), 1);
    assert_eq!(h.factory.script(ProviderId::Gemini).call_count(), 0);
}

#[tokio::test]
async fn requested_model_is_honored_when_in_catalog() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let result = h
        .client
        .generate(CompletionRequest::new("hi").with_model("mock-large"))
        .await;
    assert_eq!(result.model_used, "mock-large");

    let result = h
        .client
        .generate(CompletionRequest::new("hi").with_model("gpt-9"))
        .await;
    assert_eq!(result.model_used, "mock-small");
}

#[tokio::test]
async fn reinit_of_unconfigured_provider_reports_structured_failure() {
    let h = harness(test_config(&[]));
    h.client.initialize().await;

    let outcome = h.client.force_reinitialize(ProviderId::Openai).await;
    assert!(!outcome.success);
    assert!(!outcome.tested);
    assert!(outcome.detail.unwrap().contains("no credential"));
}

#[tokio::test]
async fn reinit_all_reports_summary_counts() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let summary = h.client.force_reinitialize_all().await;
    assert_eq!(summary.outcomes.len(), 4);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 3);

    let openai = summary
        .outcomes
        .iter()
        .find(|o| o.provider == ProviderId::Openai)
        .unwrap();
    assert!(openai.success);
    assert!(openai.tested);
}

#[tokio::test]
async fn degraded_text_reports_provider_standing() {
    let h = harness(test_config(&[(ProviderId::Openai, "valid-key-1")]));
    h.client.initialize().await;

    let openai = h.factory.script(ProviderId::Openai);
    openai.fail_next(1, &CallFailure::timeout("slow upstream"));

    let result = h.client.generate(CompletionRequest::new("hi")).await;
    assert_eq!(result.provider_used, "simulation");
    assert!(result.text.contains("openai: ready"));
    assert!(result.text.contains("anthropic: unconfigured"));
    assert!(result.text.contains("timeout"));
}
