//! End-to-end scenarios replayed against scripted providers
//!
//! All tests run on a paused clock, so delays and deadlines are exact.

use std::path::PathBuf;
use std::time::Duration;

use codeintel_aggregator::{
    AggregatorConfig, ConfigManager, RequestType, Scenario, ScriptedProviderConfig,
};
use serde_json::{json, Value};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn lsp_and_fallback(lsp: ScriptedProviderConfig) -> Scenario {
    Scenario {
        language: "python".to_string(),
        request_type: RequestType::Completion,
        params: json!({"line": 3, "column": 7}),
        give_up_after_ms: 5000,
        providers: vec![
            lsp,
            ScriptedProviderConfig::new("fallback").respond(
                RequestType::Completion,
                10,
                json!([{"label": "foo", "sortText": "0"}]),
            ),
        ],
    }
}

fn wait_for_both() -> AggregatorConfig {
    let mut config = AggregatorConfig::default();
    config.add_wait_source("lsp", &[RequestType::Completion]);
    config.add_wait_source("fallback", &[RequestType::Completion]);
    config
}

fn assert_elapsed(elapsed: Duration, expected_ms: u64) {
    let expected = Duration::from_millis(expected_ms);
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(10),
        "expected delivery at ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_both_providers_answer_before_deadline() {
    let scenario = lsp_and_fallback(ScriptedProviderConfig::new("lsp").respond(
        RequestType::Completion,
        50,
        json!([
            {"label": "foo", "sortText": "1"},
            {"label": "bar", "sortText": "2"}
        ]),
    ));

    let outcome = scenario.replay(wait_for_both()).await.unwrap();

    assert_elapsed(outcome.elapsed, 50);
    assert_eq!(outcome.pending, 0);

    let response = outcome.response.expect("merged list delivered");
    let list = response.as_completions().unwrap();
    let ranked: Vec<(String, String)> = list
        .items
        .iter()
        .map(|i| (i.label.clone(), i.sort_text.to_string()))
        .collect();
    assert_eq!(
        ranked,
        vec![
            ("foo".to_string(), "(0,1)".to_string()),
            ("bar".to_string(), "(0,2)".to_string()),
        ]
    );
    assert_eq!(list.stats.kept_from("lsp"), 2);
    assert_eq!(list.stats.kept_from("fallback"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_language_server_degrades_at_deadline() {
    let scenario = lsp_and_fallback(ScriptedProviderConfig::new("lsp"));

    let outcome = scenario.replay(wait_for_both()).await.unwrap();

    assert_elapsed(outcome.elapsed, 300);
    assert_eq!(outcome.pending, 0);

    let response = outcome.response.expect("fallback list delivered");
    let list = response.as_completions().unwrap();
    assert_eq!(list.items.len(), 1);
    assert_eq!(list.items[0].label, "foo");
    assert_eq!(list.items[0].sort_text.priority(), 1);
    assert_eq!(list.items[0].sort_text.original(), "0");
}

#[tokio::test(start_paused = true)]
async fn test_zero_deadline_delivers_first_nonempty_answer() {
    let scenario = lsp_and_fallback(ScriptedProviderConfig::new("lsp").respond(
        RequestType::Completion,
        50,
        json!([{"label": "bar", "sortText": "2"}]),
    ));
    let config = AggregatorConfig {
        wait_for_ms: 0,
        ..wait_for_both()
    };

    let outcome = scenario.replay(config).await.unwrap();

    assert_elapsed(outcome.elapsed, 10);
    let response = outcome.response.unwrap();
    assert_eq!(response.as_completions().unwrap().items[0].label, "foo");
}

#[tokio::test(start_paused = true)]
async fn test_empty_answers_after_deadline_keep_waiting() {
    // Only the fallback answers, with an empty payload; the deadline alone
    // never resolves on empty data.
    let scenario = Scenario {
        language: "python".to_string(),
        request_type: RequestType::Hover,
        params: Value::Null,
        give_up_after_ms: 1000,
        providers: vec![
            ScriptedProviderConfig::new("lsp"),
            ScriptedProviderConfig::new("fallback").respond(RequestType::Hover, 5, json!("")),
        ],
    };

    let outcome = scenario.replay(AggregatorConfig::default()).await.unwrap();

    assert!(outcome.response.is_none());
    assert_eq!(outcome.pending, 1);
}

#[tokio::test(start_paused = true)]
async fn test_provider_that_never_starts_is_not_awaited() {
    let mut kite = ScriptedProviderConfig::new("kite");
    kite.ready_after_ms = None;
    let scenario = Scenario {
        language: "python".to_string(),
        request_type: RequestType::Hover,
        params: Value::Null,
        give_up_after_ms: 5000,
        providers: vec![
            kite,
            ScriptedProviderConfig::new("lsp").respond(RequestType::Hover, 20, json!("doc")),
        ],
    };

    let outcome = scenario.replay(AggregatorConfig::default()).await.unwrap();

    assert_elapsed(outcome.elapsed, 20);
    assert_eq!(outcome.response.unwrap().as_single(), Some(&json!("doc")));
}

#[tokio::test(start_paused = true)]
async fn test_no_running_provider_resolves_at_deadline_with_default_answer() {
    let mut lsp = ScriptedProviderConfig::new("lsp");
    lsp.ready_after_ms = None;
    let scenario = Scenario {
        language: "python".to_string(),
        request_type: RequestType::References,
        params: Value::Null,
        give_up_after_ms: 1000,
        providers: vec![lsp],
    };

    let outcome = scenario.replay(AggregatorConfig::default()).await.unwrap();

    assert_elapsed(outcome.elapsed, 300);
    assert_eq!(outcome.response.unwrap().as_single(), Some(&json!([])));
}

#[tokio::test(start_paused = true)]
async fn test_bundled_scenarios_load_and_replay() {
    let both = Scenario::load(scenario_path("both_providers_answer.yaml"))
        .await
        .unwrap();
    let silent = Scenario::load(scenario_path("language_server_silent.yaml"))
        .await
        .unwrap();
    let hover = Scenario::load(scenario_path("hover_priority.yaml"))
        .await
        .unwrap();
    let config = ConfigManager::load_from_file(scenario_path("aggregator.yaml"))
        .await
        .unwrap();

    let outcome = both.replay(config.clone()).await.unwrap();
    assert_elapsed(outcome.elapsed, 50);
    let items = outcome.response.unwrap().to_value()["params"].clone();
    assert_eq!(items[0]["label"], "foo");
    assert_eq!(items[0]["sortText"], json!([0, "1"]));
    assert_eq!(items[0]["kind"], 3);

    let outcome = silent.replay(config.clone()).await.unwrap();
    assert_elapsed(outcome.elapsed, 300);
    let items = outcome.response.unwrap().to_value()["params"].clone();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["sortText"], json!([2, "0"]));

    let outcome = hover.replay(config).await.unwrap();
    assert_elapsed(outcome.elapsed, 40);
    assert_eq!(
        outcome.response.unwrap().as_single(),
        Some(&json!("foo(bar) -> int"))
    );
}
