use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{
    ExecutionError, ExpertCapabilities, ExpertDefinition, ExpertType, RequestPriority,
    RouterError, RouterOptions, ToolRequest, WeightProfile, DIRECT_FALLBACK_EXPERT_ID,
    MAX_EXPERT_PRIORITY,
};

use super::health::HealthState;
use super::router::ExpertRouter;
use super::traits::{ExecutionOutcome, ExternalRouter, ExternalRouterFactory};

fn create_test_expert(
    id: &str,
    request_types: &[&str],
    accuracy: f64,
    priority: u32,
) -> ExpertDefinition {
    ExpertDefinition {
        id: id.to_string(),
        expert_type: ExpertType::Balanced,
        name: format!("Test Expert {}", id),
        description: String::new(),
        capabilities: ExpertCapabilities {
            request_types: request_types.iter().map(|t| t.to_string()).collect(),
            max_concurrent: 100,
            avg_latency_ms: 50,
            accuracy,
        },
        weights: WeightProfile::new(1.0, 0.0, 0.0, 0.0),
        priority,
    }
}

/// 只看准确度的配置，便于精确控制总分
fn create_test_options(experts: Vec<ExpertDefinition>) -> RouterOptions {
    let mut options = RouterOptions::default();
    options.experts = Some(experts);
    options.request_weights = HashMap::from([(
        "search".to_string(),
        WeightProfile::new(1.0, 0.0, 0.0, 0.0),
    )]);
    options
}

async fn create_test_router(experts: Vec<ExpertDefinition>) -> ExpertRouter {
    let router = ExpertRouter::new(create_test_options(experts)).unwrap();
    router.initialize().await.unwrap();
    router
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

struct RecordingExternalRouter {
    preferred: String,
    outcomes: Arc<Mutex<Vec<ExecutionOutcome>>>,
}

#[async_trait]
impl ExternalRouter for RecordingExternalRouter {
    fn name(&self) -> &str {
        "recording"
    }

    fn score_hint(&self, expert: &ExpertDefinition, _request: &ToolRequest) -> Option<f64> {
        Some(if expert.id == self.preferred { 1.0 } else { 0.0 })
    }

    async fn record_outcome(&self, outcome: &ExecutionOutcome) -> anyhow::Result<()> {
        self.outcomes.lock().push(outcome.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_route_before_initialize_fails() {
    let router =
        ExpertRouter::new(create_test_options(vec![create_test_expert("a", &["search"], 0.9, 0)]))
            .unwrap();
    let request = ToolRequest::new("r1", "search", json!({}));

    assert!(matches!(router.route(&request), Err(RouterError::NotInitialized)));

    let executor =
        |_expert: String, _request: ToolRequest| async { Ok::<_, ExecutionError>(json!(null)) };
    let result = router.execute_with_routing(&request, &executor).await;
    assert!(matches!(result, Err(RouterError::NotInitialized)));
}

#[test]
fn test_invalid_options_are_rejected() {
    let mut options = create_test_options(vec![create_test_expert("a", &["search"], 1.5, 0)]);
    let error = ExpertRouter::new(options.clone()).err().unwrap();
    assert!(error.to_string().contains("invalid accuracy"));

    options.experts = Some(vec![
        create_test_expert("accurate", &["search"], 0.9, 0),
        create_test_expert("sloppy", &["search"], 0.1, 10000),
    ]);
    let error = ExpertRouter::new(options.clone()).err().unwrap();
    assert!(error.to_string().contains("invalid priority"));

    options.experts = Some(vec![create_test_expert("a", &["search"], 0.9, 0)]);
    options.health.degraded_threshold = 0.99;
    assert!(matches!(
        ExpertRouter::new(options),
        Err(RouterError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_initialize_and_shutdown_are_idempotent() {
    let router = create_test_router(vec![create_test_expert("a", &["search"], 0.9, 0)]).await;
    router.initialize().await.unwrap();
    assert!(router.is_initialized());

    let request = ToolRequest::new("r1", "search", json!({"q": 1}));
    router.route(&request).unwrap();
    assert_eq!(router.get_metrics().cache.unwrap().size, 1);

    router.shutdown().await;
    router.shutdown().await;
    assert!(!router.is_initialized());
    assert_eq!(router.get_metrics().cache.unwrap().size, 0);
    assert!(matches!(router.route(&request), Err(RouterError::NotInitialized)));
}

#[tokio::test]
async fn test_single_eligible_expert_has_full_confidence() {
    let mut expert = create_test_expert("lookup-fast", &["lookup"], 0.99, 0);
    expert.capabilities.avg_latency_ms = 5;
    let router = create_test_router(vec![expert]).await;

    let decision = router
        .route(&ToolRequest::new("r1", "lookup", json!({"key": "serde"})))
        .unwrap();

    assert_eq!(decision.selected_expert, "lookup-fast");
    assert_eq!(decision.confidence, 1.0);
    assert!(decision.alternatives.is_empty());
    assert_eq!(decision.candidates.len(), 1);
    assert!(!decision.cache_hit);
    assert!(decision.reason.contains("Test Expert lookup-fast"));
}

#[tokio::test]
async fn test_higher_score_wins_with_alternative() {
    let router = create_test_router(vec![
        create_test_expert("weak", &["search"], 0.5, 0),
        create_test_expert("strong", &["search"], 0.8, 0),
    ])
    .await;

    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "strong");
    assert_close(decision.scores.total, 0.8);
    assert_eq!(decision.alternatives.len(), 1);
    assert_eq!(decision.alternatives[0].expert_id, "weak");
    assert_close(decision.alternatives[0].score, 0.5);
    assert!(decision.alternatives[0].reason.contains("weaker on accuracy"));
    assert_eq!(decision.confidence, 1.0);
}

#[tokio::test]
async fn test_narrow_margin_gives_low_confidence() {
    let router = create_test_router(vec![
        create_test_expert("a", &["search"], 0.80, 0),
        create_test_expert("b", &["search"], 0.78, 0),
    ])
    .await;

    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "a");
    assert_close(decision.confidence, 0.54);
}

#[tokio::test]
async fn test_priority_breaks_ties() {
    let router = create_test_router(vec![
        create_test_expert("low", &["search"], 0.8, 1),
        create_test_expert("high", &["search"], 0.8, 2),
    ])
    .await;

    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "high");
    assert_close(decision.scores.total - decision.alternatives[0].score, 1.0 / 10000.0);
}

#[tokio::test]
async fn test_priority_never_outweighs_score() {
    let router = create_test_router(vec![
        create_test_expert("better", &["search"], 0.80, 0),
        create_test_expert("preferred", &["search"], 0.79, MAX_EXPERT_PRIORITY),
    ])
    .await;

    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "better");
    assert_eq!(decision.alternatives[0].expert_id, "preferred");
}

#[tokio::test]
async fn test_alternatives_limited_to_three() {
    let router = create_test_router(vec![
        create_test_expert("e1", &["search"], 0.9, 0),
        create_test_expert("e2", &["search"], 0.8, 0),
        create_test_expert("e3", &["search"], 0.7, 0),
        create_test_expert("e4", &["search"], 0.6, 0),
        create_test_expert("e5", &["search"], 0.5, 0),
    ])
    .await;

    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "e1");
    let alternatives: Vec<&str> = decision
        .alternatives
        .iter()
        .map(|alternative| alternative.expert_id.as_str())
        .collect();
    assert_eq!(alternatives, vec!["e2", "e3", "e4"]);
    assert_eq!(decision.candidates.len(), 5);
}

#[tokio::test]
async fn test_overloaded_expert_yields_fallback() {
    let router = create_test_router(vec![
        create_test_expert("installer", &["install"], 0.9, 0),
        create_test_expert("searcher", &["search"], 0.9, 0),
    ])
    .await;

    assert!(router.update_expert_health("installer", HealthState::Healthy, Some(0.96)));

    let decision = router
        .route(&ToolRequest::new("r1", "install", json!({"package": "tokio"})))
        .unwrap();

    assert_eq!(decision.selected_expert, DIRECT_FALLBACK_EXPERT_ID);
    assert_eq!(decision.confidence, 1.0);
    assert_eq!(decision.reason, "Fallback: NO_ELIGIBLE_EXPERTS");
    assert_eq!(decision.scores.reliability, 1.0);
    assert_eq!(decision.scores.accuracy, 0.0);
    assert_eq!(decision.scores.total, 0.0);
    assert_eq!(router.get_metrics().fallback_decisions, 1);
}

#[tokio::test]
async fn test_unhealthy_expert_is_excluded() {
    let router = create_test_router(vec![
        create_test_expert("a", &["search"], 0.9, 0),
        create_test_expert("b", &["search"], 0.5, 0),
    ])
    .await;

    router.update_expert_health("a", HealthState::Unhealthy, None);
    let decision = router
        .route(&ToolRequest::new("r1", "search", json!({})))
        .unwrap();

    assert_eq!(decision.selected_expert, "b");
    assert_eq!(decision.confidence, 1.0);
    assert!(!router.update_expert_health("missing", HealthState::Healthy, None));
}

#[tokio::test]
async fn test_unsupported_type_falls_back_and_is_not_cached() {
    let router = create_test_router(vec![create_test_expert("a", &["search"], 0.9, 0)]).await;
    let request = ToolRequest::new("r1", "compare", json!({"left": "a", "right": "b"}));

    let first = router.route(&request).unwrap();
    let second = router.route(&request).unwrap();

    assert!(first.is_fallback());
    assert!(second.is_fallback());
    assert!(!second.cache_hit);
    assert_eq!(router.get_metrics().cache.unwrap().size, 0);
}

#[tokio::test]
async fn test_repeated_request_hits_cache() {
    let router = create_test_router(vec![
        create_test_expert("a", &["search"], 0.9, 0),
        create_test_expert("b", &["search"], 0.7, 0),
    ])
    .await;

    let first = router
        .route(&ToolRequest::new("r1", "search", json!({"query": "serde", "limit": 5})))
        .unwrap();
    let second = router
        .route(&ToolRequest::new("r2", "search", json!({"limit": 5, "query": "serde"})))
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(second.request_id, "r2");
    assert_eq!(second.selected_expert, first.selected_expert);
    assert_eq!(second.confidence, first.confidence);
    assert_eq!(second.alternatives, first.alternatives);

    let metrics = router.get_metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 1);
    assert_close(metrics.cache_hit_rate, 0.5);
}

#[tokio::test]
async fn test_high_priority_bypasses_cache() {
    let router = create_test_router(vec![create_test_expert("a", &["search"], 0.9, 0)]).await;

    for id in ["r1", "r2"] {
        let request = ToolRequest::new(id, "search", json!({"query": "tokio"}))
            .with_priority(RequestPriority::High);
        assert!(!router.route(&request).unwrap().cache_hit);
    }

    let metrics = router.get_metrics();
    assert_eq!(metrics.cache_bypassed, 2);
    assert_eq!(metrics.cache_hits, 0);
    assert_eq!(metrics.cache.unwrap().size, 0);
}

#[tokio::test]
async fn test_disabled_cache_is_never_used() {
    let mut options = create_test_options(vec![create_test_expert("a", &["search"], 0.9, 0)]);
    options.cache.enabled = false;
    let router = ExpertRouter::new(options).unwrap();
    router.initialize().await.unwrap();

    let request = ToolRequest::new("r1", "search", json!({}));
    router.route(&request).unwrap();
    assert!(!router.route(&request).unwrap().cache_hit);
    assert_eq!(router.get_metrics().cache_bypassed, 2);
}

#[tokio::test]
async fn test_losing_eligibility_clears_cache() {
    let router = create_test_router(vec![
        create_test_expert("a", &["search"], 0.9, 0),
        create_test_expert("b", &["search"], 0.5, 0),
    ])
    .await;
    let request = ToolRequest::new("r1", "search", json!({"query": "x"}));

    assert_eq!(router.route(&request).unwrap().selected_expert, "a");

    router.update_expert_health("a", HealthState::Degraded, Some(0.97));
    let decision = router.route(&request).unwrap();

    assert!(!decision.cache_hit);
    assert_eq!(decision.selected_expert, "b");
}

#[tokio::test]
async fn test_replace_experts() {
    let router = create_test_router(vec![create_test_expert("a", &["search"], 0.9, 0)]).await;
    let request = ToolRequest::new("r1", "search", json!({}));
    assert_eq!(router.route(&request).unwrap().selected_expert, "a");

    router
        .replace_experts(vec![create_test_expert("c", &["search"], 0.6, 0)])
        .unwrap();
    let decision = router.route(&request).unwrap();
    assert_eq!(decision.selected_expert, "c");
    assert!(!decision.cache_hit);

    assert!(matches!(
        router.replace_experts(Vec::new()),
        Err(RouterError::InvalidConfig(_))
    ));
    assert!(router
        .replace_experts(vec![create_test_expert("bad", &[], 0.6, 0)])
        .is_err());
    assert!(router.registry().contains("c"));
    assert_eq!(router.get_expert_status().len(), 1);
}

#[tokio::test]
async fn test_replace_experts_during_concurrent_routing() {
    let router = create_test_router(vec![create_test_expert("gen-0", &["search"], 0.9, 0)]).await;
    let requests: Vec<ToolRequest> = (0..3)
        .map(|key| ToolRequest::new(format!("r{}", key), "search", json!({"key": key})))
        .collect();
    let done = AtomicBool::new(false);
    let mut stale = Vec::new();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Relaxed) {
                for request in &requests {
                    router.route(request).unwrap();
                }
            }
        });

        for round in 1..=200 {
            let id = format!("gen-{}", round);
            router
                .replace_experts(vec![create_test_expert(&id, &["search"], 0.9, 0)])
                .unwrap();

            for request in &requests {
                let decision = router.route(request).unwrap();
                if decision.selected_expert != id {
                    stale.push(format!(
                        "round {}: {} (cache hit: {})",
                        round, decision.selected_expert, decision.cache_hit
                    ));
                }
            }
        }
        done.store(true, Ordering::Relaxed);
    });

    assert!(stale.is_empty(), "decisions for removed experts: {:?}", stale);
}

#[tokio::test]
async fn test_failed_external_router_is_ignored() {
    let mut options = create_test_options(vec![create_test_expert("a", &["search"], 0.9, 0)]);
    options.external.enabled = true;

    let factory: ExternalRouterFactory = Box::new(|| {
        Err::<Arc<dyn ExternalRouter>, _>(anyhow::anyhow!("external module not installed"))
    });
    let router = ExpertRouter::new(options).unwrap().with_external_factory(factory);

    router.initialize().await.unwrap();
    assert_eq!(router.external_router_name(), "null");
    assert_eq!(
        router
            .route(&ToolRequest::new("r1", "search", json!({})))
            .unwrap()
            .selected_expert,
        "a"
    );
}

#[tokio::test]
async fn test_external_router_hints_and_outcomes() {
    let mut options = create_test_options(vec![
        create_test_expert("a", &["search"], 0.80, 0),
        create_test_expert("b", &["search"], 0.79, 0),
    ]);
    options.external.enabled = true;
    options.external.blend_weight = 0.3;

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let recorded = outcomes.clone();
    let factory: ExternalRouterFactory = Box::new(move || {
        Ok::<Arc<dyn ExternalRouter>, anyhow::Error>(Arc::new(RecordingExternalRouter {
            preferred: "b".to_string(),
            outcomes: recorded.clone(),
        }))
    });

    let router = ExpertRouter::new(options).unwrap().with_external_factory(factory);
    router.initialize().await.unwrap();
    assert_eq!(router.external_router_name(), "recording");

    let request = ToolRequest::new("r1", "search", json!({}));
    let executor = |expert_id: String, _request: ToolRequest| async move {
        Ok::<_, ExecutionError>(json!({ "handled_by": expert_id }))
    };
    let response = router.execute_with_routing(&request, &executor).await.unwrap();

    assert!(response.success);
    assert_eq!(response.metadata.expert_id, "b");

    router.shutdown().await;

    let outcomes = outcomes.lock();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].expert_id, "b");
    assert!(outcomes[0].success);
    assert!(!outcomes[0].used_fallback);
}

#[tokio::test]
async fn test_external_router_unused_when_disabled() {
    let options = create_test_options(vec![create_test_expert("a", &["search"], 0.9, 0)]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let factory: ExternalRouterFactory = Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err::<Arc<dyn ExternalRouter>, _>(anyhow::anyhow!("should not be called"))
    });

    let router = ExpertRouter::new(options).unwrap().with_external_factory(factory);
    router.initialize().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(router.external_router_name(), "null");
}

#[tokio::test]
async fn test_execution_updates_health_and_metrics() {
    let router = create_test_router(vec![create_test_expert("a", &["search"], 0.9, 0)]).await;
    let executor = |_expert_id: String, _request: ToolRequest| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, ExecutionError>(json!({"ok": true}))
    };

    let response = router
        .execute_with_routing(&ToolRequest::new("r1", "search", json!({})), &executor)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.result, Some(json!({"ok": true})));
    assert!(response.metadata.execution_time >= Duration::from_millis(5));
    assert!(response.metadata.total_time >= response.metadata.execution_time);

    let status = router.get_expert_status();
    assert_eq!(status[0].active_requests, 0);
    assert_eq!(status[0].success_rate, 1.0);
    assert!(status[0].p95_latency.is_some());

    let metrics = router.get_metrics();
    assert_eq!(metrics.total_executions, 1);
    assert_eq!(metrics.successful_executions, 1);
    assert!(metrics.speed_improvement > 0.0);

    router.reset_metrics();
    let metrics = router.get_metrics();
    assert_eq!(metrics.total_executions, 0);
    assert_eq!(metrics.cache.unwrap().total_lookups, 0);
}

#[tokio::test]
async fn test_concurrent_outcomes_are_not_lost() {
    let mut options = create_test_options(vec![create_test_expert("a", &["search"], 0.9, 0)]);
    options.fallback.enabled = false;
    let router = ExpertRouter::new(options).unwrap();
    router.initialize().await.unwrap();

    let executor = |_expert_id: String, _request: ToolRequest| async {
        tokio::task::yield_now().await;
        Err::<serde_json::Value, _>(ExecutionError::new("UPSTREAM_TIMEOUT", "timed out"))
    };

    let requests: Vec<ToolRequest> = (0..20)
        .map(|i| ToolRequest::new(format!("r{}", i), "search", json!({})))
        .collect();
    let responses = futures::future::join_all(
        requests
            .iter()
            .map(|request| router.execute_with_routing(request, &executor)),
    )
    .await;

    assert!(responses.iter().all(|response| !response.as_ref().unwrap().success));

    let mut expected = 1.0;
    for _ in 0..20 {
        expected *= 0.99;
    }
    let status = &router.get_expert_status()[0];
    assert_close(status.success_rate, expected);
    assert_eq!(status.active_requests, 0);
    assert_eq!(router.get_metrics().errors_by_category.get("timeout"), Some(&20));
}
