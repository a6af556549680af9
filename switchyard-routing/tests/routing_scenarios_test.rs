use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use switchyard_core::{
    ExpertCapabilities, ExpertDefinition, ExpertType, RouterOptions, ToolRequest, WeightProfile,
    DIRECT_FALLBACK_EXPERT_ID,
};
use switchyard_routing::{should_use_routing, ExpertRouter, HealthState};

/// 创建测试专家
fn create_expert(
    id: &str,
    expert_type: ExpertType,
    request_types: &[&str],
    avg_latency_ms: u64,
    accuracy: f64,
) -> ExpertDefinition {
    ExpertDefinition {
        id: id.to_string(),
        expert_type,
        name: id.to_string(),
        description: format!("{} used by routing scenarios", id),
        capabilities: ExpertCapabilities {
            request_types: request_types.iter().map(|t| t.to_string()).collect(),
            max_concurrent: 10,
            avg_latency_ms,
            accuracy,
        },
        weights: WeightProfile::default(),
        priority: 0,
    }
}

async fn create_router(options: RouterOptions) -> ExpertRouter {
    let router = ExpertRouter::new(options).unwrap();
    router.initialize().await.unwrap();
    router
}

#[tokio::test]
async fn test_single_lookup_expert_scenario() {
    let mut options = RouterOptions::default();
    options.experts = Some(vec![create_expert(
        "fast-lookup",
        ExpertType::Latency,
        &["lookup"],
        5,
        0.99,
    )]);
    let router = create_router(options).await;

    let decision = router
        .route(&ToolRequest::new("req-a", "lookup", json!({"name": "tokio"})))
        .unwrap();

    assert_eq!(decision.selected_expert, "fast-lookup");
    assert_eq!(decision.confidence, 1.0);
    assert!(decision.alternatives.is_empty());

    router.shutdown().await;
}

#[tokio::test]
async fn test_two_search_experts_scenario() {
    let mut options = RouterOptions::default();
    options.request_weights = HashMap::from([(
        "search".to_string(),
        WeightProfile::new(1.0, 0.0, 0.0, 0.0),
    )]);
    options.experts = Some(vec![
        create_expert("better", ExpertType::Accuracy, &["search"], 100, 0.80),
        create_expert("worse", ExpertType::Balanced, &["search", "list"], 100, 0.50),
    ]);
    let router = create_router(options).await;

    let decision = router
        .route(&ToolRequest::new("req-b", "search", json!({"query": "http client"})))
        .unwrap();

    assert_eq!(decision.selected_expert, "better");
    assert!((decision.scores.total - 0.80).abs() < 1e-9);
    assert_eq!(decision.alternatives.len(), 1);
    assert_eq!(decision.alternatives[0].expert_id, "worse");
    assert!((decision.alternatives[0].score - 0.50).abs() < 1e-9);
    assert_eq!(decision.confidence, 1.0);

    router.shutdown().await;
}

#[tokio::test]
async fn test_overloaded_unique_expert_scenario() {
    let mut options = RouterOptions::default();
    options.experts = Some(vec![
        create_expert("installer", ExpertType::Specialized, &["install"], 80, 0.95),
        create_expert("generalist", ExpertType::Balanced, &["search", "lookup"], 40, 0.9),
    ]);
    let router = create_router(options).await;

    let request = ToolRequest::new("req-c1", "install", json!({"package": "serde"}));
    assert_eq!(router.route(&request).unwrap().selected_expert, "installer");

    assert!(router.update_expert_health("installer", HealthState::Healthy, Some(0.96)));

    for i in 0..3 {
        let request = ToolRequest::new(
            format!("req-c{}", i + 2),
            "install",
            json!({"package": "serde"}),
        );
        let decision = router.route(&request).unwrap();

        assert_eq!(decision.selected_expert, DIRECT_FALLBACK_EXPERT_ID);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.reason, "Fallback: NO_ELIGIBLE_EXPERTS");
        assert!(!decision.cache_hit);
    }

    // 负载恢复后重新可用
    router.update_expert_health("installer", HealthState::Healthy, Some(0.2));
    assert_eq!(router.route(&request).unwrap().selected_expert, "installer");

    router.shutdown().await;
}

#[tokio::test]
async fn test_default_catalogue_routing() {
    let router = create_router(RouterOptions::default()).await;

    let cases = [
        ("validate", "validation-specialist"),
        ("lookup", "latency-expert"),
        ("install", "install-specialist"),
    ];
    for (request_type, expected) in cases {
        let decision = router
            .route(&ToolRequest::new("req", request_type, json!({})))
            .unwrap();
        assert_eq!(decision.selected_expert, expected, "request type {}", request_type);
        assert!((0.0..=1.0).contains(&decision.confidence));
        assert!(decision.alternatives.len() <= 3);
    }

    let unknown = router
        .route(&ToolRequest::new("req", "publish", json!({})))
        .unwrap();
    assert!(unknown.is_fallback());

    router.shutdown().await;
}

#[tokio::test]
async fn test_identical_requests_hit_cache_within_ttl() {
    let router = create_router(RouterOptions::default()).await;

    let arguments = json!({
        "query": "async runtime",
        "filters": {"license": "MIT", "min_downloads": 1000}
    });
    let reordered = json!({
        "filters": {"min_downloads": 1000, "license": "MIT"},
        "query": "async runtime"
    });

    let first = router
        .route(&ToolRequest::new("req-1", "search", arguments))
        .unwrap();
    let second = router
        .route(&ToolRequest::new("req-2", "search", reordered))
        .unwrap();
    let different = router
        .route(&ToolRequest::new("req-3", "search", json!({"query": "parser"})))
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert!(!different.cache_hit);
    assert_eq!(first.selected_expert, second.selected_expert);
    assert_eq!(first.scores, second.scores);

    let metrics = router.get_metrics();
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.cache_misses, 2);

    router.shutdown().await;
}

#[tokio::test]
async fn test_cache_entries_expire() {
    let mut options = RouterOptions::default();
    options.cache.ttl_seconds = 1;
    let router = create_router(options).await;

    let request = ToolRequest::new("req", "lookup", json!({"name": "rand"}));
    router.route(&request).unwrap();
    assert!(router.route(&request).unwrap().cache_hit);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!router.route(&request).unwrap().cache_hit);

    router.shutdown().await;
}

#[test]
fn test_rollout_gate_master_switch_off() {
    let mut flags = HashMap::from([("expert_routing".to_string(), false)]);
    for request_type in ["search", "lookup", "install", "validate", "compare", "recommend", "list"] {
        flags.insert(format!("expert_routing.{}", request_type), true);
        for tier in [None, Some("free"), Some("pro")] {
            assert!(!should_use_routing(request_type, &flags, tier));
        }
    }
}

#[tokio::test]
async fn test_isolated_router_instances() {
    let first = create_router(RouterOptions::default()).await;
    let second = create_router(RouterOptions::default()).await;

    first.update_expert_health("latency-expert", HealthState::Unhealthy, Some(1.0));
    first
        .route(&ToolRequest::new("req", "lookup", json!({})))
        .unwrap();

    let decision = second
        .route(&ToolRequest::new("req", "lookup", json!({})))
        .unwrap();
    assert_eq!(decision.selected_expert, "latency-expert");
    assert_eq!(second.get_metrics().total_requests, 1);

    first.shutdown().await;
    second.shutdown().await;
}
