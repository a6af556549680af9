//! 内置的专家目录与请求类型权重表

use super::model::{ExpertCapabilities, ExpertDefinition, ExpertType, WeightProfile};
use std::collections::HashMap;

/// 内置的请求类型
pub const REQUEST_TYPES: &[&str] = &[
    "search",
    "lookup",
    "install",
    "validate",
    "compare",
    "recommend",
    "list",
];

/// 每种请求类型的 (accuracy, latency, reliability, efficiency) 权重
///
/// 按ID直接获取的请求看重延迟，搜索与对比类请求看重准确度
pub fn default_request_weights() -> HashMap<String, WeightProfile> {
    [
        ("search", WeightProfile::new(0.5, 0.2, 0.2, 0.1)),
        ("lookup", WeightProfile::new(0.1, 0.6, 0.2, 0.1)),
        ("install", WeightProfile::new(0.2, 0.2, 0.5, 0.1)),
        ("validate", WeightProfile::new(0.6, 0.1, 0.2, 0.1)),
        ("compare", WeightProfile::new(0.5, 0.15, 0.2, 0.15)),
        ("recommend", WeightProfile::new(0.45, 0.2, 0.2, 0.15)),
        ("list", WeightProfile::new(0.1, 0.5, 0.2, 0.2)),
    ]
    .into_iter()
    .map(|(request_type, profile)| (request_type.to_string(), profile))
    .collect()
}

fn types(request_types: &[&str]) -> Vec<String> {
    request_types.iter().map(|t| t.to_string()).collect()
}

/// 默认专家目录
pub fn default_experts() -> Vec<ExpertDefinition> {
    vec![
        ExpertDefinition {
            id: "accuracy-expert".to_string(),
            expert_type: ExpertType::Accuracy,
            name: "Accuracy Expert".to_string(),
            description: "Thorough handler for ranking-sensitive requests".to_string(),
            capabilities: ExpertCapabilities {
                request_types: types(&["search", "compare", "recommend", "validate"]),
                max_concurrent: 10,
                avg_latency_ms: 150,
                accuracy: 0.98,
            },
            weights: WeightProfile::new(0.6, 0.1, 0.2, 0.1),
            priority: 3,
        },
        ExpertDefinition {
            id: "latency-expert".to_string(),
            expert_type: ExpertType::Latency,
            name: "Latency Expert".to_string(),
            description: "Fast path for id lookups and listings".to_string(),
            capabilities: ExpertCapabilities {
                request_types: types(&["lookup", "list", "search", "install"]),
                max_concurrent: 50,
                avg_latency_ms: 15,
                accuracy: 0.85,
            },
            weights: WeightProfile::new(0.1, 0.6, 0.2, 0.1),
            priority: 2,
        },
        ExpertDefinition {
            id: "balanced-expert".to_string(),
            expert_type: ExpertType::Balanced,
            name: "Balanced Expert".to_string(),
            description: "General purpose handler for every request type".to_string(),
            capabilities: ExpertCapabilities {
                request_types: types(REQUEST_TYPES),
                max_concurrent: 25,
                avg_latency_ms: 60,
                accuracy: 0.92,
            },
            weights: WeightProfile::default(),
            priority: 1,
        },
        ExpertDefinition {
            id: "validation-specialist".to_string(),
            expert_type: ExpertType::Specialized,
            name: "Validation Specialist".to_string(),
            description: "Dedicated validator".to_string(),
            capabilities: ExpertCapabilities {
                request_types: types(&["validate"]),
                max_concurrent: 20,
                avg_latency_ms: 40,
                accuracy: 0.97,
            },
            weights: WeightProfile::new(0.6, 0.1, 0.2, 0.1),
            priority: 4,
        },
        ExpertDefinition {
            id: "install-specialist".to_string(),
            expert_type: ExpertType::Specialized,
            name: "Install Specialist".to_string(),
            description: "Dedicated installer with retries built in".to_string(),
            capabilities: ExpertCapabilities {
                request_types: types(&["install"]),
                max_concurrent: 8,
                avg_latency_ms: 120,
                accuracy: 0.95,
            },
            weights: WeightProfile::new(0.2, 0.1, 0.6, 0.1),
            priority: 4,
        },
    ]
}
