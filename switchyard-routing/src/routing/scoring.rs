use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchyard_core::{ExpertDefinition, ScoringSettings, ToolRequest, WeightProfile};

use super::health::ExpertStatus;

/// 打分明细
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ScoreBreakdown {
    pub accuracy: f64,
    pub latency: f64,
    pub reliability: f64,
    pub efficiency: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    /// 各维度按权重加权后的贡献
    pub fn weighted_components(&self, profile: &WeightProfile) -> [(&'static str, f64); 4] {
        [
            ("accuracy", self.accuracy * profile.accuracy),
            ("latency", self.latency * profile.latency),
            ("reliability", self.reliability * profile.reliability),
            ("efficiency", self.efficiency * profile.efficiency),
        ]
    }
}

/// 置信度
///
/// 有备选时为 `min(1.0, 0.5 + 2 × (winner − runner_up))`，只有一个候选时为1.0。
/// 微弱领先接近0.5，明显领先饱和到1.0。
pub fn confidence(winner: f64, runner_up: Option<f64>) -> f64 {
    match runner_up {
        Some(runner_up) => (0.5 + 2.0 * (winner - runner_up)).clamp(0.0, 1.0),
        None => 1.0,
    }
}

/// 多因子加权打分
pub struct ScoringEngine {
    settings: ScoringSettings,
    request_weights: HashMap<String, WeightProfile>,
    blend_weight: f64,
}

impl ScoringEngine {
    pub fn new(
        settings: ScoringSettings,
        request_weights: HashMap<String, WeightProfile>,
        blend_weight: f64,
    ) -> Self {
        Self {
            settings,
            request_weights,
            blend_weight: blend_weight.clamp(0.0, 1.0),
        }
    }

    /// 请求类型的权重；未登记的类型使用专家自己声明的权重
    pub fn profile_for<'a>(
        &'a self,
        request_type: &str,
        expert: &'a ExpertDefinition,
    ) -> &'a WeightProfile {
        self.request_weights
            .get(request_type)
            .unwrap_or(&expert.weights)
    }

    /// 计算四个维度的得分，`total` 为0
    pub fn component_scores(
        &self,
        expert: &ExpertDefinition,
        status: &ExpertStatus,
        request: &ToolRequest,
    ) -> ScoreBreakdown {
        let load = status.load.clamp(0.0, 1.0);
        let capabilities = &expert.capabilities;

        let accuracy = capabilities.accuracy * (1.0 - load * self.settings.load_accuracy_penalty);

        let baseline = self.settings.latency_baseline_ms.max(1) as f64;
        let mut latency = (1.0 - capabilities.avg_latency_ms as f64 / baseline).max(0.0);
        if let Some(max_latency_ms) = request.max_latency_ms {
            // 软约束，只降分不排除
            if capabilities.avg_latency_ms > max_latency_ms {
                latency *= self.settings.max_latency_penalty;
            }
        }

        ScoreBreakdown {
            accuracy,
            latency,
            reliability: status.success_rate,
            efficiency: 1.0 - load,
            total: 0.0,
        }
    }

    /// 合成总分
    ///
    /// 顺序固定：加权求和（有外部提示时先混合），再乘专用专家加成，最后加优先级
    pub fn total_score(
        &self,
        components: &ScoreBreakdown,
        profile: &WeightProfile,
        expert: &ExpertDefinition,
        external_hint: Option<f64>,
    ) -> f64 {
        let mut total: f64 = components
            .weighted_components(profile)
            .iter()
            .map(|(_, value)| value)
            .sum();

        if let Some(hint) = external_hint.filter(|hint| hint.is_finite()) {
            total = total * (1.0 - self.blend_weight) + hint.clamp(0.0, 1.0) * self.blend_weight;
        }

        if expert.is_narrow_specialist() {
            total *= self.settings.specialist_boost;
        }

        total + expert.priority as f64 / 10000.0
    }

    pub fn score(
        &self,
        expert: &ExpertDefinition,
        status: &ExpertStatus,
        request: &ToolRequest,
        external_hint: Option<f64>,
    ) -> ScoreBreakdown {
        let mut breakdown = self.component_scores(expert, status, request);
        let profile = self.profile_for(&request.request_type, expert);
        breakdown.total = self.total_score(&breakdown, profile, expert, external_hint);
        breakdown
    }
}
