use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchyard_core::DIRECT_FALLBACK_EXPERT_ID;

use super::scoring::ScoreBreakdown;

/// 没有可用专家时的兜底原因
pub const NO_ELIGIBLE_EXPERTS: &str = "NO_ELIGIBLE_EXPERTS";

/// 备选专家
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alternative {
    pub expert_id: String,
    pub score: f64,
    pub reason: String,
}

/// 单个候选专家的打分明细
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateScore {
    pub expert_id: String,
    pub scores: ScoreBreakdown,
}

/// 路由决策
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub request_id: String,
    pub selected_expert: String,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// 选中专家的打分明细
    pub scores: ScoreBreakdown,
    /// 所有候选专家的打分明细，按总分降序
    pub candidates: Vec<CandidateScore>,
    /// 最多3个备选
    pub alternatives: Vec<Alternative>,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub decision_latency: Duration,
    pub cache_hit: bool,
}

impl RoutingDecision {
    /// 兜底决策：直连专家，置信度1.0，只有可靠性得分
    pub fn fallback(request_id: impl Into<String>, reason_code: &str) -> Self {
        Self {
            request_id: request_id.into(),
            selected_expert: DIRECT_FALLBACK_EXPERT_ID.to_string(),
            confidence: 1.0,
            scores: ScoreBreakdown {
                accuracy: 0.0,
                latency: 0.0,
                reliability: 1.0,
                efficiency: 0.0,
                total: 0.0,
            },
            candidates: Vec::new(),
            alternatives: Vec::new(),
            reason: format!("Fallback: {}", reason_code),
            timestamp: Utc::now(),
            decision_latency: Duration::ZERO,
            cache_hit: false,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.selected_expert == DIRECT_FALLBACK_EXPERT_ID
    }
}
