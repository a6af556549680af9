use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::defaults;

/// 保留的直连兜底专家ID
///
/// 没有可用专家或首选专家执行失败时使用，不能出现在注册表中
pub const DIRECT_FALLBACK_EXPERT_ID: &str = "direct";

/// 专家优先级上限，保证 `priority / 10000` 只在同分时起作用
pub const MAX_EXPERT_PRIORITY: u32 = 99;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouterOptions {
    /// 覆盖默认专家列表
    #[serde(default)]
    pub experts: Option<Vec<ExpertDefinition>>,
    /// 请求类型权重表
    #[serde(default = "defaults::default_request_weights")]
    pub request_weights: HashMap<String, WeightProfile>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub external: ExternalSettings,
}

/// 决策缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

/// 健康与负载配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HealthSettings {
    #[serde(default = "default_health_check_interval")]
    pub check_interval_seconds: u64,
    /// 负载超过该值标记为 degraded
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: f64,
    /// 负载超过该值标记为 unhealthy
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: f64,
    /// 负载达到该值的专家不参与路由
    #[serde(default = "default_max_eligible_load")]
    pub max_eligible_load: f64,
    /// P95 统计窗口大小
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,
}

/// 兜底执行配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FallbackSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 兜底重试次数，只允许 0 或 1
    #[serde(default = "default_fallback_retries")]
    pub max_retries: u32,
    /// 给执行器的超时提示，引擎本身不强制
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// 打分参数
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScoringSettings {
    #[serde(default = "default_latency_baseline")]
    pub latency_baseline_ms: u64,
    #[serde(default = "default_max_latency_penalty")]
    pub max_latency_penalty: f64,
    #[serde(default = "default_specialist_boost")]
    pub specialist_boost: f64,
    #[serde(default = "default_load_accuracy_penalty")]
    pub load_accuracy_penalty: f64,
    /// 成功率滑动平均的衰减系数
    #[serde(default = "default_success_decay")]
    pub success_decay: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsSettings {
    /// 计算提速比例时使用的基线延迟
    #[serde(default = "default_metrics_baseline_latency")]
    pub baseline_latency_ms: u64,
}

/// 外部打分模块配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExternalSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_blend_weight")]
    pub blend_weight: f64,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            experts: None,
            request_weights: defaults::default_request_weights(),
            cache: CacheSettings::default(),
            health: HealthSettings::default(),
            fallback: FallbackSettings::default(),
            scoring: ScoringSettings::default(),
            metrics: MetricsSettings::default(),
            external: ExternalSettings::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_health_check_interval(),
            degraded_threshold: default_degraded_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
            max_eligible_load: default_max_eligible_load(),
            latency_window: default_latency_window(),
        }
    }
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_fallback_retries(),
            timeout_ms: None,
        }
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            latency_baseline_ms: default_latency_baseline(),
            max_latency_penalty: default_max_latency_penalty(),
            specialist_boost: default_specialist_boost(),
            load_accuracy_penalty: default_load_accuracy_penalty(),
            success_decay: default_success_decay(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            baseline_latency_ms: default_metrics_baseline_latency(),
        }
    }
}

impl Default for ExternalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            blend_weight: default_blend_weight(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl HealthSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }
}

impl FallbackSettings {
    /// 是否允许一次兜底重试
    pub fn retry_allowed(&self) -> bool {
        self.enabled && self.max_retries > 0
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// 专家分类
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExpertType {
    /// 准确度优先
    Accuracy,
    /// 延迟优先
    Latency,
    /// 均衡
    Balanced,
    /// 专用
    Specialized,
}

impl ExpertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertType::Accuracy => "accuracy",
            ExpertType::Latency => "latency",
            ExpertType::Balanced => "balanced",
            ExpertType::Specialized => "specialized",
        }
    }
}

/// 四维权重
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct WeightProfile {
    pub accuracy: f64,
    pub latency: f64,
    pub reliability: f64,
    pub efficiency: f64,
}

impl WeightProfile {
    pub const fn new(accuracy: f64, latency: f64, reliability: f64, efficiency: f64) -> Self {
        Self {
            accuracy,
            latency,
            reliability,
            efficiency,
        }
    }

    pub fn sum(&self) -> f64 {
        self.accuracy + self.latency + self.reliability + self.efficiency
    }

    /// 所有权重都必须是非负的有限数
    pub fn is_valid(&self) -> bool {
        [self.accuracy, self.latency, self.reliability, self.efficiency]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

impl Default for WeightProfile {
    fn default() -> Self {
        Self::new(0.25, 0.25, 0.25, 0.25)
    }
}

/// 专家能力声明
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExpertCapabilities {
    pub request_types: Vec<String>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    pub avg_latency_ms: u64,
    pub accuracy: f64,
}

impl ExpertCapabilities {
    pub fn supports(&self, request_type: &str) -> bool {
        self.request_types.iter().any(|t| t == request_type)
    }

    pub fn avg_latency(&self) -> Duration {
        Duration::from_millis(self.avg_latency_ms)
    }
}

/// 专家定义，启动后不可变
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ExpertDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub expert_type: ExpertType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub capabilities: ExpertCapabilities,
    #[serde(default)]
    pub weights: WeightProfile,
    #[serde(default)]
    pub priority: u32,
}

impl ExpertDefinition {
    /// 只支持一种请求类型的专用专家
    pub fn is_narrow_specialist(&self) -> bool {
        self.expert_type == ExpertType::Specialized && self.capabilities.request_types.len() == 1
    }

    /// 验证单个专家定义的有效性
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Expert has empty id");
        }

        if self.id == DIRECT_FALLBACK_EXPERT_ID {
            anyhow::bail!(
                "Expert id '{}' is reserved for the direct fallback",
                DIRECT_FALLBACK_EXPERT_ID
            );
        }

        if self.id.contains(char::is_whitespace) {
            anyhow::bail!(
                "Expert '{}' has invalid id format (cannot contain whitespace)",
                self.id
            );
        }

        if self.name.is_empty() {
            anyhow::bail!("Expert '{}' has empty name", self.id);
        }

        if self.capabilities.request_types.is_empty() {
            anyhow::bail!("Expert '{}' has no request types defined", self.id);
        }

        let mut seen = HashSet::new();
        for request_type in &self.capabilities.request_types {
            if request_type.is_empty() {
                anyhow::bail!("Expert '{}' has empty request type", self.id);
            }
            if !seen.insert(request_type.as_str()) {
                anyhow::bail!(
                    "Expert '{}' declares request type '{}' more than once",
                    self.id,
                    request_type
                );
            }
        }

        if self.capabilities.max_concurrent == 0 {
            anyhow::bail!(
                "Expert '{}' has invalid max_concurrent: cannot be 0",
                self.id
            );
        }

        let accuracy = self.capabilities.accuracy;
        if !accuracy.is_finite() || !(0.0..=1.0).contains(&accuracy) {
            anyhow::bail!(
                "Expert '{}' has invalid accuracy: {} (must be within 0.0..=1.0)",
                self.id,
                accuracy
            );
        }

        if !self.weights.is_valid() {
            anyhow::bail!(
                "Expert '{}' has invalid weight profile (weights must be non-negative)",
                self.id
            );
        }

        if self.priority > MAX_EXPERT_PRIORITY {
            anyhow::bail!(
                "Expert '{}' has invalid priority: {} (maximum {})",
                self.id,
                self.priority,
                MAX_EXPERT_PRIORITY
            );
        }

        Ok(())
    }
}

impl RouterOptions {
    /// 实际生效的专家列表
    pub fn effective_experts(&self) -> Vec<ExpertDefinition> {
        match &self.experts {
            Some(experts) => experts.clone(),
            None => defaults::default_experts(),
        }
    }

    pub fn weights_for(&self, request_type: &str) -> Option<&WeightProfile> {
        self.request_weights.get(request_type)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if let Some(experts) = &self.experts {
            validate_experts(experts)?;
        }

        for (request_type, profile) in &self.request_weights {
            if !profile.is_valid() {
                anyhow::bail!(
                    "Request type '{}' has invalid weight profile (weights must be non-negative)",
                    request_type
                );
            }
        }

        self.validate_cache_settings()?;
        self.validate_health_settings()?;
        self.validate_scoring_settings()?;

        if self.fallback.max_retries > 1 {
            anyhow::bail!(
                "fallback.max_retries too large: {} (the fallback is single-shot, maximum 1)",
                self.fallback.max_retries
            );
        }

        if self.metrics.baseline_latency_ms == 0 {
            anyhow::bail!("metrics.baseline_latency_ms cannot be 0");
        }

        if !(0.0..=1.0).contains(&self.external.blend_weight) {
            anyhow::bail!(
                "external.blend_weight must be within 0.0..=1.0, got {}",
                self.external.blend_weight
            );
        }

        Ok(())
    }

    fn validate_cache_settings(&self) -> Result<()> {
        if self.cache.ttl_seconds == 0 {
            anyhow::bail!("cache.ttl_seconds cannot be 0");
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries cannot be 0");
        }
        Ok(())
    }

    fn validate_health_settings(&self) -> Result<()> {
        let health = &self.health;

        if health.check_interval_seconds == 0 {
            anyhow::bail!("health.check_interval_seconds cannot be 0");
        }

        for (name, value) in [
            ("degraded_threshold", health.degraded_threshold),
            ("unhealthy_threshold", health.unhealthy_threshold),
            ("max_eligible_load", health.max_eligible_load),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                anyhow::bail!("health.{} must be within (0.0, 1.0], got {}", name, value);
            }
        }

        if health.unhealthy_threshold < health.degraded_threshold {
            anyhow::bail!(
                "health.unhealthy_threshold ({}) must not be below health.degraded_threshold ({})",
                health.unhealthy_threshold,
                health.degraded_threshold
            );
        }

        if health.latency_window == 0 {
            anyhow::bail!("health.latency_window cannot be 0");
        }

        Ok(())
    }

    fn validate_scoring_settings(&self) -> Result<()> {
        let scoring = &self.scoring;

        if scoring.latency_baseline_ms == 0 {
            anyhow::bail!("scoring.latency_baseline_ms cannot be 0");
        }
        if !(0.0..=1.0).contains(&scoring.max_latency_penalty) {
            anyhow::bail!(
                "scoring.max_latency_penalty must be within 0.0..=1.0, got {}",
                scoring.max_latency_penalty
            );
        }
        if scoring.specialist_boost < 1.0 {
            anyhow::bail!(
                "scoring.specialist_boost must be at least 1.0, got {}",
                scoring.specialist_boost
            );
        }
        if !(0.0..=1.0).contains(&scoring.load_accuracy_penalty) {
            anyhow::bail!(
                "scoring.load_accuracy_penalty must be within 0.0..=1.0, got {}",
                scoring.load_accuracy_penalty
            );
        }
        if scoring.success_decay <= 0.0 || scoring.success_decay >= 1.0 {
            anyhow::bail!(
                "scoring.success_decay must be within (0.0, 1.0), got {}",
                scoring.success_decay
            );
        }
        Ok(())
    }
}

/// 验证一组专家定义，注册表构建时使用
pub fn validate_experts(experts: &[ExpertDefinition]) -> Result<()> {
    if experts.is_empty() {
        anyhow::bail!("Expert list is empty");
    }

    let mut ids = HashSet::new();
    for expert in experts {
        expert.validate()?;
        if !ids.insert(expert.id.as_str()) {
            anyhow::bail!("Duplicate expert id '{}'", expert.id);
        }
    }

    Ok(())
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300 // 5分钟
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_degraded_threshold() -> f64 {
    0.90
}

fn default_unhealthy_threshold() -> f64 {
    0.95
}

fn default_max_eligible_load() -> f64 {
    0.95
}

fn default_latency_window() -> usize {
    100
}

fn default_fallback_retries() -> u32 {
    1
}

fn default_latency_baseline() -> u64 {
    200
}

fn default_max_latency_penalty() -> f64 {
    0.5
}

fn default_specialist_boost() -> f64 {
    1.1
}

fn default_load_accuracy_penalty() -> f64 {
    0.1
}

fn default_success_decay() -> f64 {
    0.99
}

fn default_metrics_baseline_latency() -> u64 {
    500
}

fn default_blend_weight() -> f64 {
    0.3
}

fn default_max_concurrent() -> u32 {
    10
}
