use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use switchyard_core::ErrorCategory;

use super::cache::CacheStats;
use super::types::RoutingDecision;

/// 路由指标收集器
///
/// 只做计数，不参与决策；所有记录操作都不会失败
pub struct MetricsCollector {
    baseline_latency_ms: u64,

    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_bypassed: AtomicU64,
    fallback_decisions: AtomicU64,
    total_routing_time_us: AtomicU64,

    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    fallback_executions: AtomicU64,
    total_execution_time_us: AtomicU64,

    requests_by_type: RwLock<HashMap<String, u64>>,
    requests_by_expert: RwLock<HashMap<String, u64>>,
    executions_by_expert: RwLock<HashMap<String, u64>>,
    errors_by_category: RwLock<HashMap<ErrorCategory, u64>>,
}

impl MetricsCollector {
    pub fn new(baseline_latency_ms: u64) -> Self {
        Self {
            baseline_latency_ms,
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_bypassed: AtomicU64::new(0),
            fallback_decisions: AtomicU64::new(0),
            total_routing_time_us: AtomicU64::new(0),
            total_executions: AtomicU64::new(0),
            successful_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            fallback_executions: AtomicU64::new(0),
            total_execution_time_us: AtomicU64::new(0),
            requests_by_type: RwLock::new(HashMap::new()),
            requests_by_expert: RwLock::new(HashMap::new()),
            executions_by_expert: RwLock::new(HashMap::new()),
            errors_by_category: RwLock::new(HashMap::new()),
        }
    }

    /// 记录一次路由决策
    ///
    /// `cacheable` 为 false 时既不算命中也不算未命中
    pub fn record_decision(&self, decision: &RoutingDecision, request_type: &str, cacheable: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_routing_time_us
            .fetch_add(duration_micros(decision.decision_latency), Ordering::Relaxed);

        if !cacheable {
            self.cache_bypassed.fetch_add(1, Ordering::Relaxed);
        } else if decision.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        if decision.is_fallback() {
            self.fallback_decisions.fetch_add(1, Ordering::Relaxed);
        }

        *self
            .requests_by_type
            .write()
            .entry(request_type.to_string())
            .or_insert(0) += 1;
        *self
            .requests_by_expert
            .write()
            .entry(decision.selected_expert.clone())
            .or_insert(0) += 1;
    }

    /// 记录一次执行器调用，兜底重试记在直连专家名下
    pub fn record_execution(
        &self,
        expert_id: &str,
        execution_time: Duration,
        error: Option<ErrorCategory>,
    ) {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        *self
            .executions_by_expert
            .write()
            .entry(expert_id.to_string())
            .or_insert(0) += 1;
        self.total_execution_time_us
            .fetch_add(duration_micros(execution_time), Ordering::Relaxed);

        match error {
            None => {
                self.successful_executions.fetch_add(1, Ordering::Relaxed);
            }
            Some(category) => {
                self.failed_executions.fetch_add(1, Ordering::Relaxed);
                *self.errors_by_category.write().entry(category).or_insert(0) += 1;
            }
        }
    }

    /// 记录一次兜底重试
    pub fn record_fallback_execution(&self) {
        self.fallback_executions.fetch_add(1, Ordering::Relaxed);
    }

    fn average_ms(total_us: u64, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            total_us as f64 / count as f64 / 1000.0
        }
    }

    /// 基线延迟与实际平均（路由 + 执行）延迟之比，没有数据时为0
    pub fn speed_improvement(&self) -> f64 {
        let avg_routing = Self::average_ms(
            self.total_routing_time_us.load(Ordering::Relaxed),
            self.total_requests.load(Ordering::Relaxed),
        );
        let avg_execution = Self::average_ms(
            self.total_execution_time_us.load(Ordering::Relaxed),
            self.total_executions.load(Ordering::Relaxed),
        );

        let observed = avg_routing + avg_execution;
        if observed <= 0.0 {
            0.0
        } else {
            self.baseline_latency_ms as f64 / observed
        }
    }

    pub fn snapshot(&self, cache: Option<CacheStats>) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let total_executions = self.total_executions.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_requests,
            requests_by_type: sorted(&self.requests_by_type.read()),
            requests_by_expert: sorted(&self.requests_by_expert.read()),
            executions_by_expert: sorted(&self.executions_by_expert.read()),
            cache_hits,
            cache_misses,
            cache_bypassed: self.cache_bypassed.load(Ordering::Relaxed),
            cache_hit_rate: if lookups > 0 {
                cache_hits as f64 / lookups as f64
            } else {
                0.0
            },
            fallback_decisions: self.fallback_decisions.load(Ordering::Relaxed),
            total_executions,
            successful_executions: self.successful_executions.load(Ordering::Relaxed),
            failed_executions: self.failed_executions.load(Ordering::Relaxed),
            fallback_executions: self.fallback_executions.load(Ordering::Relaxed),
            errors_by_category: self
                .errors_by_category
                .read()
                .iter()
                .map(|(category, count)| (category.as_str().to_string(), *count))
                .collect(),
            avg_routing_time_ms: Self::average_ms(
                self.total_routing_time_us.load(Ordering::Relaxed),
                total_requests,
            ),
            avg_execution_time_ms: Self::average_ms(
                self.total_execution_time_us.load(Ordering::Relaxed),
                total_executions,
            ),
            speed_improvement: self.speed_improvement(),
            cache,
            timestamp: Utc::now(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.cache_hits,
            &self.cache_misses,
            &self.cache_bypassed,
            &self.fallback_decisions,
            &self.total_routing_time_us,
            &self.total_executions,
            &self.successful_executions,
            &self.failed_executions,
            &self.fallback_executions,
            &self.total_execution_time_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.requests_by_type.write().clear();
        self.requests_by_expert.write().clear();
        self.executions_by_expert.write().clear();
        self.errors_by_category.write().clear();
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn sorted(map: &HashMap<String, u64>) -> BTreeMap<String, u64> {
    map.iter().map(|(key, count)| (key.clone(), *count)).collect()
}

/// 指标快照
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub requests_by_type: BTreeMap<String, u64>,
    /// 按选中专家统计的路由决策数
    pub requests_by_expert: BTreeMap<String, u64>,
    /// 按实际执行的专家统计的执行器调用数，包括兜底重试
    pub executions_by_expert: BTreeMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// 高优先级或者缓存关闭时跳过缓存的请求数
    pub cache_bypassed: u64,
    /// 0.0 - 1.0
    pub cache_hit_rate: f64,
    pub fallback_decisions: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub fallback_executions: u64,
    pub errors_by_category: BTreeMap<String, u64>,
    pub avg_routing_time_ms: f64,
    pub avg_execution_time_ms: f64,
    pub speed_improvement: f64,
    pub cache: Option<CacheStats>,
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} requests, cache hit rate {:.1}%, {} executions ({} failed, {} fallback), \
             avg routing {:.3}ms, avg execution {:.3}ms, speed improvement {:.2}x",
            self.total_requests,
            self.cache_hit_rate * 100.0,
            self.total_executions,
            self.failed_executions,
            self.fallback_executions,
            self.avg_routing_time_ms,
            self.avg_execution_time_ms,
            self.speed_improvement
        )
    }
}
