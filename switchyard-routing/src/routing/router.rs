use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::{
    ExecutionError, ExecutionMetadata, ExpertDefinition, RouterError, RouterOptions, ToolRequest,
    ToolResponse, DIRECT_FALLBACK_EXPERT_ID,
};
use tracing::{debug, info, trace, warn};

use super::cache::{fingerprint, DecisionCache};
use super::external::OutcomeForwarder;
use super::health::{ExpertStatus, HealthState, HealthTracker};
use super::metrics::{MetricsCollector, MetricsSnapshot};
use super::monitor::HealthMonitor;
use super::registry::ExpertRegistry;
use super::scoring::{confidence, ScoreBreakdown, ScoringEngine};
use super::traits::{
    ExecutionOutcome, ExternalRouter, ExternalRouterFactory, NullExternalRouter, ToolExecutor,
};
use super::types::{Alternative, CandidateScore, RoutingDecision, NO_ELIGIBLE_EXPERTS};

/// 备选专家数量上限
const MAX_ALTERNATIVES: usize = 3;

fn invalid_config(error: anyhow::Error) -> RouterError {
    RouterError::InvalidConfig(format!("{:#}", error))
}

/// 专家路由器
///
/// 每个实例拥有独立的缓存、健康状态和指标，可以在同一进程中创建多个。
/// 必须先调用 [`ExpertRouter::initialize`] 才能路由请求。
pub struct ExpertRouter {
    options: RouterOptions,
    registry: RwLock<Arc<ExpertRegistry>>,
    cache: DecisionCache,
    health: Arc<HealthTracker>,
    scoring: ScoringEngine,
    metrics: MetricsCollector,
    external: RwLock<Arc<dyn ExternalRouter>>,
    external_factory: Option<ExternalRouterFactory>,
    forwarder: RwLock<Option<OutcomeForwarder>>,
    monitor: Mutex<Option<HealthMonitor>>,
    initialized: AtomicBool,
    /// 串行化 initialize / shutdown
    lifecycle: tokio::sync::Mutex<()>,
}

impl ExpertRouter {
    /// 创建路由器，配置或专家定义非法时返回错误
    pub fn new(options: RouterOptions) -> Result<Self, RouterError> {
        options.validate().map_err(invalid_config)?;

        let registry = ExpertRegistry::new(options.effective_experts()).map_err(invalid_config)?;
        let health = Arc::new(HealthTracker::new(
            registry.all(),
            options.health.clone(),
            options.scoring.success_decay,
        ));
        let scoring = ScoringEngine::new(
            options.scoring.clone(),
            options.request_weights.clone(),
            options.external.blend_weight,
        );
        let cache = DecisionCache::new(options.cache.ttl(), options.cache.max_entries);
        let metrics = MetricsCollector::new(options.metrics.baseline_latency_ms);

        info!(
            "Created expert router with {} experts (cache: {}, fallback: {})",
            registry.len(),
            if options.cache.enabled { "on" } else { "off" },
            if options.fallback.enabled { "on" } else { "off" }
        );

        Ok(Self {
            options,
            registry: RwLock::new(Arc::new(registry)),
            cache,
            health,
            scoring,
            metrics,
            external: RwLock::new(Arc::new(NullExternalRouter)),
            external_factory: None,
            forwarder: RwLock::new(None),
            monitor: Mutex::new(None),
            initialized: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    /// 注册外部路由模块的构建函数，在初始化时调用
    pub fn with_external_factory(mut self, factory: ExternalRouterFactory) -> Self {
        self.external_factory = Some(factory);
        self
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// 当前的专家注册表
    pub fn registry(&self) -> Arc<ExpertRegistry> {
        self.registry.read().clone()
    }

    /// 当前使用的外部路由模块名称
    pub fn external_router_name(&self) -> String {
        self.external.read().name().to_string()
    }

    /// 初始化路由器
    ///
    /// 尝试加载外部路由模块（失败时继续使用空实现），然后启动周期性健康检查。
    /// 重复调用不会产生副作用。
    pub async fn initialize(&self) -> Result<(), RouterError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.is_initialized() {
            debug!("Expert router already initialized");
            return Ok(());
        }

        self.load_external_router();

        let monitor = HealthMonitor::spawn(self.health.clone(), self.options.health.check_interval());
        *self.monitor.lock() = Some(monitor);

        self.initialized.store(true, Ordering::Release);
        info!(
            "Expert router initialized (external router: {})",
            self.external_router_name()
        );
        Ok(())
    }

    fn load_external_router(&self) {
        if !self.options.external.enabled {
            debug!("External routing disabled by configuration");
            return;
        }

        let Some(factory) = self.external_factory.as_ref() else {
            debug!("External routing enabled but no external router registered");
            return;
        };

        match factory() {
            Ok(external) if external.is_available() => {
                info!("Loaded external router '{}'", external.name());
                *self.forwarder.write() = Some(OutcomeForwarder::spawn(external.clone()));
                *self.external.write() = external;
            }
            Ok(external) => {
                warn!(
                    "External router '{}' is not available, using built-in scoring only",
                    external.name()
                );
            }
            Err(e) => {
                warn!(
                    "Failed to load external router, using built-in scoring only: {}",
                    e
                );
            }
        }
    }

    /// 停止健康检查和结果转发，释放缓存
    pub async fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.initialized.swap(false, Ordering::AcqRel) {
            debug!("Expert router is not running, nothing to shut down");
            return;
        }

        let monitor = self.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let forwarder = self.forwarder.write().take();
        if let Some(forwarder) = forwarder {
            forwarder.close().await;
        }
        *self.external.write() = Arc::new(NullExternalRouter);

        self.cache.clear();
        info!("Expert router shut down");
    }

    fn ensure_initialized(&self) -> Result<(), RouterError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(RouterError::NotInitialized)
        }
    }

    /// 为请求选择专家
    ///
    /// 顺序：缓存 → 筛选可用专家 → 打分 → 选择 → 写缓存。
    /// 没有可用专家时返回直连兜底决策而不是错误。
    pub fn route(&self, request: &ToolRequest) -> Result<RoutingDecision, RouterError> {
        self.ensure_initialized()?;

        let started = Instant::now();
        let cacheable = self.options.cache.enabled && request.is_cacheable();
        let cache_key = cacheable.then(|| fingerprint(&request.request_type, &request.arguments));

        // 读锁覆盖查缓存到写缓存，与 replace_experts 互斥
        let registry = self.registry.read();

        if let Some(key) = cache_key.as_deref() {
            if let Some(mut cached) = self.cache.get(key) {
                if cached.is_fallback() || registry.contains(&cached.selected_expert) {
                    cached.request_id = request.id.clone();
                    cached.cache_hit = true;
                    cached.decision_latency = started.elapsed();

                    debug!(
                        "Cache hit for request {} ({}): {}",
                        request.id, request.request_type, cached.selected_expert
                    );
                    self.metrics
                        .record_decision(&cached, &request.request_type, cacheable);
                    return Ok(cached);
                }

                warn!(
                    "Cached decision for request {} names unknown expert '{}', recomputing",
                    request.id, cached.selected_expert
                );
            }
        }

        let mut decision = self.decide(&registry, request);
        decision.decision_latency = started.elapsed();

        if let Some(key) = cache_key.as_deref() {
            // 兜底决策不缓存，专家恢复后立即生效
            if !decision.is_fallback() {
                self.cache.put(key, decision.clone());
            }
        }
        drop(registry);

        debug!(
            "Routed request {} ({}) to '{}' with confidence {:.2} in {:?}",
            request.id,
            request.request_type,
            decision.selected_expert,
            decision.confidence,
            decision.decision_latency
        );
        self.metrics
            .record_decision(&decision, &request.request_type, cacheable);
        Ok(decision)
    }

    fn decide(&self, registry: &ExpertRegistry, request: &ToolRequest) -> RoutingDecision {
        let external = self.external.read().clone();

        let mut candidates: Vec<(&ExpertDefinition, ScoreBreakdown)> = registry
            .supporting(&request.request_type)
            .filter_map(|expert| {
                let status = self.health.get_status(&expert.id)?;
                if !self.health.is_eligible(&status) {
                    trace!(
                        "Expert '{}' not eligible: health={}, load={:.2}",
                        expert.id,
                        status.health,
                        status.load
                    );
                    return None;
                }

                let hint = external.score_hint(expert, request);
                Some((expert, self.scoring.score(expert, &status, request, hint)))
            })
            .collect();

        candidates.sort_by(|(a, a_scores), (b, b_scores)| {
            b_scores
                .total
                .total_cmp(&a_scores.total)
                .then_with(|| b.priority.cmp(&a.priority))
                .then_with(|| a.id.cmp(&b.id))
        });

        let Some(((winner, winner_scores), rest)) = candidates.split_first() else {
            warn!(
                "No eligible experts for request {} ({}), using fallback",
                request.id, request.request_type
            );
            return RoutingDecision::fallback(request.id.clone(), NO_ELIGIBLE_EXPERTS);
        };

        let runner_up = rest.first().map(|(_, scores)| scores.total);
        let alternatives = rest
            .iter()
            .take(MAX_ALTERNATIVES)
            .map(|(expert, scores)| Alternative {
                expert_id: expert.id.clone(),
                score: scores.total,
                reason: self.explain_alternative(request, expert, scores, winner_scores),
            })
            .collect();

        RoutingDecision {
            request_id: request.id.clone(),
            selected_expert: winner.id.clone(),
            confidence: confidence(winner_scores.total, runner_up),
            scores: *winner_scores,
            candidates: candidates
                .iter()
                .map(|(expert, scores)| CandidateScore {
                    expert_id: expert.id.clone(),
                    scores: *scores,
                })
                .collect(),
            alternatives,
            reason: self.explain_winner(request, winner, winner_scores, candidates.len()),
            timestamp: Utc::now(),
            decision_latency: Duration::ZERO,
            cache_hit: false,
        }
    }

    fn explain_winner(
        &self,
        request: &ToolRequest,
        expert: &ExpertDefinition,
        scores: &ScoreBreakdown,
        candidate_count: usize,
    ) -> String {
        let profile = self.scoring.profile_for(&request.request_type, expert);
        let (factor, contribution) = scores
            .weighted_components(profile)
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or(("accuracy", 0.0));

        let mut reason = format!(
            "Selected {} ({}) for {}: strongest factor {} ({:.3}), score {:.3} among {} candidate(s)",
            expert.name,
            expert.expert_type.as_str(),
            request.request_type,
            factor,
            contribution,
            scores.total,
            candidate_count
        );
        if expert.is_narrow_specialist() {
            reason.push_str(", specialist boost applied");
        }
        reason
    }

    fn explain_alternative(
        &self,
        request: &ToolRequest,
        expert: &ExpertDefinition,
        scores: &ScoreBreakdown,
        winner_scores: &ScoreBreakdown,
    ) -> String {
        let profile = self.scoring.profile_for(&request.request_type, expert);
        let own = scores.weighted_components(profile);
        let best = winner_scores.weighted_components(profile);

        let weakest = own
            .iter()
            .zip(best.iter())
            .map(|((factor, value), (_, winner_value))| (*factor, winner_value - value))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match weakest {
            Some((factor, gap)) if gap > 0.0 => format!(
                "{} trails by {:.3}, weaker on {}",
                expert.name,
                winner_scores.total - scores.total,
                factor
            ),
            _ => format!(
                "{} trails by {:.3}",
                expert.name,
                winner_scores.total - scores.total
            ),
        }
    }

    /// 路由并执行请求
    ///
    /// 选中的专家失败后，如果允许兜底且选中的不是直连专家，会用直连专家重试一次。
    /// 两次都失败时返回带有第一次错误的失败响应；执行器最多被调用两次。
    pub async fn execute_with_routing<E>(
        &self,
        request: &ToolRequest,
        executor: &E,
    ) -> Result<ToolResponse, RouterError>
    where
        E: ToolExecutor + ?Sized,
    {
        let started = Instant::now();
        let decision = self.route(request)?;
        let routing_time = started.elapsed();

        let (first, first_time) = self
            .attempt(&decision.selected_expert, request, executor, false)
            .await;

        let original_error = match first {
            Ok(value) => {
                let metadata = ExecutionMetadata {
                    expert_id: decision.selected_expert.clone(),
                    total_time: started.elapsed(),
                    routing_time,
                    execution_time: first_time,
                    cache_hit: decision.cache_hit,
                    used_fallback: false,
                };
                return Ok(ToolResponse::success(request.id.clone(), value, metadata));
            }
            Err(error) => error,
        };

        warn!(
            "Expert '{}' failed request {}: {}",
            decision.selected_expert, request.id, original_error
        );

        if !self.options.fallback.retry_allowed() || decision.is_fallback() {
            let metadata = ExecutionMetadata {
                expert_id: decision.selected_expert.clone(),
                total_time: started.elapsed(),
                routing_time,
                execution_time: first_time,
                cache_hit: decision.cache_hit,
                used_fallback: false,
            };
            return Ok(ToolResponse::failure(request.id.clone(), original_error, metadata));
        }

        info!(
            "Retrying request {} with fallback expert '{}'",
            request.id, DIRECT_FALLBACK_EXPERT_ID
        );
        self.metrics.record_fallback_execution();

        let (retry, retry_time) = self
            .attempt(DIRECT_FALLBACK_EXPERT_ID, request, executor, true)
            .await;

        let metadata = ExecutionMetadata {
            expert_id: DIRECT_FALLBACK_EXPERT_ID.to_string(),
            total_time: started.elapsed(),
            routing_time,
            execution_time: first_time + retry_time,
            cache_hit: decision.cache_hit,
            used_fallback: true,
        };

        match retry {
            Ok(value) => Ok(ToolResponse::success(request.id.clone(), value, metadata)),
            Err(retry_error) => {
                warn!(
                    "Fallback expert also failed request {}: {}",
                    request.id, retry_error
                );
                Ok(ToolResponse::failure(request.id.clone(), original_error, metadata))
            }
        }
    }

    /// 调用一次执行器并记录结果
    ///
    /// future 在执行器返回前被丢弃时只释放活跃计数，不记录结果
    async fn attempt<E>(
        &self,
        expert_id: &str,
        request: &ToolRequest,
        executor: &E,
        used_fallback: bool,
    ) -> (Result<Value, ExecutionError>, Duration)
    where
        E: ToolExecutor + ?Sized,
    {
        let started = Instant::now();
        let result = {
            let _active = self.health.begin_request(expert_id);
            executor.execute(expert_id, request).await
        };
        let elapsed = started.elapsed();

        let error_category = result.as_ref().err().map(ExecutionError::category);
        self.health
            .record_outcome(expert_id, result.is_ok(), Some(elapsed));
        self.metrics
            .record_execution(expert_id, elapsed, error_category);
        self.forward_outcome(ExecutionOutcome {
            request_id: request.id.clone(),
            request_type: request.request_type.clone(),
            expert_id: expert_id.to_string(),
            success: result.is_ok(),
            latency: elapsed,
            error_category,
            used_fallback,
        });

        (result, elapsed)
    }

    fn forward_outcome(&self, outcome: ExecutionOutcome) {
        if let Some(forwarder) = self.forwarder.read().as_ref() {
            forwarder.forward(outcome);
        }
    }

    /// 所有专家的运行时状态
    pub fn get_expert_status(&self) -> Vec<ExpertStatus> {
        self.health.list_all()
    }

    /// 外部健康检查推送状态
    ///
    /// 专家因此变得不可用时清空决策缓存，避免继续返回指向它的决策。
    /// 专家不存在时返回 false。
    pub fn update_expert_health(&self, expert_id: &str, state: HealthState, load: Option<f64>) -> bool {
        let was_eligible = self
            .health
            .get_status(expert_id)
            .is_some_and(|status| self.health.is_eligible(&status));

        if !self.health.set_health(expert_id, state, load) {
            return false;
        }

        let now_eligible = self
            .health
            .get_status(expert_id)
            .is_some_and(|status| self.health.is_eligible(&status));
        if was_eligible && !now_eligible {
            info!(
                "Expert '{}' is no longer eligible, clearing decision cache",
                expert_id
            );
            self.cache.clear();
        }
        true
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(Some(self.cache.get_stats()))
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        self.cache.reset_stats();
        debug!("Routing metrics reset");
    }

    /// 整体替换专家列表
    ///
    /// 新列表校验通过后才会生效；仍然存在的专家保留健康状态，缓存被清空。
    /// 写锁持有到缓存清空为止，进行中的路由不会把旧专家写回缓存
    pub fn replace_experts(&self, experts: Vec<ExpertDefinition>) -> Result<(), RouterError> {
        let registry = ExpertRegistry::new(experts).map_err(invalid_config)?;
        let count = registry.len();

        let mut current = self.registry.write();
        self.health.rebuild(registry.all());
        *current = Arc::new(registry);
        self.cache.clear();
        drop(current);

        info!("Replaced expert registry with {} experts", count);
        Ok(())
    }
}
