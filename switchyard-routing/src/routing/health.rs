use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use switchyard_core::{ExpertDefinition, HealthSettings};
use tracing::{debug, info, warn};

/// 专家健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
    WarmingUp,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::WarmingUp => "warming_up",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 专家运行时状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertStatus {
    pub expert_id: String,
    pub health: HealthState,
    /// 0.0 - 1.0
    pub load: f64,
    pub active_requests: u32,
    /// 成功率的指数滑动平均，初始为1.0
    pub success_rate: f64,
    pub p95_latency: Option<Duration>,
    pub last_health_check: DateTime<Utc>,
}

impl ExpertStatus {
    fn new(expert_id: &str) -> Self {
        Self {
            expert_id: expert_id.to_string(),
            health: HealthState::Healthy,
            load: 0.0,
            active_requests: 0,
            success_rate: 1.0,
            p95_latency: None,
            last_health_check: Utc::now(),
        }
    }
}

/// 单个专家的内部记录
#[derive(Debug)]
struct ExpertRecord {
    status: ExpertStatus,
    max_concurrent: u32,
    /// 外部健康检查推送的负载
    reported_load: f64,
    recent_latencies: VecDeque<Duration>,
}

impl ExpertRecord {
    fn new(expert: &ExpertDefinition) -> Self {
        Self {
            status: ExpertStatus::new(&expert.id),
            max_concurrent: expert.capabilities.max_concurrent.max(1),
            reported_load: 0.0,
            recent_latencies: VecDeque::new(),
        }
    }

    /// 有效负载取外部上报值与并发占用率中较大的一个
    fn refresh_load(&mut self) {
        let concurrency_load = self.status.active_requests as f64 / self.max_concurrent as f64;
        self.status.load = self.reported_load.max(concurrency_load).clamp(0.0, 1.0);
    }

    fn push_latency(&mut self, latency: Duration, window: usize) {
        if self.recent_latencies.len() >= window {
            self.recent_latencies.pop_front();
        }
        self.recent_latencies.push_back(latency);
        self.status.p95_latency = percentile(&self.recent_latencies, 0.95);
    }
}

fn percentile(samples: &VecDeque<Duration>, quantile: f64) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted: Vec<Duration> = samples.iter().copied().collect();
    sorted.sort_unstable();
    let rank = ((sorted.len() as f64) * quantile).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[index])
}

/// 健康与负载跟踪器
///
/// 每个专家一条记录；请求路径和周期检查共用同一把锁，
/// 读-改-写在锁内完成
pub struct HealthTracker {
    records: RwLock<HashMap<String, ExpertRecord>>,
    settings: HealthSettings,
    success_decay: f64,
}

impl HealthTracker {
    pub fn new(experts: &[ExpertDefinition], settings: HealthSettings, success_decay: f64) -> Self {
        let records = experts
            .iter()
            .map(|expert| (expert.id.clone(), ExpertRecord::new(expert)))
            .collect();

        Self {
            records: RwLock::new(records),
            settings,
            success_decay,
        }
    }

    /// 注册表替换后重建记录，保留仍然存在的专家的状态
    pub fn rebuild(&self, experts: &[ExpertDefinition]) {
        let mut records = self.records.write();
        let mut rebuilt = HashMap::with_capacity(experts.len());

        for expert in experts {
            let record = match records.remove(&expert.id) {
                Some(mut existing) => {
                    existing.max_concurrent = expert.capabilities.max_concurrent.max(1);
                    existing.refresh_load();
                    existing
                }
                None => ExpertRecord::new(expert),
            };
            rebuilt.insert(expert.id.clone(), record);
        }

        if !records.is_empty() {
            debug!(
                "Dropped health records for removed experts: {:?}",
                records.keys().collect::<Vec<_>>()
            );
        }

        *records = rebuilt;
    }

    pub fn get_status(&self, expert_id: &str) -> Option<ExpertStatus> {
        self.records
            .read()
            .get(expert_id)
            .map(|record| record.status.clone())
    }

    /// 所有专家的状态，按ID排序
    pub fn list_all(&self) -> Vec<ExpertStatus> {
        let mut statuses: Vec<ExpertStatus> = self
            .records
            .read()
            .values()
            .map(|record| record.status.clone())
            .collect();
        statuses.sort_by(|a, b| a.expert_id.cmp(&b.expert_id));
        statuses
    }

    /// 外部健康检查直接设置状态，返回专家是否存在
    pub fn set_health(&self, expert_id: &str, state: HealthState, load: Option<f64>) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(expert_id) else {
            warn!("Ignoring health update for unknown expert '{}'", expert_id);
            return false;
        };

        if let Some(load) = load {
            record.reported_load = if load.is_finite() {
                load.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
        record.refresh_load();

        if record.status.health != state {
            info!(
                "Expert '{}' health set externally: {} -> {} (load {:.2})",
                expert_id, record.status.health, state, record.status.load
            );
        }
        record.status.health = state;
        record.status.last_health_check = Utc::now();
        true
    }

    /// 记录一次执行结果
    ///
    /// `rate = rate * decay + (success ? 1 - decay : 0)`，单次失败不会让成功率骤降
    pub fn record_outcome(&self, expert_id: &str, success: bool, latency: Option<Duration>) {
        let mut records = self.records.write();
        let Some(record) = records.get_mut(expert_id) else {
            return;
        };

        let gain = if success { 1.0 - self.success_decay } else { 0.0 };
        record.status.success_rate = record.status.success_rate * self.success_decay + gain;

        if let Some(latency) = latency {
            record.push_latency(latency, self.settings.latency_window);
        }

        debug!(
            "Recorded {} for expert '{}': success_rate={:.4}",
            if success { "success" } else { "failure" },
            expert_id,
            record.status.success_rate
        );
    }

    /// 根据负载重新计算健康状态，返回状态发生变化的专家数量
    pub fn evaluate(&self) -> usize {
        let mut records = self.records.write();
        let now = Utc::now();
        let mut changed = 0;

        for (expert_id, record) in records.iter_mut() {
            record.refresh_load();
            let next = self.classify_load(record.status.load);

            if next != record.status.health {
                info!(
                    "Expert '{}' health changed: {} -> {} (load {:.2})",
                    expert_id, record.status.health, next, record.status.load
                );
                record.status.health = next;
                changed += 1;
            }
            record.status.last_health_check = now;
        }

        changed
    }

    /// 负载到健康状态的映射
    pub fn classify_load(&self, load: f64) -> HealthState {
        if load > self.settings.unhealthy_threshold {
            HealthState::Unhealthy
        } else if load > self.settings.degraded_threshold {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        }
    }

    /// 专家是否可以参与路由
    pub fn is_eligible(&self, status: &ExpertStatus) -> bool {
        status.health != HealthState::Unhealthy && status.load < self.settings.max_eligible_load
    }

    /// 开始一次执行，返回的守卫在释放时结束计数
    pub fn begin_request(&self, expert_id: &str) -> ActiveRequestGuard<'_> {
        if let Some(record) = self.records.write().get_mut(expert_id) {
            record.status.active_requests += 1;
            record.refresh_load();
        }

        ActiveRequestGuard {
            tracker: self,
            expert_id: expert_id.to_string(),
        }
    }

    fn finish_request(&self, expert_id: &str) {
        if let Some(record) = self.records.write().get_mut(expert_id) {
            record.status.active_requests = record.status.active_requests.saturating_sub(1);
            record.refresh_load();
        }
    }
}

/// 活跃请求计数守卫
///
/// 执行完成或者future被丢弃时都会释放
pub struct ActiveRequestGuard<'a> {
    tracker: &'a HealthTracker,
    expert_id: String,
}

impl Drop for ActiveRequestGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_request(&self.expert_id);
    }
}
