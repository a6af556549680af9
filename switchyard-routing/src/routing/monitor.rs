use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

use super::health::HealthTracker;

/// 周期性健康检查
/// 按固定间隔根据负载重新计算所有专家的健康状态
/// 被丢弃时同样会停止后台任务
pub struct HealthMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
    _cancel_on_drop: DropGuard,
}

impl HealthMonitor {
    /// 启动后台检查任务
    pub fn spawn(tracker: Arc<HealthTracker>, check_interval: Duration) -> Self {
        info!("Starting health monitor with interval: {:?}", check_interval);

        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let changed = tracker.evaluate();
                        debug!("Health check completed, {} experts changed state", changed);
                    }
                }
            }

            debug!("Health monitor loop exited");
        });

        Self {
            _cancel_on_drop: token.clone().drop_guard(),
            token,
            handle,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// 停止检查任务并等待退出
    pub async fn stop(self) {
        let Self { token, handle, .. } = self;
        token.cancel();
        if let Err(e) = handle.await {
            error!("Health monitor task failed: {}", e);
        }
        info!("Health monitor stopped");
    }
}
