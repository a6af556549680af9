use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::traits::{ExecutionOutcome, ExternalRouter};

/// 把执行结果单向转发给外部路由模块
///
/// 请求路径只做一次非阻塞的 send，外部模块的失败只记录日志
pub struct OutcomeForwarder {
    sender: mpsc::UnboundedSender<ExecutionOutcome>,
    handle: JoinHandle<()>,
}

impl OutcomeForwarder {
    pub fn spawn(external: Arc<dyn ExternalRouter>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ExecutionOutcome>();

        let handle = tokio::spawn(async move {
            while let Some(outcome) = receiver.recv().await {
                if let Err(e) = external.record_outcome(&outcome).await {
                    warn!(
                        "External router '{}' failed to record outcome for request {}: {}",
                        external.name(),
                        outcome.request_id,
                        e
                    );
                }
            }
            debug!("Outcome forwarder for '{}' stopped", external.name());
        });

        Self { sender, handle }
    }

    pub fn forward(&self, outcome: ExecutionOutcome) {
        if let Err(e) = self.sender.send(outcome) {
            debug!(
                "Dropping outcome for request {}: forwarder closed",
                e.0.request_id
            );
        }
    }

    /// 关闭通道并等待已排队的结果处理完
    pub async fn close(self) {
        let Self { sender, handle } = self;
        drop(sender);
        if let Err(e) = handle.await {
            error!("Outcome forwarder task failed: {}", e);
        }
    }
}
