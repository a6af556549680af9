use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{ErrorCategory, ExecutionError, ExpertDefinition, ToolRequest};

/// 工具执行器
///
/// 由调用方提供，引擎只决定把哪个专家ID交给它
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, expert_id: &str, request: &ToolRequest) -> Result<Value, ExecutionError>;
}

/// 闭包形式的执行器
#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(String, ToolRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    async fn execute(&self, expert_id: &str, request: &ToolRequest) -> Result<Value, ExecutionError> {
        (self)(expert_id.to_string(), request.clone()).await
    }
}

/// 一次执行的结果，转发给外部路由模块学习
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub request_id: String,
    pub request_type: String,
    pub expert_id: String,
    pub success: bool,
    pub latency: Duration,
    pub error_category: Option<ErrorCategory>,
    pub used_fallback: bool,
}

/// 可选的外部路由模块
///
/// 可以提供额外的打分信号，并从执行结果中学习。
/// 引擎在没有它的情况下必须完全正常工作。
#[async_trait]
pub trait ExternalRouter: Send + Sync {
    fn name(&self) -> &str;

    /// 是否真正可用，空实现返回 false
    fn is_available(&self) -> bool {
        true
    }

    /// 0.0 - 1.0 的打分提示，`None` 表示不参与
    fn score_hint(&self, _expert: &ExpertDefinition, _request: &ToolRequest) -> Option<f64> {
        None
    }

    /// 接收执行结果
    async fn record_outcome(&self, _outcome: &ExecutionOutcome) -> Result<()> {
        Ok(())
    }
}

/// 空实现，外部模块不可用时使用
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExternalRouter;

#[async_trait]
impl ExternalRouter for NullExternalRouter {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// 外部模块构建函数
///
/// 初始化时调用一次，失败时引擎退回空实现
pub type ExternalRouterFactory = Box<dyn Fn() -> Result<Arc<dyn ExternalRouter>> + Send + Sync>;
