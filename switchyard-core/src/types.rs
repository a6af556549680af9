use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::ExecutionError;

/// 请求优先级，`High` 会绕过决策缓存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    High,
    #[default]
    Normal,
    Low,
}

/// 请求附带的调用方信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    #[serde(default)]
    pub caller_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub feature_flags: HashMap<String, bool>,
}

/// 工具调用请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub request_type: String,
    #[serde(default)]
    pub arguments: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: RequestPriority,
    #[serde(default)]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, request_type: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            request_type: request_type.into(),
            arguments,
            timestamp: Utc::now(),
            priority: RequestPriority::Normal,
            max_latency_ms: None,
            metadata: None,
        }
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency_ms = Some(max_latency.as_millis() as u64);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 高优先级请求不读也不写缓存
    pub fn is_cacheable(&self) -> bool {
        self.priority != RequestPriority::High
    }

    pub fn max_latency(&self) -> Option<Duration> {
        self.max_latency_ms.map(Duration::from_millis)
    }
}

/// 返回给调用方的结构化错误
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl From<ExecutionError> for ToolError {
    fn from(error: ExecutionError) -> Self {
        Self {
            code: error.code,
            message: error.message,
            details: error.details,
        }
    }
}

/// 执行元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// 实际处理请求的专家
    pub expert_id: String,
    pub total_time: Duration,
    pub routing_time: Duration,
    pub execution_time: Duration,
    pub cache_hit: bool,
    pub used_fallback: bool,
}

/// 工具调用响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
    pub metadata: ExecutionMetadata,
}

impl ToolResponse {
    pub fn success(request_id: impl Into<String>, result: Value, metadata: ExecutionMetadata) -> Self {
        Self {
            request_id: request_id.into(),
            success: true,
            result: Some(result),
            error: None,
            metadata,
        }
    }

    pub fn failure(
        request_id: impl Into<String>,
        error: impl Into<ToolError>,
        metadata: ExecutionMetadata,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            success: false,
            result: None,
            error: Some(error.into()),
            metadata,
        }
    }
}
