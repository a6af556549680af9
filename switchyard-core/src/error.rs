use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 路由引擎边界上的错误
///
/// 只用于调用方误用引擎的情况，执行失败通过 `ToolResponse` 返回
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router is not initialized: call initialize() before routing requests")]
    NotInitialized,
    #[error("invalid router configuration: {0}")]
    InvalidConfig(String),
}

/// 执行器返回的结构化错误
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq)]
#[error("{code}: {message}")]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl ExecutionError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::classify(&self.code, &self.message)
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        Self::new("EXECUTION_FAILED", error.to_string())
    }
}

/// 执行错误分类，用于指标统计
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    RateLimit,
    Network,
    Validation,
    NotFound,
    Internal,
    Unknown,
}

impl ErrorCategory {
    /// 根据错误码和错误信息分类
    pub fn classify(code: &str, message: &str) -> Self {
        let text = format!("{} {}", code, message).to_lowercase();

        if text.contains("timeout") || text.contains("timed out") {
            ErrorCategory::Timeout
        } else if text.contains("429") || text.contains("rate limit") || text.contains("rate_limit")
        {
            ErrorCategory::RateLimit
        } else if text.contains("network")
            || text.contains("connection")
            || text.contains("unreachable")
        {
            ErrorCategory::Network
        } else if text.contains("invalid") || text.contains("validation") {
            ErrorCategory::Validation
        } else if text.contains("not found") || text.contains("not_found") || text.contains("404")
        {
            ErrorCategory::NotFound
        } else if text.contains("internal") || text.contains("panic") || text.contains("500") {
            ErrorCategory::Internal
        } else {
            ErrorCategory::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Network => "network",
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Internal => "internal",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
