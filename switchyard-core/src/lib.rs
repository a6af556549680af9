//! Switchyard Core Library
//!
//! This library provides the shared model for the Switchyard routing system including:
//! - Expert definitions and router options
//! - Tool request / response types
//! - Error types shared by the engine and its executors

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::model::{
    CacheSettings, ExpertCapabilities, ExpertDefinition, ExpertType, ExternalSettings,
    FallbackSettings, HealthSettings, MetricsSettings, RouterOptions, ScoringSettings,
    WeightProfile, DIRECT_FALLBACK_EXPERT_ID, MAX_EXPERT_PRIORITY,
};
pub use error::{ErrorCategory, ExecutionError, RouterError};
pub use types::{
    ExecutionMetadata, RequestMetadata, RequestPriority, ToolError, ToolRequest, ToolResponse,
};
