//! Switchyard Routing Library
//!
//! This library routes tool requests to the best-suited expert backend including:
//! - Expert registry and multi-factor scoring
//! - Decision caching
//! - Health and load tracking
//! - Fallback-aware execution and metrics collection

pub mod global;
#[cfg(feature = "observability")]
pub mod observability;
pub mod routing;

// Re-export commonly used types
pub use routing::{
    fingerprint, should_route_request, should_use_routing, Alternative, CacheStats,
    CandidateScore, DecisionCache, ExecutionOutcome, ExpertRegistry, ExpertRouter, ExpertStatus,
    ExternalRouter, ExternalRouterFactory, HealthMonitor, HealthState, HealthTracker,
    MetricsCollector, MetricsSnapshot, NullExternalRouter, RoutingDecision, ScoreBreakdown,
    ScoringEngine, ToolExecutor,
};
