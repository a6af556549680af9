pub mod cache;
pub mod external;
pub mod gate;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod router;
pub mod scoring;
pub mod traits;
pub mod types;

#[cfg(test)]
mod router_tests;

pub use cache::{fingerprint, CacheStats, DecisionCache};
pub use external::OutcomeForwarder;
pub use gate::{should_route_request, should_use_routing};
pub use health::{ActiveRequestGuard, ExpertStatus, HealthState, HealthTracker};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use monitor::HealthMonitor;
pub use registry::ExpertRegistry;
pub use router::ExpertRouter;
pub use scoring::{confidence, ScoreBreakdown, ScoringEngine};
pub use traits::{
    ExecutionOutcome, ExternalRouter, ExternalRouterFactory, NullExternalRouter, ToolExecutor,
};
pub use types::{Alternative, CandidateScore, RoutingDecision};
