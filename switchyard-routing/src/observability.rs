//! Prometheus export for routing metrics
//!
//! Only available when the `observability` feature is enabled. Values are
//! copied from a [`MetricsSnapshot`] and the expert statuses, so the exporter
//! never touches the routing path.

use ::prometheus::{Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::routing::{ExpertRouter, ExpertStatus, HealthState, MetricsSnapshot};

const NAMESPACE: &str = "switchyard";

/// Prometheus metrics collector
#[derive(Clone)]
pub struct PrometheusMetrics {
    pub registry: Arc<Registry>,
    pub requests_total: Gauge,
    pub requests_by_type: GaugeVec,
    pub requests_by_expert: GaugeVec,
    pub executions_by_expert: GaugeVec,
    pub cache_hit_rate: Gauge,
    pub cache_entries: Gauge,
    pub executions: GaugeVec,
    pub errors: GaugeVec,
    pub avg_routing_time_seconds: Gauge,
    pub avg_execution_time_seconds: Gauge,
    pub speed_improvement: Gauge,
    pub expert_load: GaugeVec,
    pub expert_success_rate: GaugeVec,
    pub expert_healthy: GaugeVec,
}

fn gauge(name: &str, help: &str) -> Result<Gauge, ::prometheus::Error> {
    Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))
}

fn gauge_vec(name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec, ::prometheus::Error> {
    GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, ::prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let metrics = Self {
            requests_total: gauge("requests_total", "Total number of routed requests")?,
            requests_by_type: gauge_vec(
                "requests_by_type",
                "Routed requests per request type",
                &["request_type"],
            )?,
            requests_by_expert: gauge_vec(
                "requests_by_expert",
                "Routing decisions per selected expert",
                &["expert"],
            )?,
            executions_by_expert: gauge_vec(
                "executions_by_expert",
                "Executor calls per expert, including fallback retries",
                &["expert"],
            )?,
            cache_hit_rate: gauge("cache_hit_rate", "Decision cache hit rate (0-1)")?,
            cache_entries: gauge("cache_entries", "Number of cached routing decisions")?,
            executions: gauge_vec(
                "executions",
                "Executor calls by result",
                &["result"],
            )?,
            errors: gauge_vec(
                "errors",
                "Executor errors by category",
                &["category"],
            )?,
            avg_routing_time_seconds: gauge(
                "avg_routing_time_seconds",
                "Average routing decision time in seconds",
            )?,
            avg_execution_time_seconds: gauge(
                "avg_execution_time_seconds",
                "Average executor time in seconds",
            )?,
            speed_improvement: gauge(
                "speed_improvement",
                "Baseline latency divided by observed routing plus execution latency",
            )?,
            expert_load: gauge_vec("expert_load", "Current expert load (0-1)", &["expert"])?,
            expert_success_rate: gauge_vec(
                "expert_success_rate",
                "Rolling expert success rate (0-1)",
                &["expert"],
            )?,
            expert_healthy: gauge_vec(
                "expert_healthy",
                "Expert health (1 = routable, 0 = unhealthy)",
                &["expert"],
            )?,
            registry,
        };

        metrics
            .registry
            .register(Box::new(metrics.requests_total.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.requests_by_type.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.requests_by_expert.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.executions_by_expert.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.cache_hit_rate.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.cache_entries.clone()))?;
        metrics.registry.register(Box::new(metrics.executions.clone()))?;
        metrics.registry.register(Box::new(metrics.errors.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.avg_routing_time_seconds.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.avg_execution_time_seconds.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.speed_improvement.clone()))?;
        metrics.registry.register(Box::new(metrics.expert_load.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.expert_success_rate.clone()))?;
        metrics
            .registry
            .register(Box::new(metrics.expert_healthy.clone()))?;

        Ok(metrics)
    }

    /// Copy a metrics snapshot and expert statuses into the gauges
    pub fn update(&self, snapshot: &MetricsSnapshot, statuses: &[ExpertStatus]) {
        self.requests_total.set(snapshot.total_requests as f64);

        self.requests_by_type.reset();
        for (request_type, count) in &snapshot.requests_by_type {
            self.requests_by_type
                .with_label_values(&[request_type.as_str()])
                .set(*count as f64);
        }

        self.requests_by_expert.reset();
        for (expert, count) in &snapshot.requests_by_expert {
            self.requests_by_expert
                .with_label_values(&[expert.as_str()])
                .set(*count as f64);
        }

        self.executions_by_expert.reset();
        for (expert, count) in &snapshot.executions_by_expert {
            self.executions_by_expert
                .with_label_values(&[expert.as_str()])
                .set(*count as f64);
        }

        self.cache_hit_rate.set(snapshot.cache_hit_rate);
        self.cache_entries
            .set(snapshot.cache.as_ref().map_or(0.0, |cache| cache.size as f64));

        self.executions
            .with_label_values(&["success"])
            .set(snapshot.successful_executions as f64);
        self.executions
            .with_label_values(&["failure"])
            .set(snapshot.failed_executions as f64);
        self.executions
            .with_label_values(&["fallback"])
            .set(snapshot.fallback_executions as f64);

        self.errors.reset();
        for (category, count) in &snapshot.errors_by_category {
            self.errors
                .with_label_values(&[category.as_str()])
                .set(*count as f64);
        }

        self.avg_routing_time_seconds
            .set(snapshot.avg_routing_time_ms / 1000.0);
        self.avg_execution_time_seconds
            .set(snapshot.avg_execution_time_ms / 1000.0);
        self.speed_improvement.set(snapshot.speed_improvement);

        self.expert_load.reset();
        self.expert_success_rate.reset();
        self.expert_healthy.reset();
        for status in statuses {
            let labels = [status.expert_id.as_str()];
            self.expert_load.with_label_values(&labels).set(status.load);
            self.expert_success_rate
                .with_label_values(&labels)
                .set(status.success_rate);
            self.expert_healthy
                .with_label_values(&labels)
                .set(if status.health == HealthState::Unhealthy {
                    0.0
                } else {
                    1.0
                });
        }
    }

    /// Refresh from a router and render the text exposition format
    pub fn render(&self, router: &ExpertRouter) -> Result<String, ::prometheus::Error> {
        self.update(&router.get_metrics(), &router.get_expert_status());
        self.encode()
    }

    pub fn encode(&self) -> Result<String, ::prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
