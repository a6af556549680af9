//! Switchyard CLI Tool
//!
//! Command line interface for inspecting and exercising the expert router

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_core::config::defaults::{default_experts, REQUEST_TYPES};
use switchyard_core::config::loader::load_options_from_path;
use switchyard_core::{
    ExecutionError, RequestMetadata, RequestPriority, RouterOptions, ToolRequest,
    DIRECT_FALLBACK_EXPERT_ID,
};
use switchyard_routing::global::default_router_or_init;
use switchyard_routing::{
    should_route_request, should_use_routing, ExpertRouter, HealthState, RoutingDecision,
};
use tracing_subscriber::EnvFilter;

/// 兜底专家的模拟延迟
const DIRECT_SIMULATED_LATENCY: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "A CLI tool for the Switchyard expert router")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "switchyard.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "switchyard_example.toml")]
        output: String,
        /// Include the built-in expert catalogue as an explicit override
        #[arg(long)]
        with_experts: bool,
    },
    /// Route a single request and explain the decision
    Route {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<String>,
        /// Request type, e.g. search, lookup, install
        #[arg(short = 't', long)]
        request_type: String,
        /// Request arguments as JSON
        #[arg(short, long, default_value = "{}")]
        args: String,
        #[arg(short, long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,
        /// Soft latency limit in milliseconds
        #[arg(long)]
        max_latency_ms: Option<u64>,
        /// Caller tier used by the rollout gate
        #[arg(long)]
        tier: Option<String>,
        /// Feature flags as name=true|false; when given the rollout gate is consulted first
        #[arg(long = "flag")]
        flags: Vec<String>,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run simulated traffic through the router and show metrics
    Simulate {
        /// Path to configuration file (built-in defaults when omitted)
        #[arg(short, long)]
        config: Option<String>,
        /// Number of requests to send
        #[arg(short = 'n', long, default_value_t = 200)]
        requests: usize,
        /// Requests executed concurrently per batch
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
        /// Distinct argument payloads per request type
        #[arg(long, default_value_t = 20)]
        distinct: usize,
        /// Probability (0-1) that a simulated execution fails
        #[arg(long, default_value_t = 0.05)]
        failure_rate: f64,
        /// Expert to mark as overloaded before the run
        #[arg(long)]
        overload: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Evaluate the rollout gate for a request type
    Gate {
        /// Request type
        #[arg(short = 't', long)]
        request_type: String,
        /// Feature flags as name=true|false
        #[arg(long = "flag")]
        flags: Vec<String>,
        /// Caller tier
        #[arg(long)]
        tier: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for RequestPriority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::High => RequestPriority::High,
            PriorityArg::Normal => RequestPriority::Normal,
            PriorityArg::Low => RequestPriority::Low,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_options_from_path(&config) {
                Ok(options) => {
                    let experts = options.effective_experts();
                    println!("✅ Configuration is valid");
                    println!(
                        "  - {} experts configured{}",
                        experts.len(),
                        if options.experts.is_none() { " (built-in catalogue)" } else { "" }
                    );
                    println!("  - {} request weight profiles", options.request_weights.len());
                    println!(
                        "  - cache: {} (ttl {}s, max {} entries)",
                        if options.cache.enabled { "enabled" } else { "disabled" },
                        options.cache.ttl_seconds,
                        options.cache.max_entries
                    );
                    println!(
                        "  - fallback: {}",
                        if options.fallback.retry_allowed() { "enabled" } else { "disabled" }
                    );
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output, with_experts } => {
            println!("Generating configuration file: {}", output);
            generate_config_file(&output, with_experts)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Route {
            config,
            request_type,
            args,
            priority,
            max_latency_ms,
            tier,
            flags,
            json,
        } => {
            let arguments: Value = serde_json::from_str(&args)
                .map_err(|e| anyhow::anyhow!("Invalid --args JSON: {}", e))?;
            let mut request = ToolRequest::new("cli-request", request_type, arguments)
                .with_priority(priority.into());
            if let Some(max_latency_ms) = max_latency_ms {
                request = request.with_max_latency(Duration::from_millis(max_latency_ms));
            }
            if tier.is_some() {
                request = request.with_metadata(RequestMetadata {
                    caller_id: None,
                    source: Some("switchyard-cli".to_string()),
                    tier,
                    feature_flags: HashMap::new(),
                });
            }

            if !flags.is_empty() && !should_route_request(&request, &parse_flags(&flags)?) {
                println!(
                    "🚫 Expert routing is disabled for '{}' by feature flags",
                    request.request_type
                );
                return Ok(());
            }

            let router = default_router_or_init(|| load_router_options(config.as_deref()))?;
            router.initialize().await?;
            let decision = router.route(&request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                print_decision(&decision);
            }
            router.shutdown().await;
        }
        Commands::Simulate {
            config,
            requests,
            concurrency,
            distinct,
            failure_rate,
            overload,
            format,
        } => {
            if !(0.0..=1.0).contains(&failure_rate) {
                anyhow::bail!("--failure-rate must be within 0.0..=1.0");
            }
            let router = default_router_or_init(|| load_router_options(config.as_deref()))?;
            router.initialize().await?;

            if let Some(expert_id) = overload.as_deref() {
                if !router.update_expert_health(expert_id, HealthState::Degraded, Some(0.97)) {
                    anyhow::bail!("Unknown expert: {}", expert_id);
                }
                println!("Marked expert '{}' as overloaded", expert_id);
            }

            run_simulation(&router, requests, concurrency.max(1), distinct.max(1), failure_rate)
                .await?;
            show_metrics(&router, format)?;
            router.shutdown().await;
        }
        Commands::Gate {
            request_type,
            flags,
            tier,
        } => {
            let flags = parse_flags(&flags)?;
            if should_use_routing(&request_type, &flags, tier.as_deref()) {
                println!("✅ Expert routing enabled for '{}'", request_type);
            } else {
                println!("🚫 Expert routing disabled for '{}'", request_type);
            }
        }
    }

    Ok(())
}

fn load_router_options(config: Option<&str>) -> Result<RouterOptions> {
    match config {
        Some(path) => load_options_from_path(path),
        None => Ok(RouterOptions::default()),
    }
}

/// 解析 name=true|false 形式的开关
fn parse_flags(flags: &[String]) -> Result<HashMap<String, bool>> {
    flags
        .iter()
        .map(|flag| {
            let (name, value) = flag.split_once('=').ok_or_else(|| {
                anyhow::anyhow!("Invalid flag '{}', expected name=true|false", flag)
            })?;
            let enabled = value
                .trim()
                .parse::<bool>()
                .map_err(|_| anyhow::anyhow!("Invalid value for flag '{}': {}", name, value))?;
            Ok((name.trim().to_string(), enabled))
        })
        .collect()
}

/// 生成配置文件
fn generate_config_file(output_path: &str, with_experts: bool) -> Result<()> {
    let mut options = RouterOptions::default();
    if with_experts {
        options.experts = Some(default_experts());
    }

    let body = toml::to_string_pretty(&options)?;
    let content = format!(
        "# Switchyard router configuration\n\
         # Omit [[experts]] to use the built-in expert catalogue.\n\n{}",
        body
    );
    std::fs::write(output_path, content)?;
    Ok(())
}

fn print_decision(decision: &RoutingDecision) {
    println!("🧭 Routing Decision");
    println!("===================");
    println!("Selected Expert: {}", decision.selected_expert);
    println!("Confidence: {:.2}", decision.confidence);
    println!("Reason: {}", decision.reason);
    println!("Decision Latency: {:?}", decision.decision_latency);
    println!("Cache Hit: {}", decision.cache_hit);
    println!();

    if !decision.candidates.is_empty() {
        println!("📊 Candidate Scores");
        println!("===================");
        for candidate in &decision.candidates {
            let scores = &candidate.scores;
            println!(
                "{:<24} total={:.4} accuracy={:.3} latency={:.3} reliability={:.3} efficiency={:.3}",
                candidate.expert_id,
                scores.total,
                scores.accuracy,
                scores.latency,
                scores.reliability,
                scores.efficiency
            );
        }
        println!();
    }

    for alternative in &decision.alternatives {
        println!(
            "Alternative: {} ({:.4}) - {}",
            alternative.expert_id, alternative.score, alternative.reason
        );
    }
}

fn build_requests(count: usize, distinct: usize) -> Vec<ToolRequest> {
    (0..count)
        .map(|i| {
            let request_type = REQUEST_TYPES[i % REQUEST_TYPES.len()];
            let request = ToolRequest::new(
                format!("sim-{}", i),
                request_type,
                json!({ "query": format!("item-{}", (i / REQUEST_TYPES.len()) % distinct) }),
            );
            // 每16个请求里有一个高优先级请求，绕过缓存
            if i % 16 == 15 {
                request.with_priority(RequestPriority::High)
            } else {
                request
            }
        })
        .collect()
}

async fn run_simulation(
    router: &ExpertRouter,
    count: usize,
    concurrency: usize,
    distinct: usize,
    failure_rate: f64,
) -> Result<()> {
    let registry = router.registry();
    let timeout = router.options().fallback.timeout();
    tracing::debug!("Simulated executor timeout: {:?}", timeout);

    let executor = move |expert_id: String, request: ToolRequest| {
        let latency = registry
            .get(&expert_id)
            .map_or(DIRECT_SIMULATED_LATENCY, |expert| expert.capabilities.avg_latency());
        let fail = rand::random::<f64>() < failure_rate;

        async move {
            let work = async {
                tokio::time::sleep(latency).await;
                if fail {
                    Err(ExecutionError::new(
                        "SIMULATED_FAILURE",
                        format!("injected failure for {} on {}", request.id, expert_id),
                    ))
                } else {
                    Ok(json!({ "expert": expert_id, "request": request.id }))
                }
            };

            match timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
                    Err(ExecutionError::new(
                        "TIMEOUT",
                        format!("execution exceeded {:?}", limit),
                    ))
                }),
                None => work.await,
            }
        }
    };

    let requests = build_requests(count, distinct);
    println!(
        "Simulating {} requests ({} concurrent, failure rate {:.0}%)...",
        requests.len(),
        concurrency,
        failure_rate * 100.0
    );

    let started = Instant::now();
    let mut succeeded = 0usize;
    let mut used_fallback = 0usize;
    for batch in requests.chunks(concurrency) {
        let responses = futures::future::join_all(
            batch
                .iter()
                .map(|request| router.execute_with_routing(request, &executor)),
        )
        .await;

        for response in responses {
            let response = response?;
            if response.success {
                succeeded += 1;
            }
            if response.metadata.used_fallback {
                used_fallback += 1;
            }
        }
    }

    println!(
        "✅ Completed in {:?}: {} succeeded, {} failed, {} used fallback",
        started.elapsed(),
        succeeded,
        requests.len() - succeeded,
        used_fallback
    );
    println!();
    Ok(())
}

fn show_metrics(router: &Arc<ExpertRouter>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let report = json!({
                "metrics": router.get_metrics(),
                "experts": router.get_expert_status(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Prometheus => print_prometheus(router)?,
        OutputFormat::Text => print_metrics(router),
    }
    Ok(())
}

fn print_metrics(router: &ExpertRouter) {
    let metrics = router.get_metrics();

    println!("📊 Routing Metrics");
    println!("==================");
    println!("Total Requests: {}", metrics.total_requests);
    println!("Cache Hit Rate: {:.2}%", metrics.cache_hit_rate * 100.0);
    println!("Cache Bypassed: {}", metrics.cache_bypassed);
    println!("Fallback Decisions: {}", metrics.fallback_decisions);
    println!(
        "Executions: {} ({} failed, {} fallback retries)",
        metrics.total_executions, metrics.failed_executions, metrics.fallback_executions
    );
    println!("Avg Routing Time: {:.3}ms", metrics.avg_routing_time_ms);
    println!("Avg Execution Time: {:.3}ms", metrics.avg_execution_time_ms);
    println!("Speed Improvement: {:.2}x", metrics.speed_improvement);
    if let Some(cache) = &metrics.cache {
        println!("{}", cache);
    }
    println!();

    if let Some(direct) = metrics.executions_by_expert.get(DIRECT_FALLBACK_EXPERT_ID) {
        println!("Direct Fallback Executions: {}", direct);
        println!();
    }

    if !metrics.errors_by_category.is_empty() {
        println!("Errors:");
        for (category, count) in &metrics.errors_by_category {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    println!("🏥 Expert Status");
    println!("================");
    for status in router.get_expert_status() {
        let icon = match status.health {
            HealthState::Healthy => "🟢",
            HealthState::Degraded | HealthState::WarmingUp => "🟡",
            HealthState::Unhealthy => "🔴",
        };
        println!("{} {}", icon, status.expert_id);
        println!("  Health: {}", status.health);
        println!("  Load: {:.2}", status.load);
        println!("  Success Rate: {:.2}%", status.success_rate * 100.0);
        println!(
            "  Decisions: {}",
            metrics
                .requests_by_expert
                .get(&status.expert_id)
                .copied()
                .unwrap_or(0)
        );
        println!(
            "  Executions: {}",
            metrics
                .executions_by_expert
                .get(&status.expert_id)
                .copied()
                .unwrap_or(0)
        );
        if let Some(p95) = status.p95_latency {
            println!("  P95 Latency: {}ms", p95.as_millis());
        }
    }
}

#[cfg(feature = "observability")]
fn print_prometheus(router: &ExpertRouter) -> Result<()> {
    let exporter = switchyard_routing::observability::PrometheusMetrics::new()?;
    print!("{}", exporter.render(router)?);
    Ok(())
}

#[cfg(not(feature = "observability"))]
fn print_prometheus(_router: &ExpertRouter) -> Result<()> {
    anyhow::bail!(
        "Observability feature not enabled. Compile with --features observability to enable Prometheus output."
    )
}
