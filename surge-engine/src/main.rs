use clap::Parser;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use surge_client::{Client, ClientConfig};
use surge_common::{SurgeError, DEFAULT_BASE_URL};
use surge_engine::engine::stop_reason_name;
use surge_engine::metrics::{self, MetricSnapshot, MetricValue, TrendStrategy};
use surge_engine::pool::{CapacityPolicy, PoolConfig, DEFAULT_MAX_WORKERS};
use surge_engine::presets::Preset;
use surge_engine::scenario_file::ScenarioFile;
use surge_engine::{Engine, EngineConfig, RunResult, Scenario};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status when the run was aborted by the capacity policy.
const EXIT_ABORTED: i32 = 2;
/// Exit status for configuration and setup failures.
const EXIT_SETUP: i32 = 3;

#[derive(Parser)]
#[command(name = "surge", about = "Ramp-driven HTTP load generator")]
struct Args {
    /// Built-in scenario: smoke | load | stress | spike
    #[arg(long, default_value = "smoke")]
    scenario: String,

    /// JSON scenario file; overrides --scenario
    #[arg(long)]
    scenario_file: Option<PathBuf>,

    /// Base URL of the system under test
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Hard cap on concurrent virtual workers
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    max_workers: u32,

    /// What to do when the ramp exceeds --max-workers: clamp | abort
    #[arg(long, default_value = "clamp")]
    capacity_policy: String,

    /// Control loop period in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,

    /// Grace period for in-flight iterations at shutdown
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    graceful_stop: Duration,

    /// Per-request timeout
    #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Keep at most this many samples per trend (reservoir sampling)
    #[arg(long)]
    trend_capacity: Option<usize>,

    /// Override the scenario's total iteration budget
    #[arg(long)]
    iterations: Option<u64>,

    /// Write the metric snapshot and verdict to this file as JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();
    let args = Args::parse();

    let scenario = load_scenario(&args).unwrap_or_else(|e| {
        eprintln!("Invalid scenario: {e}");
        process::exit(EXIT_SETUP);
    });

    let capacity_policy = CapacityPolicy::from_name(&args.capacity_policy).unwrap_or_else(|| {
        eprintln!(
            "Unknown capacity policy {:?}. Valid values: clamp, abort",
            args.capacity_policy
        );
        process::exit(EXIT_SETUP);
    });

    let client_config = ClientConfig { base_url: args.base_url.clone(), timeout: args.timeout };
    let client = Client::new(client_config).unwrap_or_else(|e| {
        eprintln!("Failed to create HTTP client: {e}");
        process::exit(EXIT_SETUP);
    });

    let engine = Engine::new(EngineConfig {
        pool: PoolConfig {
            tick: Duration::from_millis(args.tick_ms),
            max_workers: args.max_workers,
            capacity_policy,
            graceful_stop: args.graceful_stop,
            ..PoolConfig::default()
        },
        trend_strategy: match args.trend_capacity {
            Some(capacity) => TrendStrategy::Reservoir { capacity },
            None => TrendStrategy::Exact,
        },
    });

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping run");
            stop.stop();
        }
    });

    println!(
        "Running {} against {}  |  peak {} workers over {:.0} s",
        scenario.name,
        args.base_url,
        scenario.profile.peak(),
        scenario.profile.total_duration().as_secs_f64(),
    );

    let result = match engine.run(&scenario, Arc::new(client)).await {
        Ok(result) => result,
        Err(e @ SurgeError::CapacityExceeded { .. }) => {
            eprintln!("Run aborted: {e}");
            process::exit(EXIT_ABORTED);
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            process::exit(EXIT_SETUP);
        }
    };

    print_report(&scenario, &result);

    if let Some(path) = &args.summary_json {
        if let Err(e) = write_summary(path, &result) {
            eprintln!("Failed to write summary to {}: {e}", path.display());
        }
    }

    process::exit(result.exit_code());
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_scenario(args: &Args) -> surge_common::Result<Scenario> {
    let scenario = match &args.scenario_file {
        Some(path) => ScenarioFile::load(path)?.into_scenario()?,
        None => {
            let preset = Preset::from_name(&args.scenario).ok_or_else(|| {
                SurgeError::config(format!(
                    "unknown scenario {:?}, valid values: smoke, load, stress, spike",
                    args.scenario
                ))
            })?;
            preset.scenario()?
        }
    };
    Ok(match args.iterations {
        Some(n) => scenario.with_iterations(Some(n)),
        None => scenario,
    })
}

fn write_summary(path: &Path, result: &RunResult) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(&result.summary())?;
    std::fs::write(path, json)
}

fn print_report(scenario: &Scenario, result: &RunResult) {
    let snapshot = &result.snapshot;
    let pass_fail = |passed: bool| if passed { "✓" } else { "✗" };

    println!();
    println!("Surge Load Test Results");
    println!("=======================");
    println!("Scenario:              {}", result.scenario);
    println!("Duration:              {:.1} s", result.report.elapsed.as_secs_f64());
    println!("Stopped by:            {}", stop_reason_name(&result.report.reason));
    println!("Peak workers:          {}", result.report.peak_workers);
    println!();
    println!("Iterations:            {}", format_thousands(snapshot.count(metrics::ITERATIONS)));
    println!("Interrupted:           {}", snapshot.count(metrics::ITERATIONS_INTERRUPTED));
    println!("HTTP requests:         {}", format_thousands(snapshot.count(metrics::HTTP_REQS)));
    println!("Throughput:            {:.1} rps", throughput(snapshot));
    println!(
        "Successful:            {}",
        format_thousands(snapshot.count(metrics::SUCCESSFUL_TRANSACTIONS))
    );
    if let Some(trend) = snapshot.trend(metrics::HTTP_REQ_DURATION) {
        println!(
            "Latency:               avg={:.1} ms  p(95)={:.1} ms  p(99)={:.1} ms",
            trend.avg, trend.p95, trend.p99
        );
    }
    println!();
    println!("Error rate:            {:.2}%", rate_percent(snapshot, metrics::ERRORS));
    println!("  transport:           {}", snapshot.count(metrics::ERRORS_TRANSPORT));
    println!("  check failed:        {}", snapshot.count(metrics::ERRORS_CHECK_FAILED));
    println!("Checks passed:         {:.2}%", rate_percent(snapshot, metrics::CHECKS));
    let prefix = format!("{}{{", metrics::CHECKS);
    for (name, value) in &snapshot.metrics {
        if let (Some(check), MetricValue::Rate(rate)) = (name.strip_prefix(&prefix), value) {
            let check = check.trim_end_matches('}');
            println!(
                "  {} {:<40} {}/{}",
                pass_fail(rate.fails == 0),
                check,
                rate.passes,
                rate.total()
            );
        }
    }

    if !scenario.thresholds.is_empty() {
        println!();
        println!("Thresholds:");
        for rule in &scenario.thresholds {
            let violation = result
                .verdict
                .violations
                .iter()
                .find(|v| v.rule.description == rule.description);
            match violation {
                None => println!("  {} {}", pass_fail(true), rule.description),
                Some(v) => match v.observed {
                    Some(observed) => println!(
                        "  {} {}    [observed: {:.3}]",
                        pass_fail(false),
                        rule.description,
                        observed
                    ),
                    None => {
                        println!("  {} {}    [{}]", pass_fail(false), rule.description, v.reason)
                    }
                },
            }
        }
    }
    println!();
    println!("Result: {}", if result.verdict.passed { "PASS" } else { "FAIL" });
}

fn throughput(snapshot: &MetricSnapshot) -> f64 {
    match snapshot.get(metrics::HTTP_REQS) {
        Some(MetricValue::Counter(c)) => c.per_second,
        _ => 0.0,
    }
}

fn rate_percent(snapshot: &MetricSnapshot, name: &str) -> f64 {
    snapshot.rate(name).map(|r| r.rate * 100.0).unwrap_or(0.0)
}

fn format_thousands(n: u64) -> String {
    if n >= 1_000_000 {
        format!("~{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("~{}K", n / 1_000)
    } else {
        n.to_string()
    }
}
