//! Smokebox CLI - Main Entry Point
//!
//! Runs black-box smoke scenarios against deployed demo applications and
//! maps results to pipeline-consumable exit codes.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use smokebox_harness::browser::{Browser, PlaywrightConfig};
use smokebox_harness::probe::{AcceptedStatus, ReadinessProbe};
use smokebox_harness::process::{ProcessVerifier, VerifierConfig};
use smokebox_harness::report::{EXIT_FUNCTIONAL, EXIT_NETWORK};
use smokebox_harness::runner::{aggregate_exit_code, load_scenario_names, Runner, RunnerConfig};

/// Smokebox - black-box smoke verification harness
#[derive(Parser)]
#[command(name = "smokebox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run browser/API smoke scenarios
    Run(RunArgs),

    /// Probe a target for readiness without running any scenario
    Probe(ProbeArgs),

    /// Process-driven verification of a packaged application client
    Verify(VerifyArgs),

    /// List scenarios found in the scenarios directory
    List {
        /// Path to the scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        scenarios: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the scenarios directory
    #[arg(short, long, default_value = "scenarios")]
    scenarios: PathBuf,

    /// Run only the scenario with this name
    #[arg(short, long)]
    name: Option<String>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Readiness deadline in seconds
    #[arg(long, default_value = "60")]
    probe_timeout: u64,

    /// Seconds between readiness attempts
    #[arg(long, default_value = "2")]
    poll_interval: u64,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Run the browser with a visible window instead of headless
    #[arg(long)]
    headed: bool,

    /// Output directory for results.json; omit the file entirely with
    /// --no-results
    #[arg(short, long, default_value = "smoke-results")]
    output: PathBuf,

    /// Skip writing results.json
    #[arg(long)]
    no_results: bool,
}

#[derive(clap::Args)]
struct ProbeArgs {
    /// Target URL to probe
    #[arg(long)]
    url: String,

    /// Deadline in seconds
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Seconds between attempts
    #[arg(long, default_value = "2")]
    poll_interval: u64,

    /// Accept any answering status ({200, 302, 401, 403}) instead of
    /// requiring 200
    #[arg(long)]
    any_answer: bool,
}

#[derive(clap::Args)]
struct VerifyArgs {
    /// Path to the verifier configuration YAML
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let code = match cli.command {
        Commands::Run(args) => run_scenarios(args).await?,
        Commands::Probe(args) => probe_target(args).await,
        Commands::Verify(args) => verify_process(args).await?,
        Commands::List { scenarios } => {
            for name in load_scenario_names(&scenarios)? {
                println!("{name}");
            }
            0
        }
    };

    std::process::exit(code);
}

async fn run_scenarios(args: RunArgs) -> anyhow::Result<i32> {
    let browser = match args.browser.as_str() {
        "firefox" => Browser::Firefox,
        "webkit" => Browser::Webkit,
        _ => Browser::Chromium,
    };

    let config = RunnerConfig {
        scenarios_dir: args.scenarios,
        probe_timeout: Duration::from_secs(args.probe_timeout),
        poll_interval: Duration::from_secs(args.poll_interval),
        playwright: PlaywrightConfig {
            browser,
            headless: !args.headed,
            ..PlaywrightConfig::default()
        },
        output_dir: if args.no_results {
            None
        } else {
            Some(args.output)
        },
    };

    let runner = Runner::new(config);

    let reports = if let Some(name) = args.name {
        vec![runner.run_named(&name).await?]
    } else if let Some(tag) = args.tag {
        runner.run_tagged(&tag).await?
    } else {
        runner.run_all().await?
    };

    runner.write_results(&reports)?;
    Ok(aggregate_exit_code(&reports))
}

async fn probe_target(args: ProbeArgs) -> i32 {
    let accept = if args.any_answer {
        AcceptedStatus::AnyAnswer
    } else {
        AcceptedStatus::Ok
    };
    let probe = ReadinessProbe::new(
        Duration::from_secs(args.timeout),
        Duration::from_secs(args.poll_interval),
        accept,
    );
    let client = reqwest::Client::new();

    match probe.wait_until_ready(&client, &args.url).await {
        Ok(readiness) => {
            println!(
                "Target ready after {} attempt(s) ({:.1?}), status {}",
                readiness.attempts, readiness.elapsed, readiness.status
            );
            0
        }
        Err(e) => {
            eprintln!("[FAIL] {e}");
            if e.is_environmental() {
                EXIT_NETWORK
            } else {
                EXIT_FUNCTIONAL
            }
        }
    }
}

async fn verify_process(args: VerifyArgs) -> anyhow::Result<i32> {
    let config = VerifierConfig::from_file(&args.config)?;
    let verifier = ProcessVerifier::new(config);
    let report = verifier.verify().await;

    println!(
        "Summary: {}/{} tests passed.",
        report.summary.passed(),
        report.summary.total()
    );
    Ok(report.verdict.exit_code())
}
