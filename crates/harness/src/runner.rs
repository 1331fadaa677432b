//! Orchestration: probe readiness, execute scenarios, report results
//!
//! Each scenario runs to completion or fails; scenarios are independent and
//! never share state. The runner owns the console contract around the
//! executor's per-step lines: start/end banners and the final summary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::browser::{PageDriver, PlaywrightConfig, PlaywrightDriver};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::ScenarioExecutor;
use crate::http::HttpCaller;
use crate::probe::{AcceptedStatus, ReadinessProbe};
use crate::report::{
    ConsoleReporter, RunReport, RunSummary, EXIT_FUNCTIONAL, EXIT_NETWORK, EXIT_OK,
    EXIT_STEP_FAILURES,
};
use crate::scenario::Scenario;

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory of scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Readiness deadline before any step runs
    pub probe_timeout: Duration,

    /// Sleep between readiness attempts
    pub poll_interval: Duration,

    /// Browser bridge settings
    pub playwright: PlaywrightConfig,

    /// Where to write machine-readable results; `None` disables the file
    pub output_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scenarios_dir: PathBuf::from("scenarios"),
            probe_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            playwright: PlaywrightConfig::default(),
            output_dir: Some(PathBuf::from("smoke-results")),
        }
    }
}

/// Runs scenarios end to end: probe, execute, report
pub struct Runner {
    config: RunnerConfig,
    executor: ScenarioExecutor,
    http: HttpCaller,
    reporter: ConsoleReporter,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        let http = HttpCaller::new();
        Self {
            executor: ScenarioExecutor::new(http.clone()),
            http,
            config,
            reporter: ConsoleReporter,
        }
    }

    /// Run every scenario in the configured directory.
    pub async fn run_all(&self) -> HarnessResult<Vec<RunReport>> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios carrying a tag.
    pub async fn run_tagged(&self, tag: &str) -> HarnessResult<Vec<RunReport>> {
        let scenarios: Vec<Scenario> = Scenario::load_all(&self.config.scenarios_dir)?
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect();
        self.run_scenarios(&scenarios).await
    }

    /// Run one scenario by name.
    pub async fn run_named(&self, name: &str) -> HarnessResult<RunReport> {
        let scenario = Scenario::load_all(&self.config.scenarios_dir)?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| HarnessError::SpecParse(format!("scenario not found: {name}")))?;
        Ok(self.run_scenario(&scenario).await)
    }

    async fn run_scenarios(&self, scenarios: &[Scenario]) -> HarnessResult<Vec<RunReport>> {
        info!("Running {} scenario(s)...", scenarios.len());
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            reports.push(self.run_scenario(scenario).await);
        }
        Ok(reports)
    }

    /// Probe the target, then execute. A readiness timeout produces a report
    /// with zero outcomes: no scenario runs against an unready target.
    pub async fn run_scenario(&self, scenario: &Scenario) -> RunReport {
        self.reporter.start_banner();
        debug!("scenario: {}", scenario.name);

        let accept = if scenario.target.ready_on_any_answer {
            AcceptedStatus::AnyAnswer
        } else {
            AcceptedStatus::Ok
        };
        let probe = ReadinessProbe::new(self.config.probe_timeout, self.config.poll_interval, accept);

        let report = match probe
            .wait_until_ready(self.http.client(), &scenario.target.home_url())
            .await
        {
            Err(e) => {
                self.reporter.fatal(&e);
                RunReport {
                    scenario: scenario.name.clone(),
                    summary: RunSummary::new(),
                    fatal: Some(e),
                }
            }
            Ok(_) => self.execute(scenario).await,
        };

        self.reporter.summary(&report.summary);
        self.reporter.end_banner();
        report
    }

    async fn execute(&self, scenario: &Scenario) -> RunReport {
        if !scenario.needs_browser() {
            return self.executor.run(None, scenario).await;
        }

        let mut driver = match PlaywrightDriver::spawn(self.config.playwright.clone()).await {
            Ok(driver) => driver,
            Err(e) => {
                self.reporter.fatal(&e);
                return RunReport {
                    scenario: scenario.name.clone(),
                    summary: RunSummary::new(),
                    fatal: Some(e),
                };
            }
        };

        let report = self
            .executor
            .run(Some(&mut driver as &mut dyn PageDriver), scenario)
            .await;
        let _ = driver.close().await;
        report
    }

    /// Write the machine-readable results file, mirroring the console
    /// aggregate for pipeline consumers that prefer JSON over scraping.
    pub fn write_results(&self, reports: &[RunReport]) -> HarnessResult<Option<PathBuf>> {
        let Some(dir) = &self.config.output_dir else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join("results.json");
        let json = serde_json::to_string_pretty(reports)?;
        std::fs::write(&path, json)?;
        info!("Results written to: {}", path.display());
        Ok(Some(path))
    }
}

/// Worst-outcome exit code across scenario reports: environment problems
/// dominate functional breakage, which dominates plain assertion failures.
pub fn aggregate_exit_code(reports: &[RunReport]) -> i32 {
    let mut code = EXIT_OK;
    for report in reports {
        let this = report.exit_code();
        let severity = |c: i32| match c {
            EXIT_NETWORK => 3,
            EXIT_FUNCTIONAL => 2,
            EXIT_STEP_FAILURES => 1,
            _ => 0,
        };
        if severity(this) > severity(code) {
            code = this;
        }
    }
    code
}

/// Convenience for loading a scenario directory without a full runner,
/// used by listing commands.
pub fn load_scenario_names(dir: &Path) -> HarnessResult<Vec<String>> {
    Ok(Scenario::load_all(dir)?
        .into_iter()
        .map(|s| s.name)
        .collect())
}
