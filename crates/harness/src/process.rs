//! Process-driven verification (secondary mode)
//!
//! Some deployments are exercised through a packaged application client
//! rather than a browser: boot check, deployed-artifact check, run the
//! client executable, scan its console output for known-good markers, and
//! optionally sanity-check that database tables were created. The harness
//! supplies arguments and interprets exit code plus text output; it never
//! implements the client or the database tool.
//!
//! Deliberate asymmetry: client correctness is load-bearing, table existence
//! is advisory. A database-check failure downgrades the printed summary and
//! the exit code to the advisory code, never to a functional failure.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::http::HttpCaller;
use crate::report::{
    ConsoleReporter, RunSummary, StepOutcome, EXIT_ADVISORY, EXIT_FUNCTIONAL, EXIT_NETWORK,
    EXIT_OK,
};

/// Configuration for one process-driven verification, parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Application identifier
    pub name: String,

    /// Admin/management endpoint probed first; must answer 200
    pub admin_url: String,

    /// Candidate locations of the deployed artifact; any one existing passes
    pub artifact_paths: Vec<PathBuf>,

    /// The external client to invoke
    pub client: ClientCommand,

    /// Hard wall-clock limit on the client run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Domain marker strings expected in client stdout (case-insensitive)
    #[serde(default)]
    pub markers: Vec<String>,

    /// Case-insensitive regex patterns for output plausibility
    #[serde(default)]
    pub plausibility_patterns: Vec<String>,

    /// Minimum pattern matches for output to count as validated
    #[serde(default = "default_min_pattern_matches")]
    pub min_pattern_matches: usize,

    /// Optional best-effort database table check
    #[serde(default)]
    pub database: Option<DatabaseCheck>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_min_pattern_matches() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCheck {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Table names expected somewhere in the tool's output
    pub expected_tables: Vec<String>,
}

impl VerifierConfig {
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    pub fn from_file(path: &std::path::Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| HarnessError::SpecParse(format!("{}: {}", path.display(), e)))
    }
}

/// Classification of a failed client run, derived from its combined output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    /// Client class/binary not found on the assembled path
    MissingClientClass,
    /// Server not answering at the client's configured address
    ConnectionRefused,
    /// Remote component lookup failed; likely not deployed
    LookupFailed,
    /// Persistence layer reported an error; check database connectivity
    PersistenceFailure,
    /// Naming/registry misconfiguration
    NamingFailure,
    Unknown,
}

impl Diagnosis {
    /// Classify common failure modes from the client's combined output.
    pub fn classify(output: &str) -> Self {
        let text = output.to_lowercase();
        if text.contains("classnotfoundexception") {
            Diagnosis::MissingClientClass
        } else if text.contains("connection") && text.contains("refused") {
            Diagnosis::ConnectionRefused
        } else if text.contains("lookup") && text.contains("failed") {
            Diagnosis::LookupFailed
        } else if text.contains("persistence") && text.contains("exception") {
            Diagnosis::PersistenceFailure
        } else if text.contains("naming") && text.contains("exception") {
            Diagnosis::NamingFailure
        } else {
            Diagnosis::Unknown
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Diagnosis::MissingClientClass => "client class not found on classpath",
            Diagnosis::ConnectionRefused => "connection refused, server may not be running",
            Diagnosis::LookupFailed => "component lookup failed, application may not be deployed",
            Diagnosis::PersistenceFailure => "persistence issue, check database connectivity",
            Diagnosis::NamingFailure => "naming service issue, check registry configuration",
            Diagnosis::Unknown => "unknown error, check application logs",
        }
    }
}

/// Captured client invocation, read-only after creation
#[derive(Debug, Clone, Serialize)]
pub struct ProcessVerificationResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub matched_markers: Vec<String>,
    pub diagnosis: Diagnosis,
}

/// Overall verdict of a process-driven verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    /// Exit 0 but sparse markers; marker absence alone does not prove
    /// malfunction
    PassedWithWarning,
    /// Everything load-bearing passed, the advisory database check did not
    AdvisoryFailed,
    /// Application or client is broken
    Functional,
    /// Environment never became reachable
    Network,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Passed | Verdict::PassedWithWarning => EXIT_OK,
            Verdict::AdvisoryFailed => EXIT_ADVISORY,
            Verdict::Functional => EXIT_FUNCTIONAL,
            Verdict::Network => EXIT_NETWORK,
        }
    }
}

/// Final report: verdict plus whatever was observed along the way
#[derive(Debug, Serialize)]
pub struct VerifierReport {
    pub name: String,
    pub verdict: Verdict,
    pub summary: RunSummary,
    pub result: Option<ProcessVerificationResult>,
}

/// Scan stdout for expected markers, case-insensitively.
pub fn scan_markers(stdout: &str, markers: &[String]) -> Vec<String> {
    let haystack = stdout.to_lowercase();
    markers
        .iter()
        .filter(|m| haystack.contains(&m.to_lowercase()))
        .cloned()
        .collect()
}

/// Count how many plausibility patterns match and compare against the
/// minimum. Invalid patterns are skipped with a warning rather than failing
/// the run; a broken fixture regex must not flip a healthy app to red.
pub fn output_plausible(stdout: &str, patterns: &[String], min_matches: usize) -> bool {
    let mut found = 0;
    for pattern in patterns {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => {
                if re.is_match(stdout) {
                    found += 1;
                }
            }
            Err(e) => warn!("skipping invalid plausibility pattern '{}': {}", pattern, e),
        }
    }
    found >= min_matches
}

/// Drives `ServerCheck -> DeploymentCheck -> ClientInvocation -> MarkerScan
/// -> OptionalDatabaseCheck -> Done`
pub struct ProcessVerifier {
    config: VerifierConfig,
    http: HttpCaller,
    reporter: ConsoleReporter,
}

impl ProcessVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            http: HttpCaller::new(),
            reporter: ConsoleReporter,
        }
    }

    pub async fn verify(&self) -> VerifierReport {
        let mut summary = RunSummary::new();

        // ServerCheck: transport failure is an environment problem, a wrong
        // status is the application's.
        match self
            .http
            .call(
                "GET",
                &self.config.admin_url,
                &BTreeMap::new(),
                None,
                Duration::from_secs(10),
            )
            .await
        {
            Err(e) => {
                self.record(&mut summary, "Server check", false, format!("{e}"));
                return self.report(Verdict::Network, summary, None);
            }
            Ok(resp) if resp.status != 200 => {
                self.record(
                    &mut summary,
                    "Server check",
                    false,
                    format!("admin endpoint returned status {}", resp.status),
                );
                return self.report(Verdict::Functional, summary, None);
            }
            Ok(_) => {
                self.record(
                    &mut summary,
                    "Server check",
                    true,
                    "Server is running".to_string(),
                );
            }
        }

        // DeploymentCheck
        let deployed = self.config.artifact_paths.iter().find(|p| p.exists());
        match deployed {
            Some(path) => {
                debug!("found deployed artifact: {}", path.display());
                self.record(
                    &mut summary,
                    "Deployment check",
                    true,
                    "Application is deployed".to_string(),
                );
            }
            None => {
                self.record(
                    &mut summary,
                    "Deployment check",
                    false,
                    "Application not deployed".to_string(),
                );
                return self.report(Verdict::Functional, summary, None);
            }
        }

        // ClientInvocation
        self.reporter.info("Running application client test driver...");
        let result = match self.invoke_client().await {
            Ok(result) => result,
            Err(e) => {
                self.record(&mut summary, "Client invocation", false, format!("{e}"));
                return self.report(Verdict::Functional, summary, None);
            }
        };

        if result.exit_code != Some(0) {
            self.record(
                &mut summary,
                "Client invocation",
                false,
                format!(
                    "client exited with {:?}: {}",
                    result.exit_code,
                    result.diagnosis.describe()
                ),
            );
            return self.report(Verdict::Functional, summary, Some(result));
        }
        self.record(
            &mut summary,
            "Client invocation",
            true,
            "Application client exited successfully (return code 0)".to_string(),
        );

        // MarkerScan: exit 0 with sparse markers is a pass with a warning,
        // not a failure.
        let mut verdict = Verdict::Passed;
        if result.matched_markers.is_empty() {
            self.reporter
                .warn("No expected operation markers found in output");
            verdict = Verdict::PassedWithWarning;
        } else {
            self.record(
                &mut summary,
                "Marker scan",
                true,
                format!(
                    "Found {}/{} expected operation marker(s)",
                    result.matched_markers.len(),
                    self.config.markers.len()
                ),
            );
            if result.matched_markers.len() < self.config.markers.len() {
                self.reporter
                    .warn("Some expected operation markers were absent");
                verdict = Verdict::PassedWithWarning;
            }
            if output_plausible(
                &result.stdout,
                &self.config.plausibility_patterns,
                self.config.min_pattern_matches,
            ) {
                self.reporter.info("Client output validated successfully");
            } else if !self.config.plausibility_patterns.is_empty() {
                self.reporter
                    .warn("Client completed but output validation failed");
                verdict = Verdict::PassedWithWarning;
            }
        }

        // OptionalDatabaseCheck: advisory only.
        if let Some(db) = &self.config.database {
            self.reporter.info("Verifying database persistence...");
            if self.database_tables_present(db).await {
                self.record(
                    &mut summary,
                    "Database check",
                    true,
                    format!("Found expected database tables: {:?}", db.expected_tables),
                );
            } else {
                self.reporter
                    .warn("Database verification failed - continuing anyway");
                verdict = Verdict::AdvisoryFailed;
            }
        }

        self.report(verdict, summary, Some(result))
    }

    async fn invoke_client(&self) -> HarnessResult<ProcessVerificationResult> {
        let client = &self.config.client;
        debug!("invoking client: {} {:?}", client.program, client.args);

        let mut command = TokioCommand::new(&client.program);
        command
            .args(&client.args)
            .envs(&client.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            command.output(),
        )
        .await
        .map_err(|_| HarnessError::ProcessTimeout {
            command: client.program.clone(),
            timeout_secs: self.config.timeout_secs,
        })?
        .map_err(|e| HarnessError::ProcessFailed {
            command: client.program.clone(),
            reason: e.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let matched_markers = scan_markers(&stdout, &self.config.markers);
        let diagnosis = if output.status.success() {
            Diagnosis::Unknown
        } else {
            Diagnosis::classify(&format!("{stdout}{stderr}"))
        };

        Ok(ProcessVerificationResult {
            exit_code: output.status.code(),
            stdout,
            stderr,
            matched_markers,
            diagnosis,
        })
    }

    /// Best effort: any failure here (spawn error, non-zero exit, missing
    /// tables) reports `false` and never escalates.
    async fn database_tables_present(&self, db: &DatabaseCheck) -> bool {
        let output = TokioCommand::new(&db.program)
            .args(&db.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!(
                    "database tool exited with {:?}: {}",
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr)
                );
                return false;
            }
            Err(e) => {
                debug!("database tool failed to start: {}", e);
                return false;
            }
        };

        let text = String::from_utf8_lossy(&output.stdout).to_lowercase();
        db.expected_tables
            .iter()
            .all(|table| text.contains(&table.to_lowercase()))
    }

    fn record(&self, summary: &mut RunSummary, step: &str, passed: bool, detail: String) {
        let outcome = StepOutcome {
            step: step.to_string(),
            passed,
            detail,
        };
        self.reporter.step(&outcome);
        summary.record(outcome);
    }

    fn report(
        &self,
        verdict: Verdict,
        summary: RunSummary,
        result: Option<ProcessVerificationResult>,
    ) -> VerifierReport {
        VerifierReport {
            name: self.config.name.clone(),
            verdict,
            summary,
            result,
        }
    }
}
