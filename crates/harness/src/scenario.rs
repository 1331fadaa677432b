//! Declarative YAML scenario definitions
//!
//! One scenario is one ordered smoke-test script bound to one target
//! application. Steps address page elements by their accessible label text,
//! never by internal identifiers, which keeps fixtures robust to incidental
//! markup changes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// A complete smoke scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name, typically the application identifier
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Where the application lives
    pub target: Target,

    /// Steps to execute, strictly in order
    pub steps: Vec<Step>,
}

/// Target address for a scenario.
///
/// The base URL can be overridden through an environment variable so the
/// same fixture runs unmodified against local, container, and CI targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Environment variable consulted before `base_url`
    #[serde(default)]
    pub base_url_env: Option<String>,

    /// Default base URL, e.g. `http://localhost:8080`
    pub base_url: String,

    /// Route of the landing page, probed for readiness
    #[serde(default = "default_home_route")]
    pub home_route: String,

    /// Accept any answering status ({200, 302, 401, 403}) during the
    /// readiness probe instead of requiring exactly 200. Used by targets
    /// whose landing page is auth-gated.
    #[serde(default)]
    pub ready_on_any_answer: bool,
}

fn default_home_route() -> String {
    "/".to_string()
}

impl Target {
    /// Resolve the effective base URL, applying the environment override.
    pub fn resolved_base_url(&self) -> String {
        if let Some(var) = &self.base_url_env {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return value;
                }
            }
        }
        self.base_url.clone()
    }

    /// Base URL joined with the home route.
    pub fn home_url(&self) -> String {
        format!("{}{}", self.resolved_base_url(), self.home_route)
    }
}

/// A single scripted action plus its expectations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Short description printed on the [PASS]/[FAIL] line
    pub name: String,

    /// The action to perform, written inline at step level
    #[serde(flatten)]
    pub action: Action,

    /// Checks evaluated against the state the action left behind.
    /// All must hold for the step to pass. An empty list means the step
    /// passes iff the action itself completed.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub expect: Vec<Check>,

    /// Bounded retry for flaky UI interactions (applies to the action only,
    /// never to the checks)
    #[serde(default)]
    pub retry: Option<RetrySpec>,

    /// Treat a transport failure on this step as a failed outcome instead of
    /// aborting the scenario
    #[serde(default)]
    pub tolerate_transport: bool,
}

/// Bounded-by-count retry override for one step
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySpec {
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// A scripted action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Load a route relative to the scenario's base URL
    Navigate { path: String },

    /// Fill an input located by its accessible label
    Fill { label: String, value: String },

    /// Select a dropdown option, locating the control by label
    Select { label: String, value: String },

    /// Check a checkbox located by label
    Check { label: String },

    /// Click a button by its accessible name and suspend until the
    /// resulting page transition completes
    Click {
        button: String,
        #[serde(default = "default_click_timeout_ms")]
        timeout_ms: u64,
    },

    /// Poll for an element's visibility; used when a transition does not
    /// trigger a full navigation (autocomplete panels, growl messages)
    WaitFor {
        selector: String,
        #[serde(default = "default_wait_timeout_ms")]
        timeout_ms: u64,
    },

    /// Read the current value of an input located by label
    ReadValue { label: String },

    /// One request/response through the HTTP collaborator.
    /// `path` is joined to the base URL; `url` is absolute and wins.
    Http {
        method: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },

    /// Fixed pause (use sparingly)
    Sleep { ms: u64 },
}

fn default_click_timeout_ms() -> u64 {
    5000
}

fn default_wait_timeout_ms() -> u64 {
    5000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

/// A predicate over the observable state an action left behind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// Page content contains the text
    ContentContains { text: String },

    /// Page content does not contain the text
    ContentLacks { text: String },

    /// Input located by label currently holds exactly this value
    FieldEquals { label: String, value: String },

    /// The value produced by a preceding `read_value` equals this
    ValueEquals { value: String },

    /// HTTP status equals the code
    Status { code: u16 },

    /// HTTP status is one of the codes
    StatusOneOf { codes: Vec<u16> },

    /// HTTP response body contains the text
    BodyContains { text: String },
}

impl Scenario {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| {
            HarnessError::SpecParse(format!("{}: {}", path.display(), e))
        })
    }

    /// Load every scenario under a directory (recursively, `*.yaml`/`*.yml`)
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// Whether this scenario needs a browser at all. Pure-HTTP scenarios run
    /// through the same executor without spawning the bridge.
    pub fn needs_browser(&self) -> bool {
        self.steps.iter().any(|s| {
            !matches!(s.action, Action::Http { .. } | Action::Sleep { .. })
        })
    }
}
