//! Error types for the smoke harness

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`HarnessError`]
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Harness error taxonomy.
///
/// Assertion failures are deliberately absent: they are recorded as failed
/// step outcomes and never propagate as errors. Everything here is either
/// fatal to the running scenario or an ambient conversion.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("target not ready: {target} still unreachable after {elapsed:.1?}")]
    ReadinessTimeout { target: String, elapsed: Duration },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error(
        "no page transition observed within {timeout_ms} ms after '{trigger}' ({attempts} attempt(s))"
    )]
    NavigationTimeout {
        trigger: String,
        timeout_ms: u64,
        attempts: u32,
    },

    #[error("element not found: '{locator}' after {attempts} attempt(s)")]
    ElementNotFound { locator: String, attempts: u32 },

    #[error("browser bridge not available. Install with: npx playwright install")]
    BridgeNotFound,

    #[error("browser bridge protocol error: {0}")]
    Bridge(String),

    #[error("scenario requires a browser but none was attached: step '{0}'")]
    NoDriver(String),

    #[error("external process '{command}' failed: {reason}")]
    ProcessFailed { command: String, reason: String },

    #[error("external process '{command}' timed out after {timeout_secs}s")]
    ProcessTimeout { command: String, timeout_secs: u64 },

    #[error("scenario parse error: {0}")]
    SpecParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    /// Whether this condition stems from the network/environment rather than
    /// from the application under test. The exit policy maps these to a
    /// distinct code so pipeline consumers can tell "app broken" apart from
    /// "app never came up".
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            HarnessError::ReadinessTimeout { .. } | HarnessError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(e: reqwest::Error) -> Self {
        HarnessError::Transport(e.to_string())
    }
}
