//! Smokebox: black-box smoke verification for deployed web applications
//!
//! This crate is the harness engine shared by every per-application smoke
//! scenario:
//! - waits for the target service to become reachable,
//! - replays a fixed sequence of user-facing actions and/or API calls,
//! - asserts expected page content, field values, or HTTP status/body,
//! - reports a pass/fail count and a pipeline-consumable exit code.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Runner                                 │
//! │   ReadinessProbe ── gates ──▶ ScenarioExecutor               │
//! │                                  │                           │
//! │                     Step actions (RetryPolicy-wrapped)       │
//! │                      │                     │                 │
//! │                 PageDriver            HttpCaller             │
//! │              (Playwright bridge)      (reqwest)              │
//! │                                  │                           │
//! │                         StepOutcome ──▶ RunSummary           │
//! │                                  │                           │
//! │                      ConsoleReporter + exit policy           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A secondary mode ([`process::ProcessVerifier`]) exercises deployments
//! through a packaged application client instead of a browser: probe the
//! admin endpoint, check the deployed artifact, run the client, scan its
//! output for known-good markers, and optionally sanity-check database
//! tables.
//!
//! Rendering, DOM handling, the HTTP stack, and external executables are
//! collaborators behind narrow interfaces; the harness never implements
//! them.

pub mod browser;
pub mod error;
pub mod executor;
pub mod http;
pub mod probe;
pub mod process;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scenario;

pub use error::{HarnessError, HarnessResult};
pub use executor::ScenarioExecutor;
pub use report::{RunReport, RunSummary, StepOutcome};
pub use runner::{Runner, RunnerConfig};
pub use scenario::{Action, Check, Scenario, Step};
