//! Scenario execution: sequence steps, evaluate checks, record outcomes
//!
//! Assertion failures are non-fatal: a failed check is recorded and the run
//! continues, because later steps are independent probes of the same live
//! instance and still carry diagnostic value. Execution-layer failures
//! (element missing after retries, navigation timeout, transport error on a
//! required step) abort the rest of the scenario, because the deterministic
//! precondition chain is broken.

use std::time::Duration;

use tracing::debug;

use crate::browser::PageDriver;
use crate::error::HarnessError;
use crate::http::{HttpCaller, HttpResponse};
use crate::report::{ConsoleReporter, RunReport, RunSummary, StepOutcome};
use crate::retry::{Exhausted, RetryPolicy};
use crate::scenario::{Action, Check, Scenario, Step};

/// Observable state the most recent action left behind
#[derive(Debug, Default)]
struct Observed {
    /// Last value produced by a `read_value` action
    value: Option<String>,
    /// Last response produced by an `http` action
    http: Option<HttpResponse>,
}

/// Per-run execution context handed back to every retry attempt
struct StepCtx<'d> {
    driver: Option<&'d mut (dyn PageDriver + 'd)>,
    http: &'d HttpCaller,
    base_url: String,
    observed: Observed,
}

/// One step's retryable unit: the run context plus the step being attempted
struct AttemptCtx<'s, 'd> {
    run: &'s mut StepCtx<'d>,
    step: &'s Step,
}

impl<'d> StepCtx<'d> {
    fn driver_for(&mut self, step: &Step) -> Result<&mut (dyn PageDriver + 'd), HarnessError> {
        self.driver
            .as_deref_mut()
            .ok_or_else(|| HarnessError::NoDriver(step.name.clone()))
    }
}

/// Executes one scenario's steps strictly in definition order
pub struct ScenarioExecutor {
    http: HttpCaller,
    reporter: ConsoleReporter,
}

impl Default for ScenarioExecutor {
    fn default() -> Self {
        Self::new(HttpCaller::new())
    }
}

impl ScenarioExecutor {
    pub fn new(http: HttpCaller) -> Self {
        Self {
            http,
            reporter: ConsoleReporter,
        }
    }

    /// Run every step, recording exactly one outcome per attempted step.
    /// `driver` is `None` for API-only scenarios; a browser step in such a
    /// run is a fatal configuration error.
    pub async fn run<'a>(
        &'a self,
        driver: Option<&'a mut (dyn PageDriver + 'a)>,
        scenario: &Scenario,
    ) -> RunReport {
        let mut ctx = StepCtx {
            driver,
            http: &self.http,
            base_url: scenario.target.resolved_base_url(),
            observed: Observed::default(),
        };

        let mut summary = RunSummary::new();
        let mut fatal = None;

        for step in &scenario.steps {
            debug!("Executing step: {}", step.name);

            match self.attempt_action(&mut ctx, step).await {
                Ok(()) => match self.evaluate_checks(&mut ctx, step).await {
                    Ok(failures) if failures.is_empty() => {
                        let outcome = StepOutcome {
                            step: step.name.clone(),
                            passed: true,
                            detail: step.name.clone(),
                        };
                        self.reporter.step(&outcome);
                        summary.record(outcome);
                    }
                    Ok(failures) => {
                        // Assertion failure: recorded, not fatal.
                        let outcome = StepOutcome {
                            step: step.name.clone(),
                            passed: false,
                            detail: format!("{} ({})", step.name, failures.join("; ")),
                        };
                        self.reporter.step(&outcome);
                        summary.record(outcome);
                    }
                    Err(e) => {
                        let outcome = StepOutcome {
                            step: step.name.clone(),
                            passed: false,
                            detail: format!("{}: {}", step.name, e),
                        };
                        self.reporter.step(&outcome);
                        summary.record(outcome);
                        fatal = Some(e);
                        break;
                    }
                },
                Err(e) => {
                    let tolerated = step.tolerate_transport
                        && matches!(e, HarnessError::Transport(_));
                    let outcome = StepOutcome {
                        step: step.name.clone(),
                        passed: false,
                        detail: format!("{}: {}", step.name, e),
                    };
                    self.reporter.step(&outcome);
                    summary.record(outcome);
                    if !tolerated {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }

        RunReport {
            scenario: scenario.name.clone(),
            summary,
            fatal,
        }
    }

    /// Perform the step's action, wrapped by its retry policy. Only
    /// element-stability failures are retried; transport errors and
    /// configuration errors surface immediately.
    async fn attempt_action(
        &self,
        ctx: &mut StepCtx<'_>,
        step: &Step,
    ) -> Result<(), HarnessError> {
        let policy = step
            .retry
            .map(RetryPolicy::from_spec)
            .unwrap_or_else(RetryPolicy::once);

        let mut attempt_ctx = AttemptCtx { run: ctx, step };
        let result = policy
            .run(
                &mut attempt_ctx,
                |c| Box::pin(Self::perform(&mut *c.run, c.step)),
                |e| {
                    matches!(
                        e,
                        HarnessError::ElementNotFound { .. }
                            | HarnessError::NavigationTimeout { .. }
                    )
                },
            )
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(Exhausted { attempts, last }) => Err(match last {
                // Surface the real attempt count, not the bridge's single try.
                HarnessError::ElementNotFound { locator, .. } => {
                    HarnessError::ElementNotFound { locator, attempts }
                }
                HarnessError::NavigationTimeout {
                    trigger,
                    timeout_ms,
                    ..
                } => HarnessError::NavigationTimeout {
                    trigger,
                    timeout_ms,
                    attempts,
                },
                other => other,
            }),
        }
    }

    async fn perform(ctx: &mut StepCtx<'_>, step: &Step) -> Result<(), HarnessError> {
        match &step.action {
            Action::Navigate { path } => {
                let url = format!("{}{}", ctx.base_url, path);
                ctx.driver_for(step)?.goto(&url).await
            }
            Action::Fill { label, value } => {
                ctx.driver_for(step)?.fill_by_label(label, value).await
            }
            Action::Select { label, value } => {
                ctx.driver_for(step)?.select_by_label(label, value).await
            }
            Action::Check { label } => ctx.driver_for(step)?.check_by_label(label).await,
            Action::Click { button, timeout_ms } => {
                ctx.driver_for(step)?
                    .click_and_await(button, *timeout_ms)
                    .await
            }
            Action::WaitFor {
                selector,
                timeout_ms,
            } => {
                ctx.driver_for(step)?
                    .wait_for_selector(selector, *timeout_ms)
                    .await
            }
            Action::ReadValue { label } => {
                let value = ctx.driver_for(step)?.field_value(label).await?;
                ctx.observed.value = Some(value);
                Ok(())
            }
            Action::Http {
                method,
                path,
                url,
                headers,
                body,
                timeout_ms,
            } => {
                let url = match (url, path) {
                    (Some(url), _) => url.clone(),
                    (None, Some(path)) => format!("{}{}", ctx.base_url, path),
                    (None, None) => {
                        return Err(HarnessError::SpecParse(format!(
                            "http step '{}' needs a path or url",
                            step.name
                        )))
                    }
                };
                let response = ctx
                    .http
                    .call(
                        method,
                        &url,
                        headers,
                        body.as_deref(),
                        Duration::from_millis(*timeout_ms),
                    )
                    .await?;
                ctx.observed.http = Some(response);
                Ok(())
            }
            Action::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
        }
    }

    /// Evaluate the step's checks against the observed state. The outer
    /// error is an execution failure (fatal); the inner list holds
    /// human-readable assertion failures (non-fatal).
    async fn evaluate_checks(
        &self,
        ctx: &mut StepCtx<'_>,
        step: &Step,
    ) -> Result<Vec<String>, HarnessError> {
        let mut failures = Vec::new();

        for check in &step.expect {
            match check {
                Check::ContentContains { text } => {
                    let content = ctx.driver_for(step)?.content().await?;
                    if !content.contains(text) {
                        failures.push(format!("page does not contain '{text}'"));
                    }
                }
                Check::ContentLacks { text } => {
                    let content = ctx.driver_for(step)?.content().await?;
                    if content.contains(text) {
                        failures.push(format!("page unexpectedly contains '{text}'"));
                    }
                }
                Check::FieldEquals { label, value } => {
                    let actual = ctx.driver_for(step)?.field_value(label).await?;
                    if &actual != value {
                        failures.push(format!(
                            "field '{label}' holds '{actual}', expected '{value}'"
                        ));
                    }
                }
                Check::ValueEquals { value } => match &ctx.observed.value {
                    Some(actual) if actual == value => {}
                    Some(actual) => {
                        failures.push(format!("read '{actual}', expected '{value}'"));
                    }
                    None => failures.push("no value read before value check".to_string()),
                },
                Check::Status { code } => match &ctx.observed.http {
                    Some(resp) if resp.status == *code => {}
                    Some(resp) => {
                        failures.push(format!("status {}, expected {code}", resp.status));
                    }
                    None => failures.push("no HTTP response observed".to_string()),
                },
                Check::StatusOneOf { codes } => match &ctx.observed.http {
                    Some(resp) if codes.contains(&resp.status) => {}
                    Some(resp) => failures.push(format!(
                        "status {}, expected one of {codes:?}",
                        resp.status
                    )),
                    None => failures.push("no HTTP response observed".to_string()),
                },
                Check::BodyContains { text } => match &ctx.observed.http {
                    Some(resp) if resp.body.contains(text) => {}
                    Some(_) => failures.push(format!("body does not contain '{text}'")),
                    None => failures.push("no HTTP response observed".to_string()),
                },
            }
        }

        Ok(failures)
    }
}
