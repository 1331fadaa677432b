//! Executor behavior against an in-memory page driver
//!
//! The PageDriver seam exists exactly so these tests need no browser: the
//! fake simulates a small form application and records every interaction.

use std::collections::HashMap;

use async_trait::async_trait;
use smokebox_harness::browser::PageDriver;
use smokebox_harness::error::{HarnessError, HarnessResult};
use smokebox_harness::executor::ScenarioExecutor;
use smokebox_harness::scenario::Scenario;

/// Simulates a one-form demo app: a text input labeled "Enter a string:"
/// and a "Submit" button that echoes the input back into the page.
#[derive(Default)]
struct FakeDriver {
    fields: HashMap<String, String>,
    content: String,
    /// Calls until `wait_for_selector` starts succeeding
    selector_flaky_for: u32,
    wait_calls: u32,
    field_reads: u32,
}

impl FakeDriver {
    fn known_label(&self, label: &str) -> HarnessResult<()> {
        if label == "Enter a string:" {
            Ok(())
        } else {
            Err(HarnessError::ElementNotFound {
                locator: label.to_string(),
                attempts: 1,
            })
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn goto(&mut self, _url: &str) -> HarnessResult<()> {
        self.content = "<h1>Smoke Form</h1><label>Enter a string:</label>".to_string();
        self.fields
            .insert("Enter a string:".to_string(), String::new());
        Ok(())
    }

    async fn content(&mut self) -> HarnessResult<String> {
        Ok(self.content.clone())
    }

    async fn fill_by_label(&mut self, label: &str, value: &str) -> HarnessResult<()> {
        self.known_label(label)?;
        self.fields.insert(label.to_string(), value.to_string());
        Ok(())
    }

    async fn select_by_label(&mut self, label: &str, _value: &str) -> HarnessResult<()> {
        self.known_label(label)
    }

    async fn check_by_label(&mut self, label: &str) -> HarnessResult<()> {
        self.known_label(label)
    }

    async fn click_and_await(&mut self, button: &str, timeout_ms: u64) -> HarnessResult<()> {
        if button != "Submit" {
            return Err(HarnessError::NavigationTimeout {
                trigger: button.to_string(),
                timeout_ms,
                attempts: 1,
            });
        }
        let value = self
            .fields
            .get("Enter a string:")
            .cloned()
            .unwrap_or_default();
        self.content = format!("<h1>Smoke Form</h1><p>You entered: {value}</p>");
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout_ms: u64) -> HarnessResult<()> {
        self.wait_calls += 1;
        if self.wait_calls > self.selector_flaky_for {
            Ok(())
        } else {
            Err(HarnessError::ElementNotFound {
                locator: selector.to_string(),
                attempts: 1,
            })
        }
    }

    async fn field_value(&mut self, label: &str) -> HarnessResult<String> {
        self.known_label(label)?;
        self.field_reads += 1;
        Ok(self.fields.get(label).cloned().unwrap_or_default())
    }

    async fn close(&mut self) -> HarnessResult<()> {
        Ok(())
    }
}

fn scenario(yaml: &str) -> Scenario {
    Scenario::from_yaml(yaml).expect("fixture parses")
}

#[tokio::test]
async fn fill_submit_assert_round_trip_passes() {
    let mut driver = FakeDriver::default();
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: smoke-form
target:
  base_url: http://localhost:8080
steps:
  - name: Page loaded successfully and contains expected text.
    action: navigate
    path: /form
    expect:
      - content_contains:
          text: Smoke Form
  - name: Fill the input
    action: fill
    label: "Enter a string:"
    value: Smoke Test
  - name: Submitted text displayed correctly.
    action: click
    button: Submit
    expect:
      - content_contains:
          text: Smoke Test
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    assert!(report.fatal.is_none());
    assert_eq!(report.summary.total(), 3);
    assert_eq!(report.summary.passed(), 3);
    assert!(report.summary.outcomes().iter().all(|o| o.passed));
}

#[tokio::test]
async fn assertion_failure_is_recorded_and_execution_continues() {
    let mut driver = FakeDriver::default();
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: continues-after-failed-check
target:
  base_url: http://localhost:8080
steps:
  - name: Error displayed correctly.
    action: navigate
    path: /form
    expect:
      - content_contains:
          text: Invalid guess
  - name: Page still contains the heading.
    action: navigate
    path: /form
    expect:
      - content_contains:
          text: Smoke Form
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    assert!(report.fatal.is_none());
    assert_eq!(report.summary.total(), 2);
    assert_eq!(report.summary.passed(), 1);
    assert!(!report.summary.outcomes()[0].passed);
    assert!(report.summary.outcomes()[1].passed);
}

#[tokio::test]
async fn execution_failure_aborts_and_skipped_steps_are_absent() {
    let mut driver = FakeDriver::default();
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: aborts-on-missing-element
target:
  base_url: http://localhost:8080
steps:
  - name: Page loads
    action: navigate
    path: /form
  - name: Fill a field that does not exist
    action: fill
    label: "No such label:"
    value: whatever
  - name: Never attempted
    action: navigate
    path: /form
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    match &report.fatal {
        Some(HarnessError::ElementNotFound { locator, .. }) => {
            assert_eq!(locator, "No such label:");
        }
        other => panic!("expected ElementNotFound, got {other:?}"),
    }
    // The failing step was attempted and recorded; the third never was.
    assert_eq!(report.summary.total(), 2);
    assert_eq!(report.summary.passed(), 1);
}

#[tokio::test]
async fn flaky_selector_succeeds_within_retry_budget() {
    let mut driver = FakeDriver {
        selector_flaky_for: 3,
        ..FakeDriver::default()
    };
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: flaky-panel
target:
  base_url: http://localhost:8080
steps:
  - name: Autocomplete panel appears
    action: wait_for
    selector: '#panel'
    timeout_ms: 100
    retry:
      max_attempts: 10
      delay_ms: 1
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    assert!(report.fatal.is_none());
    assert_eq!(report.summary.passed(), 1);
    assert_eq!(driver.wait_calls, 4);
}

#[tokio::test]
async fn exhausted_retries_surface_the_attempt_count() {
    let mut driver = FakeDriver {
        selector_flaky_for: u32::MAX,
        ..FakeDriver::default()
    };
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: panel-never-appears
target:
  base_url: http://localhost:8080
steps:
  - name: Autocomplete panel appears
    action: wait_for
    selector: '#panel'
    timeout_ms: 100
    retry:
      max_attempts: 3
      delay_ms: 1
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    match &report.fatal {
        Some(HarnessError::ElementNotFound { locator, attempts }) => {
            assert_eq!(locator, "#panel");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected ElementNotFound, got {other:?}"),
    }
    assert_eq!(driver.wait_calls, 3);
}

#[tokio::test]
async fn exhausted_navigation_surfaces_the_attempt_count() {
    let mut driver = FakeDriver::default();
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: button-never-navigates
target:
  base_url: http://localhost:8080
steps:
  - name: Page loads
    action: navigate
    path: /form
  - name: Click a button that never navigates
    action: click
    button: Missing
    timeout_ms: 100
    retry:
      max_attempts: 2
      delay_ms: 1
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    match &report.fatal {
        Some(HarnessError::NavigationTimeout {
            trigger, attempts, ..
        }) => {
            assert_eq!(trigger, "Missing");
            assert_eq!(*attempts, 2);
        }
        other => panic!("expected NavigationTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn read_value_is_idempotent_without_intervening_mutation() {
    let mut driver = FakeDriver::default();
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: read-twice
target:
  base_url: http://localhost:8080
steps:
  - name: Page loads
    action: navigate
    path: /form
  - name: Fill the input
    action: fill
    label: "Enter a string:"
    value: "42"
  - name: First read
    action: read_value
    label: "Enter a string:"
    expect:
      - value_equals:
          value: "42"
  - name: Second read matches the first
    action: read_value
    label: "Enter a string:"
    expect:
      - value_equals:
          value: "42"
      - field_equals:
          label: "Enter a string:"
          value: "42"
"#,
    );

    let report = executor.run(Some(&mut driver), &scenario).await;
    assert!(report.fatal.is_none());
    assert_eq!(report.summary.total(), 4);
    assert_eq!(report.summary.passed(), 4);
}

#[tokio::test]
async fn browser_step_without_driver_is_fatal() {
    let executor = ScenarioExecutor::default();

    let scenario = scenario(
        r#"
name: misconfigured
target:
  base_url: http://localhost:8080
steps:
  - name: Needs a browser
    action: navigate
    path: /form
"#,
    );

    let report = executor.run(None, &scenario).await;
    assert!(matches!(report.fatal, Some(HarnessError::NoDriver(_))));
    assert_eq!(report.summary.total(), 1);
    assert_eq!(report.summary.passed(), 0);
}

#[tokio::test]
async fn rerun_against_reset_target_is_deterministic() {
    let executor = ScenarioExecutor::default();
    let scenario = scenario(
        r#"
name: deterministic
target:
  base_url: http://localhost:8080
steps:
  - name: Page loaded successfully and contains expected text.
    action: navigate
    path: /form
    expect:
      - content_contains:
          text: Smoke Form
  - name: Fill the input
    action: fill
    label: "Enter a string:"
    value: Smoke Test
  - name: Submitted text displayed correctly.
    action: click
    button: Submit
    expect:
      - content_contains:
          text: Smoke Test
"#,
    );

    let mut first_driver = FakeDriver::default();
    let first = executor.run(Some(&mut first_driver), &scenario).await;

    let mut second_driver = FakeDriver::default();
    let second = executor.run(Some(&mut second_driver), &scenario).await;

    assert_eq!(first.summary.total(), second.summary.total());
    assert_eq!(first.summary.passed(), second.summary.passed());
    for (a, b) in first
        .summary
        .outcomes()
        .iter()
        .zip(second.summary.outcomes())
    {
        assert_eq!(a.passed, b.passed);
        assert_eq!(a.detail, b.detail);
    }
}
