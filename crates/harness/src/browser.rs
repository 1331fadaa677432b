//! Browser automation collaborator
//!
//! The harness core depends only on the [`PageDriver`] trait; rendering,
//! DOM parsing, and event dispatch all live on the other side of it. The
//! shipped implementation drives Playwright through a long-lived `node`
//! subprocess speaking newline-delimited JSON on stdin/stdout, so page state
//! (filled fields, navigation history) persists across steps.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Narrow interface the step library uses to touch a live rendered page.
///
/// Inputs are addressed by accessible label text and buttons by accessible
/// name, never by internal identifiers. `click_and_await` is the dominant
/// suspension point: it must not return until the resulting transition is
/// observable.
#[async_trait]
pub trait PageDriver: Send {
    async fn goto(&mut self, url: &str) -> HarnessResult<()>;
    async fn content(&mut self) -> HarnessResult<String>;
    async fn fill_by_label(&mut self, label: &str, value: &str) -> HarnessResult<()>;
    async fn select_by_label(&mut self, label: &str, value: &str) -> HarnessResult<()>;
    async fn check_by_label(&mut self, label: &str) -> HarnessResult<()>;
    async fn click_and_await(&mut self, button: &str, timeout_ms: u64) -> HarnessResult<()>;
    async fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> HarnessResult<()>;
    async fn field_value(&mut self, label: &str) -> HarnessResult<String>;
    async fn close(&mut self) -> HarnessResult<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for the Playwright bridge
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Upper bound on waiting for any single bridge reply, on top of the
    /// step's own timeout
    pub reply_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            reply_timeout: Duration::from_secs(30),
        }
    }
}

/// Node-side driver program. One JSON request per line in, one JSON reply
/// per line out.
const BRIDGE_JS: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

(async () => {
  const browserType = process.env.SMOKEBOX_BROWSER || 'chromium';
  const headless = process.env.SMOKEBOX_HEADLESS !== '0';
  const browser = await playwright[browserType].launch({ headless });
  const page = await browser.newPage();

  const reply = (obj) => process.stdout.write(JSON.stringify(obj) + '\n');
  const classify = (err) => {
    const msg = String(err.message || err);
    if (/waitForNavigation|waiting for navigation/i.test(msg)) return 'nav_timeout';
    if (/Timeout|strict mode violation|not found|no element matches/i.test(msg)) return 'not_found';
    if (/net::|NS_ERROR|ECONNREFUSED|ERR_CONNECTION/i.test(msg)) return 'transport';
    return 'other';
  };

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let req;
    try { req = JSON.parse(line); } catch (e) {
      reply({ ok: false, error: 'bad request: ' + e.message, kind: 'other' });
      continue;
    }
    try {
      let result = null;
      switch (req.cmd) {
        case 'goto':
          await page.goto(req.url);
          break;
        case 'content':
          result = await page.content();
          break;
        case 'fill':
          await page.getByLabel(req.label).fill(req.value);
          break;
        case 'select':
          await page.getByLabel(req.label).selectOption(req.value);
          break;
        case 'check':
          await page.getByLabel(req.label).check();
          break;
        case 'click_nav': {
          const nav = page.waitForNavigation({ timeout: req.timeout_ms });
          await page.getByRole('button', { name: req.button }).click({ timeout: req.timeout_ms });
          await nav;
          break;
        }
        case 'wait_selector':
          await page.waitForSelector(req.selector, { timeout: req.timeout_ms });
          break;
        case 'value':
          result = await page.getByLabel(req.label).inputValue();
          break;
        case 'close':
          reply({ ok: true });
          await browser.close();
          process.exit(0);
        default:
          reply({ ok: false, error: 'unknown cmd: ' + req.cmd, kind: 'other' });
          continue;
      }
      reply({ ok: true, result });
    } catch (err) {
      reply({ ok: false, error: String(err.message || err), kind: classify(err) });
    }
  }
  await browser.close();
})();
"#;

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Goto { url: &'a str },
    Content,
    Fill { label: &'a str, value: &'a str },
    Select { label: &'a str, value: &'a str },
    Check { label: &'a str },
    ClickNav { button: &'a str, timeout_ms: u64 },
    WaitSelector { selector: &'a str, timeout_ms: u64 },
    Value { label: &'a str },
    Close,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    ok: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

impl BridgeReply {
    /// Map a failed reply onto the harness error taxonomy. `locator` is the
    /// label/selector/button the command addressed, used in diagnostics.
    fn into_error(self, locator: &str, timeout_ms: u64) -> HarnessError {
        let message = self.error.unwrap_or_else(|| "unknown bridge error".to_string());
        match self.kind.as_deref() {
            Some("not_found") => HarnessError::ElementNotFound {
                locator: locator.to_string(),
                attempts: 1,
            },
            Some("nav_timeout") => HarnessError::NavigationTimeout {
                trigger: locator.to_string(),
                timeout_ms,
                attempts: 1,
            },
            Some("transport") => HarnessError::Transport(message),
            _ => HarnessError::Bridge(message),
        }
    }
}

/// Playwright-backed [`PageDriver`]
pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    reply_timeout: Duration,
    // Keeps the staged driver script alive for the child's lifetime.
    _script_dir: tempfile::TempDir,
}

impl PlaywrightDriver {
    /// Stage the driver script and spawn the node bridge.
    pub async fn spawn(config: PlaywrightConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_JS)?;

        info!("Spawning Playwright bridge ({})", config.browser.as_str());

        let mut child = TokioCommand::new("node")
            .arg(&script_path)
            .env("SMOKEBOX_BROWSER", config.browser.as_str())
            .env("SMOKEBOX_HEADLESS", if config.headless { "1" } else { "0" })
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HarnessError::Bridge(format!("failed to spawn node: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Bridge("bridge stdout unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            reply_timeout: config.reply_timeout,
            _script_dir: script_dir,
        })
    }

    /// Verify Playwright is reachable before spawning anything.
    fn check_playwright_installed() -> HarnessResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::BridgeNotFound),
        }
    }

    /// Send one command and await its reply. `step_timeout_ms` widens the
    /// read deadline for commands that legitimately block (navigation,
    /// selector waits).
    async fn call(
        &mut self,
        command: BridgeCommand<'_>,
        locator: &str,
        step_timeout_ms: u64,
    ) -> HarnessResult<Option<String>> {
        let mut line = serde_json::to_string(&command)?;
        line.push('\n');
        debug!("bridge <- {}", line.trim_end());

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| HarnessError::Bridge(format!("bridge write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| HarnessError::Bridge(format!("bridge flush failed: {e}")))?;

        let deadline = self.reply_timeout + Duration::from_millis(step_timeout_ms);
        let reply = tokio::time::timeout(deadline, self.stdout.next_line())
            .await
            .map_err(|_| HarnessError::NavigationTimeout {
                trigger: locator.to_string(),
                timeout_ms: deadline.as_millis() as u64,
                attempts: 1,
            })?
            .map_err(|e| HarnessError::Bridge(format!("bridge read failed: {e}")))?
            .ok_or_else(|| HarnessError::Bridge("bridge exited unexpectedly".to_string()))?;

        let reply: BridgeReply = serde_json::from_str(&reply)?;
        if reply.ok {
            Ok(reply.result)
        } else {
            Err(reply.into_error(locator, step_timeout_ms))
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        self.call(BridgeCommand::Goto { url }, url, 30_000).await?;
        Ok(())
    }

    async fn content(&mut self) -> HarnessResult<String> {
        let content = self.call(BridgeCommand::Content, "page content", 0).await?;
        content.ok_or_else(|| HarnessError::Bridge("content reply had no payload".to_string()))
    }

    async fn fill_by_label(&mut self, label: &str, value: &str) -> HarnessResult<()> {
        self.call(BridgeCommand::Fill { label, value }, label, 0).await?;
        Ok(())
    }

    async fn select_by_label(&mut self, label: &str, value: &str) -> HarnessResult<()> {
        self.call(BridgeCommand::Select { label, value }, label, 0).await?;
        Ok(())
    }

    async fn check_by_label(&mut self, label: &str) -> HarnessResult<()> {
        self.call(BridgeCommand::Check { label }, label, 0).await?;
        Ok(())
    }

    async fn click_and_await(&mut self, button: &str, timeout_ms: u64) -> HarnessResult<()> {
        self.call(BridgeCommand::ClickNav { button, timeout_ms }, button, timeout_ms)
            .await?;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout_ms: u64) -> HarnessResult<()> {
        self.call(
            BridgeCommand::WaitSelector {
                selector,
                timeout_ms,
            },
            selector,
            timeout_ms,
        )
        .await?;
        Ok(())
    }

    async fn field_value(&mut self, label: &str) -> HarnessResult<String> {
        let value = self.call(BridgeCommand::Value { label }, label, 0).await?;
        value.ok_or_else(|| HarnessError::Bridge("value reply had no payload".to_string()))
    }

    async fn close(&mut self) -> HarnessResult<()> {
        // Best effort: the bridge exits on its own after acking.
        if let Err(e) = self.call(BridgeCommand::Close, "close", 0).await {
            warn!("bridge close failed: {}", e);
        }
        let _ = self.child.wait().await;
        Ok(())
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        // Graceful shutdown first, then force.
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> BridgeReply {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn command_serialization_is_tagged() {
        let cmd = BridgeCommand::Fill {
            label: "Number:",
            value: "1",
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"cmd":"fill","label":"Number:","value":"1"}"#);

        let cmd = BridgeCommand::ClickNav {
            button: "Guess",
            timeout_ms: 5000,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"cmd":"click_nav","button":"Guess","timeout_ms":5000}"#);
    }

    #[test]
    fn not_found_reply_maps_to_element_not_found() {
        let r = reply(r#"{"ok":false,"error":"Timeout 5000ms exceeded","kind":"not_found"}"#);
        match r.into_error("Number:", 5000) {
            HarnessError::ElementNotFound { locator, attempts } => {
                assert_eq!(locator, "Number:");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn nav_timeout_reply_maps_to_navigation_timeout() {
        let r = reply(r#"{"ok":false,"error":"waiting for navigation","kind":"nav_timeout"}"#);
        match r.into_error("Guess", 5000) {
            HarnessError::NavigationTimeout {
                trigger,
                timeout_ms,
                attempts,
            } => {
                assert_eq!(trigger, "Guess");
                assert_eq!(timeout_ms, 5000);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn transport_and_unknown_kinds() {
        let r = reply(r#"{"ok":false,"error":"net::ERR_CONNECTION_REFUSED","kind":"transport"}"#);
        assert!(matches!(r.into_error("/", 0), HarnessError::Transport(_)));

        let r = reply(r#"{"ok":false,"error":"boom"}"#);
        assert!(matches!(r.into_error("/", 0), HarnessError::Bridge(_)));
    }

    #[test]
    fn ok_reply_carries_payload() {
        let r = reply(r#"{"ok":true,"result":"<html>Guess My Number</html>"}"#);
        assert!(r.ok);
        assert_eq!(r.result.as_deref(), Some("<html>Guess My Number</html>"));
    }
}
