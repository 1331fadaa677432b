//! Readiness probing: wait for the target to answer before running steps
//!
//! Transport failures (connection refused, DNS, socket timeout) are expected
//! while the target boots, so they are swallowed and retried until the
//! deadline. No scenario proceeds against an unready target.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};

/// Which responses count as "the target is up"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AcceptedStatus {
    /// Exactly 200
    #[default]
    Ok,
    /// Any of {200, 302, 401, 403}: a server answered, even if auth-gated
    AnyAnswer,
}

impl AcceptedStatus {
    fn accepts(self, status: u16) -> bool {
        match self {
            AcceptedStatus::Ok => status == 200,
            AcceptedStatus::AnyAnswer => matches!(status, 200 | 302 | 401 | 403),
        }
    }
}

/// Outcome of a successful probe
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub attempts: u32,
    pub elapsed: Duration,
    pub status: u16,
}

/// Deadline-bounded readiness prober.
///
/// Deliberately not built on [`crate::retry::RetryPolicy`]: readiness is
/// bounded by wall clock with an unbounded attempt count, the opposite
/// trade-off from UI-stability retries.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub accept: AcceptedStatus,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            accept: AcceptedStatus::Ok,
        }
    }
}

impl ReadinessProbe {
    pub fn new(timeout: Duration, poll_interval: Duration, accept: AcceptedStatus) -> Self {
        Self {
            timeout,
            poll_interval,
            accept,
        }
    }

    /// Poll `url` until it answers with an accepted status or the deadline
    /// elapses. Never returns success without at least one accepted probe;
    /// never blocks past `timeout` plus one poll interval.
    pub async fn wait_until_ready(
        &self,
        client: &reqwest::Client,
        url: &str,
    ) -> HarnessResult<Readiness> {
        info!("Waiting for {} to become ready...", url);
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            // Clamp each attempt to the time left so a connected but silent
            // target cannot push the return past the deadline.
            let per_request = Duration::from_secs(5)
                .min(self.timeout.saturating_sub(start.elapsed()))
                .max(Duration::from_millis(50));
            let request = client.get(url).timeout(per_request).send().await;

            match request {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if self.accept.accepts(status) {
                        let elapsed = start.elapsed();
                        info!(
                            "Target ready after {} attempt(s) ({:.1?}), status {}",
                            attempts, elapsed, status
                        );
                        return Ok(Readiness {
                            attempts,
                            elapsed,
                            status,
                        });
                    }
                    debug!("probe {} answered {}, not accepted yet", url, status);
                }
                Err(e) => {
                    // Connection refused is the normal state while the
                    // target boots.
                    debug!("probe {} failed: {}", url, e);
                }
            }

            if start.elapsed() >= self.timeout {
                return Err(HarnessError::ReadinessTimeout {
                    target: url.to_string(),
                    elapsed: start.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
