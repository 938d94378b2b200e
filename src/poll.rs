// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Bounded convergence polling.
//!
//! Router state settles at protocol speed, not test speed, and the
//! daemons expose no event to wait on; the only observable is polled
//! state. Callers describe the expected state and we re-probe at a fixed
//! interval until it appears or the attempt budget runs out. Exhaustion
//! is an outcome, not an error: the caller decides pass/fail/skip.

use crate::json_cmp::{json_cmp, Mismatch};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("poll spec must allow at least one attempt")]
    ZeroAttempts,
}

/// Description of a convergence condition: how often to look, and how
/// many times before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSpec {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSpec {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollSpec {
    /// The budget the topology tests run with: 60 attempts, 2s apart.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

/// Result of a poll run. `attempts` counts probe invocations actually
/// made; on failure `last` holds the final observed document and
/// `mismatch` the reason it did not match.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub converged: bool,
    pub attempts: u32,
    pub last: Option<Value>,
    pub mismatch: Option<Mismatch>,
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.converged {
            write!(f, "converged in {} attempt(s)", self.attempts)
        } else {
            match &self.mismatch {
                Some(m) => write!(
                    f,
                    "no convergence after {} attempt(s); last mismatch {}",
                    self.attempts, m
                ),
                None => write!(f, "no convergence after {} attempt(s)", self.attempts),
            }
        }
    }
}

/// Probe until `compare` accepts the observation or the budget runs out.
///
/// No sleep before the first attempt and none after the last. A probe
/// error counts as a non-matching observation for that attempt, since
/// collecting from a still-starting daemon fails transiently; the
/// previous observation (if any) is kept as `last`.
pub async fn poll<P, Fut, C>(
    spec: &PollSpec,
    mut probe: P,
    compare: C,
) -> Result<PollOutcome, PollError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
    C: Fn(&Value) -> Option<Mismatch>,
{
    if spec.max_attempts == 0 {
        return Err(PollError::ZeroAttempts);
    }

    let mut last = None;
    let mut mismatch = None;
    for attempt in 1..=spec.max_attempts {
        match probe().await {
            Ok(observed) => match compare(&observed) {
                None => {
                    return Ok(PollOutcome {
                        converged: true,
                        attempts: attempt,
                        last: Some(observed),
                        mismatch: None,
                    });
                }
                Some(m) => {
                    debug!(attempt, %m, "observation did not match");
                    mismatch = Some(m);
                    last = Some(observed);
                }
            },
            Err(e) => {
                debug!(attempt, error = %e, "probe failed, counting attempt as mismatch");
                mismatch = Some(Mismatch {
                    path: "$".to_string(),
                    expected: Value::String("successful probe".to_string()),
                    actual: Value::String(e.to_string()),
                });
            }
        }
        if attempt < spec.max_attempts {
            sleep(spec.interval).await;
        }
    }

    Ok(PollOutcome {
        converged: false,
        attempts: spec.max_attempts,
        last,
        mismatch,
    })
}

/// Poll a JSON-producing probe against an expected fixture document.
pub async fn poll_json<P, Fut>(
    spec: &PollSpec,
    probe: P,
    expected: &Value,
) -> Result<PollOutcome, PollError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Value>>,
{
    poll(spec, probe, |observed| json_cmp(observed, expected)).await
}
