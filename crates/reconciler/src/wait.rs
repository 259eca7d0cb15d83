//! Convergence/readiness poller.
//!
//! Fixed-interval polling, not exponential backoff: the operations waited on
//! (cluster provisioning, CRD establishment, certificate issuance, deletion
//! disappearance) are asynchronous but not externally throttled. Every wait
//! has a caller-supplied budget and fails loudly on expiry - nothing here
//! loops forever.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Budget and cadence for one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
        }
    }
}

/// Poll `probe` at a fixed interval until it reports done or the budget
/// runs out.
///
/// The probe must be a pure status read: it is retried freely and its call
/// count is unspecified beyond `timeout / interval + 1`. A probe error is
/// not retried; status reads that fail are surfaced to the caller.
///
/// # Errors
///
/// - [`Error::TimedOut`] naming `resource`, the elapsed wait and the budget
/// - whatever node-scoped error the probe itself returns
pub async fn wait_until_ready<F, Fut>(
    resource: &str,
    mut probe: F,
    policy: WaitPolicy,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        if probe().await? {
            debug!(resource, polls, waited = ?started.elapsed(), "Readiness confirmed");
            return Ok(());
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            warn!(resource, polls, ?waited, budget = ?policy.timeout, "Readiness wait exhausted");
            return Err(Error::timed_out(resource, waited, policy.timeout));
        }

        sleep(policy.interval).await;
    }
}
