//! Cancellable poll-until-ready with a fixed interval and ceiling.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::Clock;
use crate::config::ReadinessConfig;
use crate::error::{BootstrapError, Result};

/// Poll interval and ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl From<&ReadinessConfig> for WaitPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self::new(config.poll_interval(), config.timeout())
    }
}

/// Poll `check` until it returns `Ok(true)`.
///
/// The check runs immediately and then once per interval. The last sleep is
/// clipped so the final check lands exactly on the ceiling, which makes a
/// never-ready target fail after `policy.timeout` of clock time.
///
/// Returns the elapsed clock time on success.
///
/// # Errors
///
/// - [`BootstrapError::ReadinessTimeout`] when the ceiling is reached.
/// - [`BootstrapError::Interrupted`] when `cancel` fires.
/// - Any error returned by `check`, unchanged.
pub async fn wait_until<F>(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    policy: WaitPolicy,
    step: &str,
    mut check: F,
) -> Result<Duration>
where
    F: FnMut() -> Result<bool>,
{
    let start = clock.now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BootstrapError::Interrupted);
        }

        attempt += 1;
        let ready = check()?;
        let elapsed = clock.now().saturating_sub(start);

        if ready {
            debug!(step, attempt, elapsed_ms = elapsed.as_millis(), "Ready");
            return Ok(elapsed);
        }
        if elapsed >= policy.timeout {
            return Err(BootstrapError::ReadinessTimeout {
                step: step.to_string(),
                elapsed,
            });
        }

        debug!(step, attempt, elapsed_secs = elapsed.as_secs(), "Not ready yet");

        let nap = policy.interval.min(policy.timeout - elapsed);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BootstrapError::Interrupted),
            () = clock.sleep(nap) => {}
        }
    }
}
