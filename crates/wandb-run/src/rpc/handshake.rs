//! Startup handshake: repeat the initial run update until the backend answers.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wandb_proto::RunRecord;

use super::retry::RetryPolicy;
use super::transport::RunTransport;
use crate::error::{RunError, RunResult};

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// Run record as assigned by the backend.
    pub run: RunRecord,
    /// Attempts it took, including the successful one.
    pub attempts: u32,
}

impl Handshake {
    /// Delays slept before the backend answered.
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Send `request` until the backend returns a run, sleeping between attempts.
///
/// Any RPC failure counts as "backend not ready yet". The token is checked
/// before each attempt and after each delay.
pub fn handshake<T: RunTransport + ?Sized>(
    transport: &mut T,
    request: &RunRecord,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RunResult<Handshake> {
    handshake_with_sleep(transport, request, policy, cancel, std::thread::sleep)
}

/// [`handshake`] with an injectable sleep.
pub fn handshake_with_sleep<T, S>(
    transport: &mut T,
    request: &RunRecord,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut sleep: S,
) -> RunResult<Handshake>
where
    T: RunTransport + ?Sized,
    S: FnMut(Duration),
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        attempts = attempts.saturating_add(1);
        let status = match transport.run_update(request.clone()) {
            Ok(result) => {
                if let Some(run) = result.run {
                    info!(
                        "backend ready after {attempts} attempt(s), run id {}",
                        run.run_id
                    );
                    return Ok(Handshake { run, attempts });
                }
                // A reachable backend that refuses the run will not change its mind.
                let message = result
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "no run in response".to_string());
                return Err(RunError::RunRejected(message));
            }
            Err(status) => status,
        };

        if !policy.allows_retry(attempts, started.elapsed()) {
            return Err(RunError::HandshakeExhausted {
                attempts,
                last: status,
            });
        }

        let delay = policy.backoff.delay_for_attempt(attempts);
        debug!(
            "backend not ready (attempt {attempts}): {}; retrying in {delay:?}",
            status.message()
        );
        sleep(delay);
    }
}
