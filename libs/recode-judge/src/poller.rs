//! Single-job execution: submit, poll with growing backoff until the job
//! leaves the pending states, then fill in missing output fields once.
//!
//! **Timing:**
//! - the sleep after attempt `n` is `min(base + n * step, max) + jitter`
//! - a sleep never runs past the deadline, and neither does a submit or a
//!   read: one still in flight at the deadline is abandoned
//! - the deadline is checked only after a read came back non-terminal, so a
//!   job that finishes on the last read is still returned

use crate::catalog::StatusTable;
use crate::error::{JudgeError, JudgeResult};
use crate::protocol::ExecutionBackend;
use crate::wire::WIDE_FIELDS;
use rand::Rng;
use recode_common::config::JudgeConfig;
use recode_common::types::{ExecutionRequest, ExecutionToken, RawExecutionResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub deadline: Duration,
    pub base_interval: Duration,
    pub step: Duration,
    pub max_interval: Duration,
    pub jitter: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&JudgeConfig::default())
    }
}

impl From<&JudgeConfig> for PollSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            deadline: config.poll_deadline(),
            base_interval: config.poll_interval(),
            step: config.poll_step(),
            max_interval: config.poll_max_interval(),
            jitter: config.poll_jitter(),
        }
    }
}

impl PollSettings {
    /// Backoff before jitter for the sleep after attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.base_interval + self.step * attempt).min(self.max_interval)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.delay_for(attempt) + Duration::from_millis(extra)
    }
}

pub struct PollingOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    settings: PollSettings,
}

impl PollingOrchestrator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, settings: PollSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Submit one request and wait for its terminal result
    pub async fn execute_one(
        &self,
        request: &ExecutionRequest,
        statuses: &StatusTable,
    ) -> JudgeResult<RawExecutionResult> {
        self.execute_within(request, statuses, self.settings.deadline)
            .await
    }

    /// Same as `execute_one` with an explicit deadline measured from submission
    pub async fn execute_within(
        &self,
        request: &ExecutionRequest,
        statuses: &StatusTable,
        deadline: Duration,
    ) -> JudgeResult<RawExecutionResult> {
        let started = Instant::now();
        let token = match timeout(deadline, self.backend.submit(request)).await {
            Ok(submitted) => submitted?,
            Err(_) => return Err(deadline_reached(Vec::new(), started.elapsed())),
        };
        if token.is_empty() {
            return Err(JudgeError::malformed("submit", "backend returned an empty token"));
        }
        debug!(token = %token, "submitted, polling for result");

        let raw = self
            .wait_for_terminal(&token, statuses, started, deadline)
            .await?;
        Ok(hydrate(self.backend.as_ref(), &token, raw).await)
    }

    /// Poll `token` until its status leaves the pending set or the deadline passes
    pub async fn wait_for_terminal(
        &self,
        token: &ExecutionToken,
        statuses: &StatusTable,
        started: Instant,
        deadline: Duration,
    ) -> JudgeResult<RawExecutionResult> {
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            let raw = match timeout(remaining, self.backend.fetch(token, Some(WIDE_FIELDS))).await {
                Ok(read) => read?,
                Err(_) => {
                    debug!(token = %token, "read still in flight at the deadline");
                    return Err(deadline_reached(vec![token.clone()], started.elapsed()));
                }
            };
            if statuses.is_terminal(&raw) {
                debug!(
                    token = %token,
                    status_id = ?raw.status.id,
                    reads = attempt + 1,
                    "job finished"
                );
                return Ok(raw);
            }

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                debug!(token = %token, status_id = ?raw.status.id, "last read still pending");
                return Err(deadline_reached(vec![token.clone()], elapsed));
            }

            let delay = self.settings.jittered_delay(attempt).min(deadline - elapsed);
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }
}

fn deadline_reached(pending: Vec<ExecutionToken>, elapsed: Duration) -> JudgeError {
    warn!(
        pending = pending.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "polling deadline reached"
    );
    JudgeError::PollTimeout { pending, elapsed }
}

/// One extra read to fill output fields a terminal read left empty.
///
/// A failed read keeps the partial result rather than failing the job.
pub async fn hydrate(
    backend: &dyn ExecutionBackend,
    token: &ExecutionToken,
    mut raw: RawExecutionResult,
) -> RawExecutionResult {
    let missing = raw.missing_output_fields();
    if missing.is_empty() {
        return raw;
    }

    match backend.fetch(token, Some(WIDE_FIELDS)).await {
        Ok(later) => {
            debug!(token = %token, ?missing, "hydrated terminal result");
            raw.merge_missing(later);
        }
        Err(e) => {
            warn!(token = %token, error = %e, ?missing, "hydration read failed, keeping partial result");
        }
    }
    raw
}
