//! Many-job execution with results in input order.
//!
//! **Small batches** (at most `small_batch_threshold` requests) run one full
//! submit-and-poll flow per request, at most `small_batch_concurrency` at a
//! time. Each request gets its own outcome, so one failure does not sink the
//! others.
//!
//! **Large batches** use one batch submit and then sweep: a batch read for
//! every pending token, single reads for tokens the batch read did not
//! return, hydration for terminal results missing output, and a pause before
//! the next sweep. Single reads and hydration share a bound of
//! `fallback_fetch_concurrency`. A batch submit failure fails the whole call.
//! The batch submit and every sweep run under the time left before the
//! deadline, so a hung read cannot hold the call past it.

use crate::catalog::StatusTable;
use crate::error::{JudgeError, JudgeResult};
use crate::normalize::ResultNormalizer;
use crate::poller::{hydrate, PollingOrchestrator};
use crate::protocol::ExecutionBackend;
use crate::wire::WIDE_FIELDS;
use futures_util::future::join_all;
use recode_common::config::JudgeConfig;
use recode_common::types::{
    ExecutionRequest, ExecutionToken, NormalizedExecutionResult, RawExecutionResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Outcome for one request of a batch
pub type BatchOutcome = JudgeResult<NormalizedExecutionResult>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    pub small_batch_threshold: usize,
    pub small_batch_concurrency: usize,
    pub fallback_fetch_concurrency: usize,
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&JudgeConfig::default())
    }
}

impl From<&JudgeConfig> for BatchSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            small_batch_threshold: config.small_batch_threshold,
            small_batch_concurrency: config.small_batch_concurrency.max(1),
            fallback_fetch_concurrency: config.fallback_fetch_concurrency.max(1),
            deadline: config.batch_deadline(),
            poll_interval: config.batch_poll_interval(),
        }
    }
}

pub struct BatchOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    poller: Arc<PollingOrchestrator>,
    normalizer: ResultNormalizer,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        poller: Arc<PollingOrchestrator>,
        normalizer: ResultNormalizer,
        settings: BatchSettings,
    ) -> Self {
        Self {
            backend,
            poller,
            normalizer,
            settings,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Run every request; the outer error is reserved for whole-batch failures
    pub async fn execute_many(
        &self,
        requests: &[ExecutionRequest],
        statuses: &StatusTable,
        deadline: Option<Duration>,
    ) -> JudgeResult<Vec<BatchOutcome>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let deadline = deadline.unwrap_or(self.settings.deadline);

        if requests.len() <= self.settings.small_batch_threshold {
            debug!(count = requests.len(), "running small batch as parallel flows");
            Ok(self.run_small(requests, statuses, deadline).await)
        } else {
            debug!(count = requests.len(), "running large batch through batch endpoints");
            self.run_large(requests, statuses, deadline).await
        }
    }

    async fn run_small(
        &self,
        requests: &[ExecutionRequest],
        statuses: &StatusTable,
        deadline: Duration,
    ) -> Vec<BatchOutcome> {
        let started = Instant::now();
        let permits = Semaphore::new(self.settings.small_batch_concurrency);
        let permits = &permits;

        let flows = requests.iter().enumerate().map(|(index, request)| async move {
            let _permit = permits
                .acquire()
                .await
                .map_err(|_| JudgeError::Configuration("batch permits closed".to_string()))?;

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(JudgeError::PollTimeout {
                    pending: Vec::new(),
                    elapsed,
                });
            }
            let remaining = (deadline - elapsed).min(self.poller.settings().deadline);

            match self.poller.execute_within(request, statuses, remaining).await {
                Ok(raw) => Ok(self.normalizer.normalize(raw, request, statuses)),
                Err(e) => {
                    warn!(index, error = %e, "batch item failed");
                    Err(e)
                }
            }
        });

        join_all(flows).await
    }

    async fn run_large(
        &self,
        requests: &[ExecutionRequest],
        statuses: &StatusTable,
        deadline: Duration,
    ) -> JudgeResult<Vec<BatchOutcome>> {
        let started = Instant::now();
        let tokens = match timeout(deadline, self.backend.submit_batch(requests)).await {
            Ok(submitted) => submitted?,
            Err(_) => return Err(deadline_reached(Vec::new(), started.elapsed())),
        };
        if tokens.len() != requests.len() {
            return Err(JudgeError::malformed(
                "batch submit",
                format!("{} token(s) for {} submission(s)", tokens.len(), requests.len()),
            ));
        }

        let positions: HashMap<ExecutionToken, usize> = tokens
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, token)| (token, index))
            .collect();
        if positions.len() != tokens.len() {
            return Err(JudgeError::malformed("batch submit", "duplicate tokens"));
        }

        let mut slots: Vec<Option<RawExecutionResult>> = vec![None; tokens.len()];
        let mut pending = tokens;
        let fetch_permits = Semaphore::new(self.settings.fallback_fetch_concurrency);
        let mut sweep = 0u32;

        loop {
            sweep += 1;
            let remaining = deadline.saturating_sub(started.elapsed());
            let swept = timeout(remaining, self.sweep(&pending, statuses, &fetch_permits)).await;
            let (finished, still_pending) = match swept {
                Ok(swept) => swept,
                Err(_) => {
                    debug!(sweep, "sweep still in flight at the deadline");
                    return Err(deadline_reached(pending, started.elapsed()));
                }
            };
            let resolved = finished.len();
            for (token, raw) in finished {
                if let Some(&index) = positions.get(&token) {
                    slots[index] = Some(raw);
                }
            }

            pending = still_pending;
            pending.sort_by_key(|token| positions.get(token).copied().unwrap_or(usize::MAX));
            debug!(sweep, resolved, pending = pending.len(), "batch sweep done");

            if pending.is_empty() {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= deadline {
                return Err(deadline_reached(pending, elapsed));
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - elapsed)).await;
        }

        info!(count = slots.len(), sweeps = sweep, "batch complete");
        Ok(slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| match slot {
                Some(raw) => Ok(self.normalizer.normalize(raw, request, statuses)),
                None => Err(JudgeError::malformed("batch", "result slot left empty")),
            })
            .collect())
    }

    /// One pass over `pending`: returns terminal (hydrated) results and the
    /// tokens that are still running.
    async fn sweep(
        &self,
        pending: &[ExecutionToken],
        statuses: &StatusTable,
        fetch_permits: &Semaphore,
    ) -> (Vec<(ExecutionToken, RawExecutionResult)>, Vec<ExecutionToken>) {
        let mut terminal = Vec::new();
        let mut running = Vec::new();
        let mut unresolved = Vec::new();

        match self.backend.fetch_batch(pending).await {
            Ok(mut found) => {
                for token in pending {
                    match found.remove(token) {
                        Some(raw) if statuses.is_terminal(&raw) => terminal.push((token.clone(), raw)),
                        Some(_) => running.push(token.clone()),
                        None => unresolved.push(token.clone()),
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, tokens = pending.len(), "batch read failed, falling back to single reads");
                unresolved = pending.to_vec();
            }
        }

        if !unresolved.is_empty() {
            debug!(count = unresolved.len(), "reading tokens individually");
        }
        let backend = self.backend.as_ref();
        let singles = join_all(unresolved.into_iter().map(|token| async move {
            let outcome = match fetch_permits.acquire().await {
                Ok(_permit) => backend.fetch(&token, Some(WIDE_FIELDS)).await,
                Err(_) => Err(JudgeError::Configuration("fetch permits closed".to_string())),
            };
            (token, outcome)
        }))
        .await;

        for (token, outcome) in singles {
            match outcome {
                Ok(raw) if statuses.is_terminal(&raw) => terminal.push((token, raw)),
                Ok(_) => running.push(token),
                Err(e) => {
                    warn!(token = %token, error = %e, "single read failed, retrying next sweep");
                    running.push(token);
                }
            }
        }

        let hydrated = join_all(terminal.into_iter().map(|(token, raw)| async move {
            if !raw.needs_hydration() {
                return (token, raw);
            }
            let raw = match fetch_permits.acquire().await {
                Ok(_permit) => hydrate(backend, &token, raw).await,
                Err(_) => raw,
            };
            (token, raw)
        }))
        .await;

        (hydrated, running)
    }
}

fn deadline_reached(pending: Vec<ExecutionToken>, elapsed: Duration) -> JudgeError {
    warn!(
        pending = pending.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "batch deadline reached"
    );
    JudgeError::PollTimeout { pending, elapsed }
}
