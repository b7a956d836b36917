//! Scripted in-memory backend for orchestrator tests.
//!
//! Each submitted request is turned into a `FakeJob` by a script. Reads of a
//! job walk through its pending states, then optional sparse terminal reads,
//! then the full result. Calls are counted, and so is the peak number of
//! single-job calls in flight.

use crate::error::{JudgeError, JudgeResult};
use crate::protocol::ExecutionBackend;
use async_trait::async_trait;
use parking_lot::Mutex;
use recode_common::types::{
    ExecutionRequest, ExecutionToken, LanguageInfo, RawExecutionResult, StatusInfo, StatusRef,
    STATUS_ACCEPTED, STATUS_IN_QUEUE, STATUS_PROCESSING,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct FakeJob {
    /// Reads that answer "in queue" or "processing"
    pub pending_reads: u32,
    /// Terminal reads that come back without output fields
    pub sparse_reads: u32,
    pub result: RawExecutionResult,
    pub read_latency: Duration,
    pub reject_submit: bool,
    /// Whether batch reads include this job
    pub in_batch_reads: bool,
}

impl FakeJob {
    pub fn accepted(stdout: impl Into<String>) -> Self {
        Self {
            pending_reads: 1,
            sparse_reads: 0,
            result: RawExecutionResult {
                stdout: Some(stdout.into()),
                time: Some("0.01".to_string()),
                memory: Some(3_200),
                status: StatusRef {
                    id: Some(STATUS_ACCEPTED),
                    description: Some("Accepted".to_string()),
                },
                ..Default::default()
            },
            read_latency: Duration::from_millis(10),
            reject_submit: false,
            in_batch_reads: true,
        }
    }

    pub fn with_status(mut self, id: i32, description: &str) -> Self {
        self.result.status = StatusRef {
            id: Some(id),
            description: Some(description.to_string()),
        };
        self
    }

    pub fn with_pending_reads(mut self, reads: u32) -> Self {
        self.pending_reads = reads;
        self
    }

    pub fn with_sparse_reads(mut self, reads: u32) -> Self {
        self.sparse_reads = reads;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    pub fn rejected(mut self) -> Self {
        self.reject_submit = true;
        self
    }

    pub fn hidden_from_batch(mut self) -> Self {
        self.in_batch_reads = false;
        self
    }

    /// The `n`th read of this job (1-based)
    fn read(&self, token: &ExecutionToken, n: u32) -> RawExecutionResult {
        if n <= self.pending_reads {
            let (id, description) = if n == 1 {
                (STATUS_IN_QUEUE, "In Queue")
            } else {
                (STATUS_PROCESSING, "Processing")
            };
            return RawExecutionResult {
                token: Some(token.clone()),
                status: StatusRef {
                    id: Some(id),
                    description: Some(description.to_string()),
                },
                ..Default::default()
            };
        }

        let mut result = self.result.clone();
        result.token = Some(token.clone());
        if n <= self.pending_reads.saturating_add(self.sparse_reads) {
            result.stdout = None;
            result.stderr = None;
            result.compile_output = None;
            result.status.description = None;
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchFetchMode {
    Normal,
    Fail,
    /// Batch reads never answer
    Hang,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeStats {
    pub submit_calls: usize,
    pub submit_wait_calls: usize,
    pub fetch_calls: usize,
    pub batch_submit_calls: usize,
    pub batch_fetch_calls: usize,
    pub language_calls: usize,
    pub status_calls: usize,
    pub max_in_flight: usize,
}

type Script = Box<dyn Fn(&ExecutionRequest) -> FakeJob + Send + Sync>;

#[derive(Default)]
struct Jobs {
    next_id: usize,
    entries: HashMap<ExecutionToken, (FakeJob, u32)>,
    submitted: Vec<ExecutionRequest>,
}

pub(crate) struct FakeBackend {
    script: Script,
    jobs: Mutex<Jobs>,
    stats: Mutex<FakeStats>,
    in_flight: AtomicUsize,
    catalog_failure: AtomicBool,
    batch_mode: Mutex<BatchFetchMode>,
    catalog_latency: Mutex<Duration>,
    languages: Vec<LanguageInfo>,
    statuses: Vec<StatusInfo>,
}

/// Counts one single-job call as in flight until dropped
struct InFlight<'a>(&'a FakeBackend);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn language(id: i32, name: &str) -> LanguageInfo {
    LanguageInfo {
        id,
        name: name.to_string(),
    }
}

fn status(id: i32, description: &str) -> StatusInfo {
    StatusInfo {
        id,
        description: description.to_string(),
    }
}

impl FakeBackend {
    /// Every job echoes its stdin after one pending read
    pub fn new() -> Self {
        Self::with_script(|request| FakeJob::accepted(request.stdin.clone().unwrap_or_default()))
    }

    pub fn with_script<F>(script: F) -> Self
    where
        F: Fn(&ExecutionRequest) -> FakeJob + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            jobs: Mutex::new(Jobs::default()),
            stats: Mutex::new(FakeStats::default()),
            in_flight: AtomicUsize::new(0),
            catalog_failure: AtomicBool::new(false),
            batch_mode: Mutex::new(BatchFetchMode::Normal),
            catalog_latency: Mutex::new(Duration::ZERO),
            languages: vec![
                language(50, "C (GCC 9.2.0)"),
                language(28, "Python (3.7.0)"),
                language(92, "Python (3.11.2)"),
                language(71, "Python (3.8.1)"),
            ],
            statuses: vec![
                status(1, "In Queue"),
                status(2, "Processing"),
                status(3, "Accepted"),
                status(4, "Wrong Answer"),
                status(5, "Time Limit Exceeded"),
                status(6, "Compilation Error"),
                status(11, "Runtime Error (NZEC)"),
                status(13, "Internal Error"),
            ],
        }
    }

    pub fn with_languages(mut self, languages: Vec<LanguageInfo>) -> Self {
        self.languages = languages;
        self
    }

    pub fn set_catalog_failure(&self, failing: bool) {
        self.catalog_failure.store(failing, Ordering::SeqCst);
    }

    pub fn set_catalog_latency(&self, latency: Duration) {
        *self.catalog_latency.lock() = latency;
    }

    pub fn set_batch_mode(&self, mode: BatchFetchMode) {
        *self.batch_mode.lock() = mode;
    }

    pub fn stats(&self) -> FakeStats {
        self.stats.lock().clone()
    }

    pub fn submitted(&self) -> Vec<ExecutionRequest> {
        self.jobs.lock().submitted.clone()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stats = self.stats.lock();
        stats.max_in_flight = stats.max_in_flight.max(now);
        InFlight(self)
    }

    fn register(&self, request: &ExecutionRequest) -> JudgeResult<ExecutionToken> {
        let job = (self.script)(request);
        if job.reject_submit {
            return Err(JudgeError::rejection(
                "POST /submissions",
                422,
                r#"{"language_id":["language not supported"]}"#,
            ));
        }
        let mut jobs = self.jobs.lock();
        jobs.next_id += 1;
        let token = ExecutionToken::new(format!("tok-{:04}", jobs.next_id));
        jobs.entries.insert(token.clone(), (job, 0));
        jobs.submitted.push(request.clone());
        Ok(token)
    }

    /// Advance the job's read counter and return the job with the new count
    fn next_read(&self, token: &ExecutionToken) -> Option<(FakeJob, u32)> {
        let mut jobs = self.jobs.lock();
        let (job, reads) = jobs.entries.get_mut(token)?;
        *reads += 1;
        Some((job.clone(), *reads))
    }

    async fn catalog_guard(&self, path: &str) -> JudgeResult<()> {
        let latency = *self.catalog_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.catalog_failure.load(Ordering::SeqCst) {
            return Err(JudgeError::Transport {
                target: format!("GET {}", path),
                cause: "connection refused".to_string(),
                attempts: 3,
                connect: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for FakeBackend {
    async fn submit(&self, request: &ExecutionRequest) -> JudgeResult<ExecutionToken> {
        self.stats.lock().submit_calls += 1;
        let _guard = self.enter();
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.register(request)
    }

    async fn submit_wait(&self, request: &ExecutionRequest) -> JudgeResult<RawExecutionResult> {
        self.stats.lock().submit_wait_calls += 1;
        let _guard = self.enter();
        let token = self.register(request)?;

        let mut jobs = self.jobs.lock();
        let Some((job, reads)) = jobs.entries.get_mut(&token) else {
            return Err(JudgeError::malformed("POST /submissions", "job vanished"));
        };
        // The backend held the call until the job left the queue
        *reads = job.pending_reads.saturating_add(1);
        Ok(job.read(&token, *reads))
    }

    async fn fetch(
        &self,
        token: &ExecutionToken,
        _fields: Option<&str>,
    ) -> JudgeResult<RawExecutionResult> {
        self.stats.lock().fetch_calls += 1;
        let _guard = self.enter();

        let Some((job, reads)) = self.next_read(token) else {
            return Err(JudgeError::rejection(
                format!("GET /submissions/{}", token),
                404,
                "not found",
            ));
        };
        tokio::time::sleep(job.read_latency).await;
        Ok(job.read(token, reads))
    }

    async fn submit_batch(&self, requests: &[ExecutionRequest]) -> JudgeResult<Vec<ExecutionToken>> {
        self.stats.lock().batch_submit_calls += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        requests.iter().map(|r| self.register(r)).collect()
    }

    async fn fetch_batch(
        &self,
        tokens: &[ExecutionToken],
    ) -> JudgeResult<HashMap<ExecutionToken, RawExecutionResult>> {
        self.stats.lock().batch_fetch_calls += 1;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mode = *self.batch_mode.lock();
        match mode {
            BatchFetchMode::Normal => {}
            BatchFetchMode::Fail => {
                return Err(JudgeError::rejection(
                    "GET /submissions/batch",
                    503,
                    "batch reads disabled",
                ));
            }
            BatchFetchMode::Hang => std::future::pending::<()>().await,
        }

        let mut found = HashMap::new();
        for token in tokens {
            let visible = self
                .jobs
                .lock()
                .entries
                .get(token)
                .map_or(false, |(job, _)| job.in_batch_reads);
            if !visible {
                continue;
            }
            if let Some((job, reads)) = self.next_read(token) {
                found.insert(token.clone(), job.read(token, reads));
            }
        }
        Ok(found)
    }

    async fn languages(&self) -> JudgeResult<Vec<LanguageInfo>> {
        self.stats.lock().language_calls += 1;
        self.catalog_guard("/languages").await?;
        Ok(self.languages.clone())
    }

    async fn statuses(&self) -> JudgeResult<Vec<StatusInfo>> {
        self.stats.lock().status_calls += 1;
        self.catalog_guard("/statuses").await?;
        Ok(self.statuses.clone())
    }
}
