/// Judge Client - High-Level Orchestration
///
/// **Responsibility:**
/// Give collaborators one object for running code on the remote backend.
///
/// **Architecture:**
/// 1. Resolve the requested runtime (language.rs)
/// 2. Run the job through the poller or batch orchestrator (poller.rs, batch.rs)
/// 3. Grade and normalize the terminal read (normalize.rs, grader.rs)
///
/// This module is the glue layer; it knows nothing about:
/// - How requests are encoded (protocol's job)
/// - How outputs are compared (grader's job)

use crate::batch::{BatchOrchestrator, BatchOutcome, BatchSettings};
use crate::catalog::{CatalogService, StatusTable};
use crate::error::{JudgeError, JudgeResult};
use crate::grader::ResultGrader;
use crate::language::LanguageResolver;
use crate::normalize::ResultNormalizer;
use crate::poller::{hydrate, PollSettings, PollingOrchestrator};
use crate::protocol::{ExecutionBackend, Judge0Protocol};
use recode_common::config::JudgeConfig;
use recode_common::types::{
    ExecutionRequest, LanguageInfo, NormalizedExecutionResult, StatusInfo,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub struct JudgeClient {
    backend: Arc<dyn ExecutionBackend>,
    catalog: CatalogService,
    resolver: LanguageResolver,
    poller: Arc<PollingOrchestrator>,
    batch: BatchOrchestrator,
    normalizer: ResultNormalizer,
}

impl JudgeClient {
    /// Client talking HTTP to the backend described by `config`
    pub fn new(config: &JudgeConfig) -> JudgeResult<Self> {
        config
            .validate()
            .map_err(|e| JudgeError::Configuration(e.to_string()))?;
        let protocol = Judge0Protocol::new(config)?;
        info!(base_url = %config.base_url, base64 = config.base64_encoded, "judge client ready");
        Ok(Self::with_backend(Arc::new(protocol), config))
    }

    /// Client over any backend implementation
    pub fn with_backend(backend: Arc<dyn ExecutionBackend>, config: &JudgeConfig) -> Self {
        let normalizer = ResultNormalizer::new(ResultGrader::default());
        let poller = Arc::new(PollingOrchestrator::new(
            backend.clone(),
            PollSettings::from(config),
        ));
        let batch = BatchOrchestrator::new(
            backend.clone(),
            poller.clone(),
            normalizer,
            BatchSettings::from(config),
        );

        Self {
            catalog: CatalogService::new(backend.clone(), config.catalog_ttl()),
            resolver: LanguageResolver::from_config(config),
            backend,
            poller,
            batch,
            normalizer,
        }
    }

    pub async fn resolve_language(&self, requested: i32) -> i32 {
        self.resolver.resolve(requested, &self.catalog).await
    }

    /// Submit, poll to completion, grade
    pub async fn execute_one(
        &self,
        request: &ExecutionRequest,
    ) -> JudgeResult<NormalizedExecutionResult> {
        let (resolved, statuses) = self.prepare(request).await?;
        let raw = self.poller.execute_one(&resolved, &statuses).await?;
        Ok(self.normalizer.normalize(raw, &resolved, &statuses))
    }

    /// Let the backend hold the submit open until the job finishes; fall back
    /// to polling if it answers before that.
    pub async fn execute_waited(
        &self,
        request: &ExecutionRequest,
    ) -> JudgeResult<NormalizedExecutionResult> {
        let (resolved, statuses) = self.prepare(request).await?;
        let started = Instant::now();
        let raw = self.backend.submit_wait(&resolved).await?;

        let Some(token) = raw.token.clone() else {
            return Err(JudgeError::malformed("waited submit", "result carries no token"));
        };
        let raw = if statuses.is_terminal(&raw) {
            raw
        } else {
            debug!(token = %token, "waited submit returned early, polling");
            self.poller
                .wait_for_terminal(&token, &statuses, started, self.poller.settings().deadline)
                .await?
        };

        let raw = hydrate(self.backend.as_ref(), &token, raw).await;
        Ok(self.normalizer.normalize(raw, &resolved, &statuses))
    }

    /// Run code and return only what it printed
    pub async fn run_stdout(&self, request: &ExecutionRequest) -> JudgeResult<Option<String>> {
        Ok(self.execute_one(request).await?.stdout)
    }

    pub async fn execute_many(
        &self,
        requests: &[ExecutionRequest],
    ) -> JudgeResult<Vec<BatchOutcome>> {
        self.execute_many_within(requests, None).await
    }

    /// `execute_many` with an explicit whole-batch deadline
    pub async fn execute_many_within(
        &self,
        requests: &[ExecutionRequest],
        deadline: Option<Duration>,
    ) -> JudgeResult<Vec<BatchOutcome>> {
        let statuses = self.catalog.status_table().await;
        let mut resolved = Vec::with_capacity(requests.len());
        for request in requests {
            let language_id = self.resolve_language(request.language_id).await;
            resolved.push(request.with_language(language_id));
        }

        self.batch
            .execute_many(&resolved, &statuses, deadline)
            .await
    }

    pub async fn get_languages(&self) -> JudgeResult<Vec<LanguageInfo>> {
        self.catalog.languages().await
    }

    pub async fn get_statuses(&self) -> JudgeResult<Vec<StatusInfo>> {
        self.catalog.statuses().await
    }

    pub async fn status_table(&self) -> StatusTable {
        self.catalog.status_table().await
    }

    async fn prepare(
        &self,
        request: &ExecutionRequest,
    ) -> JudgeResult<(ExecutionRequest, StatusTable)> {
        if request.source_code.trim().is_empty() {
            return Err(JudgeError::InvalidRequest("source code is empty".to_string()));
        }
        let language_id = self.resolve_language(request.language_id).await;
        let statuses = self.catalog.status_table().await;
        Ok((request.with_language(language_id), statuses))
    }
}
