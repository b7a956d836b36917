//! Remote submission protocol.
//!
//! `ExecutionBackend` is the seam the orchestrators program against.
//! `Judge0Protocol` implements it over HTTP: it encodes the submit and fetch
//! calls and hands back results already folded into one shape by `wire`.

use crate::error::{JudgeError, JudgeResult};
use crate::transport::{HttpTransport, ReadBudget, TransportResponse};
use crate::wire::{BatchResults, BatchTokens, TextCodec, TokenItem, WireResult, WireSubmission, WIDE_FIELDS};
use async_trait::async_trait;
use recode_common::config::JudgeConfig;
use recode_common::types::{
    ExecutionRequest, ExecutionToken, LanguageInfo, RawExecutionResult, StatusInfo,
};
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Queue one job without waiting for it
    async fn submit(&self, request: &ExecutionRequest) -> JudgeResult<ExecutionToken>;

    /// Submit and let the backend hold the call open until the job finishes
    async fn submit_wait(&self, request: &ExecutionRequest) -> JudgeResult<RawExecutionResult>;

    async fn fetch(
        &self,
        token: &ExecutionToken,
        fields: Option<&str>,
    ) -> JudgeResult<RawExecutionResult>;

    /// Queue many jobs in one call; tokens come back in input order
    async fn submit_batch(&self, requests: &[ExecutionRequest]) -> JudgeResult<Vec<ExecutionToken>>;

    /// Read many jobs in one call; tokens the backend did not echo are absent
    async fn fetch_batch(
        &self,
        tokens: &[ExecutionToken],
    ) -> JudgeResult<HashMap<ExecutionToken, RawExecutionResult>>;

    async fn languages(&self) -> JudgeResult<Vec<LanguageInfo>>;

    async fn statuses(&self) -> JudgeResult<Vec<StatusInfo>>;
}

/// HTTP implementation of the backend protocol
#[derive(Debug, Clone)]
pub struct Judge0Protocol {
    transport: HttpTransport,
    codec: TextCodec,
}

impl Judge0Protocol {
    pub fn new(config: &JudgeConfig) -> JudgeResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(config)?,
            codec: TextCodec::new(config.base64_encoded),
        })
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    fn encoding_query(&self) -> (&'static str, String) {
        ("base64_encoded", self.codec.query_flag())
    }

    fn expect_status(response: &TransportResponse, accepted: &[u16]) -> JudgeResult<()> {
        if accepted.contains(&response.status) {
            Ok(())
        } else {
            Err(JudgeError::malformed(
                response.target.clone(),
                format!("unexpected status {} (wanted {:?})", response.status, accepted),
            ))
        }
    }

    fn check_request(request: &ExecutionRequest) -> JudgeResult<()> {
        if request.source_code.trim().is_empty() {
            return Err(JudgeError::InvalidRequest("source code is empty".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ExecutionBackend for Judge0Protocol {
    async fn submit(&self, request: &ExecutionRequest) -> JudgeResult<ExecutionToken> {
        Self::check_request(request)?;
        let body = serde_json::to_value(WireSubmission::from_request(request, self.codec))
            .map_err(|e| JudgeError::InvalidRequest(e.to_string()))?;
        let query = [self.encoding_query(), ("wait", "false".to_string())];

        let response = self
            .transport
            .request(Method::POST, "/submissions", &query, Some(&body), ReadBudget::Standard)
            .await?;
        Self::expect_status(&response, &[201])?;

        let item: TokenItem = response.json()?;
        let token = item
            .token
            .filter(|t| !t.trim().is_empty())
            .map(ExecutionToken::from)
            .ok_or_else(|| JudgeError::malformed(response.target.clone(), "response carries no token"))?;

        debug!(token = %token, language_id = request.language_id, "submission accepted");
        Ok(token)
    }

    async fn submit_wait(&self, request: &ExecutionRequest) -> JudgeResult<RawExecutionResult> {
        Self::check_request(request)?;
        let body = serde_json::to_value(WireSubmission::from_request(request, self.codec))
            .map_err(|e| JudgeError::InvalidRequest(e.to_string()))?;
        let query = [
            self.encoding_query(),
            ("wait", "true".to_string()),
            ("fields", WIDE_FIELDS.to_string()),
        ];

        let response = self
            .transport
            .request(Method::POST, "/submissions", &query, Some(&body), ReadBudget::Unbounded)
            .await?;
        // Waited submits answer 200 or 201 depending on backend version
        Self::expect_status(&response, &[200, 201])?;

        let raw = response.json::<WireResult>()?.into_raw(self.codec);
        if raw.token.is_none() {
            return Err(JudgeError::malformed(
                response.target,
                "waited submission carries no token",
            ));
        }
        Ok(raw)
    }

    async fn fetch(
        &self,
        token: &ExecutionToken,
        fields: Option<&str>,
    ) -> JudgeResult<RawExecutionResult> {
        if token.is_empty() {
            return Err(JudgeError::InvalidRequest("cannot fetch an empty token".to_string()));
        }
        let mut query = vec![self.encoding_query()];
        if let Some(fields) = fields {
            query.push(("fields", fields.to_string()));
        }
        let path = format!("/submissions/{}", token);

        let response = self
            .transport
            .request(Method::GET, &path, &query, None, ReadBudget::Standard)
            .await?;

        let mut raw = response.json::<WireResult>()?.into_raw(self.codec);
        if raw.token.is_none() {
            raw.token = Some(token.clone());
        }
        Ok(raw)
    }

    async fn submit_batch(&self, requests: &[ExecutionRequest]) -> JudgeResult<Vec<ExecutionToken>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for request in requests {
            Self::check_request(request)?;
        }
        let submissions: Vec<WireSubmission> = requests
            .iter()
            .map(|r| WireSubmission::from_request(r, self.codec))
            .collect();
        let body = json!({ "submissions": submissions });
        let query = [self.encoding_query()];

        let response = self
            .transport
            .request(Method::POST, "/submissions/batch", &query, Some(&body), ReadBudget::Standard)
            .await?;
        Self::expect_status(&response, &[201])?;

        let tokens = response.json::<BatchTokens>()?.into_tokens();
        if tokens.len() != requests.len() {
            warn!(
                submitted = requests.len(),
                returned = tokens.len(),
                "batch token count mismatch"
            );
            return Err(JudgeError::malformed(
                response.target,
                format!(
                    "batch returned {} token(s) for {} submission(s)",
                    tokens.len(),
                    requests.len()
                ),
            ));
        }

        info!(count = tokens.len(), "batch accepted");
        Ok(tokens)
    }

    async fn fetch_batch(
        &self,
        tokens: &[ExecutionToken],
    ) -> JudgeResult<HashMap<ExecutionToken, RawExecutionResult>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = tokens
            .iter()
            .map(ExecutionToken::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let query = [
            ("tokens", joined),
            self.encoding_query(),
            ("fields", WIDE_FIELDS.to_string()),
        ];

        let response = self
            .transport
            .request(Method::GET, "/submissions/batch", &query, None, ReadBudget::Unbounded)
            .await?;

        let mut results = HashMap::new();
        for item in response.json::<BatchResults>()?.into_items() {
            let raw = item.into_raw(self.codec);
            // Items identify themselves by token; anything else is unusable
            if let Some(token) = raw.token.clone() {
                results.insert(token, raw);
            }
        }
        Ok(results)
    }

    async fn languages(&self) -> JudgeResult<Vec<LanguageInfo>> {
        let response = self
            .transport
            .request(Method::GET, "/languages", &[], None, ReadBudget::Standard)
            .await?;
        response.json()
    }

    async fn statuses(&self) -> JudgeResult<Vec<StatusInfo>> {
        let response = self
            .transport
            .request(Method::GET, "/statuses", &[], None, ReadBudget::Standard)
            .await?;
        response.json()
    }
}
