//! Turns a terminal backend read into the caller-facing result.

use crate::catalog::StatusTable;
use crate::grader::ResultGrader;
use chrono::Utc;
use recode_common::types::{ExecutionRequest, NormalizedExecutionResult, RawExecutionResult};
use tracing::debug;
use uuid::Uuid;

pub const UNKNOWN_STATUS: &str = "unknown";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultNormalizer {
    grader: ResultGrader,
}

impl ResultNormalizer {
    pub fn new(grader: ResultGrader) -> Self {
        Self { grader }
    }

    pub fn grader(&self) -> &ResultGrader {
        &self.grader
    }

    /// Grade `raw` against `request` and fill every caller-visible field.
    ///
    /// **Fallbacks:**
    /// - submission id: derived from the token, random when there is none
    /// - status description: backend text, then the status catalog, then "unknown"
    /// - language: the one the caller asked for
    /// - created_at: the moment of normalization
    pub fn normalize(
        &self,
        raw: RawExecutionResult,
        request: &ExecutionRequest,
        statuses: &StatusTable,
    ) -> NormalizedExecutionResult {
        let submission_id = raw
            .token
            .as_ref()
            .map(|token| token.submission_id())
            .unwrap_or_else(Uuid::new_v4)
            .to_string();

        let status_description = raw
            .status
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| statuses.describe(raw.status.id).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string());

        let verdict = self.grader.grade_detailed(
            raw.status.id,
            raw.stdout.as_deref(),
            request.expected_output.as_deref(),
        );
        debug!(
            submission_id = %submission_id,
            status_id = ?raw.status.id,
            passed = verdict.passed,
            matched_by = ?verdict.matched_by,
            "graded execution"
        );

        NormalizedExecutionResult {
            submission_id,
            token: raw.token,
            stdout: raw.stdout,
            stderr: raw.stderr,
            compile_output: raw.compile_output,
            execution_time: raw.time,
            memory_used: raw.memory,
            status_id: raw.status.id,
            status_description,
            language_id: raw.language_id.unwrap_or(request.language_id),
            success: verdict.passed,
            created_at: raw.created_at.unwrap_or_else(Utc::now),
        }
    }
}
