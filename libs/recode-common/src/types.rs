use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Backend status id for a job waiting in the queue
pub const STATUS_IN_QUEUE: i32 = 1;
/// Backend status id for a job currently running
pub const STATUS_PROCESSING: i32 = 2;
/// Backend status id for a job that ran and exited cleanly
pub const STATUS_ACCEPTED: i32 = 3;

/// One piece of source code to run on the remote backend.
///
/// Built once by the caller and only read afterwards; orchestrators borrow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language_id: i32,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub expected_output: Option<String>,
}

impl ExecutionRequest {
    pub fn new(source_code: impl Into<String>, language_id: i32) -> Self {
        Self {
            source_code: source_code.into(),
            language_id,
            stdin: None,
            expected_output: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    /// Same request aimed at a different runtime (used after language resolution)
    pub fn with_language(&self, language_id: i32) -> Self {
        Self {
            language_id,
            ..self.clone()
        }
    }
}

/// Opaque job identifier handed out by the backend on submit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionToken(String);

impl ExecutionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Stable submission id derived from the token
    pub fn submission_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.0.as_bytes())
    }
}

impl fmt::Display for ExecutionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ExecutionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle status as reported by the backend.
///
/// Only `id` decides lifecycle state; `description` is cosmetic and may lag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRef {
    pub id: Option<i32>,
    pub description: Option<String>,
}

/// A backend read of one job, already reconciled into a single shape.
///
/// Intermediate reads may leave any field other than `status.id` empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExecutionResult {
    pub token: Option<ExecutionToken>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub message: Option<String>,
    pub time: Option<String>,
    pub memory: Option<i64>,
    pub status: StatusRef,
    pub language_id: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn fill_text(slot: &mut Option<String>, incoming: Option<String>) {
    if is_blank(slot) && !is_blank(&incoming) {
        *slot = incoming;
    }
}

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

impl RawExecutionResult {
    pub fn status_id(&self) -> Option<i32> {
        self.status.id
    }

    pub fn has_stdout(&self) -> bool {
        !is_blank(&self.stdout)
    }

    /// Names of the output fields a hydration read should try to fill
    pub fn missing_output_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.stdout) {
            missing.push("stdout");
        }
        if is_blank(&self.stderr) {
            missing.push("stderr");
        }
        if is_blank(&self.compile_output) {
            missing.push("compile_output");
        }
        if is_blank(&self.status.description) {
            missing.push("status_description");
        }
        missing
    }

    pub fn needs_hydration(&self) -> bool {
        !self.missing_output_fields().is_empty()
    }

    /// Fill fields that are still empty from a later read.
    ///
    /// Populated fields are never overwritten, even if `other` disagrees.
    pub fn merge_missing(&mut self, other: RawExecutionResult) {
        fill(&mut self.token, other.token);
        fill_text(&mut self.stdout, other.stdout);
        fill_text(&mut self.stderr, other.stderr);
        fill_text(&mut self.compile_output, other.compile_output);
        fill_text(&mut self.message, other.message);
        fill_text(&mut self.time, other.time);
        fill(&mut self.memory, other.memory);
        fill(&mut self.status.id, other.status.id);
        fill_text(&mut self.status.description, other.status.description);
        fill(&mut self.language_id, other.language_id);
        fill(&mut self.created_at, other.created_at);
    }
}

/// Caller-facing result of one execution, graded and with fallbacks applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedExecutionResult {
    pub submission_id: String,
    pub token: Option<ExecutionToken>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    pub execution_time: Option<String>,
    pub memory_used: Option<i64>,
    pub status_id: Option<i32>,
    pub status_description: String,
    pub language_id: i32,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Entry of the backend's language catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub id: i32,
    pub name: String,
}

/// Entry of the backend's status catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub id: i32,
    pub description: String,
}
