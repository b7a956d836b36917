//! Backend JSON shapes and their reconciliation into one internal form.
//!
//! The backend reports status either as a nested `status` object or as flat
//! `status_id` / `status_description` fields, and language either as
//! `language.id` or `language_id`. Both are folded into `RawExecutionResult`
//! here and nowhere else.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use recode_common::types::{ExecutionRequest, ExecutionToken, RawExecutionResult, StatusRef};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Field projection used for every polling read
pub const WIDE_FIELDS: &str = "token,stdout,stderr,compile_output,message,time,memory,status,status_id,language,language_id,created_at";

/// Text encoding agreed with the backend through `base64_encoded`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCodec {
    pub base64: bool,
}

impl TextCodec {
    pub fn new(base64: bool) -> Self {
        Self { base64 }
    }

    pub fn query_flag(&self) -> String {
        self.base64.to_string()
    }

    pub fn encode(&self, text: &str) -> String {
        if self.base64 {
            general_purpose::STANDARD.encode(text)
        } else {
            text.to_string()
        }
    }

    /// Decode a backend text field; undecodable input is kept as-is
    pub fn decode(&self, text: Option<String>) -> Option<String> {
        let text = text?;
        if !self.base64 {
            return Some(text);
        }
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match general_purpose::STANDARD.decode(compact.as_bytes()) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(error = %e, "field is not valid base64, keeping raw text");
                Some(text)
            }
        }
    }
}

/// Submission body sent to the backend
#[derive(Debug, Clone, Serialize)]
pub struct WireSubmission {
    pub source_code: String,
    pub language_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

impl WireSubmission {
    pub fn from_request(request: &ExecutionRequest, codec: TextCodec) -> Self {
        Self {
            source_code: codec.encode(&request.source_code),
            language_id: request.language_id,
            stdin: request.stdin.as_deref().map(|s| codec.encode(s)),
            expected_output: request
                .expected_output
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| codec.encode(s)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenItem {
    #[serde(default)]
    pub token: Option<String>,
}

/// Batch submit answers come wrapped or bare depending on backend version
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchTokens {
    Wrapped { submission_tokens: Vec<TokenItem> },
    Bare(Vec<TokenItem>),
}

impl BatchTokens {
    /// Tokens in response order; items without a token are dropped
    pub fn into_tokens(self) -> Vec<ExecutionToken> {
        let items = match self {
            BatchTokens::Wrapped { submission_tokens } => submission_tokens,
            BatchTokens::Bare(items) => items,
        };
        items
            .into_iter()
            .filter_map(|item| item.token)
            .filter(|token| !token.trim().is_empty())
            .map(ExecutionToken::from)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchResults {
    Wrapped { submissions: Vec<WireResult> },
    Bare(Vec<WireResult>),
}

impl BatchResults {
    pub fn into_items(self) -> Vec<WireResult> {
        match self {
            BatchResults::Wrapped { submissions } => submissions,
            BatchResults::Bare(items) => items,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireStatus {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireLanguage {
    #[serde(default)]
    pub id: Option<i32>,
}

/// One job as the backend serialized it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireResult {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub memory: Option<i64>,
    #[serde(default)]
    pub status: Option<WireStatus>,
    #[serde(default)]
    pub status_id: Option<i32>,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub language: Option<WireLanguage>,
    #[serde(default)]
    pub language_id: Option<i32>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Which status layout a payload used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusShape {
    Nested(StatusRef),
    Flat(StatusRef),
    Absent,
}

impl WireResult {
    pub fn status_shape(&self) -> StatusShape {
        match &self.status {
            Some(nested) => {
                // Nested wins, flat fields only fill its gaps
                StatusShape::Nested(StatusRef {
                    id: nested.id.or(self.status_id),
                    description: nested
                        .description
                        .clone()
                        .filter(|d| !d.is_empty())
                        .or_else(|| self.status_description.clone()),
                })
            }
            None if self.status_id.is_some() || self.status_description.is_some() => {
                StatusShape::Flat(StatusRef {
                    id: self.status_id,
                    description: self.status_description.clone(),
                })
            }
            None => StatusShape::Absent,
        }
    }

    pub fn into_raw(self, codec: TextCodec) -> RawExecutionResult {
        let status = match self.status_shape() {
            StatusShape::Nested(status) | StatusShape::Flat(status) => status,
            StatusShape::Absent => StatusRef::default(),
        };
        let language_id = self.language.as_ref().and_then(|l| l.id).or(self.language_id);
        let created_at = self.created_at.as_deref().and_then(parse_timestamp);

        RawExecutionResult {
            token: self
                .token
                .filter(|t| !t.trim().is_empty())
                .map(ExecutionToken::from),
            stdout: codec.decode(self.stdout),
            stderr: codec.decode(self.stderr),
            compile_output: codec.decode(self.compile_output),
            message: codec.decode(self.message),
            time: self.time,
            memory: self.memory,
            status,
            language_id,
            created_at,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> WireResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nested_status() {
        let wire = parse(json!({
            "token": "abc",
            "stdout": "2\n",
            "time": "0.01",
            "memory": 3200,
            "status": {"id": 3, "description": "Accepted"},
            "language": {"id": 71, "name": "Python (3.8.1)"}
        }));
        let raw = wire.into_raw(TextCodec::default());
        assert_eq!(raw.status.id, Some(3));
        assert_eq!(raw.status.description.as_deref(), Some("Accepted"));
        assert_eq!(raw.language_id, Some(71));
        assert_eq!(raw.time.as_deref(), Some("0.01"));
        assert_eq!(raw.memory, Some(3200));
        assert_eq!(raw.token, Some(ExecutionToken::from("abc")));
    }

    #[test]
    fn test_flat_status_is_synthesized() {
        let wire = parse(json!({
            "token": "abc",
            "status_id": 6,
            "status_description": "Compilation Error",
            "language_id": 54,
            "time": 0.5
        }));
        assert!(matches!(wire.status_shape(), StatusShape::Flat(_)));

        let raw = wire.into_raw(TextCodec::default());
        assert_eq!(raw.status.id, Some(6));
        assert_eq!(raw.status.description.as_deref(), Some("Compilation Error"));
        assert_eq!(raw.language_id, Some(54));
        assert_eq!(raw.time.as_deref(), Some("0.5"));
    }

    #[test]
    fn test_nested_status_gaps_filled_from_flat_fields() {
        let wire = parse(json!({
            "status": {"id": null, "description": ""},
            "status_id": 4,
            "status_description": "Wrong Answer"
        }));
        let raw = wire.into_raw(TextCodec::default());
        assert_eq!(raw.status.id, Some(4));
        assert_eq!(raw.status.description.as_deref(), Some("Wrong Answer"));
    }

    #[test]
    fn test_absent_status_and_nulls() {
        let wire = parse(json!({"token": "abc", "stdout": null, "memory": null, "time": null}));
        assert_eq!(wire.status_shape(), StatusShape::Absent);
        let raw = wire.into_raw(TextCodec::default());
        assert_eq!(raw.status, StatusRef::default());
        assert!(raw.stdout.is_none());
        assert!(raw.memory.is_none());
    }

    #[test]
    fn test_created_at_parsing() {
        let raw = parse(json!({"created_at": "2024-03-01T10:00:00.000Z"})).into_raw(TextCodec::default());
        assert!(raw.created_at.is_some());

        let raw = parse(json!({"created_at": "yesterday"})).into_raw(TextCodec::default());
        assert!(raw.created_at.is_none());
    }

    #[test]
    fn test_base64_codec() {
        let codec = TextCodec::new(true);
        assert_eq!(codec.encode("print(1)"), "cHJpbnQoMSk=");
        // backend wraps long base64 output with newlines
        assert_eq!(
            codec.decode(Some("aGVs\nbG8K".to_string())).as_deref(),
            Some("hello\n")
        );
        assert_eq!(codec.decode(Some("%%%".to_string())).as_deref(), Some("%%%"));
        assert_eq!(TextCodec::new(false).encode("x"), "x");
    }

    #[test]
    fn test_submission_body_skips_empty_expected_output() {
        let request = ExecutionRequest::new("print(1)", 71).with_expected_output("");
        let body = serde_json::to_value(WireSubmission::from_request(&request, TextCodec::default())).unwrap();
        assert_eq!(body, json!({"source_code": "print(1)", "language_id": 71}));
    }

    #[test]
    fn test_batch_token_shapes() {
        let bare: BatchTokens = serde_json::from_value(json!([{"token": "a"}, {"token": "b"}])).unwrap();
        assert_eq!(bare.into_tokens().len(), 2);

        let wrapped: BatchTokens =
            serde_json::from_value(json!({"submission_tokens": [{"token": "a"}, {"error": "bad"}]})).unwrap();
        assert_eq!(wrapped.into_tokens(), vec![ExecutionToken::from("a")]);
    }

    #[test]
    fn test_batch_result_shapes() {
        let wrapped: BatchResults =
            serde_json::from_value(json!({"submissions": [{"token": "a", "status": {"id": 3}}]})).unwrap();
        assert_eq!(wrapped.into_items().len(), 1);

        let bare: BatchResults = serde_json::from_value(json!([{"token": "a"}, {"token": "b"}])).unwrap();
        assert_eq!(bare.into_items().len(), 2);
    }
}
