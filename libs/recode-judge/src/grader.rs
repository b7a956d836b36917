/// Result Grader - Output Equivalence Checking
///
/// **Core Responsibility:**
/// Decide whether a finished execution produced the expected output.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP or the backend protocol
/// - Pure function: (status, stdout, expected) → verdict
/// - Never panics on arbitrary output
///
/// **Grading Rules (first match wins):**
/// 1. Status must be Accepted; anything else fails
/// 2. No expected output means any accepted run passes
/// 3. Both sides are normalized (CRLF → LF, trimmed); an empty side fails
/// 4. Exact match of the normalized text
/// 5. Match after deleting all whitespace
/// 6. Both sides parse as literals that compare equal (floats within 1e-6,
///    sets and dicts in any order)
/// 7. Last non-blank lines match after deleting whitespace
///
/// Step 7 forgives debug prints before the answer.

use crate::literal::{literals_equal, parse_literal};
use recode_common::types::STATUS_ACCEPTED;

pub const DEFAULT_FLOAT_EPS: f64 = 1e-6;

/// Which rule declared two outputs equivalent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Equivalence {
    Exact,
    Whitespace,
    Literal,
    LastLine,
    /// No expected output was given
    Unchecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeOutcome {
    pub passed: bool,
    pub matched_by: Option<Equivalence>,
}

impl GradeOutcome {
    fn failed() -> Self {
        Self {
            passed: false,
            matched_by: None,
        }
    }

    fn passed(by: Equivalence) -> Self {
        Self {
            passed: true,
            matched_by: Some(by),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultGrader {
    float_eps: f64,
}

impl Default for ResultGrader {
    fn default() -> Self {
        Self::new(DEFAULT_FLOAT_EPS)
    }
}

/// Normalize output for comparison
///
/// **Normalization Rules:**
/// - Line endings unified to `\n`
/// - Leading and trailing whitespace trimmed
/// - Empty after trimming means "no value"
fn normalize_output(output: &str) -> Option<String> {
    let unified = output.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(strip_whitespace)
        .find(|line| !line.is_empty())
}

impl ResultGrader {
    pub fn new(float_eps: f64) -> Self {
        Self { float_eps }
    }

    /// Pass/fail verdict for one finished execution
    pub fn grade(&self, status_id: Option<i32>, stdout: Option<&str>, expected: Option<&str>) -> bool {
        self.grade_detailed(status_id, stdout, expected).passed
    }

    /// Verdict plus the rule that matched
    pub fn grade_detailed(
        &self,
        status_id: Option<i32>,
        stdout: Option<&str>,
        expected: Option<&str>,
    ) -> GradeOutcome {
        if status_id != Some(STATUS_ACCEPTED) {
            return GradeOutcome::failed();
        }
        let Some(expected) = expected else {
            return GradeOutcome::passed(Equivalence::Unchecked);
        };

        match self.outputs_match(expected, stdout.unwrap_or_default()) {
            Some(by) => GradeOutcome::passed(by),
            None => GradeOutcome::failed(),
        }
    }

    /// Compare two outputs, returning the first rule under which they agree
    pub fn outputs_match(&self, expected: &str, actual: &str) -> Option<Equivalence> {
        let expected = normalize_output(expected)?;
        let actual = normalize_output(actual)?;

        if expected == actual {
            return Some(Equivalence::Exact);
        }

        if strip_whitespace(&expected) == strip_whitespace(&actual) {
            return Some(Equivalence::Whitespace);
        }

        if let (Some(a), Some(b)) = (parse_literal(&expected), parse_literal(&actual)) {
            if literals_equal(&a, &b, self.float_eps) {
                return Some(Equivalence::Literal);
            }
        }

        match (last_line(&expected), last_line(&actual)) {
            (Some(a), Some(b)) if a == b => Some(Equivalence::LastLine),
            _ => None,
        }
    }
}
