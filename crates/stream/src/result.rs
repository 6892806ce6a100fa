use std::sync::LazyLock;

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

#[allow(clippy::expect_used)]
static RESULT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"type"\s*:\s*"result""#).expect("result prefix pattern compiles")
});

/// Token accounting reported with a structured result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub output_tokens: u64,
}

/// The structured result object an agent prints when a turn finishes.
///
/// Fields beyond these are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
}

/// A parsed result and the byte offset just past its closing brace.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedResult {
    pub result: TurnResult,
    pub end: usize,
}

/// Outcome of looking for a result object in accumulated output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultScan {
    /// A balanced object that parsed.
    Complete(ExtractedResult),
    /// An object has started at `start` but its braces are not balanced yet.
    Partial { start: usize },
    Absent,
}

/// Look for a complete structured result object in `text`.
///
/// Starts at each `{"type":"result"` prefix and balances braces from there
/// (ignoring braces inside JSON strings). Only a balanced candidate is
/// parsed; a candidate that fails to parse is skipped, not reported.
pub fn scan_result(text: &str) -> ResultScan {
    for m in RESULT_START.find_iter(text) {
        let start = m.start();
        let Some(len) = balanced_len(&text[start..]) else {
            return ResultScan::Partial { start };
        };
        let candidate = &text[start..start + len];
        match serde_json::from_str::<TurnResult>(candidate) {
            Ok(result) => {
                return ResultScan::Complete(ExtractedResult {
                    result,
                    end: start + len,
                });
            },
            Err(e) => debug!(error = %e, "balanced result candidate did not parse"),
        }
    }
    ResultScan::Absent
}

/// Length of the brace-balanced object at the start of `text`, if closed.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {},
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            },
            _ => {},
        }
    }
    None
}
