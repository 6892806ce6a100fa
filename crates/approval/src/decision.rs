use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

const TARGET_MAX_CHARS: usize = 200;

/// Outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Allow,
    /// Allow, and skip approval for this tool for the rest of the session.
    AllowSession,
    Deny,
}

impl ApprovalDecision {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "allow_session" => Some(Self::AllowSession),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }

    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow | Self::AllowSession)
    }
}

/// Body of a decision delivery.
///
/// Accepts `{"requestId", "response": "allow"|"allow_session"|"deny"}` and the
/// older `{"requestId", "approved": bool}` shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub request_id: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
}

impl ApprovalResponse {
    /// The delivered decision, or `None` when the body carries no usable one.
    pub fn decision(&self) -> Option<ApprovalDecision> {
        if let Some(response) = &self.response {
            return ApprovalDecision::parse(response);
        }
        self.approved.map(|approved| {
            if approved {
                ApprovalDecision::Allow
            } else {
                ApprovalDecision::Deny
            }
        })
    }
}

/// Short human-readable summary of what a tool call touches.
pub fn approval_target(tool_name: &str, input: &Value) -> String {
    let field = match tool_name {
        "Bash" => Some("command"),
        "Read" | "Write" | "Edit" | "MultiEdit" => Some("file_path"),
        "NotebookEdit" => Some("notebook_path"),
        "WebFetch" => Some("url"),
        _ => None,
    };
    if let Some(value) = field.and_then(|f| input.get(f)).and_then(Value::as_str) {
        return value.to_string();
    }
    match input {
        Value::Null => tool_name.to_string(),
        Value::Object(map) if map.is_empty() => tool_name.to_string(),
        other => truncate_chars(&other.to_string(), TARGET_MAX_CHARS),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case(json!({"requestId": "r1", "response": "allow"}), Some(ApprovalDecision::Allow))]
    #[case(json!({"requestId": "r1", "response": "allow_session"}), Some(ApprovalDecision::AllowSession))]
    #[case(json!({"requestId": "r1", "response": "DENY"}), Some(ApprovalDecision::Deny))]
    #[case(json!({"requestId": "r1", "approved": true}), Some(ApprovalDecision::Allow))]
    #[case(json!({"requestId": "r1", "approved": false}), Some(ApprovalDecision::Deny))]
    #[case(json!({"requestId": "r1", "response": "maybe"}), None)]
    #[case(json!({"requestId": "r1"}), None)]
    fn decodes_wire_body(#[case] body: Value, #[case] expected: Option<ApprovalDecision>) {
        let response: ApprovalResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.request_id, "r1");
        assert_eq!(response.decision(), expected);
    }

    #[test]
    fn response_field_wins_over_legacy_flag() {
        let response: ApprovalResponse =
            serde_json::from_value(json!({"requestId": "r", "response": "deny", "approved": true}))
                .unwrap();
        assert_eq!(response.decision(), Some(ApprovalDecision::Deny));
    }

    #[test]
    fn missing_request_id_is_rejected() {
        assert!(serde_json::from_value::<ApprovalResponse>(json!({"approved": true})).is_err());
    }

    #[test]
    fn decision_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ApprovalDecision::AllowSession).unwrap(),
            json!("allow_session")
        );
    }

    #[rstest]
    #[case("Bash", json!({"command": "rm -rf target"}), "rm -rf target")]
    #[case("Edit", json!({"file_path": "/src/main.rs", "old_string": "a"}), "/src/main.rs")]
    #[case("WebFetch", json!({"url": "https://example.com", "prompt": "x"}), "https://example.com")]
    #[case("mcp__db__query", json!({"sql": "select 1"}), r#"{"sql":"select 1"}"#)]
    #[case("Glob", json!({}), "Glob")]
    #[case("Task", Value::Null, "Task")]
    fn summarises_target(#[case] tool: &str, #[case] input: Value, #[case] expected: &str) {
        assert_eq!(approval_target(tool, &input), expected);
    }

    #[test]
    fn long_targets_are_truncated() {
        let input = json!({"blob": "x".repeat(500)});
        let target = approval_target("Other", &input);
        assert_eq!(target.chars().count(), TARGET_MAX_CHARS + 3);
        assert!(target.ends_with("..."));
    }
}
