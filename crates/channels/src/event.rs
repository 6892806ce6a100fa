use std::sync::Arc;

use {
    async_trait::async_trait,
    serde::Serialize,
    switchboard_approval::{ApprovalNotice, ApprovalNotifier},
    switchboard_stream::{PromptKind, TurnResult},
};

/// Notifications emitted by the session layer for the chat front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    /// An interactive question is waiting for an answer.
    PromptDetected {
        channel_id: String,
        prompt_kind: PromptKind,
        title: String,
        options: Vec<String>,
        raw: String,
    },
    ApprovalRequested {
        channel_id: String,
        request_id: String,
        tool_name: String,
        approval_target: String,
    },
    /// A queued command was taken off the queue and written to the process.
    QueueProcessingStarted { channel_id: String, text: String },
    TurnComplete { channel_id: String },
    ResultCaptured {
        channel_id: String,
        result: TurnResult,
    },
    /// Free-form text posted by the agent through the message endpoint.
    AgentMessage { channel_id: String, text: String },
    /// The process exited or was torn down; `dropped` queued commands were abandoned.
    SessionEnded { channel_id: String, dropped: usize },
}

impl SessionEvent {
    pub fn channel_id(&self) -> &str {
        match self {
            Self::PromptDetected { channel_id, .. }
            | Self::ApprovalRequested { channel_id, .. }
            | Self::QueueProcessingStarted { channel_id, .. }
            | Self::TurnComplete { channel_id }
            | Self::ResultCaptured { channel_id, .. }
            | Self::AgentMessage { channel_id, .. }
            | Self::SessionEnded { channel_id, .. } => channel_id,
        }
    }
}

/// Consumer of session notifications; the chat adapter provides the implementation.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SessionEvent);
}

/// Posts approval requests to the chat front end as [`SessionEvent::ApprovalRequested`].
pub struct SinkApprovalNotifier {
    sink: Arc<dyn EventSink>,
}

impl SinkApprovalNotifier {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ApprovalNotifier for SinkApprovalNotifier {
    async fn post_approval_request(&self, notice: &ApprovalNotice) -> anyhow::Result<()> {
        self.sink
            .emit(SessionEvent::ApprovalRequested {
                channel_id: notice.channel_id.clone(),
                request_id: notice.request_id.clone(),
                tool_name: notice.tool_name.clone(),
                approval_target: notice.approval_target.clone(),
            })
            .await;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, tokio::sync::Mutex};

    #[derive(Default)]
    struct Collect(Mutex<Vec<SessionEvent>>);

    #[async_trait]
    impl EventSink for Collect {
        async fn emit(&self, event: SessionEvent) {
            self.0.lock().await.push(event);
        }
    }

    #[test]
    fn serializes_with_kind_tag() {
        let event = SessionEvent::PromptDetected {
            channel_id: "c1".into(),
            prompt_kind: PromptKind::Binary,
            title: "Proceed?".into(),
            options: vec!["Yes".into(), "No".into()],
            raw: "Proceed? (y/n)".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "kind": "prompt_detected",
                "channelId": "c1",
                "promptKind": "binary",
                "title": "Proceed?",
                "options": ["Yes", "No"],
                "raw": "Proceed? (y/n)",
            })
        );
        assert_eq!(
            serde_json::to_value(SessionEvent::TurnComplete {
                channel_id: "c2".into()
            })
            .unwrap(),
            json!({"kind": "turn_complete", "channelId": "c2"})
        );
    }

    #[tokio::test]
    async fn notifier_emits_approval_event() {
        let sink = Arc::new(Collect::default());
        let notifier = SinkApprovalNotifier::new(Arc::clone(&sink) as Arc<dyn EventSink>);
        notifier
            .post_approval_request(&ApprovalNotice {
                channel_id: "c1".into(),
                request_id: "r1".into(),
                tool_name: "Bash".into(),
                approval_target: "make".into(),
                input: json!({"command": "make"}),
            })
            .await
            .unwrap();

        let events = sink.0.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel_id(), "c1");
        assert!(matches!(
            &events[0],
            SessionEvent::ApprovalRequested { approval_target, .. } if approval_target == "make"
        ));
    }
}
