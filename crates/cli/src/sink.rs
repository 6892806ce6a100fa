//! Prints session notifications to the terminal.

use std::fmt::Write as _;

use {
    async_trait::async_trait,
    switchboard_channels::{EventSink, SessionEvent},
    switchboard_stream::PromptKind,
    tracing::debug,
};

/// Event sink that writes a readable line (or block) per notification to stdout.
pub struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    async fn emit(&self, event: SessionEvent) {
        debug!(channel_id = %event.channel_id(), ?event, "session event");
        println!("{}", render(&event));
    }
}

/// Format a notification for display.
pub fn render(event: &SessionEvent) -> String {
    match event {
        SessionEvent::PromptDetected {
            channel_id,
            prompt_kind,
            title,
            options,
            ..
        } => {
            let mut out = format!("[#{channel_id}] {title}");
            for (i, option) in options.iter().enumerate() {
                let _ = write!(out, "\n  {}. {option}", i + 1);
            }
            let hint = match prompt_kind {
                PromptKind::Binary => "yes/no",
                PromptKind::Menu => "pick one",
            };
            let _ = write!(out, "\n  ({hint}: /answer #{channel_id} <n>)");
            out
        },
        SessionEvent::ApprovalRequested {
            channel_id,
            request_id,
            tool_name,
            approval_target,
        } => format!(
            "[#{channel_id}] {tool_name} wants to run: {approval_target}\n  \
             (/approve {request_id} allow|allow_session|deny)"
        ),
        SessionEvent::QueueProcessingStarted { channel_id, text } => {
            format!("[#{channel_id}] processing queued message: {text}")
        },
        SessionEvent::TurnComplete { channel_id } => format!("[#{channel_id}] done"),
        SessionEvent::ResultCaptured { channel_id, result } => {
            let mut out = format!("[#{channel_id}] {}", result.result.trim());
            if result.is_error {
                out.push_str("\n  (agent reported an error)");
            }
            if let Some(cost) = result.total_cost_usd {
                let _ = write!(
                    out,
                    "\n  ${cost:.4}, {} in / {} out tokens",
                    result.usage.input_tokens, result.usage.output_tokens
                );
            }
            out
        },
        SessionEvent::AgentMessage { channel_id, text } => format!("[#{channel_id}] > {text}"),
        SessionEvent::SessionEnded {
            channel_id,
            dropped,
        } => {
            if *dropped == 0 {
                format!("[#{channel_id}] session ended")
            } else {
                format!("[#{channel_id}] session ended, {dropped} queued message(s) dropped")
            }
        },
    }
}
