use std::{
    collections::{HashSet, VecDeque},
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    secrecy::Secret,
    serde::Serialize,
    switchboard_stream::{DetectedPrompt, PromptKind, StreamScanner, TurnResult},
    switchboard_terminal::ProcessHandle,
    tokio::sync::oneshot,
};

/// A command waiting for the channel to go idle.
///
/// The credential is captured when the command is queued; a later switch
/// does not affect it.
pub struct QueuedCommand {
    pub text: String,
    pub credential: Option<Secret<String>>,
    /// Receives `true` once written to the process, `false` if the write
    /// failed. Dropped unresolved when the queue is abandoned.
    pub on_dispatched: oneshot::Sender<bool>,
}

/// The interactive question currently waiting for an answer on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPrompt {
    pub kind: PromptKind,
    pub title: String,
    pub options: Vec<String>,
}

impl From<&DetectedPrompt> for PendingPrompt {
    fn from(prompt: &DetectedPrompt) -> Self {
        Self {
            kind: prompt.kind,
            title: prompt.title.clone(),
            options: prompt.options.clone(),
        }
    }
}

/// Outcome of submitting a command.
#[derive(Debug)]
pub enum DispatchTicket {
    /// Written immediately (`true`) or rejected (`false`).
    Dispatched(bool),
    /// The channel was busy; `receiver` resolves when the command is written.
    Queued {
        position: usize,
        receiver: oneshot::Receiver<bool>,
    },
}

impl DispatchTicket {
    /// Wait until the command has been written to the process (not completed).
    pub async fn wait(self) -> bool {
        match self {
            Self::Dispatched(ok) => ok,
            Self::Queued { receiver, .. } => receiver.await.unwrap_or(false),
        }
    }
}

/// Read-only view of one channel for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub channel_id: String,
    pub terminal_id: String,
    pub pid: Option<u32>,
    pub busy: bool,
    pub queued: usize,
    pub resume_id: Option<String>,
    pub model_override: Option<String>,
    pub awaiting_resume_id: bool,
    pub pending_prompt: Option<PendingPrompt>,
    pub allowed_tools: Vec<String>,
    pub last_activity_ms: u64,
    pub has_result: bool,
}

/// Mutable state of one channel. Always accessed under the channel's own lock.
pub struct ChannelSession {
    pub(crate) channel_id: String,
    pub(crate) busy: bool,
    pub(crate) queue: VecDeque<QueuedCommand>,
    pub(crate) resume_id: Option<String>,
    pub(crate) model_override: Option<String>,
    pub(crate) capability_config_path: PathBuf,
    pub(crate) tool_allowlist: HashSet<String>,
    pub(crate) last_activity_ms: u64,
    pub(crate) awaiting_resume_id: bool,
    pub(crate) pending_prompt: Option<PendingPrompt>,
    pub(crate) last_result: Option<TurnResult>,
    pub(crate) process: Arc<dyn ProcessHandle>,
    pub(crate) scanner: StreamScanner,
}

impl ChannelSession {
    pub(crate) fn new(
        channel_id: &str,
        process: Arc<dyn ProcessHandle>,
        resume_id: Option<String>,
        capability_config_path: PathBuf,
        scanner: StreamScanner,
    ) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            busy: false,
            queue: VecDeque::new(),
            resume_id,
            model_override: None,
            capability_config_path,
            tool_allowlist: HashSet::new(),
            last_activity_ms: now_ms(),
            awaiting_resume_id: false,
            pending_prompt: None,
            last_result: None,
            process,
            scanner,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity_ms = now_ms();
    }

    /// Abandon every queued command; their dispatch receivers resolve `false`.
    pub(crate) fn drop_queue(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        let mut allowed_tools: Vec<String> = self.tool_allowlist.iter().cloned().collect();
        allowed_tools.sort();
        SessionSnapshot {
            channel_id: self.channel_id.clone(),
            terminal_id: self.process.id().to_string(),
            pid: self.process.pid(),
            busy: self.busy,
            queued: self.queue.len(),
            resume_id: self.resume_id.clone(),
            model_override: self.model_override.clone(),
            awaiting_resume_id: self.awaiting_resume_id,
            pending_prompt: self.pending_prompt.clone(),
            allowed_tools,
            last_activity_ms: self.last_activity_ms,
            has_result: self.last_result.is_some(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
