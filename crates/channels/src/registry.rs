use std::{
    path::PathBuf,
    sync::{Arc, Weak},
    time::Duration,
};

use {
    async_trait::async_trait,
    dashmap::{DashMap, mapref::entry::Entry},
    secrecy::{ExposeSecret, Secret},
    switchboard_approval::SessionAllowlist,
    switchboard_config::{AgentConfig, SwitchboardConfig},
    switchboard_sessions::ResumeStore,
    switchboard_stream::{PromptKind, ScanContext, StreamScanner, StreamSignal, TurnResult},
    switchboard_terminal::{OutputEvent, ProcessSpawner},
    tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot},
    tracing::{debug, info, warn},
};

use crate::{
    command::{CommandLine, build_command, is_plain_word},
    error::{Error, Result},
    event::{EventSink, SessionEvent},
    session::{ChannelSession, DispatchTicket, PendingPrompt, QueuedCommand, SessionSnapshot},
};

type SharedSession = Arc<Mutex<ChannelSession>>;

enum Opened {
    Existing(SharedSession),
    Created {
        session: SharedSession,
        guard: OwnedMutexGuard<ChannelSession>,
        output: mpsc::UnboundedReceiver<OutputEvent>,
    },
}

/// Settings the registry needs from the loaded configuration.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub agent: AgentConfig,
    pub sentinel: String,
    pub capability_config_path: PathBuf,
    pub max_window_bytes: usize,
    pub warmup: Duration,
    pub init_commands: Vec<String>,
}

impl RegistryOptions {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self {
            agent: config.agent.clone(),
            sentinel: config.sessions.sentinel.clone(),
            capability_config_path: config.sessions.capability_config_path.clone(),
            max_window_bytes: config.sessions.max_window_bytes,
            warmup: Duration::from_millis(config.terminal.warmup_ms),
            init_commands: config.terminal.init_commands.clone(),
        }
    }
}

/// Owns every live channel session and serializes commands per channel.
///
/// Each channel has its own lock; nothing here holds more than one channel
/// lock at a time. Notifications are collected while a lock is held and
/// emitted after it is released.
pub struct ChannelRegistry {
    sessions: DashMap<String, SharedSession>,
    spawner: Arc<dyn ProcessSpawner>,
    store: Arc<ResumeStore>,
    sink: Arc<dyn EventSink>,
    opts: RegistryOptions,
    this: Weak<ChannelRegistry>,
}

impl ChannelRegistry {
    pub fn new(
        spawner: Arc<dyn ProcessSpawner>,
        store: Arc<ResumeStore>,
        sink: Arc<dyn EventSink>,
        opts: RegistryOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            sessions: DashMap::new(),
            spawner,
            store,
            sink,
            opts,
            this: this.clone(),
        })
    }

    fn session(&self, channel_id: &str) -> Option<SharedSession> {
        self.sessions
            .get(channel_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.sessions.contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Get or create the channel's session.
    ///
    /// A new session spawns a process, waits out the warm-up delay and sends
    /// the shell init commands before any command can reach it. Concurrent
    /// callers for the same channel wait for that to finish.
    pub async fn open(&self, channel_id: &str) -> Result<()> {
        let opened = match self.sessions.entry(channel_id.to_string()) {
            Entry::Occupied(entry) => Opened::Existing(Arc::clone(entry.get())),
            Entry::Vacant(slot) => {
                let spawned = self.spawner.spawn(channel_id)?;
                let resume_id = self.store.get(channel_id).filter(|id| {
                    let usable = is_plain_word(id);
                    if !usable {
                        warn!(channel_id, "ignoring stored resume id with unexpected characters");
                    }
                    usable
                });
                let session = Arc::new(Mutex::new(ChannelSession::new(
                    channel_id,
                    spawned.handle,
                    resume_id,
                    self.opts.capability_config_path.clone(),
                    StreamScanner::new(self.opts.sentinel.clone(), self.opts.max_window_bytes),
                )));
                // Held until warm-up is done so nothing else reaches the shell first.
                let guard = Arc::clone(&session)
                    .try_lock_owned()
                    .map_err(|_| Error::unavailable("fresh session lock contended"))?;
                slot.insert(Arc::clone(&session));
                Opened::Created {
                    session,
                    guard,
                    output: spawned.output,
                }
            },
        };

        let (session, guard, output) = match opened {
            Opened::Existing(session) => {
                // Waits for a concurrent opener to finish its warm-up.
                drop(session.lock().await);
                return Ok(());
            },
            Opened::Created {
                session,
                guard,
                output,
            } => (session, guard, output),
        };

        tokio::spawn(run_output_pump(
            self.this.clone(),
            Arc::clone(&session),
            channel_id.to_string(),
            output,
        ));

        if !self.opts.warmup.is_zero() {
            tokio::time::sleep(self.opts.warmup).await;
        }
        for line in &self.opts.init_commands {
            guard.process.write_line(line)?;
        }
        info!(
            channel_id,
            terminal_id = %guard.process.id(),
            resumed = guard.resume_id.is_some(),
            "channel session ready"
        );
        Ok(())
    }

    /// Write a command now, or queue it behind the one in flight.
    pub async fn submit(
        &self,
        channel_id: &str,
        text: &str,
        credential: Option<Secret<String>>,
    ) -> DispatchTicket {
        let Some(session) = self.session(channel_id) else {
            debug!(channel_id, "dispatch to unknown channel");
            return DispatchTicket::Dispatched(false);
        };
        let mut s = session.lock().await;
        if s.busy {
            let (tx, rx) = oneshot::channel();
            s.queue.push_back(QueuedCommand {
                text: text.to_string(),
                credential,
                on_dispatched: tx,
            });
            let position = s.queue.len();
            debug!(channel_id, position, "channel busy, command queued");
            return DispatchTicket::Queued {
                position,
                receiver: rx,
            };
        }
        DispatchTicket::Dispatched(self.write_command(&mut s, text, credential.as_ref()))
    }

    /// Like [`submit`](Self::submit), but waits until the command has been written.
    pub async fn dispatch(
        &self,
        channel_id: &str,
        text: &str,
        credential: Option<Secret<String>>,
    ) -> bool {
        self.submit(channel_id, text, credential).await.wait().await
    }

    fn write_command(
        &self,
        s: &mut ChannelSession,
        text: &str,
        credential: Option<&Secret<String>>,
    ) -> bool {
        let model = s
            .model_override
            .clone()
            .unwrap_or_else(|| self.opts.agent.default_model.clone());
        let line = build_command(&CommandLine {
            agent: &self.opts.agent,
            payload: text,
            resume_id: s.resume_id.as_deref(),
            model: &model,
            capability_config_path: &s.capability_config_path,
            sentinel: &self.opts.sentinel,
            credential: credential.map(|c| c.expose_secret().as_str()),
        });
        match s.process.write_line(&line) {
            Ok(()) => {
                s.scanner.reset();
                s.busy = true;
                s.awaiting_resume_id = s.resume_id.is_none();
                s.touch();
                info!(
                    channel_id = %s.channel_id,
                    resume = s.resume_id.is_some(),
                    model = %model,
                    "command dispatched"
                );
                true
            },
            Err(e) => {
                warn!(channel_id = %s.channel_id, error = %e, "failed to write command");
                false
            },
        }
    }

    /// Clear busy and start the next queued command, if any.
    fn advance_queue(&self, s: &mut ChannelSession, events: &mut Vec<SessionEvent>) {
        s.busy = false;
        while let Some(next) = s.queue.pop_front() {
            let ok = self.write_command(s, &next.text, next.credential.as_ref());
            let _ = next.on_dispatched.send(ok);
            if ok {
                events.push(SessionEvent::QueueProcessingStarted {
                    channel_id: s.channel_id.clone(),
                    text: next.text,
                });
                return;
            }
        }
    }

    /// The in-flight command finished: go idle or start the next queued one.
    pub async fn on_completion_signal(&self, channel_id: &str) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        let mut events = Vec::new();
        {
            let mut s = session.lock().await;
            self.advance_queue(&mut s, &mut events);
        }
        self.emit_all(events).await;
        true
    }

    /// Forget the conversation: the next command starts a fresh one.
    ///
    /// Works for channels without a live session too; the stored resume id is
    /// cleared either way.
    pub async fn reset_conversation(&self, channel_id: &str) -> Result<()> {
        if let Some(session) = self.session(channel_id) {
            let mut s = session.lock().await;
            s.resume_id = None;
            s.busy = false;
            s.awaiting_resume_id = false;
            s.pending_prompt = None;
            s.last_result = None;
            s.scanner.reset();
            let dropped = s.drop_queue();
            self.store.clear(channel_id)?;
            info!(channel_id, dropped, "conversation reset");
        } else {
            self.store.clear(channel_id)?;
            info!(channel_id, "stored conversation reset");
        }
        Ok(())
    }

    /// Best-effort interrupt of the running command; abandons the whole queue.
    pub async fn interrupt(&self, channel_id: &str) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        let mut s = session.lock().await;
        if let Err(e) = s.process.interrupt() {
            warn!(channel_id, error = %e, "interrupt write failed");
        }
        s.busy = false;
        s.awaiting_resume_id = false;
        s.scanner.reset();
        let dropped = s.drop_queue();
        info!(channel_id, dropped, "channel interrupted");
        true
    }

    pub async fn set_model(&self, channel_id: &str, model: Option<String>) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if let Some(name) = &model
            && !is_plain_word(name)
        {
            warn!(channel_id, "rejected model name with unexpected characters");
            return false;
        }
        let mut s = session.lock().await;
        debug!(channel_id, model = ?model, "model override set");
        s.model_override = model;
        true
    }

    /// Answer the pending prompt with the option at `option_index` (0-based).
    ///
    /// Yes/no prompts get `y` or `n` plus a newline; menus get the 1-based
    /// option number. Returns `false` when there is no prompt, the index is
    /// out of range, or the write fails; the prompt is kept in those cases.
    pub async fn respond_to_prompt(&self, channel_id: &str, option_index: usize) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        let mut s = session.lock().await;
        let Some(prompt) = &s.pending_prompt else {
            return false;
        };
        if option_index >= prompt.options.len() {
            return false;
        }
        let written = match prompt.kind {
            PromptKind::Binary => {
                s.process
                    .write_line(if option_index == 0 { "y" } else { "n" })
            },
            PromptKind::Menu => {
                s.process.write((option_index + 1).to_string().as_bytes())
            },
        };
        match written {
            Ok(()) => {
                debug!(channel_id, option_index, "prompt answered");
                s.pending_prompt = None;
                s.touch();
                true
            },
            Err(e) => {
                warn!(channel_id, error = %e, "failed to answer prompt");
                false
            },
        }
    }

    pub async fn clear_prompt(&self, channel_id: &str) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        session.lock().await.pending_prompt.take().is_some()
    }

    pub async fn pending_prompt(&self, channel_id: &str) -> Option<PendingPrompt> {
        let session = self.session(channel_id)?;
        let s = session.lock().await;
        s.pending_prompt.clone()
    }

    pub async fn last_result(&self, channel_id: &str) -> Option<TurnResult> {
        let session = self.session(channel_id)?;
        let s = session.lock().await;
        s.last_result.clone()
    }

    pub async fn recent_output(&self, channel_id: &str, n: usize) -> Option<Vec<String>> {
        let session = self.session(channel_id)?;
        let s = session.lock().await;
        Some(s.process.recent_output(n))
    }

    /// Snapshots of every live session, ordered by channel id.
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<SharedSession> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            out.push(session.lock().await.snapshot());
        }
        out.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        out
    }

    /// Kill the channel's process and drop its state. The stored resume id stays.
    pub async fn teardown(&self, channel_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(channel_id) else {
            return false;
        };
        session.lock().await.process.kill();
        self.finish_session(channel_id, &session).await;
        true
    }

    /// Treat the channel's process as gone.
    pub async fn handle_exit(&self, channel_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(channel_id) else {
            return false;
        };
        self.finish_session(channel_id, &session).await;
        true
    }

    /// Exit seen by a pump: only its own session is removed, never a newer one.
    async fn handle_exit_of(&self, channel_id: &str, session: &SharedSession) {
        if self
            .sessions
            .remove_if(channel_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
        {
            self.finish_session(channel_id, session).await;
        }
    }

    async fn finish_session(&self, channel_id: &str, session: &SharedSession) {
        let dropped = {
            let mut s = session.lock().await;
            s.busy = false;
            s.pending_prompt = None;
            s.drop_queue()
        };
        info!(channel_id, dropped, "channel session ended");
        self.sink
            .emit(SessionEvent::SessionEnded {
                channel_id: channel_id.to_string(),
                dropped,
            })
            .await;
    }

    /// Apply one output chunk to the channel it came from.
    async fn apply_output(&self, session: &SharedSession, chunk: &str) {
        let mut events = Vec::new();
        {
            let mut s = session.lock().await;
            s.touch();
            let ctx = ScanContext {
                awaiting_resume_id: s.awaiting_resume_id,
                busy: s.busy,
                prompt_pending: s.pending_prompt.is_some(),
            };
            let signals = s.scanner.feed(chunk, ctx);
            for signal in signals {
                match signal {
                    StreamSignal::ResumeId(id) => {
                        s.awaiting_resume_id = false;
                        self.remember_resume_id(&mut s, id);
                    },
                    StreamSignal::Result(result) => {
                        if let Some(id) = result.session_id.clone() {
                            self.remember_resume_id(&mut s, id);
                        }
                        events.push(SessionEvent::ResultCaptured {
                            channel_id: s.channel_id.clone(),
                            result: result.clone(),
                        });
                        s.last_result = Some(result);
                    },
                    StreamSignal::TurnComplete => {
                        events.push(SessionEvent::TurnComplete {
                            channel_id: s.channel_id.clone(),
                        });
                        self.advance_queue(&mut s, &mut events);
                    },
                    StreamSignal::Prompt(prompt) => {
                        s.pending_prompt = Some(PendingPrompt::from(&prompt));
                        events.push(SessionEvent::PromptDetected {
                            channel_id: s.channel_id.clone(),
                            prompt_kind: prompt.kind,
                            title: prompt.title,
                            options: prompt.options,
                            raw: prompt.raw,
                        });
                    },
                }
            }
        }
        self.emit_all(events).await;
    }

    fn remember_resume_id(&self, s: &mut ChannelSession, id: String) {
        if s.resume_id.as_deref() == Some(id.as_str()) {
            return;
        }
        if !is_plain_word(&id) {
            warn!(channel_id = %s.channel_id, "ignoring resume id with unexpected characters");
            return;
        }
        if let Err(e) = self.store.set(&s.channel_id, &id) {
            warn!(channel_id = %s.channel_id, error = %e, "failed to persist resume id");
        }
        info!(channel_id = %s.channel_id, resume_id = %id, "resume id captured");
        s.resume_id = Some(id);
    }

    async fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.sink.emit(event).await;
        }
    }
}

/// Feed a process's output into its channel session, in arrival order.
async fn run_output_pump(
    registry: Weak<ChannelRegistry>,
    session: SharedSession,
    channel_id: String,
    mut output: mpsc::UnboundedReceiver<OutputEvent>,
) {
    while let Some(event) = output.recv().await {
        let Some(registry) = registry.upgrade() else {
            return;
        };
        match event {
            OutputEvent::Output(chunk) => registry.apply_output(&session, &chunk).await,
            OutputEvent::Error(message) => {
                warn!(channel_id = %channel_id, error = %message, "process output error");
            },
            OutputEvent::Closed => break,
        }
    }
    debug!(channel_id = %channel_id, "output pump finished");
    if let Some(registry) = registry.upgrade() {
        registry.handle_exit_of(&channel_id, &session).await;
    }
}

#[async_trait]
impl SessionAllowlist for ChannelRegistry {
    async fn is_tool_allowed(&self, channel_id: &str, tool_name: &str) -> bool {
        let Some(session) = self.session(channel_id) else {
            return false;
        };
        session.lock().await.tool_allowlist.contains(tool_name)
    }

    async fn allow_tool_for_session(&self, channel_id: &str, tool_name: &str) {
        let Some(session) = self.session(channel_id) else {
            warn!(channel_id, tool_name, "cannot allow tool for unknown channel");
            return;
        };
        session
            .lock()
            .await
            .tool_allowlist
            .insert(tool_name.to_string());
        info!(channel_id, tool_name, "tool allowed for session");
    }
}
