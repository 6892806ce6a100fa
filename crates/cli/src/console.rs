//! Line-oriented chat front end on stdin.
//!
//! `#channel text` sends a message to a channel; slash commands control it.

use std::sync::Arc;

use {
    secrecy::Secret,
    switchboard_approval::{ApprovalCoordinator, ApprovalDecision},
    switchboard_channels::{ChannelRegistry, DispatchTicket},
    tokio::io::{AsyncBufReadExt, BufReader},
    tracing::{debug, warn},
};

const HELP: &str = "\
#<channel> <text>                 send a message
/reset #<channel>                 start a fresh conversation
/interrupt #<channel>             stop the running command and drop the queue
/model #<channel> [name]          set or clear the model override
/answer #<channel> <n>            answer the pending prompt with option n
/approve <request-id> <decision>  allow, allow_session or deny
/end #<channel>                   close the channel's shell
/sessions                         list live channels
/help                             show this help";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Message { channel_id: String, text: String },
    Reset { channel_id: String },
    Interrupt { channel_id: String },
    Model {
        channel_id: String,
        model: Option<String>,
    },
    /// `option` is 1-based, as typed.
    Answer { channel_id: String, option: usize },
    Approve {
        request_id: String,
        decision: ApprovalDecision,
    },
    End { channel_id: String },
    Sessions,
    Help,
}

fn channel_arg(token: Option<&str>) -> Result<String, String> {
    match token.and_then(|t| t.strip_prefix('#')) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err("expected a #channel".to_string()),
    }
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.starts_with('#') {
        let (channel, text) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let channel_id = channel_arg(Some(channel))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(format!("nothing to send to #{channel_id}"));
        }
        return Ok(Some(ConsoleCommand::Message {
            channel_id,
            text: text.to_string(),
        }));
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Err("messages start with #channel; /help lists commands".to_string());
    };
    let mut parts = rest.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let parsed = match command {
        "reset" => ConsoleCommand::Reset {
            channel_id: channel_arg(parts.next())?,
        },
        "interrupt" => ConsoleCommand::Interrupt {
            channel_id: channel_arg(parts.next())?,
        },
        "model" => ConsoleCommand::Model {
            channel_id: channel_arg(parts.next())?,
            model: parts.next().map(str::to_string),
        },
        "answer" => {
            let channel_id = channel_arg(parts.next())?;
            let option = parts
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .ok_or_else(|| "expected an option number starting at 1".to_string())?;
            ConsoleCommand::Answer { channel_id, option }
        },
        "approve" => {
            let request_id = parts
                .next()
                .ok_or_else(|| "expected a request id".to_string())?
                .to_string();
            let decision = parts
                .next()
                .and_then(ApprovalDecision::parse)
                .ok_or_else(|| "decision must be allow, allow_session or deny".to_string())?;
            ConsoleCommand::Approve {
                request_id,
                decision,
            }
        },
        "end" => ConsoleCommand::End {
            channel_id: channel_arg(parts.next())?,
        },
        "sessions" => ConsoleCommand::Sessions,
        "help" => ConsoleCommand::Help,
        other => return Err(format!("unknown command /{other}")),
    };
    Ok(Some(parsed))
}

/// Executes console commands against the registry and approval coordinator.
pub struct Console {
    registry: Arc<ChannelRegistry>,
    approvals: Arc<ApprovalCoordinator>,
    /// Environment variable read for a per-message credential.
    credential_env: String,
}

impl Console {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        approvals: Arc<ApprovalCoordinator>,
        credential_env: String,
    ) -> Self {
        Self {
            registry,
            approvals,
            credential_env,
        }
    }

    /// The credential in effect right now, captured with the message.
    fn current_credential(&self) -> Option<Secret<String>> {
        std::env::var(&self.credential_env)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }

    /// Run one command and return the status line to show.
    pub async fn execute(&self, command: ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Message { channel_id, text } => {
                if let Err(e) = self.registry.open(&channel_id).await {
                    warn!(channel_id, error = %e, "failed to open channel session");
                    return format!("could not start a session for #{channel_id}: {e}");
                }
                let credential = self.current_credential();
                match self.registry.submit(&channel_id, &text, credential).await {
                    DispatchTicket::Dispatched(true) => format!("sent to #{channel_id}"),
                    DispatchTicket::Dispatched(false) => {
                        format!("could not deliver to #{channel_id}")
                    },
                    ticket @ DispatchTicket::Queued { position, .. } => {
                        let status = format!("#{channel_id} is busy, queued at position {position}");
                        tokio::spawn(async move {
                            let ok = ticket.wait().await;
                            debug!(channel_id, ok, "queued message resolved");
                        });
                        status
                    },
                }
            },
            ConsoleCommand::Reset { channel_id } => {
                match self.registry.reset_conversation(&channel_id).await {
                    Ok(()) => format!("#{channel_id} will start a fresh conversation"),
                    Err(e) => format!("reset of #{channel_id} failed: {e}"),
                }
            },
            ConsoleCommand::Interrupt { channel_id } => {
                if self.registry.interrupt(&channel_id).await {
                    format!("interrupted #{channel_id}")
                } else {
                    format!("no session for #{channel_id}")
                }
            },
            ConsoleCommand::Model { channel_id, model } => {
                let shown = model.clone().unwrap_or_else(|| "default".to_string());
                if self.registry.set_model(&channel_id, model).await {
                    format!("#{channel_id} now uses model {shown}")
                } else {
                    format!("no session for #{channel_id}, or {shown} is not a model name")
                }
            },
            ConsoleCommand::Answer { channel_id, option } => {
                if self
                    .registry
                    .respond_to_prompt(&channel_id, option - 1)
                    .await
                {
                    format!("answered #{channel_id} with {option}")
                } else {
                    format!("#{channel_id} has no prompt with option {option}")
                }
            },
            ConsoleCommand::Approve {
                request_id,
                decision,
            } => {
                if self
                    .approvals
                    .resolve_approval(&request_id, decision)
                    .await
                {
                    format!("request {request_id} resolved")
                } else {
                    format!("request {request_id} is no longer pending")
                }
            },
            ConsoleCommand::End { channel_id } => {
                if self.registry.teardown(&channel_id).await {
                    format!("closed #{channel_id}")
                } else {
                    format!("no session for #{channel_id}")
                }
            },
            ConsoleCommand::Sessions => {
                let sessions = self.registry.snapshot().await;
                if sessions.is_empty() {
                    return "no live sessions".to_string();
                }
                sessions
                    .iter()
                    .map(|s| {
                        format!(
                            "#{} {} queued={} model={} resume={}",
                            s.channel_id,
                            if s.busy { "busy" } else { "idle" },
                            s.queued,
                            s.model_override.as_deref().unwrap_or("default"),
                            s.resume_id.as_deref().unwrap_or("-"),
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            },
            ConsoleCommand::Help => HELP.to_string(),
        }
    }

    /// Read commands from stdin until it closes.
    pub async fn run(self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(command)) => println!("{}", self.execute(command).await),
                    Ok(None) => {},
                    Err(message) => println!("{message}"),
                },
                Ok(None) => {
                    debug!("console input closed");
                    return;
                },
                Err(e) => {
                    warn!(error = %e, "failed to read console input");
                    return;
                },
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        std::{sync::Mutex, time::Duration},
        switchboard_approval::SessionAllowlist,
        switchboard_channels::{EventSink, RegistryOptions, SinkApprovalNotifier},
        switchboard_config::SwitchboardConfig,
        switchboard_sessions::ResumeStore,
        switchboard_terminal::{OutputEvent, ProcessHandle, ProcessSpawner, SpawnedProcess},
        tokio::sync::mpsc,
    };

    struct SilentProcess;

    impl ProcessHandle for SilentProcess {
        fn id(&self) -> &str {
            "term-console"
        }

        fn pid(&self) -> Option<u32> {
            None
        }

        fn write(&self, _bytes: &[u8]) -> switchboard_terminal::Result<()> {
            Ok(())
        }

        fn kill(&self) {}

        fn recent_output(&self, _n: usize) -> Vec<String> {
            Vec::new()
        }

        fn last_activity_ms(&self) -> u64 {
            0
        }
    }

    #[derive(Default)]
    struct SilentSpawner {
        outputs: Mutex<Vec<mpsc::UnboundedSender<OutputEvent>>>,
    }

    impl ProcessSpawner for SilentSpawner {
        fn spawn(&self, _channel_id: &str) -> switchboard_terminal::Result<SpawnedProcess> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.outputs.lock().unwrap().push(tx);
            Ok(SpawnedProcess {
                handle: Arc::new(SilentProcess),
                output: rx,
            })
        }
    }

    struct Discard;

    #[async_trait::async_trait]
    impl EventSink for Discard {
        async fn emit(&self, _event: switchboard_channels::SessionEvent) {}
    }

    fn console(dir: &tempfile::TempDir) -> Console {
        let mut config = SwitchboardConfig::default();
        config.terminal.warmup_ms = 0;
        config.terminal.init_commands.clear();
        let sink: Arc<dyn EventSink> = Arc::new(Discard);
        let registry = ChannelRegistry::new(
            Arc::new(SilentSpawner::default()),
            Arc::new(ResumeStore::load(dir.path().join("ids.json")).unwrap()),
            Arc::clone(&sink),
            RegistryOptions::from_config(&config),
        );
        let approvals = Arc::new(ApprovalCoordinator::new(
            Arc::clone(&registry) as Arc<dyn SessionAllowlist>,
            Arc::new(SinkApprovalNotifier::new(sink)),
            Duration::from_secs(5),
        ));
        Console::new(registry, approvals, "SWITCHBOARD_CONSOLE_TEST_CRED".into())
    }

    fn message(channel_id: &str, text: &str) -> ConsoleCommand {
        ConsoleCommand::Message {
            channel_id: channel_id.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn second_message_on_busy_channel_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(&dir);

        assert_eq!(console.execute(message("dev", "first")).await, "sent to #dev");
        assert_eq!(
            console.execute(message("dev", "second")).await,
            "#dev is busy, queued at position 1"
        );
        assert_eq!(
            console.execute(message("dev", "third")).await,
            "#dev is busy, queued at position 2"
        );
        assert_eq!(
            console
                .execute(ConsoleCommand::Interrupt {
                    channel_id: "dev".into()
                })
                .await,
            "interrupted #dev"
        );
    }

    #[tokio::test]
    async fn unsafe_model_name_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let console = console(&dir);
        console.execute(message("dev", "hello")).await;

        let status = console
            .execute(ConsoleCommand::Model {
                channel_id: "dev".into(),
                model: Some("opus;rm".into()),
            })
            .await;
        assert!(status.contains("not a model name"));
        let status = console
            .execute(ConsoleCommand::Model {
                channel_id: "dev".into(),
                model: Some("opus".into()),
            })
            .await;
        assert_eq!(status, "#dev now uses model opus");
    }

    #[rstest]
    #[case("#dev run the tests", ConsoleCommand::Message { channel_id: "dev".into(), text: "run the tests".into() })]
    #[case("/reset #dev", ConsoleCommand::Reset { channel_id: "dev".into() })]
    #[case("/interrupt #ops", ConsoleCommand::Interrupt { channel_id: "ops".into() })]
    #[case("/model #dev opus", ConsoleCommand::Model { channel_id: "dev".into(), model: Some("opus".into()) })]
    #[case("/model #dev", ConsoleCommand::Model { channel_id: "dev".into(), model: None })]
    #[case("/answer #dev 2", ConsoleCommand::Answer { channel_id: "dev".into(), option: 2 })]
    #[case("/approve abc allow_session", ConsoleCommand::Approve { request_id: "abc".into(), decision: ApprovalDecision::AllowSession })]
    #[case("/end #dev", ConsoleCommand::End { channel_id: "dev".into() })]
    #[case("  /sessions  ", ConsoleCommand::Sessions)]
    fn parses_commands(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(parse_line(line).unwrap(), Some(expected));
    }

    #[rstest]
    #[case("#dev")]
    #[case("# hello")]
    #[case("/reset dev")]
    #[case("/answer #dev 0")]
    #[case("/answer #dev two")]
    #[case("/approve abc maybe")]
    #[case("/frobnicate")]
    #[case("hello")]
    fn rejects_malformed_lines(#[case] line: &str) {
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(parse_line("   ").unwrap(), None);
    }
}
