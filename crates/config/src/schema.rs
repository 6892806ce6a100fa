/// Config schema types (server, agent command line, terminal, sessions, approvals).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default sentinel echoed after every agent command.
pub const DEFAULT_SENTINEL: &str = "__SWITCHBOARD_TURN_COMPLETE__";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub terminal: TerminalConfig,
    pub sessions: SessionsConfig,
    pub approval: ApprovalConfig,
}

/// HTTP server configuration for the approval/message endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 8787.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

/// How the agent command line is built for each dispatched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable invoked inside the channel shell.
    pub binary: String,
    /// Model used when a channel has no override.
    pub default_model: String,
    /// Tools passed via `--allowedTools`. Empty means the flag is omitted.
    pub allowed_tools: Vec<String>,
    /// Tool the agent delegates permission prompts to (`--permission-prompt-tool`).
    pub permission_prompt_tool: Option<String>,
    /// Extra arguments appended verbatim before the sentinel echo.
    pub extra_args: Vec<String>,
    /// Environment variable a captured per-message credential is exported as.
    pub credential_env: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".into(),
            default_model: "sonnet".into(),
            allowed_tools: Vec::new(),
            permission_prompt_tool: Some("mcp__switchboard__approval_prompt".into()),
            extra_args: Vec::new(),
            credential_env: "CLAUDE_CODE_OAUTH_TOKEN".into(),
        }
    }
}

/// Interactive shell (PTY) settings for each channel's process session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell to spawn. `None` uses `$SHELL`, falling back to `/bin/bash`.
    pub shell: Option<String>,
    /// Working directory for spawned shells. `None` uses `$HOME`.
    pub working_dir: Option<PathBuf>,
    /// Grace delay after spawn before the first command is written.
    pub warmup_ms: u64,
    /// Number of output chunks kept in each session's ring buffer.
    pub ring_capacity: usize,
    pub cols: u16,
    pub rows: u16,
    /// Lines written to a fresh shell once the warm-up delay has passed.
    pub init_commands: Vec<String>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: None,
            working_dir: None,
            warmup_ms: 1500,
            ring_capacity: 1000,
            cols: 400,
            rows: 50,
            init_commands: vec!["stty -echo".into(), "export PS1='' PS2=''".into()],
        }
    }
}

/// Channel session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// JSON file mapping channel id to resume id. `None` uses the data dir.
    pub store_path: Option<PathBuf>,
    /// Literal line echoed after every command to detect completion.
    pub sentinel: String,
    /// MCP config handed to the agent via `--mcp-config` for new channels.
    pub capability_config_path: PathBuf,
    /// Upper bound on the per-command scan window kept for parsing.
    pub max_window_bytes: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            sentinel: DEFAULT_SENTINEL.into(),
            capability_config_path: PathBuf::from("mcp-config.json"),
            max_window_bytes: 1024 * 1024,
        }
    }
}

/// Approval coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds to wait for a decision before denying.
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl SwitchboardConfig {
    /// Check values that would make the runtime misbehave.
    ///
    /// Returns one message per problem; an empty list means the config is usable.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.agent.binary.trim().is_empty() {
            problems.push("agent.binary must not be empty".to_string());
        }
        if self.agent.default_model.trim().is_empty() {
            problems.push("agent.default_model must not be empty".to_string());
        }
        let sentinel = self.sessions.sentinel.trim();
        if sentinel.is_empty() {
            problems.push("sessions.sentinel must not be empty".to_string());
        } else if sentinel.contains(['"', '\\', '$', '`', '\n']) {
            problems.push("sessions.sentinel must not contain shell metacharacters".to_string());
        }
        if self.terminal.ring_capacity == 0 {
            problems.push("terminal.ring_capacity must be at least 1".to_string());
        }
        if self.approval.timeout_secs == 0 {
            problems.push("approval.timeout_secs must be at least 1".to_string());
        }
        if self.agent.credential_env.is_empty()
            || !self
                .agent
                .credential_env
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            problems.push("agent.credential_env must be a valid variable name".to_string());
        }
        problems
    }
}
