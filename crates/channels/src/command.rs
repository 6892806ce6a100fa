use std::path::Path;

use switchboard_config::AgentConfig;

/// Everything that varies between two agent invocations on a channel.
#[derive(Debug, Clone, Copy)]
pub struct CommandLine<'a> {
    pub agent: &'a AgentConfig,
    pub payload: &'a str,
    pub resume_id: Option<&'a str>,
    pub model: &'a str,
    pub capability_config_path: &'a Path,
    pub sentinel: &'a str,
    pub credential: Option<&'a str>,
}

/// Escape text for use inside a double-quoted shell string.
///
/// Line breaks are stripped so the command stays on one line.
pub fn escape_payload(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            },
            '\r' | '\n' => {},
            _ => out.push(c),
        }
    }
    out
}

/// Whether `value` can be passed to the shell unquoted: non-empty and made
/// only of ASCII alphanumerics and `.`, `_`, `:`, `-`.
pub fn is_plain_word(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// A flag value as written on the command line; quoted unless it is a plain word.
fn shell_value(value: &str) -> String {
    if is_plain_word(value) {
        value.to_string()
    } else {
        format!("\"{}\"", escape_payload(value))
    }
}

/// Render the single line written to the channel's shell.
pub fn build_command(line: &CommandLine<'_>) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(16);
    if let Some(credential) = line.credential {
        parts.push(format!(
            "{}=\"{}\"",
            line.agent.credential_env,
            escape_payload(credential)
        ));
    }
    parts.push(line.agent.binary.clone());
    parts.push("-p".into());
    parts.push(format!("\"{}\"", escape_payload(line.payload)));
    parts.push("--output-format json".into());
    if let Some(id) = line.resume_id {
        parts.push(format!("--resume {}", shell_value(id)));
    }
    parts.push(format!("--model {}", shell_value(line.model)));
    parts.push(format!(
        "--mcp-config \"{}\"",
        escape_payload(&line.capability_config_path.display().to_string())
    ));
    if !line.agent.allowed_tools.is_empty() {
        parts.push(format!(
            "--allowedTools \"{}\"",
            escape_payload(&line.agent.allowed_tools.join(","))
        ));
    }
    if let Some(tool) = &line.agent.permission_prompt_tool {
        parts.push(format!("--permission-prompt-tool {tool}"));
    }
    parts.extend(line.agent.extra_args.iter().cloned());
    format!("{} ; echo \"{}\"", parts.join(" "), line.sentinel)
}
