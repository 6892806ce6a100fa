use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

/// `${NAME}` or `${NAME:-fallback}`; the fallback may not contain `}`.
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("placeholder pattern compiles")
});

/// Expand `${VAR}` and `${VAR:-fallback}` placeholders in raw config text.
///
/// A variable that is unset and has no fallback is left in place, so the
/// value reaches the parser unchanged. Anything that is not a well-formed
/// placeholder is copied literally.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let expanded: Cow<'_, str> = PLACEHOLDER.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(value), _) => value,
            (None, Some(fallback)) => fallback.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        }
    });
    expanded.into_owned()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn lookup(name: &str) -> Option<String> {
        match name {
            "AGENT_BIN" => Some("/opt/agent/bin/claude".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    #[rstest]
    #[case("binary = \"${AGENT_BIN}\"", "binary = \"/opt/agent/bin/claude\"")]
    #[case("port = ${SB_PORT:-8787}", "port = 8787")]
    #[case("bin = \"${AGENT_BIN:-claude}\"", "bin = \"/opt/agent/bin/claude\"")]
    #[case("x = \"${EMPTY:-fallback}\"", "x = \"\"")]
    #[case("x = \"${UNSET_THING}\"", "x = \"${UNSET_THING}\"")]
    #[case("x = \"${OPEN\"", "x = \"${OPEN\"")]
    #[case("x = \"${1BAD}\"", "x = \"${1BAD}\"")]
    #[case("a=${AGENT_BIN} b=${SB_MODEL:-sonnet}", "a=/opt/agent/bin/claude b=sonnet")]
    fn expands_placeholders(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(substitute_env_with(input, lookup), expected);
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(substitute_env("cost = $5 {braces}"), "cost = $5 {braces}");
    }
}
