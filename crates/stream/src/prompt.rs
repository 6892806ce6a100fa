use std::sync::LazyLock;

use {
    regex::Regex,
    serde::{Deserialize, Serialize},
};

#[allow(clippy::expect_used)]
static MENU_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[❯>›»*•\-]\s*)?(\d+)\.\s+(.+?)\s*$").expect("menu option pattern compiles")
});

#[allow(clippy::expect_used)]
static YES_NO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^([^\n]*\?)[^\n]*(?:\n[ \t]*)?[(\[]\s*y(?:es)?\s*/\s*n(?:o)?\s*[)\]]",
    )
    .expect("yes/no pattern compiles")
});

#[allow(clippy::expect_used)]
static TRUST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btrust\s+(?:the\s+files\s+in\s+)?this\s+(?:workspace|folder|directory|project)")
        .expect("trust pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Answered with `y` or `n`.
    Binary,
    /// Answered with a 1-based option number.
    Menu,
}

/// An interactive question found in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPrompt {
    pub kind: PromptKind,
    pub title: String,
    pub options: Vec<String>,
    /// The matched prompt text.
    pub raw: String,
    /// Byte offset just past the prompt text.
    pub end: usize,
}

/// Detect an interactive prompt in `text`.
///
/// Numbered menus win over yes/no questions, which win over the workspace
/// trust heuristic.
pub fn detect_prompt(text: &str) -> Option<DetectedPrompt> {
    let lines = split_lines(text);
    detect_menu(text, &lines)
        .or_else(|| detect_yes_no(text))
        .or_else(|| detect_trust(text, &lines))
}

/// A line without its terminator, with its byte span in the source text.
struct Line<'a> {
    text: &'a str,
    start: usize,
    /// Offset past the line terminator, if any.
    end: usize,
}

fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            Line {
                text: raw.trim_end_matches('\n'),
                start,
                end: offset,
            }
        })
        .collect()
}

/// Consecutive numbered option lines starting at `from`. Each label is
/// paired with its line index.
fn collect_options(lines: &[Line<'_>], from: usize) -> Vec<(usize, String)> {
    let mut idx = from;
    let mut options = Vec::new();
    while let Some(line) = lines.get(idx) {
        let Some(caps) = MENU_OPTION.captures(line.text) else {
            break;
        };
        options.push((idx, caps[2].to_string()));
        idx += 1;
    }
    options
}

fn labels(options: Vec<(usize, String)>) -> Vec<String> {
    options.into_iter().map(|(_, label)| label).collect()
}

fn detect_menu(text: &str, lines: &[Line<'_>]) -> Option<DetectedPrompt> {
    for (i, line) in lines.iter().enumerate() {
        // The question must close its line; the options follow on the next one.
        if !line.text.trim_end().ends_with('?') || MENU_OPTION.is_match(line.text) {
            continue;
        }
        let options = collect_options(lines, i + 1);
        let Some(&(last, _)) = options.last() else {
            continue;
        };
        if options.len() < 2 {
            continue;
        }
        let end = lines[last].end;
        return Some(DetectedPrompt {
            kind: PromptKind::Menu,
            title: line.text.trim().to_string(),
            options: labels(options),
            raw: text[line.start..end].to_string(),
            end,
        });
    }
    None
}

fn detect_yes_no(text: &str) -> Option<DetectedPrompt> {
    let caps = YES_NO.captures(text)?;
    let whole = caps.get(0)?;
    Some(DetectedPrompt {
        kind: PromptKind::Binary,
        title: caps[1].trim().to_string(),
        options: vec!["Yes".to_string(), "No".to_string()],
        raw: whole.as_str().to_string(),
        end: whole.end(),
    })
}

fn detect_trust(text: &str, lines: &[Line<'_>]) -> Option<DetectedPrompt> {
    let found = TRUST.find(text)?;
    let idx = lines
        .iter()
        .position(|line| found.start() >= line.start && found.start() < line.end)?;
    let line = &lines[idx];
    let title = line.text.trim().to_string();

    let mut options = collect_options(lines, idx + 1);
    options.truncate(2);
    if let [_, (last, _)] = options.as_slice() {
        let end = lines[*last].end;
        return Some(DetectedPrompt {
            kind: PromptKind::Menu,
            title,
            options: labels(options),
            raw: text[line.start..end].to_string(),
            end,
        });
    }

    Some(DetectedPrompt {
        kind: PromptKind::Binary,
        title,
        options: vec!["Yes".to_string(), "No".to_string()],
        raw: line.text.to_string(),
        end: line.end,
    })
}
