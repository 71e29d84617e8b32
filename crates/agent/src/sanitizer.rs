//! Turns raw handler output into text that is safe to render as-is.
//!
//! Handlers (and the models behind them) emit Markdown, HTML fragments, agent
//! trace lines and tool-call envelopes. None of that reaches the customer.
//! Cleaning is applied repeatedly until the text stops changing, so the
//! result is a fixpoint and sanitizing twice is the same as sanitizing once.

use std::sync::OnceLock;

use regex::Regex;
use telassist_core::config::RouterConfig;

const ELLIPSIS: &str = " …";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseSanitizer {
    max_chars: usize,
}

impl ResponseSanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn from_config(router: &RouterConfig) -> Self {
        Self::new(router.max_response_chars)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Never fails; malformed input yields a best-effort cleaned string.
    pub fn sanitize(&self, raw: &str) -> String {
        truncate(&clean(raw), self.max_chars)
    }
}

/// Markup and trace removal without the length cap.
pub fn clean(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with ` …`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let marker_chars = ELLIPSIS.chars().count();
    if max_chars <= marker_chars {
        return text.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    let kept: String = text.chars().take(max_chars - marker_chars).collect();
    let kept = kept.trim_end();
    if kept.is_empty() {
        return ELLIPSIS.trim_start().to_string();
    }
    format!("{kept}{ELLIPSIS}")
}

fn clean_pass(input: &str) -> String {
    let text = normalize_characters(input);
    let text = tool_blocks().replace_all(&text, "");
    let text = code_fences().replace_all(&text, "");
    let text = html_tags().replace_all(&text, "");
    let text = text.replace(['<', '>'], "");
    let text = text.replace(['*', '`'], "").replace("__", "");
    let text = unwrap_links(&text);

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let Some(line) = clean_line(line) else {
            continue;
        };
        if line.is_empty() && lines.last().is_some_and(|previous| previous.is_empty()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

/// Replaces links with their label, innermost first, until none remain.
fn unwrap_links(input: &str) -> String {
    let mut text = input.to_string();
    while markdown_links().is_match(&text) {
        text = markdown_links().replace_all(&text, "$1").into_owned();
    }
    text
}

fn normalize_characters(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .chars()
        .filter_map(|character| match character {
            '\r' | '\n' => Some('\n'),
            '\t' => Some(' '),
            other if other.is_control() => None,
            other => Some(other),
        })
        .collect()
}

fn clean_line(raw: &str) -> Option<String> {
    let mut line = collapse_whitespace(raw);
    loop {
        let stripped = final_answer_prefix().replace(line.trim_start_matches('#'), "");
        let stripped = stripped.trim().to_string();
        if stripped == line {
            break;
        }
        line = stripped;
    }

    if agent_trace_line().is_match(&line)
        || horizontal_rule().is_match(&line)
        || is_table_separator(&line)
    {
        return None;
    }

    if line.contains('|') {
        line = collapse_whitespace(&line.replace('|', " | "));
    }
    Some(line)
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_table_separator(line: &str) -> bool {
    line.contains('|')
        && line.contains('-')
        && line.chars().all(|character| matches!(character, '|' | '-' | ':' | ' '))
}

fn tool_blocks() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?is)<tool_call>.*?</tool_call>|<function_calls>.*?</function_calls>|<thinking>.*?</thinking>",
        )
        .expect("tool block pattern is valid")
    })
}

fn code_fences() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("code fence pattern is valid"))
}

fn html_tags() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^<>]*>").expect("html tag pattern is valid"))
}

fn markdown_links() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"!?\[([^\[\]]*)\]\([^()]*\)").expect("markdown link pattern is valid")
    })
}

fn final_answer_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*final\s*answer\s*:\s*").expect("final answer pattern is valid")
    })
}

fn agent_trace_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?:(?:thought|action input|action|observation)\s*:|terminate$)")
            .expect("agent trace pattern is valid")
    })
}

fn horizontal_rule() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?:[-_=] ?){3,}$").expect("rule pattern is valid"))
}
