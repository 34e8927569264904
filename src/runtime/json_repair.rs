//! Repair-tolerant JSON parsing.
//!
//! LLMs frequently emit near-valid JSON: markdown-fenced blocks, single-quoted
//! strings, trailing commas, or truncated output cut off mid-object. This module
//! applies an ordered chain of repair passes and returns the first one that
//! produces a valid [`serde_json::Value`]. Used for both tool-argument payloads
//! (see [`crate::runtime::tool_call_parser`]) and planning-LLM replies
//! (see [`crate::runtime::analyser`]).
//!
//! Grounded on the brace-counting scan `Agent::parse_tool_call` already performs
//! in the teacher's agent module, generalised here into an explicit, orderable
//! list of passes with a structured terminal error instead of a silent `None`.

use std::fmt;

/// Terminal failure: none of the repair passes produced valid JSON.
///
/// Callers must not recover by guessing semantics from the unparsed text —
/// the only valid response to this error is to surface it.
#[derive(Debug, Clone)]
pub struct JsonRepairError {
    pub attempted_passes: usize,
    pub input_preview: String,
}

impl fmt::Display for JsonRepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to repair JSON after {} passes; input began: {:?}",
            self.attempted_passes, self.input_preview
        )
    }
}

impl std::error::Error for JsonRepairError {}

/// Attempt to parse `input` as JSON, applying repair passes in order until one
/// succeeds. Each pass is applied to the *original* input independently rather
/// than chained, since later passes are not always compatible with earlier ones
/// (e.g. fence-stripping before quote conversion can change brace positions).
pub fn repair_parse(input: &str) -> Result<serde_json::Value, JsonRepairError> {
    let passes: Vec<fn(&str) -> Option<String>> = vec![
        |s| Some(s.to_string()),
        strip_markdown_fences,
        |s| single_to_double_quotes(&strip_markdown_fences(s).unwrap_or_else(|| s.to_string())),
        |s| remove_trailing_commas(&strip_markdown_fences(s).unwrap_or_else(|| s.to_string())),
        |s| {
            let fenced = strip_markdown_fences(s).unwrap_or_else(|| s.to_string());
            let quoted = single_to_double_quotes(&fenced).unwrap_or(fenced);
            remove_trailing_commas(&quoted)
        },
        close_unterminated,
        extract_longest_balanced_object,
    ];

    let mut attempted = 0;
    for pass in &passes {
        attempted += 1;
        if let Some(candidate) = pass(input) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&candidate) {
                return Ok(value);
            }
        }
    }

    let preview: String = input.chars().take(120).collect();
    Err(JsonRepairError {
        attempted_passes: attempted,
        input_preview: preview,
    })
}

/// Strip leading/trailing ``` or ```json fences.
fn strip_markdown_fences(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let without_open = trimmed.trim_start_matches("```json").trim_start_matches("```");
    let without_open = without_open.trim_start();
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    Some(without_close.trim().to_string())
}

/// Convert single-quoted string delimiters to double quotes. Naive but matches
/// the single most common malformed shape (`{'tool': 'read_specs'}`); does not
/// attempt to handle escaped single quotes inside double-quoted strings.
fn single_to_double_quotes(s: &str) -> Option<String> {
    if !s.contains('\'') {
        return None;
    }
    let mut out = String::with_capacity(s.len());
    let mut in_double = false;
    for ch in s.chars() {
        match ch {
            '"' => {
                in_double = !in_double;
                out.push(ch);
            }
            '\'' if !in_double => out.push('"'),
            _ => out.push(ch),
        }
    }
    Some(out)
}

/// Remove commas immediately preceding a closing `}` or `]`, ignoring whitespace.
fn remove_trailing_commas(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    let mut changed = false;
    while i < bytes.len() {
        let ch = bytes[i] as char;
        if ch == ',' {
            let mut j = i + 1;
            while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                j += 1;
            }
            if j < bytes.len() && matches!(bytes[j] as char, '}' | ']') {
                changed = true;
                i += 1;
                continue;
            }
        }
        out.push(ch);
        i += 1;
    }
    if changed {
        Some(out)
    } else {
        None
    }
}

/// Close unterminated strings, arrays, and objects to the shortest valid form.
/// Scans once, tracking open brackets/braces and whether we are inside a string,
/// then appends the closers in reverse order of opening.
fn close_unterminated(s: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    for ch in s.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    if !in_string && stack.is_empty() {
        return None;
    }
    let mut out = s.to_string();
    if in_string {
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    Some(out)
}

/// Extract the longest substring that forms a balanced `{…}` object, ignoring
/// braces found inside string literals.
fn extract_longest_balanced_object(s: &str) -> Option<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut best: Option<(usize, usize)> = None;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                let len = end - i;
                if best.map(|(bs, be)| len > be - bs).unwrap_or(true) {
                    best = Some((i, end));
                }
            }
        }
        i += 1;
    }
    best.map(|(start, end)| chars[start..=end].iter().collect())
}

fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &ch) in chars.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
