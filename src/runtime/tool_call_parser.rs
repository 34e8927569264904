//! Text-block tool-call parsing and fuzzy tool-name resolution.
//!
//! Legacy (non-native-function-calling) providers emit tool invocations inline
//! in assistant text. Three shapes are recognised, tried in this order:
//!
//! 1. An XML-ish wrapper: `<tool_use>{ "tool": "<name>", "arguments": {…} }</tool_use>`
//! 2. A bare object: `{"type": "tool_use", "name": "<name>", "input": {…}}`
//! 3. A bare object: `{"function_call": {"name": "<name>", "arguments": "<json string>"}}`
//!
//! Grounded on the brace-counting extraction in the teacher's `Agent::parse_tool_call`,
//! generalised to all three dialects and routed through [`crate::runtime::json_repair`]
//! so malformed JSON in any of them is repaired the same way.

use crate::runtime::json_repair::repair_parse;

/// A single tool invocation parsed out of assistant text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Scan `text` for every recognised tool-invocation block, in source order.
pub fn parse_tool_calls(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    calls.extend(parse_xml_blocks(text));
    calls.extend(parse_bare_objects(text));
    calls
}

fn parse_xml_blocks(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    let mut search_from = 0;
    while let Some(start) = text[search_from..].find("<tool_use>") {
        let body_start = search_from + start + "<tool_use>".len();
        let Some(end_rel) = text[body_start..].find("</tool_use>") else {
            break;
        };
        let body = text[body_start..body_start + end_rel].trim();
        if let Ok(value) = repair_parse(body) {
            if let Some(call) = from_wrapper_json(&value) {
                calls.push(call);
            }
        }
        search_from = body_start + end_rel + "</tool_use>".len();
    }
    calls
}

/// Accepts `{"tool": name, "arguments": {...}}` (the `<tool_use>` body shape) as
/// well as the two bare-object dialects, since all three carry the same payload.
fn from_wrapper_json(value: &serde_json::Value) -> Option<ParsedToolCall> {
    if let (Some(name), Some(arguments)) = (
        value.get("tool").and_then(|v| v.as_str()),
        value.get("arguments"),
    ) {
        return Some(ParsedToolCall {
            name: name.to_string(),
            arguments: arguments.clone(),
        });
    }
    from_type_tool_use(value).or_else(|| from_function_call(value))
}

/// `{"type": "tool_use", "name": "...", "input": {...}}`
fn from_type_tool_use(value: &serde_json::Value) -> Option<ParsedToolCall> {
    if value.get("type").and_then(|v| v.as_str()) != Some("tool_use") {
        return None;
    }
    let name = value.get("name")?.as_str()?.to_string();
    let arguments = value.get("input").cloned().unwrap_or(serde_json::json!({}));
    Some(ParsedToolCall { name, arguments })
}

/// `{"function_call": {"name": "...", "arguments": "<json string>"}}`
fn from_function_call(value: &serde_json::Value) -> Option<ParsedToolCall> {
    let call = value.get("function_call")?;
    let name = call.get("name")?.as_str()?.to_string();
    let arguments = match call.get("arguments") {
        Some(serde_json::Value::String(s)) => repair_parse(s).unwrap_or(serde_json::json!({})),
        Some(other) => other.clone(),
        None => serde_json::json!({}),
    };
    Some(ParsedToolCall { name, arguments })
}

/// Scan for top-level `{"type":"tool_use",...}` or `{"function_call":{...}}` objects
/// that are not wrapped in a `<tool_use>` block, via brace-counting over the text.
fn parse_bare_objects(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = matching_brace(&chars, i) {
                let candidate: String = chars[i..=end].iter().collect();
                if (candidate.contains("\"type\"") && candidate.contains("tool_use"))
                    || candidate.contains("\"function_call\"")
                {
                    if let Ok(value) = repair_parse(&candidate) {
                        if let Some(call) = from_type_tool_use(&value).or_else(|| from_function_call(&value)) {
                            calls.push(call);
                        }
                    }
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    calls
}

fn matching_brace(chars: &[char], start: usize) -> Option<usize> {
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

/// Fuzzy-resolve a tool name against a registry that only knows bare names:
/// strips any of the `default_api.`, `api.`, `tools.` prefixes and retries.
/// Returns the resolved bare name if either the exact name or a stripped
/// variant is present in `known_names`.
pub fn resolve_tool_name<'a>(requested: &'a str, known_names: &[&str]) -> Option<&'a str> {
    if known_names.contains(&requested) {
        return Some(requested);
    }
    for prefix in ["default_api.", "api.", "tools."] {
        if let Some(stripped) = requested.strip_prefix(prefix) {
            if known_names.contains(&stripped) {
                log::info!("fuzzy-resolved tool name '{}' -> '{}'", requested, stripped);
                return Some(stripped);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xml_tool_use_block() {
        let text = "<tool_use>\n{ \"tool\": \"read_specs\", \"arguments\": { \"id\": \"x\" } }\n</tool_use>";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_specs");
        assert_eq!(calls[0].arguments["id"], "x");
    }

    #[test]
    fn parses_xml_block_with_malformed_json() {
        let text = "<tool_use>\n{'tool': 'read_specs', 'arguments': {,}}\n</tool_use>";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_specs");
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn parses_type_tool_use_object() {
        let text = "Sure. {\"type\": \"tool_use\", \"name\": \"calculator\", \"input\": {\"expression\": \"2+2\"}}";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "calculator");
    }

    #[test]
    fn parses_function_call_object_with_string_arguments() {
        let text = r#"{"function_call": {"name": "calculator", "arguments": "{\"expression\": \"2+2\"}"}}"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["expression"], "2+2");
    }

    #[test]
    fn fuzzy_resolution_strips_known_prefixes() {
        let known = ["foo"];
        assert_eq!(resolve_tool_name("foo", &known), Some("foo"));
        assert_eq!(resolve_tool_name("default_api.foo", &known), Some("foo"));
        assert_eq!(resolve_tool_name("api.foo", &known), Some("foo"));
        assert_eq!(resolve_tool_name("tools.foo", &known), Some("foo"));
        assert_eq!(resolve_tool_name("unknown.foo", &known), None);
    }
}
