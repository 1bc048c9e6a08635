//! Parsing of ReAct-formatted model output.
//!
//! The model is asked to answer with
//!
//! ```text
//! Thought: <reasoning>
//! Action: <tool name>
//! Action Input: <JSON object>
//! ```
//!
//! Models drift from that shape, so parsing is lenient: JSON may span several
//! lines, and anything unparseable becomes `{"query": <raw text>}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::tools::FINISH_TOOL;

pub const DEFAULT_THOUGHT: &str = "Continue with next step";
pub const NO_ACTION_ANSWER: &str = "No clear action determined";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedStep {
    pub thought: String,
    pub action: String,
    pub action_input: Value,
}

impl ProposedStep {
    pub fn new(thought: impl Into<String>, action: impl Into<String>, action_input: Value) -> Self {
        Self { thought: thought.into(), action: action.into(), action_input }
    }

    pub fn finish(thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(thought, FINISH_TOOL, json!({ "answer": answer.into() }))
    }
}

pub fn parse_react_response(response: &str) -> ProposedStep {
    let lines: Vec<&str> = response.lines().collect();
    let mut thought: Option<String> = None;
    let mut action: Option<String> = None;
    let mut action_input: Option<Value> = None;
    let mut final_answer: Option<String> = None;

    for (position, line) in lines.iter().enumerate() {
        let line = line.trim();
        if let Some(rest) = strip_label(line, "Thought:") {
            thought = Some(rest.to_string());
        } else if let Some(rest) = strip_label(line, "Action Input:") {
            action_input = Some(parse_action_input(rest, &lines[position + 1..]));
            break;
        } else if let Some(rest) = strip_label(line, "Action:") {
            action = Some(normalize_action(rest));
        } else if let Some(rest) = strip_label(line, "Final Answer:") {
            let trailing = lines[position + 1..].join("\n");
            final_answer = Some(join_nonempty(rest, trailing.trim()));
            break;
        }
    }

    let thought = thought.filter(|text| !text.is_empty()).unwrap_or_else(|| DEFAULT_THOUGHT.to_string());

    match action.filter(|name| !name.is_empty()) {
        Some(action) => {
            ProposedStep::new(thought, action, action_input.unwrap_or_else(|| Value::Object(Map::new())))
        }
        None => ProposedStep::finish(thought, final_answer.unwrap_or_else(|| NO_ACTION_ANSWER.to_string())),
    }
}

/// Trims whitespace plus surrounding backticks, brackets and quotes, and
/// lowercases tool names so "`Premium_Calculator`" dispatches.
pub fn normalize_action(raw: &str) -> String {
    raw.trim()
        .trim_matches(|ch: char| matches!(ch, '`' | '[' | ']' | '"' | '\'') || ch.is_whitespace())
        .to_lowercase()
}

fn parse_action_input(inline: &str, following: &[&str]) -> Value {
    let inline = inline.trim();
    if let Ok(value) = serde_json::from_str::<Value>(inline) {
        return value;
    }

    let mut block = inline.to_string();
    for line in following {
        block.push('\n');
        block.push_str(line);
    }
    let block = block.trim();

    if let (Some(start), Some(end)) = (block.find('{'), block.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&block[start..=end]) {
                return value;
            }
        }
    }

    let raw = if inline.is_empty() { block } else { inline };
    json!({ "query": raw })
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| line[label.len()..].trim())
}

fn join_nonempty(first: &str, rest: &str) -> String {
    match (first.is_empty(), rest.is_empty()) {
        (_, true) => first.to_string(),
        (true, false) => rest.to_string(),
        (false, false) => format!("{first}\n{rest}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{normalize_action, parse_react_response, DEFAULT_THOUGHT, NO_ACTION_ANSWER};

    #[test]
    fn parses_well_formed_response() {
        let step = parse_react_response(
            "Thought: I need the premium\nAction: premium_calculator\nAction Input: {\"policy_name\": \"ActivAssure\", \"members\": [{\"age\": 35}]}",
        );

        assert_eq!(step.thought, "I need the premium");
        assert_eq!(step.action, "premium_calculator");
        assert_eq!(step.action_input["policy_name"], "ActivAssure");
        assert_eq!(step.action_input["members"][0]["age"], 35);
    }

    #[test]
    fn multi_line_json_is_recovered_from_brace_span() {
        let step = parse_react_response(
            "Thought: compare\nAction: policy_comparator\nAction Input: ```json\n{\n  \"policy1\": \"ActivAssure\",\n  \"policy2\": \"ActivFit\"\n}\n```",
        );

        assert_eq!(step.action, "policy_comparator");
        assert_eq!(step.action_input, json!({"policy1": "ActivAssure", "policy2": "ActivFit"}));
    }

    #[test]
    fn unparseable_input_becomes_query_object() {
        let step = parse_react_response(
            "Thought: search\nAction: document_retriever\nAction Input: maternity waiting period",
        );

        assert_eq!(step.action_input, json!({"query": "maternity waiting period"}));
    }

    #[test]
    fn broken_brace_span_also_falls_back_to_query() {
        let step = parse_react_response("Action: document_retriever\nAction Input: {not json}");

        assert_eq!(step.action_input, json!({"query": "{not json}"}));
        assert_eq!(step.thought, DEFAULT_THOUGHT);
    }

    #[test]
    fn missing_action_finishes_with_default_answer() {
        let step = parse_react_response("I am not sure what to do.");

        assert_eq!(step.action, "finish");
        assert_eq!(step.thought, DEFAULT_THOUGHT);
        assert_eq!(step.action_input, json!({"answer": NO_ACTION_ANSWER}));
    }

    #[test]
    fn empty_action_line_counts_as_missing() {
        let step = parse_react_response("Thought: hmm\nAction:   \nAction Input: {}");

        assert_eq!(step.action, "finish");
        assert_eq!(step.action_input["answer"], NO_ACTION_ANSWER);
    }

    #[test]
    fn last_thought_line_wins() {
        let step = parse_react_response(
            "Thought: look up the rate\nThought: price ActivAssure first\nAction: list_products\nAction Input: {}",
        );

        assert_eq!(step.thought, "price ActivAssure first");
        assert_eq!(step.action, "list_products");
    }

    #[test]
    fn final_answer_line_becomes_finish_answer() {
        let step = parse_react_response("Thought: I know this\nFinal Answer: The premium is ₹8,126.66");

        assert_eq!(step.action, "finish");
        assert_eq!(step.action_input["answer"], "The premium is ₹8,126.66");
    }

    #[test]
    fn finish_action_keeps_answer_input() {
        let step = parse_react_response(
            "Thought: done\nAction: finish\nAction Input: {\"answer\": \"ActivFit is cheaper\"}",
        );

        assert_eq!(step.action, "finish");
        assert_eq!(step.action_input["answer"], "ActivFit is cheaper");
    }

    #[test]
    fn action_names_are_normalized() {
        assert_eq!(normalize_action(" `premium_calculator` "), "premium_calculator");
        assert_eq!(normalize_action("[Document_Retriever]"), "document_retriever");
        assert_eq!(normalize_action("\"finish\""), "finish");
    }

    #[test]
    fn action_without_input_gets_empty_object() {
        let step = parse_react_response("thought: list them\naction: list_products");

        assert_eq!(step.thought, "list them");
        assert_eq!(step.action, "list_products");
        assert_eq!(step.action_input, json!({}));
    }
}
