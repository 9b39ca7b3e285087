//! Action parser: pulls structured directives out of free-form model replies.
//!
//! # ReAct mode
//!
//! ````text
//! Thought: I need the current weather.
//! Action:
//! ```json
//! {"type": "skill-call", "skill": "web_search", "parameters": {"query": "weather"}}
//! ```
//! ````
//!
//! A `Final Answer:` marker wins over everything else: the rest of the text
//! becomes a `result` action. Otherwise the first fenced block holding a
//! recognised directive is the action. The fence tag is ignored; the JSON
//! `type` field decides the variant.
//!
//! # Legacy mode
//!
//! Every block fenced as `json:a2a-task`, `json:skill-call` or `json:result`
//! is parsed on its own. The tag supplies the `type`.
//!
//! Malformed blocks never produce an error. They are logged and contribute no
//! action.

use regex_lite::Regex;
use serde_json::Value;
use simplea2a_core::action::{Action, ParsedReply, TaskTransfer};
use std::sync::OnceLock;
use tracing::{debug, warn};

const FINAL_ANSWER: &str = "Final Answer:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// One directive per reply, `Thought:` / `Final Answer:` markers
    #[default]
    ReAct,
    /// Any number of `json:<type>` fenced blocks
    Legacy,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([^\n`]*)\n(.*?)```").expect("Invalid fence pattern"))
}

fn thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Thought:(.*?)(?:Action:|Final Answer:|\z)")
            .expect("Invalid thought pattern")
    })
}

/// A fenced block: its tag (possibly empty) and raw body.
struct Fence<'a> {
    tag: &'a str,
    body: &'a str,
}

fn fences(text: &str) -> impl Iterator<Item = Fence<'_>> {
    fence_re().captures_iter(text).filter_map(|caps| {
        Some(Fence {
            tag: caps.get(1)?.as_str().trim(),
            body: caps.get(2)?.as_str().trim(),
        })
    })
}

/// The action type implied by a legacy `json:<type>` fence tag.
fn legacy_type(tag: &str) -> Option<&'static str> {
    match tag {
        "json:a2a-task" => Some("a2a-task"),
        "json:skill-call" => Some("skill-call"),
        "json:result" => Some("result"),
        _ => None,
    }
}

/// Deserialize a JSON value as an action, filling in `type` when the caller
/// knows it from the fence tag.
fn to_action(mut value: Value, implied_type: Option<&str>) -> Option<Action> {
    if let (Some(kind), Value::Object(map)) = (implied_type, &mut value) {
        map.entry("type")
            .or_insert_with(|| Value::String(kind.to_string()));
    }
    serde_json::from_value(value).ok()
}

/// Parse a model reply.
pub fn parse(text: &str, mode: ParseMode) -> ParsedReply {
    match mode {
        ParseMode::ReAct => parse_react(text),
        ParseMode::Legacy => parse_legacy(text),
    }
}

fn parse_react(text: &str) -> ParsedReply {
    let thought = thought_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    if let Some(pos) = text.find(FINAL_ANSWER) {
        let answer = text[pos + FINAL_ANSWER.len()..].trim();
        return ParsedReply {
            thought,
            actions: vec![Action::final_answer(answer)],
        };
    }

    for fence in fences(text) {
        let value: Value = match serde_json::from_str(fence.body) {
            Ok(v) => v,
            Err(e) => {
                debug!(tag = fence.tag, error = %e, "Skipping fenced block that is not JSON");
                continue;
            }
        };
        match to_action(value, None) {
            Some(action) => {
                return ParsedReply {
                    thought,
                    actions: vec![action],
                };
            }
            None => debug!(tag = fence.tag, "Fenced JSON carries no recognised directive"),
        }
    }

    // No directive: whatever the model said is only a thought.
    let thought = thought.or_else(|| {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    ParsedReply {
        thought,
        actions: Vec::new(),
    }
}

fn parse_legacy(text: &str) -> ParsedReply {
    let mut actions = Vec::new();
    for fence in fences(text) {
        let Some(kind) = legacy_type(fence.tag) else {
            continue;
        };
        let value: Value = match serde_json::from_str(fence.body) {
            Ok(v) => v,
            Err(e) => {
                warn!(kind, error = %e, "Skipping malformed directive block");
                continue;
            }
        };
        match to_action(value, Some(kind)) {
            Some(action) => actions.push(action),
            None => warn!(kind, "Directive block does not match its declared type"),
        }
    }
    ParsedReply {
        thought: None,
        actions,
    }
}

/// Find a hand-off directive embedded in final-answer text.
///
/// Accepts a fenced block (any tag, or `json:a2a-task` without a `type`
/// field) or the whole text being the bare JSON directive.
pub fn find_task_transfer(text: &str) -> Option<TaskTransfer> {
    let fenced = fences(text).find_map(|fence| {
        let value: Value = serde_json::from_str(fence.body).ok()?;
        match to_action(value, legacy_type(fence.tag))? {
            Action::TaskTransfer(transfer) => Some(transfer),
            _ => None,
        }
    });
    fenced.or_else(|| match serde_json::from_str::<Action>(text.trim()) {
        Ok(Action::TaskTransfer(transfer)) => Some(transfer),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simplea2a_core::action::SkillCall;

    fn only_action(reply: &ParsedReply) -> &Action {
        assert_eq!(reply.actions.len(), 1, "{reply:?}");
        &reply.actions[0]
    }

    #[test]
    fn final_answer_becomes_result() {
        let reply = parse("Final Answer: 42", ParseMode::ReAct);
        assert_eq!(only_action(&reply), &Action::final_answer("42"));
    }

    #[test]
    fn final_answer_wins_over_later_directives() {
        let text = "Thought: done\nFinal Answer: Paris\nAction:\n```json\n\
                    {\"type\": \"skill-call\", \"skill\": \"web_search\"}\n```";
        let reply = parse(text, ParseMode::ReAct);
        match only_action(&reply) {
            Action::Result(r) => assert!(r.text().starts_with("Paris")),
            other => panic!("expected result, got {other:?}"),
        }
        assert_eq!(reply.thought.as_deref(), Some("done"));
    }

    #[test]
    fn skill_call_with_thought() {
        let text = "Thought: I should search.\nAction:\n```json\n\
                    {\"type\": \"skill-call\", \"skill\": \"web_search\", \"parameters\": {\"query\": \"x\"}}\n```";
        let reply = parse(text, ParseMode::ReAct);
        assert_eq!(reply.thought.as_deref(), Some("I should search."));
        assert_eq!(
            only_action(&reply),
            &Action::SkillCall(SkillCall {
                skill: "web_search".into(),
                parameters: json!({"query": "x"}),
                callback: None,
            })
        );
    }

    #[test]
    fn inline_code_stays_inside_thought() {
        let text = "Thought: use ```code``` here then\nFinal Answer: done";
        let reply = parse(text, ParseMode::ReAct);
        assert_eq!(reply.thought.as_deref(), Some("use ```code``` here then"));
        assert_eq!(only_action(&reply), &Action::final_answer("done"));
    }

    #[test]
    fn fence_tag_is_ignored() {
        let text = "```json:skill-call\n{\"type\": \"result\", \"data\": \"ok\"}\n```";
        let reply = parse(text, ParseMode::ReAct);
        assert_eq!(only_action(&reply).type_tag(), "result");
    }

    #[test]
    fn single_result_block_yields_single_result() {
        let text = "Here you go:\n```\n{\"type\": \"result\", \"data\": {\"total\": 3}}\n```";
        let reply = parse(text, ParseMode::ReAct);
        match only_action(&reply) {
            Action::Result(r) => assert_eq!(r.data, json!({"total": 3})),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn unknown_or_missing_type_yields_no_action() {
        for text in [
            "```json\n{\"type\": \"dance\"}\n```",
            "```json\n{\"skill\": \"web_search\"}\n```",
            "```json\n{not json}\n```",
            "just chatting",
        ] {
            let reply = parse(text, ParseMode::ReAct);
            assert!(reply.is_empty(), "{text}");
        }
        let reply = parse("just chatting", ParseMode::ReAct);
        assert_eq!(reply.thought.as_deref(), Some("just chatting"));
    }

    #[test]
    fn first_recognised_block_is_used() {
        let text = "```json\n{\"rows\": 3}\n```\nAction:\n```json\n\
                    {\"type\": \"a2a-task\", \"targetAgent\": \"writer\", \"task\": \"draft\"}\n```";
        let reply = parse(text, ParseMode::ReAct);
        assert_eq!(only_action(&reply).type_tag(), "a2a-task");
    }

    #[test]
    fn legacy_collects_every_tagged_block() {
        let text = "\
```json:skill-call
{\"skill\": \"calc\", \"parameters\": {\"expr\": \"1+1\"}}
```
```json:a2a-task
{\"targetAgent\": \"writer\", \"task\": \"draft\"}
```
```json:skill-call
{\"skill\": \"calc\", \"parameters\": {\"expr\": \"2+2\"}}
```
```json
{\"type\": \"result\", \"data\": \"untagged blocks are ignored\"}
```";
        let reply = parse(text, ParseMode::Legacy);
        let tags: Vec<_> = reply.actions.iter().map(Action::type_tag).collect();
        assert_eq!(tags, vec!["skill-call", "a2a-task", "skill-call"]);
    }

    #[test]
    fn legacy_skips_malformed_blocks_only() {
        let text = "\
```json:result
{\"data\": \"broken\",
```
```json:result
{\"data\": \"fine\"}
```";
        let reply = parse(text, ParseMode::Legacy);
        match only_action(&reply) {
            Action::Result(r) => assert_eq!(r.text(), "fine"),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn reparsing_is_stable() {
        let text = "Thought: x\n```json\n{\"type\": \"skill-call\", \"skill\": \"t\"}\n```";
        assert_eq!(parse(text, ParseMode::ReAct), parse(text, ParseMode::ReAct));
        assert_eq!(parse(text, ParseMode::Legacy), parse(text, ParseMode::Legacy));
    }

    #[test]
    fn finds_embedded_task_transfer() {
        let fenced = "I'll pass this on.\n```json\n\
                      {\"type\": \"a2a-task\", \"targetAgent\": \"writer\", \"task\": \"draft\"}\n```";
        assert_eq!(find_task_transfer(fenced).unwrap().target_agent, "writer");

        let legacy = "```json:a2a-task\n{\"target_agent\": \"writer\", \"task\": \"draft\"}\n```";
        assert_eq!(find_task_transfer(legacy).unwrap().task, "draft");

        let bare = r#"{"type": "a2a-task", "targetAgent": "writer", "task": "draft"}"#;
        assert!(find_task_transfer(bare).is_some());

        assert!(find_task_transfer("The answer is 42.").is_none());
        let other = "```json\n{\"type\": \"result\", \"data\": 1}\n```";
        assert!(find_task_transfer(other).is_none());
    }
}
