//! Directives an agent can emit inside its free-form reply.
//!
//! The wire shape is the JSON payload of a fenced block, discriminated by its
//! `type` field. Unknown `type` values fail to deserialize, which the parser
//! treats as "no directive".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of a skill name that means "delegate synchronously to this agent".
pub const AGENT_SKILL_PREFIX: &str = "agent:";

/// One structured directive extracted from a model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Hand the work off to another agent and stop.
    #[serde(rename = "a2a-task")]
    TaskTransfer(TaskTransfer),

    /// Call a tool, or an agent through the `agent:<id>` form.
    #[serde(rename = "skill-call")]
    SkillCall(SkillCall),

    /// The final answer.
    #[serde(rename = "result")]
    Result(ResultAction),
}

impl Action {
    /// The `type` tag used on the wire.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Action::TaskTransfer(_) => "a2a-task",
            Action::SkillCall(_) => "skill-call",
            Action::Result(_) => "result",
        }
    }

    /// Build a `result` action carrying plain answer text.
    pub fn final_answer(text: impl Into<String>) -> Self {
        Action::Result(ResultAction {
            data: Value::String(text.into()),
            format: None,
            destination: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTransfer {
    #[serde(rename = "targetAgent", alias = "target_agent")]
    pub target_agent: String,

    /// Instruction for the receiving agent
    pub task: String,

    #[serde(default)]
    pub context: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,

    /// Requested timeout in seconds; recorded, not enforced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCall {
    pub skill: String,

    #[serde(default = "empty_object")]
    pub parameters: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl SkillCall {
    /// The agent id when this call is a synchronous delegation (`agent:<id>`).
    pub fn delegate_target(&self) -> Option<&str> {
        self.skill
            .strip_prefix(AGENT_SKILL_PREFIX)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The instruction handed to a synchronously delegated agent.
    ///
    /// A string parameter bag, or a bag with a `task`/`instruction`/`query`
    /// string, is used verbatim; anything else is passed as JSON text.
    pub fn delegated_instruction(&self) -> String {
        match &self.parameters {
            Value::String(s) => s.clone(),
            Value::Object(map) => ["task", "instruction", "query"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| self.parameters.to_string()),
            other => other.to_string(),
        }
    }

    /// The context handed to a synchronously delegated agent: the `context`
    /// object when the bag has one, otherwise the bag itself.
    pub fn delegated_context(&self) -> Map<String, Value> {
        match &self.parameters {
            Value::Object(map) => match map.get("context") {
                Some(Value::Object(context)) => context.clone(),
                _ => map.clone(),
            },
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultAction {
    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl ResultAction {
    /// The answer as text: strings verbatim, other values as compact JSON.
    pub fn text(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// The normalized outcome of parsing one reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl ParsedReply {
    /// The single directive of a ReAct-mode parse, if any.
    pub fn action(&self) -> Option<&Action> {
        self.actions.first()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
