//! System prompt synthesis.
//!
//! The prompt is assembled from sections, in order:
//!
//! 1. **Role**: the agent's name and responsibilities
//! 2. **Sub-agents**: agents it may hand work to, addressed by id
//! 3. **Tools**: capabilities it may call, addressed by name
//! 4. **Response format**: the directive formats, versioned
//!
//! Empty sections are left out. The prompt is rebuilt for every task so
//! capability changes apply immediately.

use simplea2a_core::action::AGENT_SKILL_PREFIX;
use simplea2a_core::agent::{AgentProfile, SubAgentInfo, ToolInfo};

/// Bump when the directive formats below change.
pub const PROMPT_FORMAT_VERSION: &str = "react-v1";

pub fn build_system_prompt(
    identity: &AgentProfile,
    sub_agents: &[SubAgentInfo],
    tools: &[ToolInfo],
) -> String {
    let mut sections = vec![role_section(identity)];
    if !sub_agents.is_empty() {
        sections.push(sub_agents_section(sub_agents));
    }
    if !tools.is_empty() {
        sections.push(tools_section(tools));
    }
    sections.push(format_section(!sub_agents.is_empty()));
    sections.join("\n\n")
}

fn role_section(identity: &AgentProfile) -> String {
    let mut out = format!("You are {} (agent id `{}`).", identity.name, identity.id);
    let responsibilities = identity.responsibilities.trim();
    if !responsibilities.is_empty() {
        out.push_str("\n\n## Responsibilities and capabilities\n");
        out.push_str(responsibilities);
    }
    out
}

fn sub_agents_section(sub_agents: &[SubAgentInfo]) -> String {
    let mut out = String::from(
        "## Agents you can delegate to\n\
         Hand a whole task to one of these agents with an `a2a-task` directive whose \
         `targetAgent` is the agent id. To ask one a question and wait for the answer, \
         call the skill `agent:<id>` instead.\n",
    );
    for (i, agent) in sub_agents.iter().enumerate() {
        out.push_str(&format!(
            "{}. `{}` ({}): {}\n",
            i + 1,
            agent.id,
            agent.name,
            agent.responsibilities.trim()
        ));
    }
    out.trim_end().to_string()
}

fn tools_section(tools: &[ToolInfo]) -> String {
    let mut out = String::from(
        "## Tools you can call\n\
         Call a tool with a `skill-call` directive whose `skill` is the tool name.\n",
    );
    for tool in tools {
        out.push_str(&format!("- `{}`: {}\n", tool.name, tool.description.trim()));
    }
    out.trim_end().to_string()
}

fn format_section(can_delegate: bool) -> String {
    let mut out = format!(
        "## Response format ({PROMPT_FORMAT_VERSION})\n\
         Think step by step. Start with `Thought:` and your reasoning. Then either take \
         exactly one action or give the final answer.\n\n\
         To take an action, write `Action:` followed by one fenced JSON block:\n\n\
         ```json\n\
         {{\"type\": \"skill-call\", \"skill\": \"<tool name or {AGENT_SKILL_PREFIX}<agent id>>\", \
         \"parameters\": {{}}}}\n\
         ```\n\n\
         The result comes back as a message starting with `Observation:`.\n\n"
    );
    if can_delegate {
        out.push_str(
            "To hand the task to another agent and stop:\n\n\
             ```json\n\
             {\"type\": \"a2a-task\", \"targetAgent\": \"<agent id>\", \"task\": \"<instruction>\", \
             \"context\": {}}\n\
             ```\n\n",
        );
    }
    out.push_str(
        "When you are done, write `Final Answer:` followed by the answer, or return structured \
         data with:\n\n\
         ```json\n\
         {\"type\": \"result\", \"data\": <answer>}\n\
         ```",
    );
    out
}
