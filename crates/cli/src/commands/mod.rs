pub mod agents;
pub mod cancel;
pub mod init;
pub mod run;
pub mod serve;
pub mod task;

use serde_json::Value;
use simplea2a_core::task::{Task, TaskStep};

/// Render a task result for the terminal: strings as-is, anything else as JSON.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

pub(crate) fn print_task(task: &Task) {
    println!("Task {}", task.id);
    println!("  Agent:    {}", task.agent_id);
    println!("  Status:   {}", task.status);
    if let Some(parent) = &task.parent_id {
        println!("  Parent:   {parent}");
    }
    if let Some(source) = &task.source_id {
        println!("  Source:   {source}");
    }
    println!("  Created:  {}", task.created_at.to_rfc3339());
    if let Some(finished) = task.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    println!("  Instruction: {}", task.input.instruction);
    if let Some(result) = &task.result {
        println!("\n{}", render_value(result));
    }
    if let Some(error) = &task.error {
        println!("\n  Error: {error}");
    }
}

pub(crate) fn print_steps(steps: &[TaskStep]) {
    if steps.is_empty() {
        return;
    }
    println!("\nSteps:");
    for step in steps {
        let action = step
            .action
            .as_ref()
            .map(|a| a.type_tag())
            .unwrap_or("none");
        println!(
            "  {} [{}] action={}",
            step.step_id,
            step.status.as_str(),
            action
        );
        if let Some(result) = &step.action_result {
            let rendered = render_value(result);
            let first_line = rendered.lines().next().unwrap_or_default();
            println!("    -> {first_line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_render_without_quotes() {
        assert_eq!(render_value(&json!("Paris")), "Paris");
        assert_eq!(render_value(&json!({"total": 3})), "{\n  \"total\": 3\n}");
    }
}
