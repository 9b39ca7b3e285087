//! `simplea2a run`: create a task and execute it inline.

use simplea2a_core::task::{Context, NewTask, Task, TaskStatus, TaskStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{print_steps, print_task, render_value};
use crate::runtime::{Runtime, load_config};

const FOLLOW_POLL: Duration = Duration::from_millis(250);

pub async fn run(
    config_path: Option<PathBuf>,
    agent: String,
    instruction: String,
    context: Option<String>,
    follow: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let context = parse_context(context.as_deref())?;
    let config = load_config(config_path)?;
    let mut runtime = Runtime::build(config).await?;
    // Hand-offs are executed by the scheduler.
    runtime.spawn_scheduler();

    let orchestrator = runtime.orchestrator.clone();
    let task = orchestrator
        .create_task(NewTask::new(agent, instruction).with_context(context))
        .await?;
    let task = orchestrator.execute_task(&task.id).await?;

    let store = orchestrator.store().clone();
    print_task(&task);
    print_steps(&store.list_steps(&task.id).await?);

    if follow && task.status == TaskStatus::Delegated {
        println!("\nFollowing delegated work...");
        for child in wait_for_descendants(&store, &task.id).await? {
            println!(
                "\n{} [{}] {}",
                child.agent_id, child.status, child.input.instruction
            );
            if let Some(result) = &child.result {
                println!("{}", render_value(result));
            }
            if let Some(error) = &child.error {
                println!("Error: {error}");
            }
        }
    }

    if task.status == TaskStatus::Failed {
        return Err(format!("Task {} failed", task.id).into());
    }
    Ok(())
}

fn parse_context(raw: Option<&str>) -> Result<Context, Box<dyn std::error::Error>> {
    let Some(raw) = raw else {
        return Ok(Context::new());
    };
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err("--context must be a JSON object".into()),
    }
}

/// Poll until every task below `root` is terminal, then return them all.
async fn wait_for_descendants(
    store: &Arc<dyn TaskStore>,
    root: &str,
) -> Result<Vec<Task>, Box<dyn std::error::Error>> {
    loop {
        let mut done = Vec::new();
        let mut frontier = vec![root.to_string()];
        let mut settled = true;
        while let Some(id) = frontier.pop() {
            for child in store.list_children(&id).await? {
                settled &= child.status.is_terminal();
                frontier.push(child.id.clone());
                done.push(child);
            }
        }
        if settled {
            return Ok(done);
        }
        tokio::time::sleep(FOLLOW_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_must_be_an_object() {
        assert!(parse_context(None).unwrap().is_empty());

        let ctx = parse_context(Some(r#"{"customer": "acme", "priority": 2}"#)).unwrap();
        assert_eq!(ctx["customer"], "acme");
        assert_eq!(ctx["priority"], 2);

        assert!(parse_context(Some("[1, 2]")).is_err());
        assert!(parse_context(Some("not json")).is_err());
    }
}
