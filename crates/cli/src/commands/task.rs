//! `simplea2a task`: show a task with its steps and children.

use serde_json::json;
use simplea2a_store::Stores;
use std::path::PathBuf;

use super::{print_steps, print_task};
use crate::runtime::load_config;

pub async fn run(
    config_path: Option<PathBuf>,
    id: &str,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let Stores { tasks, .. } = simplea2a_store::open(&config.store).await?;

    let task = tasks.get_task(id).await?;
    let steps = tasks.list_steps(id).await?;
    let children = tasks.list_children(id).await?;

    if as_json {
        let record = json!({
            "task": task,
            "steps": steps,
            "children": children,
        });
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    print_task(&task);
    print_steps(&steps);
    if !children.is_empty() {
        println!("\nChildren:");
        for child in &children {
            println!("  {} [{}] {}", child.id, child.status, child.agent_id);
        }
    }
    Ok(())
}
