//! `simplea2a cancel`: cancel a task that has not finished.

use simplea2a_store::Stores;
use std::path::PathBuf;

use crate::runtime::load_config;

pub async fn run(config_path: Option<PathBuf>, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let Stores { tasks, .. } = simplea2a_store::open(&config.store).await?;

    let task = tasks.get_task(id).await?;
    if task.status.is_terminal() {
        return Err(format!("Task {id} already finished as {}", task.status).into());
    }

    let task = tasks.cancel_task(id).await?;
    println!("Cancelled task {} (agent {})", task.id, task.agent_id);
    Ok(())
}
