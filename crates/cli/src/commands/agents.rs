//! `simplea2a agents`: list the agent directory.

use simplea2a_agent::build_system_prompt;
use std::path::PathBuf;

use crate::runtime::{Runtime, load_config};

pub async fn run(
    config_path: Option<PathBuf>,
    show_prompt: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let runtime = Runtime::build(config).await?;
    let directory = &runtime.stores.directory;

    let agents = directory.list_agents().await?;
    if agents.is_empty() {
        println!("No agents configured. Add [[agents]] entries to the config file.");
        return Ok(());
    }

    for agent in &agents {
        let sub_agents = directory.get_sub_agents(&agent.id).await?;
        let tools = directory.get_tools(&agent.id).await?;

        println!("{} ({})", agent.id, agent.name);
        println!("  Application: {}", agent.application_id);
        if let Some(model) = &agent.model {
            println!("  Model:       {model}");
        }
        let sub_ids: Vec<&str> = sub_agents.iter().map(|a| a.id.as_str()).collect();
        let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        println!("  Delegates:   {}", display_list(&sub_ids));
        println!("  Tools:       {}", display_list(&tool_names));

        if show_prompt {
            let prompt = build_system_prompt(agent, &sub_agents, &tools);
            println!("\n{prompt}\n");
        }
        println!();
    }
    Ok(())
}

fn display_list(items: &[&str]) -> String {
    if items.is_empty() {
        "-".into()
    } else {
        items.join(", ")
    }
}
