//! `simplea2a init`: write a default configuration file.

use simplea2a_config::AppConfig;
use std::path::PathBuf;

pub fn run(config_path: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.unwrap_or_else(AppConfig::default_path);

    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;

    println!("Created {}", path.display());
    println!("\nNext steps:");
    println!("  1. Add an API key (or set SIMPLEA2A_API_KEY / OPENAI_API_KEY)");
    println!("  2. Describe your agents under [[agents]]");
    println!("  3. Run: simplea2a run --agent assistant \"What time is it?\"");
    Ok(())
}
