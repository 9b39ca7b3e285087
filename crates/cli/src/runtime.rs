//! Wires configuration, stores, providers, tools and the orchestrator.
//!
//! Every command that touches tasks builds the same runtime:
//!
//! 1. **Tools**: the default registry, plus `vika_records` when configured
//! 2. **Stores**: the configured backend, with the agent directory seeded
//! 3. **Invoker**: one rate gate shared by every provider
//! 4. **Orchestrator**: attached to a scheduler queue

use simplea2a_agent::{Orchestrator, Scheduler};
use simplea2a_config::AppConfig;
use simplea2a_core::event::EventBus;
use simplea2a_providers::{ProviderRouter, RateGate, RateLimitedInvoker};
use simplea2a_store::Stores;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Runtime {
    pub config: AppConfig,
    pub stores: Stores,
    pub orchestrator: Arc<Orchestrator>,
    /// Taken by whoever drives execution
    pub scheduler: Option<Scheduler>,
}

pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(AppConfig::default_path);
    let config =
        AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(config)
}

impl Runtime {
    pub async fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let tools = simplea2a_tools::default_registry(
            Duration::from_secs(config.tools.http_timeout_secs),
            config.tools.vika_base_url.as_deref(),
        );

        let stores = simplea2a_store::open(&config.store).await?;
        simplea2a_store::seed_from_config(stores.admin.as_ref(), &config, &tools.infos()).await?;

        let gate = Arc::new(RateGate::new(
            config.rate_limit.requests_per_second,
            Duration::from_millis(config.rate_limit.window_ms),
        ));
        let invoker = RateLimitedInvoker::new(gate, Arc::new(ProviderRouter::default()))
            .with_default_model(config.default_model.clone())
            .with_temperature(config.default_temperature)
            .with_max_tokens(config.default_max_tokens);

        let (submitter, scheduler) =
            Scheduler::channel(config.orchestrator.max_concurrent_tasks);
        let orchestrator = Orchestrator::new(
            stores.tasks.clone(),
            stores.directory.clone(),
            Arc::new(invoker),
            tools,
            Arc::new(EventBus::default()),
        )
        .with_max_steps(config.orchestrator.max_steps)
        .with_max_delegation_depth(config.orchestrator.max_delegation_depth)
        .with_submitter(submitter);

        info!(
            backend = ?config.store.backend,
            requests_per_second = config.rate_limit.requests_per_second,
            max_steps = config.orchestrator.max_steps,
            "Runtime ready"
        );

        Ok(Self {
            config,
            stores,
            orchestrator: Arc::new(orchestrator),
            scheduler: Some(scheduler),
        })
    }

    /// Start the scheduler in the background, if it has not been taken.
    pub fn spawn_scheduler(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        let scheduler = self.scheduler.take()?;
        Some(tokio::spawn(scheduler.run(self.orchestrator.clone())))
    }
}
