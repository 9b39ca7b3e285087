//! `simplea2a serve`: the scheduler plus the HTTP gateway.

use simplea2a_core::task::TaskStatus;
use simplea2a_gateway::GatewayState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::runtime::{Runtime, load_config};

/// Pending tasks picked up again at start-up.
const REQUEUE_LIMIT: usize = 1_000;

pub async fn run(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let mut runtime = Runtime::build(config).await?;
    let gateway_config = runtime.config.gateway.clone();

    println!("simplea2a");
    println!(
        "   Gateway:     {}:{}",
        gateway_config.host, gateway_config.port
    );
    println!("   Store:       {:?}", runtime.config.store.backend);
    println!(
        "   Rate limit:  {} req / {} ms",
        runtime.config.rate_limit.requests_per_second, runtime.config.rate_limit.window_ms
    );
    println!("   Agents:      {}", runtime.config.agents.len());

    runtime.spawn_scheduler();
    requeue_pending(&runtime).await;

    let state = Arc::new(GatewayState::new(runtime.orchestrator.clone()));
    simplea2a_gateway::start(&gateway_config, state).await?;

    Ok(())
}

/// Tasks left pending by a previous process would otherwise never run.
async fn requeue_pending(runtime: &Runtime) {
    let pending = match runtime
        .stores
        .tasks
        .list_tasks(Some(TaskStatus::Pending), REQUEUE_LIMIT)
        .await
    {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(error = %e, "Could not list pending tasks");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }

    let Some(submitter) = runtime.orchestrator.submitter() else {
        return;
    };
    // Oldest first, so earlier work keeps its place.
    for task in pending.iter().rev() {
        if let Err(e) = submitter.submit(task.id.clone()) {
            warn!(task_id = %task.id, error = %e, "Could not requeue task");
        }
    }
    info!(count = pending.len(), "Requeued pending tasks");
}
