//! `passport serve`: start pipeline services and block until Ctrl+C.

use std::sync::Arc;

use passport_core::agent::StageKind;
use passport_core::capability::{HttpToolClient, ToolClient};
use passport_core::config::PassportConfig;
use passport_core::orchestration::RetryPolicy;
use passport_core::PassportError;

fn tool_client(config: &PassportConfig) -> Arc<dyn ToolClient> {
    Arc::new(HttpToolClient::new(&config.capability_url, config.tool_timeout))
}

fn retry_policy(retries: u32) -> RetryPolicy {
    if retries <= 1 {
        RetryPolicy::none()
    } else {
        RetryPolicy::exponential(retries, std::time::Duration::from_millis(500))
    }
}

async fn wait_for_shutdown() -> Result<(), String> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;
    println!("\nShutting down...");
    Ok(())
}

pub async fn capabilities(host: &str) -> Result<(), String> {
    let config = PassportConfig::from_env();
    let addr = passport_server::start_capability_server(&config, host).await?;
    println!("Capability server listening on http://{}", addr);
    wait_for_shutdown().await
}

pub async fn agent(stage: &str, host: &str) -> Result<(), String> {
    let stage: StageKind = stage
        .parse()
        .map_err(|e: PassportError| e.to_string())?;
    let config = PassportConfig::from_env();
    let addr = passport_server::start_agent(stage, &config, tool_client(&config), host).await?;
    println!("{} agent listening on http://{}", stage, addr);
    wait_for_shutdown().await
}

pub async fn orchestrator(retries: u32, host: &str) -> Result<(), String> {
    let config = PassportConfig::from_env();
    let addr = passport_server::start_orchestrator(&config, retry_policy(retries), host).await?;
    println!("Orchestrator listening on http://{}", addr);
    wait_for_shutdown().await
}

/// Everything in one process, started in dependency order so the
/// orchestrator can discover every agent.
pub async fn all(retries: u32, host: &str) -> Result<(), String> {
    let config = PassportConfig::from_env();

    let addr = passport_server::start_capability_server(&config, host).await?;
    println!("Capability server   http://{}", addr);

    let tools = tool_client(&config);
    for stage in StageKind::ALL {
        let addr = passport_server::start_agent(stage, &config, tools.clone(), host).await?;
        println!("{:<19} http://{}", format!("{} agent", stage), addr);
    }

    let addr = passport_server::start_orchestrator(&config, retry_policy(retries), host).await?;
    println!("Orchestrator        http://{}", addr);
    wait_for_shutdown().await
}
