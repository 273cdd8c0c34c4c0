//! `passport tools`: list the tools a capability server advertises.

use passport_core::capability::{HttpToolClient, ToolClient};
use passport_core::config::PassportConfig;

pub async fn list(url: Option<&str>, json: bool) -> Result<(), String> {
    let config = PassportConfig::from_env();
    let url = url.unwrap_or(&config.capability_url);
    let client = HttpToolClient::new(url, config.tool_timeout);

    let tools = client.list_tools().await.map_err(|e| e.to_string())?;
    if json {
        let value = serde_json::to_value(&tools).map_err(|e| e.to_string())?;
        super::print_json(&value);
        return Ok(());
    }
    if tools.is_empty() {
        println!("No tools advertised by {}", url);
        return Ok(());
    }

    println!("{} tool(s) at {}:\n", tools.len(), url);
    for tool in &tools {
        println!("  {:<24} {}", tool.name, tool.description);
    }
    Ok(())
}
