//! `compagent gateway`: Start the HTTP API server.

use compagent_config::AppConfig;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        info!(port, "Gateway port overridden on the command line");
        config.gateway.port = port;
    }

    println!("💼 CompAgent Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Origin:    {}",
        config.gateway.allowed_origin.as_deref().unwrap_or("http://localhost:8080")
    );
    println!("   Users:     {}", config.users.len());

    compagent_gateway::start(config).await?;

    Ok(())
}
