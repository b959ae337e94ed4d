//! `orgchat serve` — Start the HTTP API server.

use orgchat_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!("warning: no API key set (ORGCHAT_API_KEY or OPENAI_API_KEY)");
    }

    println!("orgchat gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.chat.default_model);

    orgchat_gateway::start(config).await?;

    Ok(())
}
