//! Voice server binary: loads config, builds the model client, and serves
//! the HTTP/WebSocket gateway.
//!
//! Usage: `sous-server [config.toml]`. Without an argument the default
//! config path is used when present, built-in defaults otherwise.

use sous::config::AssistConfig;
use sous::gateway::run_gateway;
use sous::model::HttpModelClient;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(
        "sous-server starting (model endpoint {}, listen {})",
        config.model.api_url,
        config.listen_addr()
    );

    let model = Arc::new(HttpModelClient::new(&config.model)?);

    run_gateway(config, model).await.map_err(|e| {
        tracing::error!(error = %e, "gateway exited with error");
        anyhow::anyhow!("sous-server failed: {e}")
    })
}

fn load_config() -> anyhow::Result<AssistConfig> {
    if let Some(path) = std::env::args().nth(1) {
        let path = std::path::PathBuf::from(path);
        return Ok(AssistConfig::from_file(&path)?);
    }

    let default_path = AssistConfig::default_config_path();
    if default_path.exists() {
        tracing::info!("loading config from {}", default_path.display());
        Ok(AssistConfig::from_file(&default_path)?)
    } else {
        Ok(AssistConfig::default())
    }
}
