//! `carehub-probe`: resolve the current session's identity and capabilities
//! against the configured backend and print them as JSON.

use anyhow::Context;
use serde_json::json;

use carehub_client::{ClientConfig, ClientState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carehub_observability::init();

    let config = ClientConfig::from_env().context("invalid configuration")?;
    tracing::info!(api_url = %config.api_url, "starting probe");

    let state = ClientState::from_config(&config).await?;
    if state.gateway.token().await.context("failed to read session store")?.is_none() {
        tracing::warn!("no session token; backend calls are unauthenticated");
    }

    state.resolver.load().await;

    let resolved = state.resolver.state();
    let report = json!({
        "apiUrl": config.api_url,
        "identity": resolved.identity(),
        "privileged": resolved.policy().is_some_and(|policy| policy.is_unrestricted()),
        "permissions": state.resolver.resolve_all(),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
