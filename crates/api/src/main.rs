use std::sync::Arc;

use anyhow::Context;

use stockledger_api::app::{build_app, services::AppServices};
use stockledger_infra::LedgerConfig;
use stockledger_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env().context("invalid configuration")?;
    stockledger_observability::init(LogFormat::from_json_flag(config.log_json));

    let services = AppServices::from_config(&config)
        .await
        .context("failed to initialise ledger store")?;
    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
