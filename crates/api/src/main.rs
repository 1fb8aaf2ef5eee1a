use anyhow::Context;

use mekgoro_infra::config::AppConfig;
use mekgoro_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mekgoro_observability::init(LogFormat::from_env());

    let config = AppConfig::from_env();
    let app = mekgoro_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
