use anyhow::Context;

use matflow_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::load().context("failed to load configuration")?;
    matflow_observability::init_with(&config.log.level, config.log.format);

    if config.uses_dev_secret() {
        tracing::warn!("MATFLOW__JWT__SECRET not set; using insecure dev default");
    }

    let app = matflow_api::app::build_app(&config);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        environment = %config.environment,
        addr = %listener.local_addr()?,
        "matflow api listening"
    );

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
