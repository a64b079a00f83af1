use anyhow::Context;
use content_service::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    init_tracing(&config)?;

    let app = build_router(&config)
        .await
        .with_context(|| format!("starting the {} backend", config.storage.backend))?;

    Server::new(config).serve(app).await?;

    Ok(())
}
