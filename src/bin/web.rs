//! Scout HTTP API
//!
//! 启动: cargo run --bin scout-web --features web
//! 监听地址见 [app] listen（默认 127.0.0.1:8000），可用 SCOUT__APP__LISTEN 覆盖

use std::sync::Arc;

use anyhow::Context;
use scout::agent::AgentRuntime;
use scout::config::load_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    scout::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let runtime = Arc::new(
        AgentRuntime::from_config(&cfg)
            .await
            .context("Failed to build agent runtime")?,
    );

    let listener = tokio::net::TcpListener::bind(&cfg.app.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.app.listen))?;
    tracing::info!(addr = %cfg.app.listen, "scout-web listening");

    let shutdown_runtime = runtime.clone();
    axum::serve(listener, scout::web::router(runtime))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, cancelling active runs");
            shutdown_runtime.supervisor().cancel_all();
        })
        .await
        .context("Server failed")?;
    Ok(())
}
