//! order-desk HTTP 服务
//!
//! 启动: cargo run --bin order-desk-web
//! 端口取配置 server.port，可用 ORDER_DESK_PORT 覆盖

#![cfg(feature = "web")]

use std::sync::Arc;

use anyhow::Context;
use order_desk::{config::load_config, core::ChatService, observability, server::router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let service = Arc::new(ChatService::from_config(&cfg).context("Failed to build chat service")?);
    let app = router(Arc::clone(&service));

    let port = std::env::var("ORDER_DESK_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.server.port);
    let addr = format!("{}:{}", cfg.server.host, port);
    tracing::info!(
        "{} listening on http://{}",
        cfg.app.name.as_deref().unwrap_or("order-desk"),
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let shutdown_service = Arc::clone(&service);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl-C received");
            shutdown_service.shutdown();
        })
        .await?;

    Ok(())
}
