mod app_state;
mod camera;
mod config;
mod core;
mod scan;
mod submit;
#[cfg(test)]
mod testing;
mod web;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use app_state::AppState;
use camera::discovery::{V4l2Enumerator, probe_report};
use config::AppConfig;
use submit::client::SubmissionClient;
use tokio::time::sleep;
use tracing::info;
use tracing_appender::rolling;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    if std::env::args().any(|arg| arg == "--probe-cameras") {
        let report = probe_report(&V4l2Enumerator).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if std::env::args().any(|arg| arg == "--ping") {
        let config = AppConfig::from_env()?;
        let client = SubmissionClient::from_config(&config)?
            .context("SUBMIT_ENDPOINT is not set")?;
        client
            .ping()
            .await
            .with_context(|| format!("ping to {} failed", client.endpoint()))?;
        println!("submission endpoint OK");
        return Ok(());
    }

    tokio::fs::create_dir_all("logs").await?;
    let file_appender = rolling::daily("logs", "scan-relay.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env()?;
    tokio::fs::create_dir_all("static").await?;

    let state = Arc::new(AppState::new(config.clone(), Arc::new(V4l2Enumerator))?);
    let app = web::routes::build_router(state.clone());

    {
        let scanner = state.scanner.clone();
        tokio::spawn(async move {
            scanner.announce_ready().await;
            sleep(Duration::from_secs(2)).await;
            scanner.test_connection().await;
        });
    }

    info!(
        "{} listening on {} (engine: {:?}, device: {})",
        config.app_name, config.bind_addr, config.scan_engine, config.camera_device
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
