use anyhow::Result;
use log::*;
use quizlive::{config::Config, http, server::{AppState, start_ws_server}};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    info!("Starting quizlive backend: {config:?}");

    let app_state = Arc::new(AppState::new(config.clone()));

    let ws_listener = TcpListener::bind((config.host.as_str(), config.ws_port)).await?;
    let http_listener = TcpListener::bind((config.host.as_str(), config.http_port)).await?;
    info!(
        "REST API listening on: {}",
        http_listener.local_addr()?
    );

    let api = http::router(app_state.clone());

    tokio::select! {
        _ = start_ws_server(ws_listener, app_state) => {},
        _ = axum::serve(http_listener, api) => {},
    }

    Ok(())
}
