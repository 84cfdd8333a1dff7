use anyhow::Context;
use axum::Router;
use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use helpdesk_bot::channels::DiscordClient;
use helpdesk_bot::core::config::AppConfig;
use helpdesk_bot::core::shared::state::AppState;
use helpdesk_bot::tickets::api::configure_helpdesk_routes;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env().context("Invalid helpdesk configuration")?;

    let client = DiscordClient::new(&config.discord);
    let bot = client
        .current_user()
        .await
        .context("Could not authenticate against Discord")?;
    info!("Bot connected as {}", bot.tag());

    let state = Arc::new(AppState::new(Arc::new(client), config.helpdesk.clone()));
    let app = Router::new()
        .merge(configure_helpdesk_routes())
        .with_state(state);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Helpdesk event bridge listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Helpdesk bot stopped");
    Ok(())
}
